pub mod env_var;
pub mod finder;
pub mod path;
pub mod reg_key;
pub mod shortcut;

pub use env_var::{DelayedBroadcast, EnvVar};
pub use finder::{SearchDir, ShortcutFinder};
pub use path::{normalize_path, normalize_path_with, windows_normpath, NormalizeOptions, Tilde};
pub use reg_key::RegKey;
pub use shortcut::{PinLocations, Shell, Shortcut};
