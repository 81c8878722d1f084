pub mod app_id;
pub mod broadcast;
pub mod elevation;
pub mod memory;
pub mod registry;
pub mod shell;

pub use broadcast::{EnvironmentBroadcast, NoBroadcast};
pub use memory::MemoryRegistry;
pub use registry::RegistryBackend;
pub use shell::{LinkStore, VerbProvider};

#[cfg(windows)]
pub use broadcast::SettingChangeBroadcast;
#[cfg(windows)]
pub use registry::WinRegistry;
#[cfg(windows)]
pub use shell::{ShellLinkStore, ShellVerbs};
