pub mod domain;
pub mod repositories;
pub mod services;

// Public, stable-ish API surface for consumers (CLI / other crates)

pub use crate::domain::{
    CasementError, Hive, IconLocation, PinTarget, PinnedShortcutState, RawValue,
    RegistryLocation, RegistryValue, RegistryView, Result, Scope, ShortcutDescriptor,
    WellKnownKey,
};

pub use crate::repositories::app_id::qualified_app_id;
pub use crate::repositories::elevation::{elevation_status, is_admin};
pub use crate::repositories::{
    EnvironmentBroadcast, LinkStore, MemoryRegistry, NoBroadcast, RegistryBackend, VerbProvider,
};

#[cfg(windows)]
pub use crate::repositories::app_id::{current_process_app_id, set_current_process_app_id};
#[cfg(windows)]
pub use crate::repositories::{SettingChangeBroadcast, ShellLinkStore, ShellVerbs, WinRegistry};

pub use crate::services::{
    normalize_path, EnvVar, NormalizeOptions, PinLocations, RegKey, SearchDir, Shell, Shortcut,
    ShortcutFinder, Tilde,
};

pub mod prelude {
    pub use crate::domain::{
        CasementError, Hive, PinTarget, RegistryLocation, RegistryValue, Result, Scope,
        ShortcutDescriptor,
    };
    pub use crate::repositories::{LinkStore, RegistryBackend, VerbProvider};
    pub use crate::services::{
        normalize_path, EnvVar, NormalizeOptions, RegKey, Shell, Shortcut, ShortcutFinder, Tilde,
    };

    #[cfg(windows)]
    pub use crate::repositories::{ShellLinkStore, ShellVerbs, WinRegistry};
}
