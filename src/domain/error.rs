//! Error types for the crate.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CasementError {
    #[error("Shortcut not found: {}", .0.display())]
    ShortcutNotFound(PathBuf),

    #[error("Invalid shortcut {}: {reason}", .path.display())]
    InvalidShortcut { path: PathBuf, reason: String },

    #[error("Shell verb \"{verb}\" is not available for {}", .path.display())]
    PinVerbUnavailable { verb: String, path: PathBuf },

    #[error("Shortcut is not pinned to the {target}: {}", .path.display())]
    NotPinned { target: String, path: PathBuf },

    #[error("Pinned paths can only be modified for the current user: {}", .0.display())]
    ForeignPinDirectory(PathBuf),

    #[error("Registry entry not found: {0}")]
    EntryNotFound(String),

    #[error("Registry key not found: {0}")]
    KeyNotFound(String),

    #[error("Unsupported registry value type: {0}")]
    UnsupportedValueType(u32),

    #[error("Malformed registry value of type {raw_type}: {reason}")]
    MalformedValue { raw_type: u32, reason: String },

    #[error("Unable to delete key, it has sub-keys: {0}")]
    KeyNotEmpty(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Registry error {code}: {context}")]
    RegistryError { code: i32, context: String },

    #[error("Invalid shortcut name pattern: {0}")]
    InvalidPattern(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Shell error: {0}")]
    Shell(String),
}

/// `ERROR_KEY_DELETED`: the key behind an open handle was deleted.
pub const ERROR_KEY_DELETED: i32 = 1018;

impl CasementError {
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }

    /// The handle used for the operation outlived its key.
    pub fn is_key_deleted(&self) -> bool {
        matches!(self, Self::RegistryError { code, .. } if *code == ERROR_KEY_DELETED)
    }

    /// True for every "the thing you asked for does not exist" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ShortcutNotFound(_)
                | Self::EntryNotFound(_)
                | Self::KeyNotFound(_)
                | Self::NotPinned { .. }
        )
    }
}

impl From<std::io::Error> for CasementError {
    fn from(e: std::io::Error) -> Self {
        CasementError::FileSystem(e.to_string())
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for CasementError {
    fn from(e: windows::core::Error) -> Self {
        CasementError::Shell(e.to_string())
    }
}

pub type Result<T = (), E = CasementError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(CasementError::EntryNotFound("Path".into()).is_not_found());
        assert!(CasementError::ShortcutNotFound(PathBuf::from("a.lnk")).is_not_found());
        assert!(!CasementError::KeyNotEmpty("HKCU\\Software".into()).is_not_found());
    }

    #[test]
    fn test_io_error_maps_to_file_system() {
        let err: CasementError =
            std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err, CasementError::FileSystem("disk full".into()));
    }
}
