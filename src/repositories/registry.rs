//! Registry access - the backend seam plus a thin wrapper over winreg.

use crate::domain::{RawValue, RegistryLocation, RegistryView, Result};

/// Raw key/value storage a [`crate::services::RegKey`] talks to.
///
/// Handles are scoped: whatever a backend returns from `open`/`create` is
/// released when dropped.
pub trait RegistryBackend: Clone {
    type Handle;

    /// `Ok(None)` when the key does not exist.
    fn open(
        &self,
        location: &RegistryLocation,
        view: RegistryView,
        write: bool,
    ) -> Result<Option<Self::Handle>>;

    /// Create the key and every missing parent. Opens it if it already exists.
    fn create(&self, location: &RegistryLocation, view: RegistryView) -> Result<Self::Handle>;

    /// Remove a key that has no sub-keys.
    fn delete_key(&self, location: &RegistryLocation, view: RegistryView) -> Result<()>;

    fn subkey_names(&self, handle: &Self::Handle) -> Result<Vec<String>>;

    fn value_names(&self, handle: &Self::Handle) -> Result<Vec<String>>;

    /// `Ok(None)` when the value does not exist.
    fn get_value(&self, handle: &Self::Handle, name: &str) -> Result<Option<RawValue>>;

    fn set_value(&self, handle: &Self::Handle, name: &str, value: &RawValue) -> Result<()>;

    /// `Ok(false)` when there was nothing to delete.
    fn delete_value(&self, handle: &Self::Handle, name: &str) -> Result<bool>;
}

#[cfg(windows)]
pub use native::WinRegistry;

#[cfg(windows)]
mod native {
    use super::RegistryBackend;
    use crate::domain::value as codec;
    use crate::domain::{CasementError, Hive, RawValue, RegistryLocation, RegistryView, Result};
    use crate::repositories::elevation;
    use std::io;
    use tracing::trace;
    use winreg::enums::*;
    use winreg::{RegKey, RegValue, HKEY};

    const ERROR_ACCESS_DENIED: i32 = 5;

    /// The live Windows registry.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WinRegistry;

    fn predef(hive: Hive) -> RegKey {
        let hkey: HKEY = match hive {
            Hive::ClassesRoot => HKEY_CLASSES_ROOT,
            Hive::CurrentUser => HKEY_CURRENT_USER,
            Hive::LocalMachine => HKEY_LOCAL_MACHINE,
            Hive::Users => HKEY_USERS,
            Hive::CurrentConfig => HKEY_CURRENT_CONFIG,
        };
        RegKey::predef(hkey)
    }

    fn sam(view: RegistryView) -> u32 {
        match view {
            RegistryView::Default => 0,
            RegistryView::Registry32 => KEY_WOW64_32KEY,
            RegistryView::Registry64 => KEY_WOW64_64KEY,
        }
    }

    fn map_err(e: io::Error, context: impl Into<String>) -> CasementError {
        let context = context.into();
        match e.raw_os_error() {
            Some(ERROR_ACCESS_DENIED) => {
                if elevation::is_admin() {
                    CasementError::AccessDenied(context)
                } else {
                    CasementError::AccessDenied(format!("{} (process is not elevated)", context))
                }
            }
            Some(code) => CasementError::RegistryError { code, context },
            None => CasementError::RegistryError {
                code: -1,
                context: format!("{}: {}", context, e),
            },
        }
    }

    fn to_reg_type(raw_type: u32) -> Result<RegType> {
        Ok(match raw_type {
            codec::REG_NONE => RegType::REG_NONE,
            codec::REG_SZ => RegType::REG_SZ,
            codec::REG_EXPAND_SZ => RegType::REG_EXPAND_SZ,
            codec::REG_BINARY => RegType::REG_BINARY,
            codec::REG_DWORD => RegType::REG_DWORD,
            codec::REG_DWORD_BIG_ENDIAN => RegType::REG_DWORD_BIG_ENDIAN,
            codec::REG_LINK => RegType::REG_LINK,
            codec::REG_MULTI_SZ => RegType::REG_MULTI_SZ,
            codec::REG_RESOURCE_LIST => RegType::REG_RESOURCE_LIST,
            9 => RegType::REG_FULL_RESOURCE_DESCRIPTOR,
            10 => RegType::REG_RESOURCE_REQUIREMENTS_LIST,
            codec::REG_QWORD => RegType::REG_QWORD,
            other => return Err(CasementError::UnsupportedValueType(other)),
        })
    }

    impl RegistryBackend for WinRegistry {
        type Handle = RegKey;

        fn open(
            &self,
            location: &RegistryLocation,
            view: RegistryView,
            write: bool,
        ) -> Result<Option<RegKey>> {
            let access = if write { KEY_READ | KEY_WRITE } else { KEY_READ };
            trace!("Opening {} (write: {})", location, write);
            match predef(location.hive()).open_subkey_with_flags(location.subpath(), access | sam(view)) {
                Ok(key) => Ok(Some(key)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(map_err(e, location.to_string())),
            }
        }

        fn create(&self, location: &RegistryLocation, view: RegistryView) -> Result<RegKey> {
            let (key, _) = predef(location.hive())
                .create_subkey_with_flags(location.subpath(), KEY_READ | KEY_WRITE | sam(view))
                .map_err(|e| map_err(e, location.to_string()))?;
            Ok(key)
        }

        fn delete_key(&self, location: &RegistryLocation, view: RegistryView) -> Result<()> {
            let (parent, name) = match (location.parent(), location.name()) {
                (Some(parent), Some(name)) => (parent, name.to_owned()),
                _ => {
                    return Err(CasementError::AccessDenied(format!(
                        "cannot delete hive root {}",
                        location
                    )))
                }
            };
            let parent_key = self
                .open(&parent, view, true)?
                .ok_or_else(|| CasementError::KeyNotFound(parent.to_string()))?;
            parent_key
                .delete_subkey_with_flags(&name, sam(view))
                .map_err(|e| map_err(e, location.to_string()))
        }

        fn subkey_names(&self, handle: &RegKey) -> Result<Vec<String>> {
            handle
                .enum_keys()
                .collect::<io::Result<Vec<String>>>()
                .map_err(|e| map_err(e, "enumerate sub-keys"))
        }

        fn value_names(&self, handle: &RegKey) -> Result<Vec<String>> {
            handle
                .enum_values()
                .map(|item| item.map(|(name, _)| name))
                .collect::<io::Result<Vec<String>>>()
                .map_err(|e| map_err(e, "enumerate values"))
        }

        fn get_value(&self, handle: &RegKey, name: &str) -> Result<Option<RawValue>> {
            match handle.get_raw_value(name) {
                Ok(value) => {
                    let RegValue { bytes, vtype, .. } = value;
                    Ok(Some(RawValue::new(vtype as u32, bytes.to_vec())))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(map_err(e, name)),
            }
        }

        fn set_value(&self, handle: &RegKey, name: &str, value: &RawValue) -> Result<()> {
            let raw = RegValue {
                bytes: value.bytes.clone().into(),
                vtype: to_reg_type(value.raw_type)?,
            };
            handle
                .set_raw_value(name, &raw)
                .map_err(|e| map_err(e, name))
        }

        fn delete_value(&self, handle: &RegKey, name: &str) -> Result<bool> {
            match handle.delete_value(name) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(map_err(e, name)),
            }
        }
    }
}
