//! Explicit App User Model ID of the running process.
//!
//! Windows groups taskbar buttons by this id. It has to be set before the
//! process shows any window.

/// Join `prefix` and `id` the way taskbar ids are conventionally namespaced,
/// e.g. `("Editor", Some("Vendor"))` gives `Vendor.Editor`.
pub fn qualified_app_id(id: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}.{id}"),
        _ => id.to_owned(),
    }
}

#[cfg(windows)]
pub use native::{current_process_app_id, set_current_process_app_id};

#[cfg(windows)]
mod native {
    use super::qualified_app_id;
    use crate::domain::Result;
    use tracing::debug;
    use windows::core::HSTRING;
    use windows::Win32::System::Com::CoTaskMemFree;
    use windows::Win32::UI::Shell::{
        GetCurrentProcessExplicitAppUserModelID, SetCurrentProcessExplicitAppUserModelID,
    };

    /// Set the id used to group this process' windows on the taskbar.
    pub fn set_current_process_app_id(id: &str, prefix: Option<&str>) -> Result<()> {
        let id = qualified_app_id(id, prefix);
        debug!("Setting process app id to {}", id);
        unsafe { SetCurrentProcessExplicitAppUserModelID(&HSTRING::from(id.as_str()))? };
        Ok(())
    }

    /// `None` if the process never set an explicit id.
    pub fn current_process_app_id() -> Result<Option<String>> {
        match unsafe { GetCurrentProcessExplicitAppUserModelID() } {
            Ok(ptr) => {
                let id = unsafe { ptr.to_string() }.unwrap_or_default();
                unsafe { CoTaskMemFree(Some(ptr.0 as *const _)) };
                Ok(Some(id))
            }
            Err(_) => Ok(None),
        }
    }
}
