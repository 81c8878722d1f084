//! Environment change notification.

use crate::domain::Result;

/// Tells running processes that the stored environment changed.
pub trait EnvironmentBroadcast {
    fn broadcast(&self) -> Result<()>;
}

/// Skips notification entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBroadcast;

impl EnvironmentBroadcast for NoBroadcast {
    fn broadcast(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: EnvironmentBroadcast + ?Sized> EnvironmentBroadcast for &T {
    fn broadcast(&self) -> Result<()> {
        (**self).broadcast()
    }
}

#[cfg(windows)]
pub use native::SettingChangeBroadcast;

#[cfg(windows)]
mod native {
    use super::EnvironmentBroadcast;
    use crate::domain::{CasementError, Result};
    use windows::Win32::Foundation::{LPARAM, WPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        SendMessageTimeoutW, HWND_BROADCAST, SMTO_ABORTIFHUNG, WM_SETTINGCHANGE,
    };

    /// Sends `WM_SETTINGCHANGE` with `"Environment"` to every top-level
    /// window. Hung windows are skipped after `timeout_ms`.
    #[derive(Debug, Clone, Copy)]
    pub struct SettingChangeBroadcast {
        pub timeout_ms: u32,
    }

    impl Default for SettingChangeBroadcast {
        fn default() -> Self {
            Self { timeout_ms: 1000 }
        }
    }

    impl EnvironmentBroadcast for SettingChangeBroadcast {
        fn broadcast(&self) -> Result<()> {
            let param: Vec<u16> = "Environment".encode_utf16().chain(Some(0)).collect();
            let mut result = 0usize;

            let rv = unsafe {
                SendMessageTimeoutW(
                    HWND_BROADCAST,
                    WM_SETTINGCHANGE,
                    WPARAM(0),
                    LPARAM(param.as_ptr() as isize),
                    SMTO_ABORTIFHUNG,
                    self.timeout_ms,
                    Some(&raw mut result),
                )
            };

            if rv.0 == 0 {
                let err = windows::core::Error::from_thread();
                return Err(CasementError::Shell(format!(
                    "SendMessageTimeoutW failed: {err}"
                )));
            }
            Ok(())
        }
    }
}
