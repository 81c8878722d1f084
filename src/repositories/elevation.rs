//! Process elevation.
//!
//! Writes to machine-wide keys (system environment, `HKLM\Software`) need an
//! elevated token. The registry repository uses this to say why a write was
//! refused.

use crate::domain::Result;
use tracing::debug;

/// Whether the current process token is elevated.
///
/// Fails if the token cannot be opened or queried. Always `Ok(false)` off
/// Windows.
pub fn elevation_status() -> Result<bool> {
    #[cfg(windows)]
    {
        token::query_elevation()
    }

    #[cfg(not(windows))]
    {
        Ok(false)
    }
}

/// [`elevation_status`], reading a failed token query as "not elevated".
#[must_use]
pub fn is_admin() -> bool {
    elevation_status().unwrap_or_else(|e| {
        debug!("Elevation query failed: {}", e);
        false
    })
}

#[cfg(windows)]
mod token {
    use crate::domain::Result;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    /// Process token, closed on drop.
    struct Token(HANDLE);

    impl Drop for Token {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    pub(super) fn query_elevation() -> Result<bool> {
        let mut handle = HANDLE::default();
        unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &raw mut handle)? };
        let token = Token(handle);

        let mut elevation = TOKEN_ELEVATION::default();
        let mut return_length = 0u32;
        #[allow(clippy::cast_possible_truncation)]
        let size = std::mem::size_of::<TOKEN_ELEVATION>() as u32;
        unsafe {
            GetTokenInformation(
                token.0,
                TokenElevation,
                Some((&raw mut elevation).cast()),
                size,
                &raw mut return_length,
            )?;
        }
        Ok(elevation.TokenIsElevated != 0)
    }
}
