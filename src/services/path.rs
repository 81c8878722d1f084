//! Path normalization for values stored in environment variables.

use crate::domain::value::expand_vars;
use crate::domain::Result;

/// How `normalize_path` treats file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tilde {
    /// Expand 8.3 short names, `C:\PROGRA~1` becomes `C:\Program Files`.
    Long,
    /// Convert to 8.3 short names.
    Short,
    /// Collapse a leading home directory to `~`.
    Home,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub expand_vars: bool,
    pub tilde: Option<Tilde>,
    pub normpath: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            expand_vars: true,
            tilde: None,
            normpath: true,
        }
    }
}

impl NormalizeOptions {
    pub fn with_tilde(mut self, tilde: Tilde) -> Self {
        self.tilde = Some(tilde);
        self
    }
}

/// Normalize `path` against the process environment and the current user's
/// home directory.
pub fn normalize_path(path: &str, options: &NormalizeOptions) -> Result<String> {
    let home = dirs::home_dir().map(|p| p.to_string_lossy().into_owned());
    normalize_path_with(path, options, |name| std::env::var(name).ok(), home.as_deref())
}

/// [`normalize_path`] with an injectable variable lookup and home directory.
pub fn normalize_path_with<F>(
    path: &str,
    options: &NormalizeOptions,
    lookup: F,
    home: Option<&str>,
) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut path = if options.expand_vars {
        expand_vars(path, lookup)
    } else {
        path.to_owned()
    };

    match options.tilde {
        Some(Tilde::Long) => path = long_path_name(&path)?,
        Some(Tilde::Short) => path = short_path_name(&path)?,
        _ => {}
    }

    if options.normpath {
        path = windows_normpath(&path);
    }

    if options.tilde == Some(Tilde::Home) {
        if let Some(home) = home {
            path = collapse_home(&path, home);
        }
    }

    Ok(path)
}

/// Replace a leading `home` with `~`. Only whole components match, compared
/// case-insensitively.
pub fn collapse_home(path: &str, home: &str) -> String {
    let home = home.trim_end_matches(['\\', '/']);
    if home.is_empty() || path.len() < home.len() || !path.is_char_boundary(home.len()) {
        return path.to_owned();
    }
    let (head, tail) = path.split_at(home.len());
    if head.to_lowercase() != home.to_lowercase() {
        return path.to_owned();
    }
    if tail.is_empty() || tail.starts_with(['\\', '/']) {
        format!("~{tail}")
    } else {
        path.to_owned()
    }
}

/// Lexical normalization with Windows rules: `/` becomes `\`, duplicate
/// separators and `.` components go away, `..` eats the previous component.
/// `\\.\` and `\\?\` device paths are left alone.
pub fn windows_normpath(path: &str) -> String {
    let path = path.replace('/', "\\");
    if path.starts_with(r"\\.\") || path.starts_with(r"\\?\") {
        return path;
    }

    let (drive, rest) = split_drive(&path);
    let mut prefix = drive.to_owned();
    let rooted = rest.starts_with('\\');
    if rooted {
        prefix.push('\\');
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('\\') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                // nothing above the root
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    if prefix.is_empty() && parts.is_empty() {
        return ".".to_owned();
    }
    prefix + &parts.join("\\")
}

/// Split `C:` or `\\server\share` off the front of a `\` separated path.
fn split_drive(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return path.split_at(2);
    }
    if let Some(unc) = path.strip_prefix(r"\\") {
        if unc.starts_with('\\') {
            return ("", path);
        }
        return match unc.find('\\') {
            Some(server_end) => {
                let share = &unc[server_end + 1..];
                let end = share
                    .find('\\')
                    .map_or(path.len(), |i| 2 + server_end + 1 + i);
                path.split_at(end)
            }
            None => (path, ""),
        };
    }
    ("", path)
}

#[cfg(windows)]
fn long_path_name(path: &str) -> Result<String> {
    use windows::Win32::Storage::FileSystem::GetLongPathNameW;
    convert_path_name(path, |input, output| unsafe { GetLongPathNameW(input, output) })
}

#[cfg(windows)]
fn short_path_name(path: &str) -> Result<String> {
    use windows::Win32::Storage::FileSystem::GetShortPathNameW;
    convert_path_name(path, |input, output| unsafe { GetShortPathNameW(input, output) })
}

/// Two-call buffer sizing shared by `GetLongPathNameW`/`GetShortPathNameW`.
#[cfg(windows)]
fn convert_path_name<F>(path: &str, call: F) -> Result<String>
where
    F: Fn(&windows::core::HSTRING, Option<&mut [u16]>) -> u32,
{
    use crate::domain::CasementError;
    use windows::core::HSTRING;

    let input = HSTRING::from(path);
    let needed = call(&input, None);
    if needed == 0 {
        let err = windows::core::Error::from_thread();
        return Err(CasementError::FileSystem(format!("{path}: {err}")));
    }
    let mut buf = vec![0u16; needed as usize];
    let written = call(&input, Some(&mut buf)) as usize;
    if written == 0 || written >= buf.len() {
        let err = windows::core::Error::from_thread();
        return Err(CasementError::FileSystem(format!("{path}: {err}")));
    }
    Ok(String::from_utf16_lossy(&buf[..written]))
}

// 8.3 names only exist on Windows volumes.
#[cfg(not(windows))]
fn long_path_name(path: &str) -> Result<String> {
    Ok(path.to_owned())
}

#[cfg(not(windows))]
fn short_path_name(path: &str) -> Result<String> {
    Ok(path.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_vars(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_normpath() {
        assert_eq!(windows_normpath(r"C:/Tools//bin/./x/../app.exe"), r"C:\Tools\bin\app.exe");
        assert_eq!(windows_normpath(r"C:\..\Windows"), r"C:\Windows");
        assert_eq!(windows_normpath(r"..\a\..\..\b"), r"..\..\b");
        assert_eq!(windows_normpath(""), ".");
        assert_eq!(windows_normpath(r"\\server\share\dir\..\file"), r"\\server\share\file");
        assert_eq!(windows_normpath(r"\\?\C:\a\..\b"), r"\\?\C:\a\..\b");
        assert_eq!(windows_normpath("C:"), "C:");
    }

    #[test]
    fn test_expands_known_vars_only() {
        let lookup = |name: &str| (name == "ROOT").then(|| r"C:\Tools".to_owned());
        let path = normalize_path_with(
            r"%ROOT%\bin;%MISSING%",
            &NormalizeOptions::default(),
            lookup,
            None,
        )
        .unwrap();
        assert_eq!(path, r"C:\Tools\bin;%MISSING%");
    }

    #[test]
    fn test_no_expansion_when_disabled() {
        let options = NormalizeOptions {
            expand_vars: false,
            normpath: false,
            ..Default::default()
        };
        let lookup = |_: &str| Some("x".to_owned());
        assert_eq!(
            normalize_path_with("%A%/b", &options, lookup, None).unwrap(),
            "%A%/b"
        );
    }

    #[test]
    fn test_collapse_home() {
        let home = r"C:\Users\alice";
        assert_eq!(collapse_home(r"C:\Users\alice\bin", home), r"~\bin");
        assert_eq!(collapse_home(r"c:\users\ALICE", home), "~");
        assert_eq!(collapse_home(r"C:\Users\alicex\bin", home), r"C:\Users\alicex\bin");
        assert_eq!(collapse_home(r"D:\bin", home), r"D:\bin");
    }

    #[test]
    fn test_home_tilde_runs_after_normpath() {
        let options = NormalizeOptions::default().with_tilde(Tilde::Home);
        let path =
            normalize_path_with("C:/Users/alice/./bin", &options, no_vars, Some(r"C:\Users\alice\"))
                .unwrap();
        assert_eq!(path, r"~\bin");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_short_long_identity_off_windows() {
        let options = NormalizeOptions::default().with_tilde(Tilde::Long);
        assert_eq!(
            normalize_path_with(r"C:\PROGRA~1", &options, no_vars, None).unwrap(),
            r"C:\PROGRA~1"
        );
    }

    #[cfg(windows)]
    #[test]
    fn test_short_long_round_trip() {
        let program_files = std::env::var("ProgramFiles").unwrap();
        let short = normalize_path(
            &program_files,
            &NormalizeOptions::default().with_tilde(Tilde::Short),
        )
        .unwrap();
        let long = normalize_path(&short, &NormalizeOptions::default().with_tilde(Tilde::Long))
            .unwrap();
        assert!(long.eq_ignore_ascii_case(&program_files));
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(path in r"([A-Za-z]:)?[\\/.a-zA-Z %~]{0,24}") {
            let options = NormalizeOptions::default();
            let once = normalize_path_with(&path, &options, no_vars, None).unwrap();
            let twice = normalize_path_with(&once, &options, no_vars, None).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
