//! Shortcut data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Icon reference: a file (usually `.ico`, `.exe` or `.dll`) and the index
/// of the icon resource inside it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IconLocation {
    pub path: PathBuf,
    pub index: i32,
}

impl IconLocation {
    pub fn new(path: impl Into<PathBuf>, index: i32) -> Self {
        Self {
            path: path.into(),
            index,
        }
    }
}

/// The editable property surface of a `.lnk` file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShortcutDescriptor {
    pub target: PathBuf,
    pub arguments: String,
    pub working_dir: Option<PathBuf>,
    pub icon: Option<IconLocation>,
    pub description: String,
    /// `System.AppUserModel.ID`, used by the taskbar to group windows.
    pub app_id: Option<String>,
}

impl ShortcutDescriptor {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_icon(mut self, icon: IconLocation) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }
}

/// Where a shortcut can be pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinTarget {
    StartMenu,
    Taskbar,
}

impl PinTarget {
    pub const ALL: [PinTarget; 2] = [PinTarget::StartMenu, PinTarget::Taskbar];

    pub fn as_str(&self) -> &'static str {
        match self {
            PinTarget::StartMenu => "start menu",
            PinTarget::Taskbar => "taskbar",
        }
    }

    /// Directory name inside `User Pinned`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            PinTarget::StartMenu => "StartMenu",
            PinTarget::Taskbar => "TaskBar",
        }
    }

    /// Known spellings of the pin verb, Windows 10+ first, then Windows 7.
    pub fn pin_verbs(&self) -> &'static [&'static str] {
        match self {
            PinTarget::StartMenu => &["Pin to Start", "Pin to Start Men&u"],
            PinTarget::Taskbar => &["Pin to taskbar", "Pin to Tas&kbar"],
        }
    }

    pub fn unpin_verbs(&self) -> &'static [&'static str] {
        match self {
            PinTarget::StartMenu => &["Unpin from Start", "Unpin from Start Men&u"],
            PinTarget::Taskbar => &["Unpin from taskbar", "Unpin from Tas&kbar"],
        }
    }
}

impl fmt::Display for PinTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived pin view, computed from the file system every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedShortcutState {
    pub target: PinTarget,
    pub exists: bool,
    pub path: PathBuf,
}

/// Compare verb display names ignoring `&` accelerators and case.
pub fn verb_matches(display_name: &str, wanted: &str) -> bool {
    fn clean(s: &str) -> String {
        s.chars()
            .filter(|c| *c != '&')
            .collect::<String>()
            .trim()
            .to_lowercase()
    }
    clean(display_name) == clean(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_matching() {
        assert!(verb_matches("Pin to Tas&kbar", "pin to taskbar"));
        assert!(verb_matches("&Pin to Start", "Pin to Start"));
        assert!(!verb_matches("Unpin from Start", "Pin to Start"));
    }

    #[test]
    fn test_verb_spellings() {
        for target in PinTarget::ALL {
            for known in [target.pin_verbs(), target.unpin_verbs()] {
                assert_eq!(known.len(), 2);
                assert_ne!(known[0], known[1]);
            }
        }
        // the Windows 10 shell reports the taskbar verb with an accelerator
        let offered = "Pin to tas&kbar";
        assert!(PinTarget::Taskbar
            .pin_verbs()
            .iter()
            .all(|k| verb_matches(offered, k)));
        assert!(!PinTarget::StartMenu
            .pin_verbs()
            .iter()
            .any(|k| verb_matches(offered, k)));
    }

    #[test]
    fn test_descriptor_builder() {
        let desc = ShortcutDescriptor::new(r"C:\Tools\app.exe")
            .with_arguments("--fast")
            .with_icon(IconLocation::new(r"C:\Tools\app.ico", 0))
            .with_app_id("Vendor.App");
        assert_eq!(desc.arguments, "--fast");
        assert_eq!(desc.app_id.as_deref(), Some("Vendor.App"));
        assert!(desc.working_dir.is_none());
    }
}
