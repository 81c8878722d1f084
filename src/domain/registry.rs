//! Registry addressing types - pure data, no OS access.

use crate::domain::{CasementError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Hives
// =============================================================================

/// A top-level registry root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hive {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
    CurrentConfig,
}

impl Hive {
    pub const ALL: [Hive; 5] = [
        Hive::ClassesRoot,
        Hive::CurrentUser,
        Hive::LocalMachine,
        Hive::Users,
        Hive::CurrentConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hive::ClassesRoot => "HKEY_CLASSES_ROOT",
            Hive::CurrentUser => "HKEY_CURRENT_USER",
            Hive::LocalMachine => "HKEY_LOCAL_MACHINE",
            Hive::Users => "HKEY_USERS",
            Hive::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Hive::ClassesRoot => "HKCR",
            Hive::CurrentUser => "HKCU",
            Hive::LocalMachine => "HKLM",
            Hive::Users => "HKU",
            Hive::CurrentConfig => "HKCC",
        }
    }
}

impl fmt::Display for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Hive {
    type Err = CasementError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Hive::ALL
            .into_iter()
            .find(|h| {
                h.as_str().eq_ignore_ascii_case(wanted) || h.short_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| CasementError::KeyNotFound(format!("unknown hive: {}", s)))
    }
}

/// Which WOW64 registry view a key is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistryView {
    /// No redirection flag, the process' native view.
    Default,
    /// `KEY_WOW64_32KEY`
    Registry32,
    /// `KEY_WOW64_64KEY`
    #[default]
    Registry64,
}

impl RegistryView {
    pub fn from_architecture(bits: u32) -> Self {
        match bits {
            32 => RegistryView::Registry32,
            64 => RegistryView::Registry64,
            _ => RegistryView::Default,
        }
    }
}

// =============================================================================
// Locations
// =============================================================================

/// Identifies a registry key. Owns no OS resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryLocation {
    hive: Hive,
    segments: Vec<String>,
}

impl RegistryLocation {
    pub fn new(hive: Hive, subpath: &str) -> Self {
        Self {
            hive,
            segments: split_segments(subpath),
        }
    }

    /// Parse a full path such as `HKLM\Software\Vendor`.
    pub fn parse(path: &str) -> Result<Self> {
        let (hive, rest) = match path.split_once('\\') {
            Some((hive, rest)) => (hive, rest),
            None => (path, ""),
        };
        Ok(Self::new(hive.parse()?, rest))
    }

    pub fn hive(&self) -> Hive {
        self.hive
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The path below the hive, `\` separated.
    pub fn subpath(&self) -> String {
        self.segments.join("\\")
    }

    /// Last path segment, `None` for a hive root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            hive: self.hive,
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Pure path composition; `relative` may contain several segments.
    pub fn child(&self, relative: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(split_segments(relative));
        Self {
            hive: self.hive,
            segments,
        }
    }

    /// Case-insensitive ancestor test, the way the registry compares names.
    pub fn starts_with(&self, other: &RegistryLocation) -> bool {
        self.hive == other.hive
            && self.segments.len() >= other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl fmt::Display for RegistryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hive)?;
        for segment in &self.segments {
            write!(f, "\\{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for RegistryLocation {
    type Err = CasementError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('\\')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// =============================================================================
// Well-known locations
// =============================================================================

/// Per-user or per-machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    User,
    System,
}

impl Scope {
    pub fn from_system(system: bool) -> Self {
        if system {
            Scope::System
        } else {
            Scope::User
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::System => "system",
        }
    }
}

/// Commonly looked up keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownKey {
    Classes,
    Environment,
    Uninstall,
}

impl WellKnownKey {
    pub fn location(&self, scope: Scope) -> RegistryLocation {
        match (self, scope) {
            (WellKnownKey::Classes, Scope::User) => {
                RegistryLocation::new(Hive::CurrentUser, r"Software\Classes")
            }
            (WellKnownKey::Classes, Scope::System) => {
                RegistryLocation::new(Hive::LocalMachine, r"Software\Classes")
            }
            (WellKnownKey::Environment, Scope::User) => {
                RegistryLocation::new(Hive::CurrentUser, "Environment")
            }
            (WellKnownKey::Environment, Scope::System) => RegistryLocation::new(
                Hive::LocalMachine,
                r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment",
            ),
            (WellKnownKey::Uninstall, Scope::User) => RegistryLocation::new(
                Hive::CurrentUser,
                r"Software\Microsoft\Windows\CurrentVersion\Uninstall",
            ),
            (WellKnownKey::Uninstall, Scope::System) => RegistryLocation::new(
                Hive::LocalMachine,
                r"Software\Microsoft\Windows\CurrentVersion\Uninstall",
            ),
        }
    }
}
