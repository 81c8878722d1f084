//! Persistent environment variables.

use super::reg_key::RegKey;
use crate::domain::{RegistryValue, Result, Scope, WellKnownKey};
use crate::repositories::{EnvironmentBroadcast, NoBroadcast, RegistryBackend};
use std::cell::Cell;
use tracing::{debug, instrument, warn};

/// The stored environment of one scope, as a name to raw value mapping.
///
/// Values come back exactly as written; `%VAR%` tokens are only expanded
/// through [`EnvVar::get_expanded`]. Every change is followed by a broadcast
/// so running shells can pick it up. A failed broadcast is logged and never
/// fails the write.
pub struct EnvVar<B: RegistryBackend, N: EnvironmentBroadcast = NoBroadcast> {
    key: RegKey<B>,
    scope: Scope,
    broadcaster: N,
    broadcast_enabled: Cell<bool>,
    broadcast_required: Cell<bool>,
}

impl<B: RegistryBackend, N: EnvironmentBroadcast> EnvVar<B, N> {
    pub fn new(backend: B, scope: Scope, broadcaster: N) -> Self {
        Self {
            key: RegKey::new(backend, WellKnownKey::Environment.location(scope)),
            scope,
            broadcaster,
            broadcast_enabled: Cell::new(true),
            broadcast_required: Cell::new(false),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The registry key the variables live in.
    pub fn key(&self) -> &RegKey<B> {
        &self.key
    }

    /// Raw value as a string. Non-string values are rendered with `Display`.
    pub fn get(&self, name: &str) -> Result<String> {
        Ok(match self.entry(name)? {
            RegistryValue::String(s) | RegistryValue::ExpandString(s) => s,
            other => other.to_string(),
        })
    }

    /// Value with `%VAR%` tokens expanded against the process environment.
    pub fn get_expanded(&self, name: &str) -> Result<String> {
        Ok(self.entry(name)?.expand().to_string())
    }

    pub fn entry(&self, name: &str) -> Result<RegistryValue> {
        self.key.entry(name)
    }

    /// Store `value` as `REG_EXPAND_SZ` when `expandable`, else `REG_SZ`.
    #[instrument(skip(self, value), fields(scope = self.scope.as_str()))]
    pub fn set(&self, name: &str, value: &str, expandable: bool) -> Result<()> {
        let value = if expandable {
            RegistryValue::ExpandString(value.to_owned())
        } else {
            RegistryValue::String(value.to_owned())
        };
        debug!("Setting env var \"{}\" to \"{}\"", name, value);
        self.key.set_entry(name, value)?;
        self.changed();
        Ok(())
    }

    #[instrument(skip(self), fields(scope = self.scope.as_str()))]
    pub fn delete(&self, name: &str) -> Result<()> {
        debug!("Deleting env var \"{}\"", name);
        self.key.delete_entry(name)?;
        self.changed();
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.key.has_entry(name)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.key.value_names()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// `;` separated items of `name`, empty items dropped. A missing variable
    /// is an empty list.
    pub fn get_list(&self, name: &str) -> Result<Vec<String>> {
        match self.get(name) {
            Ok(value) => Ok(split_list(&value)),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Append `item` unless an item equal to it ignoring case is present.
    /// Returns whether the value changed.
    pub fn append_to_list(&self, name: &str, item: &str) -> Result<bool> {
        let (mut items, expandable) = self.list_and_kind(name, item)?;
        if items.iter().any(|i| i.eq_ignore_ascii_case(item)) {
            return Ok(false);
        }
        items.push(item.to_owned());
        self.set(name, &items.join(";"), expandable)?;
        Ok(true)
    }

    /// Remove every item equal to `item` ignoring case. Returns whether the
    /// value changed.
    pub fn remove_from_list(&self, name: &str, item: &str) -> Result<bool> {
        let (mut items, expandable) = self.list_and_kind(name, item)?;
        let before = items.len();
        items.retain(|i| !i.eq_ignore_ascii_case(item));
        if items.len() == before {
            return Ok(false);
        }
        self.set(name, &items.join(";"), expandable)?;
        Ok(true)
    }

    /// Current items plus the kind to write them back as. New variables are
    /// expandable if the item holds a `%` token.
    fn list_and_kind(&self, name: &str, item: &str) -> Result<(Vec<String>, bool)> {
        match self.entry(name) {
            Ok(value) => {
                let expandable = value.is_expandable();
                let text = match value {
                    RegistryValue::String(s) | RegistryValue::ExpandString(s) => s,
                    other => other.to_string(),
                };
                Ok((split_list(&text), expandable))
            }
            Err(e) if e.is_not_found() => Ok((Vec::new(), item.contains('%'))),
            Err(e) => Err(e),
        }
    }

    fn changed(&self) {
        self.broadcast_required.set(true);
        self.broadcast();
    }

    /// Notify running processes now, unless a [`DelayedBroadcast`] is active.
    pub fn broadcast(&self) {
        if !self.broadcast_enabled.get() {
            debug!("Skipping broadcasting that the environment was changed");
            return;
        }
        debug!("Broadcasting that the environment was changed");
        if let Err(e) = self.broadcaster.broadcast() {
            warn!("Environment change broadcast failed: {}", e);
        }
        self.broadcast_required.set(false);
    }

    /// Hold off broadcasting until the returned guard drops; then broadcast
    /// once if anything changed in between.
    pub fn delayed_broadcast(&self) -> DelayedBroadcast<'_, B, N> {
        let previous = self.broadcast_enabled.replace(false);
        DelayedBroadcast {
            env: self,
            previous,
        }
    }
}

#[cfg(windows)]
impl EnvVar<crate::repositories::WinRegistry, crate::repositories::SettingChangeBroadcast> {
    /// `HKCU\Environment`.
    pub fn user() -> Self {
        Self::new(
            crate::repositories::WinRegistry,
            Scope::User,
            Default::default(),
        )
    }

    /// The machine environment. Writes need an elevated process.
    pub fn system() -> Self {
        Self::new(
            crate::repositories::WinRegistry,
            Scope::System,
            Default::default(),
        )
    }
}

/// Guard returned by [`EnvVar::delayed_broadcast`].
#[must_use = "broadcasts resume as soon as the guard is dropped"]
pub struct DelayedBroadcast<'a, B: RegistryBackend, N: EnvironmentBroadcast> {
    env: &'a EnvVar<B, N>,
    previous: bool,
}

impl<B: RegistryBackend, N: EnvironmentBroadcast> Drop for DelayedBroadcast<'_, B, N> {
    fn drop(&mut self) {
        self.env.broadcast_enabled.set(self.previous);
        if self.env.broadcast_required.get() {
            self.env.broadcast();
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CasementError;
    use crate::repositories::MemoryRegistry;

    #[derive(Default)]
    struct Counter {
        calls: Cell<u32>,
        fail: bool,
    }

    impl EnvironmentBroadcast for Counter {
        fn broadcast(&self) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                Err(CasementError::Shell("no desktop".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_broadcast_per_mutation() {
        let counter = Counter::default();
        let env = EnvVar::new(MemoryRegistry::new(), Scope::User, &counter);
        env.set("A", "1", false).unwrap();
        env.delete("A").unwrap();
        assert_eq!(counter.calls.get(), 2);
    }

    #[test]
    fn test_delayed_broadcast_coalesces() {
        let counter = Counter::default();
        let env = EnvVar::new(MemoryRegistry::new(), Scope::User, &counter);
        {
            let _guard = env.delayed_broadcast();
            env.set("A", "1", false).unwrap();
            env.set("B", "2", false).unwrap();
            {
                let _inner = env.delayed_broadcast();
                env.delete("A").unwrap();
            }
            assert_eq!(counter.calls.get(), 0);
        }
        assert_eq!(counter.calls.get(), 1);
    }

    #[test]
    fn test_delayed_broadcast_without_changes_is_silent() {
        let counter = Counter::default();
        let env = EnvVar::new(MemoryRegistry::new(), Scope::User, &counter);
        drop(env.delayed_broadcast());
        assert_eq!(counter.calls.get(), 0);
    }

    #[test]
    fn test_failed_broadcast_does_not_fail_write() {
        let counter = Counter {
            fail: true,
            ..Default::default()
        };
        let env = EnvVar::new(MemoryRegistry::new(), Scope::User, &counter);
        env.set("A", "1", false).unwrap();
        assert_eq!(env.get("A").unwrap(), "1");
        assert_eq!(counter.calls.get(), 1);
    }

    #[test]
    fn test_list_helpers_keep_kind() {
        let env = EnvVar::new(MemoryRegistry::new(), Scope::User, NoBroadcast);
        env.set("PATH", r"%USERPROFILE%\bin;;C:\Tools", true).unwrap();
        assert_eq!(
            env.get_list("PATH").unwrap(),
            vec![r"%USERPROFILE%\bin", r"C:\Tools"]
        );

        assert!(env.append_to_list("PATH", r"C:\Other").unwrap());
        assert!(!env.append_to_list("PATH", r"c:\tools").unwrap());
        assert!(env.entry("PATH").unwrap().is_expandable());

        assert!(env.remove_from_list("PATH", r"C:\TOOLS").unwrap());
        assert!(!env.remove_from_list("PATH", r"C:\Missing").unwrap());
        assert_eq!(env.get("PATH").unwrap(), r"%USERPROFILE%\bin;C:\Other");
    }

    #[test]
    fn test_missing_list_is_empty() {
        let env = EnvVar::new(MemoryRegistry::new(), Scope::User, NoBroadcast);
        assert!(env.get_list("NOPE").unwrap().is_empty());
        assert!(env.append_to_list("NOPE", "a").unwrap());
        assert!(!env.entry("NOPE").unwrap().is_expandable());
    }

    #[test]
    fn test_get_expanded() {
        std::env::set_var("CASEMENT_TEST_ROOT", r"C:\Root");
        let env = EnvVar::new(MemoryRegistry::new(), Scope::User, NoBroadcast);
        env.set("TOOLS", r"%CASEMENT_TEST_ROOT%\tools", true).unwrap();
        assert_eq!(env.get("TOOLS").unwrap(), r"%CASEMENT_TEST_ROOT%\tools");
        assert_eq!(env.get_expanded("TOOLS").unwrap(), r"C:\Root\tools");
    }
}
