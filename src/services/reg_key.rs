//! Registry key service - typed access on top of a [`RegistryBackend`].

use crate::domain::value::{decode_raw, encode};
use crate::domain::{
    CasementError, RawValue, RegistryLocation, RegistryValue, RegistryView, Result,
};
use crate::repositories::RegistryBackend;
use std::cell::RefCell;
use std::fmt;
use tracing::{debug, info, instrument, trace};

/// A registry key by location.
///
/// Reads go through a handle opened on first use and kept until the key is
/// dropped or [`RegKey::release`] is called. Nothing here creates a key as a
/// side effect of reading it.
pub struct RegKey<B: RegistryBackend> {
    backend: B,
    location: RegistryLocation,
    view: RegistryView,
    handle: RefCell<Option<B::Handle>>,
}

impl<B: RegistryBackend> RegKey<B> {
    pub fn new(backend: B, location: RegistryLocation) -> Self {
        Self {
            backend,
            location,
            view: RegistryView::default(),
            handle: RefCell::new(None),
        }
    }

    /// Build from a full path such as `HKLM\Software\Vendor`.
    pub fn parse(backend: B, path: &str) -> Result<Self> {
        Ok(Self::new(backend, RegistryLocation::parse(path)?))
    }

    pub fn with_view(mut self, view: RegistryView) -> Self {
        self.view = view;
        self.handle = RefCell::new(None);
        self
    }

    pub fn location(&self) -> &RegistryLocation {
        &self.location
    }

    pub fn view(&self) -> RegistryView {
        self.view
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Last path segment; empty for a hive root.
    pub fn name(&self) -> &str {
        self.location.name().unwrap_or_default()
    }

    /// Close the cached read handle. The next read reopens it.
    pub fn release(&self) {
        self.handle.borrow_mut().take();
    }

    /// Run `f` on the cached read handle. A handle whose key was deleted
    /// underneath it is dropped and the key reopened once.
    fn with_read<R>(&self, f: impl Fn(&B::Handle) -> Result<R>) -> Result<Option<R>> {
        match self.read_cached(&f) {
            Err(e) if e.is_key_deleted() => {
                trace!("Cached handle for {} is stale, reopening", self.location);
                self.release();
                self.read_cached(&f)
            }
            other => other,
        }
    }

    fn read_cached<R>(&self, f: &impl Fn(&B::Handle) -> Result<R>) -> Result<Option<R>> {
        let mut cached = self.handle.borrow_mut();
        if cached.is_none() {
            *cached = self.backend.open(&self.location, self.view, false)?;
        }
        match cached.as_ref() {
            Some(handle) => f(handle).map(Some),
            None => Ok(None),
        }
    }

    fn entry_error(&self, name: &str) -> CasementError {
        let name = if name.is_empty() { "(Default)" } else { name };
        CasementError::EntryNotFound(format!("{}\\{}", self.location, name))
    }

    pub fn exists(&self) -> bool {
        matches!(
            self.backend.open(&self.location, self.view, false),
            Ok(Some(_))
        )
    }

    /// Create the key. With `force_subkeys` every missing parent is created
    /// too, otherwise the parent has to exist already.
    #[instrument(skip(self), fields(key = %self.location))]
    pub fn create(&self, force_subkeys: bool) -> Result<()> {
        if !force_subkeys {
            if let Some(parent) = self.location.parent() {
                if !parent.is_root() && self.backend.open(&parent, self.view, false)?.is_none() {
                    return Err(CasementError::KeyNotFound(parent.to_string()));
                }
            }
        }
        self.backend.create(&self.location, self.view)?;
        self.release();
        debug!("Created key");
        Ok(())
    }

    /// Delete the key. Returns `false` if it did not exist.
    ///
    /// Without `recursive` a key that still has sub-keys is left untouched
    /// and `KeyNotEmpty` is returned.
    #[instrument(skip(self), fields(key = %self.location))]
    pub fn delete(&self, recursive: bool) -> Result<bool> {
        if !self.exists() {
            trace!("Nothing to delete");
            return Ok(false);
        }

        let children = self.child_names()?;
        if !children.is_empty() {
            if !recursive {
                return Err(CasementError::KeyNotEmpty(self.location.to_string()));
            }
            for name in &children {
                self.child(name).delete(true)?;
            }
        }

        self.release();
        self.backend.delete_key(&self.location, self.view)?;
        info!("Deleted key");
        Ok(true)
    }

    /// Pure path composition, no I/O.
    pub fn child(&self, relative: &str) -> RegKey<B> {
        RegKey::new(self.backend.clone(), self.location.child(relative)).with_view(self.view)
    }

    pub fn parent(&self) -> Option<RegKey<B>> {
        self.location
            .parent()
            .map(|parent| RegKey::new(self.backend.clone(), parent).with_view(self.view))
    }

    /// Sub-key names in OS enumeration order; empty if the key is missing.
    pub fn child_names(&self) -> Result<Vec<String>> {
        Ok(self
            .with_read(|h| self.backend.subkey_names(h))?
            .unwrap_or_default())
    }

    pub fn children(&self) -> Result<Vec<RegKey<B>>> {
        Ok(self
            .child_names()?
            .iter()
            .map(|name| self.child(name))
            .collect())
    }

    /// Value names in OS enumeration order; empty if the key is missing.
    pub fn value_names(&self) -> Result<Vec<String>> {
        Ok(self
            .with_read(|h| self.backend.value_names(h))?
            .unwrap_or_default())
    }

    /// The value as stored. An empty `name` is the key's `(Default)` value.
    pub fn entry_raw(&self, name: &str) -> Result<RawValue> {
        self.with_read(|h| self.backend.get_value(h, name))?
            .flatten()
            .ok_or_else(|| self.entry_error(name))
    }

    pub fn entry(&self, name: &str) -> Result<RegistryValue> {
        decode_raw(&self.entry_raw(name)?)
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.entry_raw(name).is_ok()
    }

    /// Write a value. The key is created first if it is missing.
    #[instrument(skip(self, value), fields(key = %self.location))]
    pub fn set_entry(&self, name: &str, value: impl Into<RegistryValue>) -> Result<()> {
        let value = value.into();
        debug!("Setting {} ({})", name, value.type_name());
        self.set_entry_raw(name, &encode(&value))
    }

    pub fn set_entry_raw(&self, name: &str, value: &RawValue) -> Result<()> {
        let handle = match self.backend.open(&self.location, self.view, true)? {
            Some(handle) => handle,
            None => self.backend.create(&self.location, self.view)?,
        };
        self.backend.set_value(&handle, name, value)
    }

    #[instrument(skip(self), fields(key = %self.location))]
    pub fn delete_entry(&self, name: &str) -> Result<()> {
        let handle = self
            .backend
            .open(&self.location, self.view, true)?
            .ok_or_else(|| self.entry_error(name))?;
        if !self.backend.delete_value(&handle, name)? {
            return Err(self.entry_error(name));
        }
        debug!("Deleted {}", name);
        Ok(())
    }

    /// Copy every value, and with `recursive` every sub-key, into
    /// `destination`, creating it as needed. Values are copied as stored.
    ///
    /// There is no rollback: if a write fails part way, whatever was already
    /// copied stays in the destination.
    #[instrument(skip(self, destination), fields(from = %self.location, to = %destination.location))]
    pub fn copy(&self, destination: &RegKey<B>, recursive: bool) -> Result<()> {
        if !self.exists() {
            return Err(CasementError::KeyNotFound(self.location.to_string()));
        }

        // Snapshot before writing so copying into our own subtree terminates.
        let values = self.value_names()?;
        let children = if recursive {
            self.child_names()?
        } else {
            Vec::new()
        };

        destination.create(true)?;
        for name in &values {
            let raw = self.entry_raw(name)?;
            destination.set_entry_raw(name, &raw)?;
        }
        for name in &children {
            self.child(name).copy(&destination.child(name), true)?;
        }
        Ok(())
    }
}

impl<B: RegistryBackend> Clone for RegKey<B> {
    fn clone(&self) -> Self {
        RegKey::new(self.backend.clone(), self.location.clone()).with_view(self.view)
    }
}

impl<B: RegistryBackend> fmt::Debug for RegKey<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegKey")
            .field("location", &self.location)
            .field("view", &self.view)
            .finish()
    }
}

impl<B: RegistryBackend> fmt::Display for RegKey<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.location, f)
    }
}

#[cfg(windows)]
impl RegKey<crate::repositories::WinRegistry> {
    /// A key in the live registry.
    pub fn open(path: &str) -> Result<Self> {
        Self::parse(crate::repositories::WinRegistry, path)
    }
}
