//! In-process registry tree.
//!
//! Behaves like the OS registry for everything the services rely on: names
//! are case-insensitive but keep the spelling they were created with, enumeration follows
//! insertion order, and hives can be marked read-only to stand in for keys
//! that need elevation. Views are not modelled; every view sees the same tree.

use super::registry::RegistryBackend;
use crate::domain::{
    CasementError, Hive, RawValue, RegistryLocation, RegistryView, Result, ERROR_KEY_DELETED,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

type NodeKey = (Hive, Vec<String>);

#[derive(Debug, Default)]
struct Node {
    /// Differs between a deleted key and one recreated at the same path.
    id: u64,
    children: Vec<String>,
    values: Vec<(String, RawValue)>,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: HashMap<NodeKey, Node>,
    /// Top-level key names per hive; hive roots have no node of their own.
    roots: HashMap<Hive, Vec<String>>,
    next_id: u64,
    read_only: HashSet<Hive>,
}

/// Cheap to clone; clones share the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    tree: Rc<RefCell<Tree>>,
}

#[derive(Debug, Clone)]
pub struct MemoryHandle {
    location: RegistryLocation,
    /// `None` for a hive root.
    node: Option<u64>,
    write: bool,
}

fn node_key(location: &RegistryLocation) -> NodeKey {
    (
        location.hive(),
        location
            .segments()
            .iter()
            .map(|s| s.to_lowercase())
            .collect(),
    )
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes under `hive` will fail with `AccessDenied`.
    pub fn with_read_only(self, hive: Hive) -> Self {
        self.tree.borrow_mut().read_only.insert(hive);
        self
    }

    pub fn set_read_only(&self, hive: Hive, read_only: bool) {
        let mut tree = self.tree.borrow_mut();
        if read_only {
            tree.read_only.insert(hive);
        } else {
            tree.read_only.remove(&hive);
        }
    }

    fn check_writable(&self, location: &RegistryLocation) -> Result<()> {
        if self.tree.borrow().read_only.contains(&location.hive()) {
            return Err(CasementError::AccessDenied(location.to_string()));
        }
        Ok(())
    }

    fn exists(tree: &Tree, location: &RegistryLocation) -> bool {
        location.is_root() || tree.nodes.contains_key(&node_key(location))
    }

    fn node_id(tree: &Tree, location: &RegistryLocation) -> Option<u64> {
        tree.nodes.get(&node_key(location)).map(|node| node.id)
    }

    fn with_node<R>(&self, handle: &MemoryHandle, f: impl FnOnce(&mut Node) -> R) -> Result<R> {
        let mut tree = self.tree.borrow_mut();
        let node = tree
            .nodes
            .entry(node_key(&handle.location))
            .or_default();
        Ok(f(node))
    }

    fn ensure_live(&self, handle: &MemoryHandle) -> Result<()> {
        let live = match handle.node {
            None => true,
            Some(id) => Self::node_id(&self.tree.borrow(), &handle.location) == Some(id),
        };
        if live {
            Ok(())
        } else {
            // deleted (and maybe recreated) while the handle was held
            Err(CasementError::RegistryError {
                code: ERROR_KEY_DELETED,
                context: handle.location.to_string(),
            })
        }
    }
}

impl RegistryBackend for MemoryRegistry {
    type Handle = MemoryHandle;

    fn open(
        &self,
        location: &RegistryLocation,
        _view: RegistryView,
        write: bool,
    ) -> Result<Option<MemoryHandle>> {
        if write {
            self.check_writable(location)?;
        }
        let tree = self.tree.borrow();
        if !Self::exists(&tree, location) {
            return Ok(None);
        }
        Ok(Some(MemoryHandle {
            location: location.clone(),
            node: Self::node_id(&tree, location),
            write,
        }))
    }

    fn create(&self, location: &RegistryLocation, _view: RegistryView) -> Result<MemoryHandle> {
        self.check_writable(location)?;
        let mut tree = self.tree.borrow_mut();
        let mut current = RegistryLocation::new(location.hive(), "");
        for segment in location.segments() {
            let next = current.child(segment);
            let key = node_key(&next);
            if !tree.nodes.contains_key(&key) {
                tree.next_id += 1;
                let id = tree.next_id;
                tree.nodes.insert(
                    key,
                    Node {
                        id,
                        ..Node::default()
                    },
                );
                if current.is_root() {
                    tree.roots
                        .entry(location.hive())
                        .or_default()
                        .push(segment.clone());
                } else if let Some(parent) = tree.nodes.get_mut(&node_key(&current)) {
                    parent.children.push(segment.clone());
                }
            }
            current = next;
        }
        Ok(MemoryHandle {
            location: location.clone(),
            node: Self::node_id(&tree, location),
            write: true,
        })
    }

    fn delete_key(&self, location: &RegistryLocation, _view: RegistryView) -> Result<()> {
        self.check_writable(location)?;
        let mut tree = self.tree.borrow_mut();
        let key = node_key(location);
        match tree.nodes.get(&key) {
            None => return Err(CasementError::KeyNotFound(location.to_string())),
            Some(node) if !node.children.is_empty() => {
                return Err(CasementError::KeyNotEmpty(location.to_string()))
            }
            Some(_) => {}
        }
        tree.nodes.remove(&key);
        if let (Some(parent), Some(name)) = (location.parent(), location.name()) {
            if parent.is_root() {
                if let Some(roots) = tree.roots.get_mut(&location.hive()) {
                    roots.retain(|root| !root.eq_ignore_ascii_case(name));
                }
            } else if let Some(parent_node) = tree.nodes.get_mut(&node_key(&parent)) {
                parent_node
                    .children
                    .retain(|child| !child.eq_ignore_ascii_case(name));
            }
        }
        Ok(())
    }

    fn subkey_names(&self, handle: &MemoryHandle) -> Result<Vec<String>> {
        if handle.location.is_root() {
            let tree = self.tree.borrow();
            return Ok(tree
                .roots
                .get(&handle.location.hive())
                .cloned()
                .unwrap_or_default());
        }
        self.ensure_live(handle)?;
        self.with_node(handle, |node| node.children.clone())
    }

    fn value_names(&self, handle: &MemoryHandle) -> Result<Vec<String>> {
        self.ensure_live(handle)?;
        self.with_node(handle, |node| {
            node.values.iter().map(|(name, _)| name.clone()).collect()
        })
    }

    fn get_value(&self, handle: &MemoryHandle, name: &str) -> Result<Option<RawValue>> {
        self.ensure_live(handle)?;
        self.with_node(handle, |node| {
            node.values
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        })
    }

    fn set_value(&self, handle: &MemoryHandle, name: &str, value: &RawValue) -> Result<()> {
        if !handle.write {
            return Err(CasementError::AccessDenied(format!(
                "{} opened read-only",
                handle.location
            )));
        }
        self.check_writable(&handle.location)?;
        self.ensure_live(handle)?;
        self.with_node(handle, |node| {
            match node
                .values
                .iter_mut()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
            {
                Some((_, existing)) => *existing = value.clone(),
                None => node.values.push((name.to_owned(), value.clone())),
            }
        })
    }

    fn delete_value(&self, handle: &MemoryHandle, name: &str) -> Result<bool> {
        if !handle.write {
            return Err(CasementError::AccessDenied(format!(
                "{} opened read-only",
                handle.location
            )));
        }
        self.check_writable(&handle.location)?;
        self.ensure_live(handle)?;
        self.with_node(handle, |node| {
            let before = node.values.len();
            node.values.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            node.values.len() != before
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::{encode, REG_SZ};
    use crate::domain::RegistryValue;

    fn loc(path: &str) -> RegistryLocation {
        RegistryLocation::parse(path).unwrap()
    }

    #[test]
    fn test_create_makes_parents() {
        let reg = MemoryRegistry::new();
        reg.create(&loc(r"HKCU\A\B\C"), RegistryView::default()).unwrap();
        let a = reg.open(&loc(r"HKCU\a"), RegistryView::default(), false).unwrap().unwrap();
        assert_eq!(reg.subkey_names(&a).unwrap(), vec!["B".to_string()]);
    }

    #[test]
    fn test_hive_root_keeps_spelling() {
        let reg = MemoryRegistry::new();
        reg.create(&loc(r"HKCU\Software\A"), RegistryView::default()).unwrap();
        reg.create(&loc(r"HKCU\Environment"), RegistryView::default()).unwrap();
        reg.create(&loc(r"HKLM\SYSTEM"), RegistryView::default()).unwrap();

        let root = reg.open(&loc("HKCU"), RegistryView::default(), false).unwrap().unwrap();
        assert_eq!(reg.subkey_names(&root).unwrap(), vec!["Software", "Environment"]);

        reg.delete_key(&loc(r"HKCU\environment"), RegistryView::default()).unwrap();
        assert_eq!(reg.subkey_names(&root).unwrap(), vec!["Software"]);
    }

    #[test]
    fn test_handle_outlives_recreated_key() {
        let reg = MemoryRegistry::new();
        let first = reg.create(&loc(r"HKCU\Software\A"), RegistryView::default()).unwrap();
        reg.delete_key(&loc(r"HKCU\Software\A"), RegistryView::default()).unwrap();
        reg.create(&loc(r"HKCU\Software\A"), RegistryView::default()).unwrap();

        let err = reg.value_names(&first).unwrap_err();
        assert!(err.is_key_deleted());
        let fresh = reg.open(&loc(r"HKCU\Software\A"), RegistryView::default(), false).unwrap().unwrap();
        assert!(reg.value_names(&fresh).unwrap().is_empty());
    }

    #[test]
    fn test_read_only_hive() {
        let reg = MemoryRegistry::new().with_read_only(Hive::LocalMachine);
        let err = reg
            .create(&loc(r"HKLM\Software\X"), RegistryView::default())
            .unwrap_err();
        assert!(err.is_access_denied());
    }

    #[test]
    fn test_values_case_insensitive() {
        let reg = MemoryRegistry::new();
        let handle = reg.create(&loc(r"HKCU\Environment"), RegistryView::default()).unwrap();
        reg.set_value(&handle, "Path", &encode(&RegistryValue::from("a")))
            .unwrap();
        let raw = reg.get_value(&handle, "PATH").unwrap().unwrap();
        assert_eq!(raw.raw_type, REG_SZ);
        assert!(reg.delete_value(&handle, "path").unwrap());
        assert!(!reg.delete_value(&handle, "path").unwrap());
    }
}
