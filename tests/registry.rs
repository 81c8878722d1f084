use casement::prelude::*;
use casement::{MemoryRegistry, RegistryView};

fn key(reg: &MemoryRegistry, path: &str) -> RegKey<MemoryRegistry> {
    RegKey::parse(reg.clone(), path).unwrap()
}

#[test]
fn test_child_names_follow_creation() {
    let reg = MemoryRegistry::new();
    let app = key(&reg, r"HKLM\Software\Vendor\App");
    app.create(true).unwrap();
    app.child("Plugins").create(true).unwrap();
    app.child("Settings").set_entry("Theme", "dark").unwrap();
    app.child("Cache").create(false).unwrap();

    assert_eq!(app.child_names().unwrap(), vec!["Plugins", "Settings", "Cache"]);
    assert_eq!(
        app.child("settings").entry("theme").unwrap(),
        RegistryValue::String("dark".into())
    );
}

#[test]
fn test_non_recursive_delete_keeps_children() {
    let reg = MemoryRegistry::new();
    let app = key(&reg, r"HKCU\Software\Vendor\App");
    app.child(r"A\B").create(true).unwrap();
    app.set_entry("Version", 3u32).unwrap();

    let err = app.delete(false).unwrap_err();
    assert_eq!(
        err,
        CasementError::KeyNotEmpty(r"HKEY_CURRENT_USER\Software\Vendor\App".into())
    );
    assert!(app.exists());
    assert!(app.child(r"A\B").exists());
    assert_eq!(app.entry("Version").unwrap(), RegistryValue::Dword(3));

    assert!(app.delete(true).unwrap());
    assert!(!app.exists());
    assert!(key(&reg, r"HKCU\Software\Vendor").exists());
    assert!(key(&reg, r"HKCU\Software\Vendor").child_names().unwrap().is_empty());
}

#[test]
fn test_recursive_copy() {
    let reg = MemoryRegistry::new();
    let src = key(&reg, r"HKCU\Software\Src");
    src.set_entry("Name", "src").unwrap();
    src.set_entry("Paths", vec![r"C:\a".to_string(), r"C:\b".to_string()])
        .unwrap();
    src.child("Sub").set_entry("Count", 9u64).unwrap();

    let shallow = key(&reg, r"HKCU\Software\Shallow");
    src.copy(&shallow, false).unwrap();
    assert_eq!(shallow.value_names().unwrap(), vec!["Name", "Paths"]);
    assert!(shallow.child_names().unwrap().is_empty());

    let deep = key(&reg, r"HKCU\Software\Deep");
    src.copy(&deep, true).unwrap();
    assert_eq!(
        deep.entry("Paths").unwrap(),
        RegistryValue::MultiString(vec![r"C:\a".into(), r"C:\b".into()])
    );
    assert_eq!(deep.child("Sub").entry("Count").unwrap(), RegistryValue::Qword(9));
    assert_eq!(deep.entry_raw("Name").unwrap(), src.entry_raw("Name").unwrap());
}

#[test]
fn test_copy_missing_source() {
    let reg = MemoryRegistry::new();
    let err = key(&reg, r"HKCU\Nope")
        .copy(&key(&reg, r"HKCU\Dest"), true)
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!key(&reg, r"HKCU\Dest").exists());
}

#[test]
fn test_copy_into_read_only_hive() {
    let reg = MemoryRegistry::new();
    let src = key(&reg, r"HKCU\Software\Src");
    src.set_entry("A", "1").unwrap();
    src.child("Child").set_entry("B", "2").unwrap();

    reg.set_read_only(Hive::LocalMachine, true);
    let dest = RegKey::new(
        reg.clone(),
        RegistryLocation::parse(r"HKLM\Software\Dest").unwrap(),
    );
    assert!(src.copy(&dest, true).unwrap_err().is_access_denied());

    reg.set_read_only(Hive::LocalMachine, false);
    assert!(!dest.exists());
    assert_eq!(src.entry("A").unwrap(), RegistryValue::String("1".into()));
}

#[test]
fn test_child_is_pure_composition() {
    let reg = MemoryRegistry::new();
    let child = key(&reg, r"HKCU\Software")
        .with_view(RegistryView::Registry32)
        .child(r"Vendor\\App\");
    assert_eq!(child.location().to_string(), r"HKEY_CURRENT_USER\Software\Vendor\App");
    assert_eq!(child.view(), RegistryView::Registry32);
    assert!(!child.exists());
}
