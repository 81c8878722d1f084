use casement::prelude::*;
use casement::{MemoryRegistry, NoBroadcast};

fn user_env(reg: &MemoryRegistry) -> EnvVar<MemoryRegistry> {
    EnvVar::new(reg.clone(), Scope::User, NoBroadcast)
}

#[test]
fn test_set_get_returns_raw_value() {
    let reg = MemoryRegistry::new();
    let env = user_env(&reg);
    env.set("FOO", r"C:\PROGRA~1", true).unwrap();
    assert_eq!(env.get("FOO").unwrap(), r"C:\PROGRA~1");

    env.set("BAR", r"%SystemRoot%\system32", true).unwrap();
    assert_eq!(env.get("BAR").unwrap(), r"%SystemRoot%\system32");
    assert_eq!(
        env.entry("BAR").unwrap(),
        RegistryValue::ExpandString(r"%SystemRoot%\system32".into())
    );

    env.set("PLAIN", "x", false).unwrap();
    assert_eq!(env.entry("PLAIN").unwrap(), RegistryValue::String("x".into()));
}

#[test]
fn test_contains_until_delete() {
    let reg = MemoryRegistry::new();
    let env = user_env(&reg);
    env.set("FOO", "1", true).unwrap();
    assert!(env.contains("FOO"));
    assert!(env.contains("foo"));
    assert_eq!(env.keys().unwrap(), vec!["FOO"]);
    assert_eq!(env.len().unwrap(), 1);

    env.delete("FOO").unwrap();
    assert!(!env.contains("FOO"));
    assert!(env.is_empty().unwrap());
    assert!(env.delete("FOO").unwrap_err().is_not_found());
    assert!(env.get("FOO").unwrap_err().is_not_found());
}

#[test]
fn test_scopes_are_separate_keys() {
    let reg = MemoryRegistry::new();
    let user = user_env(&reg);
    let system = EnvVar::new(reg.clone(), Scope::System, NoBroadcast);
    user.set("ONLY_USER", "1", false).unwrap();
    system.set("ONLY_SYSTEM", "1", false).unwrap();

    assert!(!system.contains("ONLY_USER"));
    assert!(!user.contains("ONLY_SYSTEM"));
    assert_eq!(
        system.key().location().to_string(),
        r"HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Control\Session Manager\Environment"
    );
}

#[test]
fn test_system_scope_without_elevation() {
    let reg = MemoryRegistry::new().with_read_only(Hive::LocalMachine);
    let system = EnvVar::new(reg, Scope::System, NoBroadcast);
    let err = system.set("FOO", "1", false).unwrap_err();
    assert!(err.is_access_denied());
    assert!(!system.contains("FOO"));
}

#[test]
fn test_normalize_stored_value() {
    let reg = MemoryRegistry::new();
    let env = user_env(&reg);
    env.set("TOOLS", r"C:/Tools/./bin//..\lib", false).unwrap();
    let value = env.get("TOOLS").unwrap();
    let options = NormalizeOptions::default();
    let once = normalize_path(&value, &options).unwrap();
    assert_eq!(once, r"C:\Tools\lib");
    assert_eq!(normalize_path(&once, &options).unwrap(), once);
}
