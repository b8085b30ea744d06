use scripthost_core::path::{compare_names, join};
use scripthost_core::{ErrorKind, RuntimeConfig, ScriptError, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_load_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("scripthost.toml");
    fs::write(
        &path,
        "root = \"/vault\"\nscripts_folder = \"Scripts\"\nwatch_restart_delay_ms = 50\n",
    )
    .unwrap();

    let config = RuntimeConfig::load(&path).unwrap();
    assert_eq!(config.scripts_folder(), Some("Scripts"));
    assert_eq!(config.watch_restart_delay_ms, 50);
}

#[test]
fn test_config_load_or_default_missing_file() {
    let temp = TempDir::new().unwrap();
    let config = RuntimeConfig::load_or_default(&temp.path().join("absent.toml")).unwrap();
    assert_eq!(config, RuntimeConfig::default());
}

#[test]
fn test_config_parse_error_names_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("scripthost.toml");
    fs::write(&path, "scripts_folder = [").unwrap();

    let err = RuntimeConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("scripthost.toml"));
}

#[test]
fn test_collation_orders_case_insensitively() {
    assert_eq!(compare_names("A.ts", "b.ts"), Ordering::Less);
    assert_eq!(compare_names("b.ts", "Z"), Ordering::Less);
    assert_eq!(join(["Scripts", "Z", "c.ts"]), "Scripts/Z/c.ts");
}

#[test]
fn test_error_kinds() {
    let not_invocable = ScriptError::NotInvocable { path: "a.md".into() };
    assert_eq!(not_invocable.kind(), ErrorKind::NotInvocable);

    let load = ScriptError::load("a.rhai", "syntax error");
    assert_eq!(load.kind(), ErrorKind::LoadFailure);
    assert!(load.to_string().contains("syntax error"));
}

#[test]
fn test_value_accessors() {
    let mut obj = HashMap::new();
    obj.insert("name".to_string(), Value::from("Say hi"));
    let value = Value::from(obj);

    assert_eq!(value.get("name").and_then(Value::as_str), Some("Say hi"));
    assert!(value.is_truthy());
    assert!(!Value::Null.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
}
