//! Layered configuration loading

use hostpdr::config::{ConfigLoader, HostPdrConfig};
use hostpdr::event::EventDataFormat;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes environment variable access across the tests in this file
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const SAMPLE: &str = r#"
[host]
eid = 12
terminus_handle = 4

[fetch]
sync_sensor_states = false
notify_format = "format_is_pdr_types"

[inventory]
object_path_root = "/xyz/openbmc_project/inventory/host"

[[inventory.entity_names]]
entity_type = 67
name = "module"

[[host_parents]]
entity_type = 67
parent_type = 64
parent_instance = 1
"#;

#[test]
fn test_explicit_file_overrides_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hostpdr.toml");
    fs::write(&path, SAMPLE).unwrap();

    let config = ConfigLoader::load(Some(&path)).unwrap();

    assert_eq!(config.host.eid, 12);
    assert_eq!(config.host.tid, 1, "unset keys keep their defaults");
    assert_eq!(config.host.terminus_handle, 4);
    assert!(config.fetch.fetch_fru_table);
    assert!(!config.fetch.sync_sensor_states);
    assert_eq!(config.fetch.notify_format, EventDataFormat::FormatIsPdrTypes);
    assert_eq!(config.entity_names().get(&67).map(String::as_str), Some("module"));
    assert_eq!(config.parent_rules().get(&67).map(|r| r.parent_type), Some(64));
    assert!(config.validate().is_ok());
}

#[test]
fn test_environment_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hostpdr.toml");
    fs::write(&path, SAMPLE).unwrap();

    std::env::set_var("HOSTPDR__HOST__EID", "30");
    let config = ConfigLoader::load(Some(&path));
    std::env::remove_var("HOSTPDR__HOST__EID");

    assert_eq!(config.unwrap().host.eid, 30);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = TempDir::new().unwrap();
    assert!(ConfigLoader::load(Some(&dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_load_from_file_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hostpdr.toml");
    fs::write(&path, "[host]\neid = 0\n").unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("reserved"));
}

#[test]
fn test_defaults_are_valid() {
    let config = HostPdrConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.host.eid, 9);
    assert_eq!(
        config.inventory.object_path_root,
        hostpdr::config::DEFAULT_OBJECT_PATH_ROOT
    );
}
