//! Unit tests for configuration loading and root folder resolution
//!
//! Note: Uses serial_test to prevent ENV variable race conditions. Tests
//! that manipulate ENTOLAB_ROOT are marked #[serial] so they run
//! sequentially.

use entolab_common::config::{
    load_toml_config_from, resolve_root_folder, write_toml_config, StorageConfig, TomlConfig,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
#[serial]
fn test_cli_arg_takes_priority() {
    env::set_var("ENTOLAB_ROOT", "/tmp/from-env");
    let resolved = resolve_root_folder(Some("/tmp/from-cli"), "ENTOLAB_ROOT");
    env::remove_var("ENTOLAB_ROOT");

    assert_eq!(resolved, PathBuf::from("/tmp/from-cli"));
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    env::set_var("ENTOLAB_ROOT", "/tmp/from-env");
    let resolved = resolve_root_folder(None, "ENTOLAB_ROOT");
    env::remove_var("ENTOLAB_ROOT");

    assert_eq!(resolved, PathBuf::from("/tmp/from-env"));
}

#[test]
#[serial]
fn test_fallback_to_default_root() {
    env::remove_var("ENTOLAB_ROOT");
    let resolved = resolve_root_folder(None, "ENTOLAB_ROOT");

    // Platform default is non-empty and ends in "entolab"
    assert!(!resolved.as_os_str().is_empty());
    assert!(resolved.to_string_lossy().contains("entolab"));
}

#[test]
fn test_toml_config_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entolab.toml");

    let config = TomlConfig {
        root_folder: Some("/srv/entolab".to_string()),
        bind_address: Some("127.0.0.1:5810".to_string()),
        detector_url: Some("http://127.0.0.1:9000".to_string()),
        detector_api_key: Some("k".to_string()),
        storage: StorageConfig {
            bucket: Some("entolab-cases".to_string()),
            region: Some("us-east-1".to_string()),
            endpoint: Some("http://127.0.0.1:9001".to_string()),
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio123".to_string()),
            allow_http: true,
        },
    };

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config_from(&path).unwrap();

    assert_eq!(loaded.root_folder.as_deref(), Some("/srv/entolab"));
    assert_eq!(loaded.bind_address.as_deref(), Some("127.0.0.1:5810"));
    assert_eq!(loaded.storage.bucket.as_deref(), Some("entolab-cases"));
    assert!(loaded.storage.allow_http);
}

#[test]
fn test_missing_toml_config_is_an_error_not_a_panic() {
    let result = load_toml_config_from(&PathBuf::from("/tmp/does-not-exist/entolab.toml"));
    assert!(result.is_err());
}

#[test]
fn test_partial_toml_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entolab.toml");
    std::fs::write(&path, "bind_address = \"0.0.0.0:8080\"\n").unwrap();

    let loaded = load_toml_config_from(&path).unwrap();
    assert_eq!(loaded.bind_address.as_deref(), Some("0.0.0.0:8080"));
    assert!(loaded.root_folder.is_none());
    assert!(loaded.storage.bucket.is_none());
    assert!(!loaded.storage.allow_http);
}
