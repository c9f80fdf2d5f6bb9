#![cfg(feature = "config-file")]

//! Loading `ManagerConfig` from disk.

use std::io::Write;

use keystage::{ChangeManager, ConfigError, ManagerConfig};

fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn toml_file_configures_manager() {
    let file = write_temp(
        ".toml",
        "max_undo_depth = 2\nimmediate_by_default = false\n",
    );
    let config = ManagerConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.max_undo_depth, 2);

    let manager = ChangeManager::new(config);
    assert_eq!(manager.max_undo_depth(), 2);
}

#[test]
fn json_file_round_trips_through_serde() {
    let config = ManagerConfig::default()
        .with_max_undo_depth(40)
        .with_immediate_by_default(true);
    let file = write_temp(".json", &serde_json::to_string(&config).unwrap());
    assert_eq!(ManagerConfig::from_json_file(file.path()).unwrap(), config);
}

#[test]
fn empty_toml_uses_defaults() {
    let file = write_temp(".toml", "");
    assert_eq!(
        ManagerConfig::from_toml_file(file.path()).unwrap(),
        ManagerConfig::default()
    );
}

#[test]
fn invalid_depth_is_rejected() {
    let file = write_temp(".toml", "max_undo_depth = 0\n");
    let err = ManagerConfig::from_toml_file(file.path()).unwrap_err();
    match err {
        ConfigError::Validation(errors) => {
            assert_eq!(errors, vec!["max_undo_depth must be > 0".to_string()]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn malformed_toml_reports_parse_error() {
    let file = write_temp(".toml", "max_undo_depth = \"many\"\n");
    assert!(matches!(
        ManagerConfig::from_toml_file(file.path()),
        Err(ConfigError::Toml(_))
    ));
}

#[test]
fn missing_file_reports_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ManagerConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
    assert!(err.to_string().starts_with("I/O error"));
}
