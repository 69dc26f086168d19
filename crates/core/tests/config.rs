use std::path::PathBuf;
use std::time::Duration;

use rzview::{ArchSpec, SessionConfig};

const SAVED_CONFIG: &str = r#"{
  "base_addr": 4194304,
  "arch": {"name": "arm64", "bits": 64},
  "command_timeout_secs": null
}"#;

#[test]
fn empty_json_yields_defaults() {
    let config: SessionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, SessionConfig::default());
    assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.analysis_timeout(), Some(Duration::from_secs(300)));
    assert_eq!(config.load_addr, 0);
    assert!(config.base_addr.is_none());
}

#[test]
fn load_reads_file_and_reports_bad_json() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("session.json");
    std::fs::write(&path, SAVED_CONFIG).unwrap();
    let config = SessionConfig::load(&path).expect("load");
    assert_eq!(config.base_addr, Some(0x400000));
    assert_eq!(config.arch, Some(ArchSpec::new("arm64", 64)));
    assert_eq!(config.command_timeout(), None);

    std::fs::write(&path, "not json").unwrap();
    let err = SessionConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse session config JSON"));

    let err = SessionConfig::load(temp.path().join("missing.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read session config"));
}

#[test]
fn explicit_rizin_path_wins() {
    let config = SessionConfig::default().with_rizin_path("/opt/rizin/bin/rizin");
    assert_eq!(config.resolve_rizin_path(), PathBuf::from("/opt/rizin/bin/rizin"));
}

#[test]
fn builders_compose() {
    let config = SessionConfig::default()
        .with_base_addr(0x10000)
        .with_load_addr(0x1000)
        .with_timeouts(None, Some(5));
    assert_eq!(config.base_addr, Some(0x10000));
    assert_eq!(config.load_addr, 0x1000);
    assert_eq!(config.command_timeout(), None);
    assert_eq!(config.analysis_timeout(), Some(Duration::from_secs(5)));
}
