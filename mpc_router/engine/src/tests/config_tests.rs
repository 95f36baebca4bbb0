use std::path::PathBuf;

use test_case::test_case;

use crate::config::RouterConfig;
use crate::envelope::EnvelopeFormat;
use crate::error::ConfigError;

#[test]
fn test_defaults() {
    let config = RouterConfig::default();

    assert_eq!(config.log_dir, PathBuf::from("logs"));
    assert!(!config.json_logs);
    assert_eq!(config.audit_capacity, 500);
    assert_eq!(config.max_parties, 100);
    assert_eq!(config.envelope_format, EnvelopeFormat::AddressedMap);
    config.validate().unwrap();
}

#[test]
fn test_partial_json_keeps_defaults() {
    let config = RouterConfig::from_json_str(r#"{"json_logs":true,"envelope_format":"data_field"}"#).unwrap();

    assert!(config.json_logs);
    assert_eq!(config.envelope_format, EnvelopeFormat::DataField);
    assert_eq!(config.max_parties, 100);
}

#[test_case(r#"{"max_parties":1}"# ; "party limit too small")]
#[test_case(r#"{"log_dir":""}"# ; "empty log dir")]
fn test_invalid_values_are_rejected(raw: &str) {
    assert!(matches!(RouterConfig::from_json_str(raw), Err(ConfigError::Invalid(_))));
}

#[test_case(r#"{"envelope_format":"v3"}"# ; "unknown format")]
#[test_case(r#"{"max_parties":"many"}"# ; "wrong type")]
#[test_case("not json" ; "garbage")]
fn test_unparseable_config_is_parse_error(raw: &str) {
    assert!(matches!(RouterConfig::from_json_str(raw), Err(ConfigError::Parse(_))));
}

#[test]
fn test_from_file() {
    let path = std::env::temp_dir().join(format!("mpc-router-config-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{"audit_capacity":16,"log_dir":"/var/log/mpc"}"#).unwrap();

    let config = RouterConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.audit_capacity, 16);
    assert_eq!(config.log_dir, PathBuf::from("/var/log/mpc"));
}

#[test]
fn test_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("mpc-router-config-does-not-exist.json");
    assert!(matches!(RouterConfig::from_file(path), Err(ConfigError::Io(_))));
}
