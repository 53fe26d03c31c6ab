use std::collections::HashMap;

use corebridge_config::{BridgeConfig, ConfigError};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_parse_and_validate() {
    let config = BridgeConfig::load("tests/fixtures/basic.yaml").unwrap();
    assert_eq!(config.source_name, "app.js");
    assert!(config.debug);
    assert!(!config.clocks);
    assert_eq!(config.imports.len(), 2);
    assert_eq!(config.imports.get("log").unwrap().argcnt, 2);
    assert_eq!(config.imports.get_index(1).unwrap().0, "now");

    let names: Vec<&str> = config.exports.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["add", "packed", "boxed"]);
    assert_eq!(config.exports.get("add").unwrap().args, "i32,i64");
    assert_eq!(config.exports.get("packed").unwrap().ret, "i32");
    assert_eq!(config.exports.get("boxed").unwrap().retsize, 8);
}

#[test]
fn test_empty_source_name() {
    let err = BridgeConfig::load("tests/fixtures/empty_source.yaml").unwrap_err();
    assert_eq!(err.to_string(), "Source module name must not be empty");
}

#[test]
fn test_unknown_field_is_rejected() {
    let err = BridgeConfig::load("tests/fixtures/unknown_field.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Yaml(_)));
}

#[test]
fn test_missing_file() {
    let err = BridgeConfig::load("tests/fixtures/does_not_exist.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_env_manifest() {
    let config = BridgeConfig::from_lookup(lookup(&[
        ("DEBUG", "0"),
        ("FEATURE_CLOCKS", "1"),
        ("SOURCE_NAME", "main.js"),
        ("IMPORT_CNT", "1"),
        ("IMPORT0_NAME", "log"),
        ("IMPORT0_ARGCNT", "2"),
        ("EXPORT_CNT", "2"),
        ("EXPORT0_NAME", "run"),
        ("EXPORT0_ARGS", ""),
        ("EXPORT0_RET", ""),
        ("EXPORT0_RETSIZE", "0"),
        ("EXPORT1_NAME", "sum"),
        ("EXPORT1_ARGS", "f64,f64"),
        ("EXPORT1_RET", "f64"),
        ("EXPORT1_RETSIZE", "8"),
    ]))
    .unwrap();

    assert!(!config.debug);
    assert!(config.clocks);
    assert_eq!(config.source_name, "main.js");
    assert_eq!(config.imports.get("log").unwrap().argcnt, 2);
    assert_eq!(config.exports.get_index(1).unwrap().0, "sum");
    assert_eq!(config.exports.get("sum").unwrap().args, "f64,f64");
    assert_eq!(config.exports.get("sum").unwrap().retsize, 8);
}

#[test]
fn test_env_manifest_missing_key() {
    let err = BridgeConfig::from_lookup(lookup(&[
        ("DEBUG", "0"),
        ("FEATURE_CLOCKS", "0"),
        ("SOURCE_NAME", "main.js"),
        ("IMPORT_CNT", "0"),
        ("EXPORT_CNT", "1"),
        ("EXPORT0_NAME", "run"),
        ("EXPORT0_ARGS", ""),
        ("EXPORT0_RET", ""),
    ]))
    .unwrap_err();
    assert_eq!(err, ConfigError::MissingKey("EXPORT0_RETSIZE".to_string()));
}

#[test]
fn test_env_manifest_bad_count() {
    let err = BridgeConfig::from_lookup(lookup(&[
        ("DEBUG", "0"),
        ("FEATURE_CLOCKS", "0"),
        ("SOURCE_NAME", "main.js"),
        ("IMPORT_CNT", "two"),
    ]))
    .unwrap_err();
    assert_eq!(
        err,
        ConfigError::InvalidNumber {
            key: "IMPORT_CNT".to_string(),
            value: "two".to_string(),
        }
    );
}

#[test]
fn test_env_manifest_duplicate_export() {
    let err = BridgeConfig::from_lookup(lookup(&[
        ("DEBUG", "0"),
        ("FEATURE_CLOCKS", "0"),
        ("SOURCE_NAME", "main.js"),
        ("IMPORT_CNT", "0"),
        ("EXPORT_CNT", "2"),
        ("EXPORT0_NAME", "run"),
        ("EXPORT0_ARGS", ""),
        ("EXPORT0_RET", ""),
        ("EXPORT0_RETSIZE", "0"),
        ("EXPORT1_NAME", "run"),
        ("EXPORT1_ARGS", ""),
        ("EXPORT1_RET", ""),
        ("EXPORT1_RETSIZE", "0"),
    ]))
    .unwrap_err();
    assert_eq!(err.to_string(), "Duplicate export name `run`");
}

#[test]
fn test_missing_export_key_is_rejected() {
    let err = BridgeConfig::load("tests/fixtures/missing_retsize.yaml").unwrap_err();
    match err {
        ConfigError::Yaml(msg) => assert!(msg.contains("retsize"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_boxed_export_needs_retsize() {
    let err = BridgeConfig::load("tests/fixtures/boxed_zero_retsize.yaml").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Export `boxed` returns through a pointer but has no retsize"
    );
}

#[test]
fn test_env_manifest_boxed_export_needs_retsize() {
    let err = BridgeConfig::from_lookup(lookup(&[
        ("DEBUG", "0"),
        ("FEATURE_CLOCKS", "0"),
        ("SOURCE_NAME", "main.js"),
        ("IMPORT_CNT", "0"),
        ("EXPORT_CNT", "1"),
        ("EXPORT0_NAME", "boxed"),
        ("EXPORT0_ARGS", ""),
        ("EXPORT0_RET", "*i64"),
        ("EXPORT0_RETSIZE", "0"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}
