// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loading factory configuration from disk.

use qreply::{ConfigError, DriftPolicy, FactoryConfig, RequestResponseFactory};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
connection_string = "memory://"
request_queue = "loans-in"
response_queue = "loans-out"
reply_timeout_ms = 2500
drift_policy = "session-only"
"#
    )
    .unwrap();

    let config = FactoryConfig::from_file(file.path()).unwrap();
    assert_eq!(config.request_queue, "loans-in");
    assert_eq!(config.drift_policy, DriftPolicy::SessionOnly);
    assert_eq!(config.reply_timeout(), Duration::from_millis(2500));

    let factory = RequestResponseFactory::connect(&config).unwrap();
    assert_eq!(factory.request_descriptor().name, "loans-in");
    assert_eq!(factory.response_descriptor().name, "loans-out");
}

#[test]
fn test_invalid_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "request_queue = \"same\"\nresponse_queue = \"same\"").unwrap();
    assert!(matches!(
        FactoryConfig::from_file(file.path()),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        FactoryConfig::from_file(dir.path().join("absent.toml")),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn test_sample_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qreply.toml");
    std::fs::write(&path, FactoryConfig::sample_toml()).unwrap();
    assert_eq!(
        FactoryConfig::from_file(&path).unwrap(),
        FactoryConfig::default()
    );
}
