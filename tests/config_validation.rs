//! Integration tests for configuration loading and validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;
use stnet::config::{NetworkConfig, DEFAULT_BATCH_SIZE, DEFAULT_SEND_QUEUE};
use stnet::error::ProtocolError;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = NetworkConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert_eq!(config.session.read_buffer, 1024);
    assert_eq!(config.session.send_queue, DEFAULT_SEND_QUEUE);
    assert_eq!(config.service.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(config.rpc.call_timeout, Duration::from_secs(5));
    assert_eq!(config.rpc.reconnect_interval, Duration::from_millis(100));
}

#[test]
fn test_errors_from_every_section_are_collected() {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.session.send_queue = 0;
        c.service.batch_size = 0;
        c.scheduler.tick = Duration::ZERO;
        c.rpc.call_timeout = Duration::from_millis(1);
    });

    let errors = config.validate();
    assert_eq!(errors.len(), 4, "unexpected errors: {errors:?}");
    assert!(errors.iter().any(|e| e.contains("Send queue length")));
    assert!(errors.iter().any(|e| e.contains("Batch size")));
    assert!(errors.iter().any(|e| e.contains("Scheduler tick")));
    assert!(errors.iter().any(|e| e.contains("RPC call timeout")));

    match config.validate_strict() {
        Err(ProtocolError::ConfigError(message)) => assert!(message.contains("Batch size")),
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_file_logging_requires_path() {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.logging.log_to_console = false;
        c.logging.log_to_file = true;
    });
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("log_file_path")));
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = NetworkConfig::from_toml(
        r#"
        [session]
        send_queue = 32
        send_timeout = 250

        [scheduler]
        tick = 1

        [logging]
        log_level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.session.send_queue, 32);
    assert_eq!(config.session.send_timeout, Duration::from_millis(250));
    assert_eq!(config.session.read_buffer, 1024);
    assert_eq!(config.scheduler.tick, Duration::from_millis(1));
    assert_eq!(config.service, NetworkConfig::default().service);
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.validate().is_empty());
}

#[test]
fn test_malformed_toml_is_rejected() {
    let result = NetworkConfig::from_toml("[session]\nsend_queue = \"many\"");
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
}

#[test]
fn test_save_and_reload() {
    let path = std::env::temp_dir().join(format!("stnet-config-{}.toml", std::process::id()));
    let config = NetworkConfig::default_with_overrides(|c| {
        c.connector.reconnect_interval = Duration::from_millis(750);
        c.logging.app_name = "gateway".into();
    });

    config.save_to_file(&path).unwrap();
    let loaded = NetworkConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, config);
}

#[test]
fn test_example_config_parses() {
    let example = NetworkConfig::example_config();
    let parsed = NetworkConfig::from_toml(&example).unwrap();
    assert_eq!(parsed, NetworkConfig::default());
}

#[test]
fn test_missing_file() {
    let result = NetworkConfig::from_file("/nonexistent/stnet.toml");
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
}
