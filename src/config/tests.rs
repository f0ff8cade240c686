use serial_test::serial;

use super::settings::{Overrides, Settings};
use super::load_config;
use crate::broker::Endpoint;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 4152);
    assert_eq!(settings.broker.nsqd, "127.0.0.1:4150");
    assert_eq!(settings.broker.lookupd, "127.0.0.1:4161");
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn test_load_config_defaults() {
    temp_env::with_vars_unset(
        [
            "POLLBRIDGE_SERVER_HOST",
            "POLLBRIDGE_SERVER_PORT",
            "POLLBRIDGE_BROKER_NSQD",
            "POLLBRIDGE_BROKER_LOOKUPD",
            "POLLBRIDGE_LOG_LEVEL",
        ],
        || {
            let settings = load_config().unwrap();
            assert_eq!(settings, Settings::default());
        },
    );
}

#[test]
#[serial]
fn test_load_config_from_env() {
    temp_env::with_vars(
        [
            ("POLLBRIDGE_SERVER_PORT", Some("9000")),
            ("POLLBRIDGE_BROKER_NSQD", Some("")),
            ("POLLBRIDGE_BROKER_LOOKUPD", Some("10.0.0.5:4161")),
            ("POLLBRIDGE_LOG_LEVEL", Some("debug")),
        ],
        || {
            let settings = load_config().unwrap();
            assert_eq!(settings.server.port, 9000);
            assert_eq!(settings.server.host, "0.0.0.0");
            assert_eq!(
                settings.broker.endpoint(),
                Some(Endpoint::Lookupd("10.0.0.5:4161".to_string()))
            );
            assert_eq!(settings.log.level, "debug");
        },
    );
}

#[test]
fn test_endpoint_prefers_nsqd() {
    let mut settings = Settings::default();
    assert_eq!(
        settings.broker.endpoint(),
        Some(Endpoint::Nsqd("127.0.0.1:4150".to_string()))
    );

    settings.broker.nsqd.clear();
    assert_eq!(
        settings.broker.endpoint(),
        Some(Endpoint::Lookupd("127.0.0.1:4161".to_string()))
    );

    settings.broker.lookupd.clear();
    assert_eq!(settings.broker.endpoint(), None);
}

#[test]
fn test_overrides_win() {
    let mut settings = Settings::default();
    settings
        .apply(Overrides {
            address: Some("127.0.0.1:8081".to_string()),
            nsqd: Some(String::new()),
            lookupd: None,
            log_level: Some("warn".to_string()),
        })
        .unwrap();

    assert_eq!(settings.server.address(), "127.0.0.1:8081");
    assert!(settings.broker.nsqd.is_empty());
    assert_eq!(settings.broker.lookupd, "127.0.0.1:4161");
    assert_eq!(settings.log.level, "warn");
}

#[test]
fn test_set_address() {
    let mut settings = Settings::default();

    settings.server.set_address(":4152").unwrap();
    assert_eq!(settings.server.address(), "0.0.0.0:4152");

    settings.server.set_address("[::1]:8080").unwrap();
    assert_eq!(settings.server.host, "::1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.address(), "[::1]:8080");

    assert!(settings.server.set_address("localhost").is_err());
    assert!(settings.server.set_address("localhost:http").is_err());
}
