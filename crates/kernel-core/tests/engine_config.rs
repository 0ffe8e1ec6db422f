use std::time::Duration;

use kernel_core::config::{STORAGE_HOST_KEY, STORAGE_PORT_KEY};
use kernel_core::{BrokerError, DeploymentDirective, EngineConfig, StorageService};

#[test]
fn storage_service_settings_are_merged() {
    let config = EngineConfig::default().with_storage_service(&StorageService {
        host: "db.internal".to_string(),
        port: 9042,
    });

    assert_eq!(config.setting(STORAGE_HOST_KEY), Some("db.internal"));
    assert_eq!(config.setting(STORAGE_PORT_KEY), Some("9042"));
}

#[test]
fn explicit_settings_win_over_computed_ones() {
    let mut config = EngineConfig::default();
    config
        .settings
        .insert(STORAGE_HOST_KEY.to_string(), "pinned-host".to_string());

    let config = config.with_storage_service(&StorageService {
        host: "db.internal".to_string(),
        port: 9042,
    });

    assert_eq!(config.setting(STORAGE_HOST_KEY), Some("pinned-host"));
    assert_eq!(config.setting(STORAGE_PORT_KEY), Some("9042"));
}

#[test]
fn directive_display() {
    assert_eq!(DeploymentDirective::Local.to_string(), "local");
    let remote = DeploymentDirective::Remote {
        address: "node-2:2552".to_string(),
    };
    assert_eq!(remote.to_string(), "remote(node-2:2552)");
}

#[test]
fn only_directive_failures_are_fatal() {
    let timeout = BrokerError::EngineUnavailable {
        waited: Duration::from_secs(120),
    };
    assert!(timeout.is_fatal());
    assert!(BrokerError::DirectiveDropped.is_fatal());
    assert!(!BrokerError::BrokerStopped.is_fatal());
}
