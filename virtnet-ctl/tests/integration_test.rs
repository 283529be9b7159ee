//! Integration tests for virtnetctl.
//!
//! These tests drive configuration parsing and the subcommands against a
//! temporary cache tree.

use clap::Parser;
use std::path::PathBuf;
use tempfile::TempDir;

use virtnet_common::LogFormat;
use virtnet_core::{CacheFactory, InfoSource, NetworkConfigState, PodInterfaceCacheEntry};
use virtnet_ctl::{commands, Args, Config};

/// Test that defaults apply without a config file.
#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.cache.base_dir, PathBuf::from("/var/run/virtnet/cache"));
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.json);
}

/// Test configuration loading from YAML.
#[test]
fn test_config_yaml_parsing() {
    let yaml = r#"
cache:
  base_dir: /run/virtnet-test
logging:
  level: debug
  json: true
"#;

    let config = Config::from_yaml(yaml).expect("Failed to parse YAML");

    assert_eq!(config.cache.base_dir, PathBuf::from("/run/virtnet-test"));
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert_eq!(config.logging.format(), LogFormat::Json);
}

/// Test that omitted sections keep their defaults.
#[test]
fn test_config_partial_yaml() {
    let config = Config::from_yaml("logging:\n  level: warn\n").expect("Failed to parse YAML");

    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.cache.base_dir, PathBuf::from("/var/run/virtnet/cache"));
}

#[test]
fn test_config_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.yaml");

    assert!(Config::load(&missing).is_err());
    assert!(Config::resolve(missing.to_str()).is_err());
}

#[test]
fn test_config_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("virtnet.yaml");
    std::fs::write(&path, "cache:\n  base_dir: /tmp/virtnet\n").unwrap();

    let config = Config::resolve(path.to_str()).unwrap();

    assert_eq!(config.cache.base_dir, PathBuf::from("/tmp/virtnet"));
}

/// Test that CLI flags win over the file.
#[test]
fn test_cli_overrides() {
    let args = Args::parse_from([
        "virtnetctl",
        "--log-level",
        "trace",
        "--json-logs",
        "--cache-dir",
        "/srv/cache",
        "teardown",
        "--uid",
        "uid-1",
    ]);

    let config = Config::from_yaml("logging:\n  level: warn\n")
        .unwrap()
        .with_cli_overrides(&args);

    assert_eq!(config.logging.level, "trace");
    assert!(config.logging.json);
    assert_eq!(config.cache.base_dir, PathBuf::from("/srv/cache"));
}

fn seed(cache: &CacheFactory, network: &str, state: NetworkConfigState) {
    cache
        .write_pod_interface(
            "uid-1",
            network,
            &PodInterfaceCacheEntry {
                pod_ip: Some("10.0.0.5".to_string()),
                pod_ips: vec!["10.0.0.5".to_string()],
                state,
                ..Default::default()
            },
        )
        .unwrap();
}

#[test]
fn test_state_and_reset() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFactory::new(dir.path());
    seed(&cache, "default", NetworkConfigState::Finished);
    seed(&cache, "blue", NetworkConfigState::Started);

    let networks = vec!["default".to_string(), "blue".to_string(), "red".to_string()];
    let states = commands::network_states(&cache, "uid-1", &networks).unwrap();
    assert_eq!(
        states,
        vec![
            ("default".to_string(), NetworkConfigState::Finished),
            ("blue".to_string(), NetworkConfigState::Started),
            ("red".to_string(), NetworkConfigState::Pending),
        ]
    );

    let previous = commands::reset_network(&cache, "uid-1", "blue").unwrap();
    assert_eq!(previous, NetworkConfigState::Started);

    let entry = cache.read_pod_interface("uid-1", "blue").unwrap();
    assert_eq!(entry.state, NetworkConfigState::Pending);
    assert_eq!(entry.pod_ip.as_deref(), Some("10.0.0.5"));
}

#[test]
fn test_reset_unknown_network_leaves_cache_untouched() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFactory::new(dir.path());

    let previous = commands::reset_network(&cache, "uid-1", "red").unwrap();

    assert_eq!(previous, NetworkConfigState::Pending);
    assert!(cache.read_pod_interface("uid-1", "red").unwrap_err().is_not_found());
}

#[test]
fn test_teardown_removes_vm_tree() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFactory::new(dir.path());
    seed(&cache, "default", NetworkConfigState::Finished);

    commands::teardown(&cache, "uid-1").unwrap();

    assert!(cache.read_pod_interface("uid-1", "default").unwrap_err().is_not_found());
    // Unknown VMs are fine
    commands::teardown(&cache, "uid-2").unwrap();
}

#[test]
fn test_status_reconciliation() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFactory::new(dir.path().join("cache"));
    seed(&cache, "default", NetworkConfigState::Finished);

    let vmi_path = dir.path().join("vmi.json");
    std::fs::write(
        &vmi_path,
        r#"{
  "uid": "uid-1",
  "name": "vm",
  "spec": {
    "networks": [{"name": "default", "pod": {}}],
    "interfaces": [{"name": "default", "binding": "masquerade"}]
  }
}"#,
    )
    .unwrap();
    let domain_path = dir.path().join("domain.json");
    std::fs::write(
        &domain_path,
        r#"{
  "spec": {"devices": {"interfaces": [{"alias": "default", "mac": "02:00:00:00:00:01"}]}}
}"#,
    )
    .unwrap();

    let interfaces = commands::reconcile_status(&cache, &vmi_path, Some(&domain_path)).unwrap();

    assert_eq!(interfaces.len(), 1);
    assert_eq!(interfaces[0].name, "default");
    assert_eq!(interfaces[0].mac.as_deref(), Some("02:00:00:00:00:01"));
    assert_eq!(interfaces[0].ip.as_deref(), Some("10.0.0.5"));
    assert_eq!(interfaces[0].info_source, InfoSource::DOMAIN);
}

#[test]
fn test_status_without_domain_keeps_previous() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFactory::new(dir.path());
    let vmi_path = dir.path().join("vmi.json");
    std::fs::write(
        &vmi_path,
        r#"{"uid": "uid-1", "name": "vm", "status": {"interfaces": [{"name": "default"}]}}"#,
    )
    .unwrap();

    let interfaces = commands::reconcile_status(&cache, &vmi_path, None).unwrap();

    assert_eq!(interfaces.len(), 1);
    assert_eq!(interfaces[0].name, "default");
}
