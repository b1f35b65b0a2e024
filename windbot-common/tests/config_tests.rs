//! Rig configuration loading and config path resolution
//!
//! Tests that touch WINDBOT_CONFIG or the working directory are marked
//! #[serial] so they do not race each other.

mod helpers;

use helpers::*;
use serial_test::serial;
use std::env;
use std::path::Path;
use tempfile::TempDir;
use windbot_common::config::{resolve_config_path, AirTransport, RigConfig, CONFIG_ENV_VAR};
use windbot_common::fingering::{Hand, InstrumentKind};
use windbot_common::Error;

#[test]
fn test_full_rig_config_parses() {
    let config = rig_config();
    assert_eq!(config.hands.address(Hand::Right).device_id().unwrap(), 0x29);
    let secondary = config.instrument(InstrumentKind::Secondary).unwrap();
    assert_eq!(secondary.register_overrides.unwrap().register_a, [60, 160]);
    assert_eq!(secondary.hand(Hand::Left).press.len(), 6);
}

#[test]
fn test_bus_air_supply_requires_valid_id() {
    let text = r#"
        [air_supply]
        transport = "bus"
        bus_id = "not-a-number"
    "#;
    assert!(matches!(RigConfig::from_toml_str(text), Err(Error::Config(_))));

    let text = r#"
        [air_supply]
        transport = "bus"
        bus_interface = "can3"
        bus_id = "0x200"
    "#;
    let config = RigConfig::from_toml_str(text).unwrap();
    assert_eq!(config.air_supply.transport, AirTransport::Bus);
    assert_eq!(config.air_supply.bus_interface, "can3");
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rig.toml");
    std::fs::write(&path, RIG_TOML).unwrap();

    let config = RigConfig::load(&path).unwrap();
    assert_eq!(config.bus_bridge_url, "http://127.0.0.1:5260");
}

#[test]
fn test_load_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        RigConfig::load(&dir.path().join("absent.toml")),
        Err(Error::Config(_))
    ));
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/windbot-from-env.toml");
    let resolved = resolve_config_path(Some(Path::new("/tmp/windbot-cli.toml"))).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Path::new("/tmp/windbot-cli.toml"));
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/windbot-from-env.toml");
    let resolved = resolve_config_path(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Path::new("/tmp/windbot-from-env.toml"));
}

#[test]
#[serial]
fn test_working_directory_file_used_after_env() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("windbot.toml"), RIG_TOML).unwrap();

    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir.path()).unwrap();
    let resolved = resolve_config_path(None);
    env::set_current_dir(previous).unwrap();

    assert_eq!(resolved.unwrap(), Path::new("windbot.toml"));
}
