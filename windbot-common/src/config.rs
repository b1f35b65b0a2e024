//! Rig configuration loading and config file resolution
//!
//! The rig is described by a single TOML file: bus bridge address, per-hand
//! bus addressing, air-supply transport, per-instrument finger profiles and a
//! few playback tunables. Every optional field has a built-in default, so a
//! minimal file only needs the instrument profiles it actually plays.
//!
//! ```toml
//! bus_bridge_url = "http://localhost:5260"
//! tonguing_delay_ms = 30
//!
//! [hands.left]
//! interface = "can0"
//! id = "0x28"
//!
//! [instruments.secondary.left]
//! press = [0, 0, 0, 0, 0, 0]
//! release = [255, 255, 255, 255, 255, 255]
//!
//! [instruments.secondary.register_overrides]
//! register_a = [40, 200]
//! register_b = [200, 40]
//! ```

use crate::fingering::{Hand, InstrumentKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the rig configuration file
pub const CONFIG_ENV_VAR: &str = "WINDBOT_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "windbot.toml";

/// Number of logical finger channels per hand
pub const FINGER_CHANNELS: usize = 6;

/// Complete rig configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    /// Base URL of the HTTP bus bridge
    #[serde(default = "default_bus_bridge_url")]
    pub bus_bridge_url: String,

    /// Log frames and air commands instead of sending them
    #[serde(default)]
    pub dry_run: bool,

    /// Configured tempo; overridden by the caller, overrides the timeline
    #[serde(default)]
    pub bpm: Option<f64>,

    /// Articulation gap between repeated notes (ms)
    #[serde(default = "default_tonguing_delay_ms")]
    pub tonguing_delay_ms: u32,

    #[serde(default)]
    pub hands: HandsConfig,

    #[serde(default)]
    pub air_supply: AirSupplyConfig,

    #[serde(default)]
    pub ready: ReadyConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub instruments: InstrumentsConfig,

    /// Default fingering map per instrument
    #[serde(default)]
    pub fingering: FingeringPaths,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bus addressing for both hands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandsConfig {
    #[serde(default = "default_left_hand")]
    pub left: HandAddress,
    #[serde(default = "default_right_hand")]
    pub right: HandAddress,
}

/// Physical bus address of one hand's actuator board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandAddress {
    /// Bus interface name on the bridge (e.g. `can0`)
    pub interface: String,
    /// Device id, hexadecimal (`0x28`) or decimal
    #[serde(default = "default_device_id")]
    pub id: String,
}

impl HandAddress {
    /// Parsed numeric device id
    pub fn device_id(&self) -> Result<u32> {
        parse_device_id(&self.id)
            .ok_or_else(|| Error::Config(format!("Invalid device id '{}'", self.id)))
    }
}

/// How the air pump is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AirTransport {
    /// Dedicated serial line to the pump controller
    #[default]
    Serial,
    /// Pump board on the frame bus
    Bus,
}

/// Air-supply actuator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirSupplyConfig {
    #[serde(default)]
    pub transport: AirTransport,

    /// Serial device node of the pump controller
    #[serde(default = "default_port_name")]
    pub port_name: String,

    /// Bus interface of the pump board (bus transport)
    #[serde(default = "default_air_interface")]
    pub bus_interface: String,

    /// Device id of the pump board (bus transport)
    #[serde(default = "default_air_id")]
    pub bus_id: String,
}

/// Ready gesture: release all fingers and hold before the first note
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub hold_ms: u64,
}

/// Playback tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Upper bound on waiting for in-flight dispatches at shutdown
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Per-request timeout for the bus bridge
    #[serde(default = "default_bridge_timeout_ms")]
    pub bridge_timeout_ms: u64,
}

/// Finger profiles for each instrument
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    #[serde(default)]
    pub primary: Option<InstrumentProfile>,
    #[serde(default)]
    pub secondary: Option<InstrumentProfile>,
}

/// Press/release values for one hand, one byte per logical finger channel
///
/// Channel order: thumb, thumb rotation, index, middle, ring, little.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandProfile {
    pub press: Vec<u8>,
    pub release: Vec<u8>,
}

/// Channel 0/1 values for the two extended-register thumb positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOverrides {
    /// Values for the `Thumb1` register
    pub register_a: [u8; 2],
    /// Values for the `Thumb2` register
    pub register_b: [u8; 2],
}

/// Complete finger profile for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    pub left: HandProfile,
    pub right: HandProfile,
    #[serde(default)]
    pub register_overrides: Option<RegisterOverrides>,
}

impl InstrumentProfile {
    pub fn hand(&self, hand: Hand) -> &HandProfile {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }
}

/// Fingering map files per instrument
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingeringPaths {
    #[serde(default)]
    pub primary: Option<PathBuf>,
    #[serde(default)]
    pub secondary: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_bus_bridge_url() -> String {
    "http://localhost:5260".to_string()
}

fn default_tonguing_delay_ms() -> u32 {
    30
}

fn default_device_id() -> String {
    "0x28".to_string()
}

fn default_left_hand() -> HandAddress {
    HandAddress {
        interface: "can0".to_string(),
        id: default_device_id(),
    }
}

fn default_right_hand() -> HandAddress {
    HandAddress {
        interface: "can1".to_string(),
        id: default_device_id(),
    }
}

fn default_port_name() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_air_interface() -> String {
    "can4".to_string()
}

fn default_air_id() -> String {
    "0x101".to_string()
}

fn default_grace_ms() -> u64 {
    100
}

fn default_bridge_timeout_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            left: default_left_hand(),
            right: default_right_hand(),
        }
    }
}

impl Default for AirSupplyConfig {
    fn default() -> Self {
        Self {
            transport: AirTransport::default(),
            port_name: default_port_name(),
            bus_interface: default_air_interface(),
            bus_id: default_air_id(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            bridge_timeout_ms: default_bridge_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl HandsConfig {
    pub fn address(&self, hand: Hand) -> &HandAddress {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }
}

impl RigConfig {
    /// Load and validate a TOML rig configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded rig configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RigConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check addressing and profiles
    ///
    /// Short profiles are accepted (missing channels fall back to fully
    /// released), but unparsable device ids are not.
    pub fn validate(&self) -> Result<()> {
        self.hands.left.device_id()?;
        self.hands.right.device_id()?;
        if self.air_supply.transport == AirTransport::Bus {
            parse_device_id(&self.air_supply.bus_id).ok_or_else(|| {
                Error::Config(format!("Invalid air supply id '{}'", self.air_supply.bus_id))
            })?;
        }

        for kind in [InstrumentKind::Primary, InstrumentKind::Secondary] {
            let Some(profile) = self.profile_slot(kind) else {
                continue;
            };
            for hand in [Hand::Left, Hand::Right] {
                let p = profile.hand(hand);
                if p.press.len() != FINGER_CHANNELS || p.release.len() != FINGER_CHANNELS {
                    warn!(
                        "{} {} profile has {} press / {} release values, expected {}",
                        kind,
                        hand,
                        p.press.len(),
                        p.release.len(),
                        FINGER_CHANNELS
                    );
                }
            }
            if kind == InstrumentKind::Secondary && profile.register_overrides.is_none() {
                warn!("secondary instrument has no register_overrides; Thumb1/Thumb2 will stay released");
            }
        }

        if let Some(bpm) = self.bpm {
            crate::timing::validate_bpm(bpm)?;
        }
        Ok(())
    }

    fn profile_slot(&self, kind: InstrumentKind) -> Option<&InstrumentProfile> {
        match kind {
            InstrumentKind::Primary => self.instruments.primary.as_ref(),
            InstrumentKind::Secondary => self.instruments.secondary.as_ref(),
        }
    }

    /// Finger profile for an instrument, or a configuration error if absent
    pub fn instrument(&self, kind: InstrumentKind) -> Result<&InstrumentProfile> {
        self.profile_slot(kind)
            .ok_or_else(|| Error::Config(format!("No profile configured for instrument '{}'", kind)))
    }

    /// Configured fingering map path for an instrument
    pub fn fingering_path(&self, kind: InstrumentKind) -> Option<&Path> {
        match kind {
            InstrumentKind::Primary => self.fingering.primary.as_deref(),
            InstrumentKind::Secondary => self.fingering.secondary.as_deref(),
        }
    }
}

/// Parse a device id written as `0x28`/`0X28` (hex) or `40` (decimal)
pub fn parse_device_id(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u32>().ok()
    }
}

/// Render a device id the way execution sequences store it (`0x28`)
pub fn format_device_id(id: u32) -> String {
    format!("0x{:X}", id)
}

/// Config file resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `WINDBOT_CONFIG` environment variable
/// 3. `windbot.toml` in the working directory
/// 4. `<config_dir>/windbot/config.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: Working directory
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    // Priority 4: Per-user config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("windbot").join("config.toml")) {
        if path.exists() {
            return Ok(path);
        }
    }

    Err(Error::Config(format!(
        "No config file found (pass --config, set {}, or create {})",
        CONFIG_ENV_VAR, LOCAL_CONFIG_FILE
    )))
}
