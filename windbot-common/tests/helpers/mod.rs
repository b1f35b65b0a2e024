//! Shared fixtures for windbot-common integration tests

#![allow(dead_code)]

use serde_json::Value;
use windbot_common::config::RigConfig;
use windbot_common::fingering::{FingeringMap, InstrumentKind};
use windbot_common::preprocess::SequencePreprocessor;
use windbot_common::timeline::Timeline;

pub const PRESS: [u8; 6] = [0, 10, 20, 30, 40, 50];
pub const RELEASE: [u8; 6] = [250, 251, 252, 253, 254, 255];

/// Rig config with both instruments using the same profile
pub const RIG_TOML: &str = r#"
bus_bridge_url = "http://127.0.0.1:5260"
tonguing_delay_ms = 30

[hands.left]
interface = "can0"
id = "0x28"

[hands.right]
interface = "can1"
id = "0x29"

[instruments.primary.left]
press = [0, 10, 20, 30, 40, 50]
release = [250, 251, 252, 253, 254, 255]

[instruments.primary.right]
press = [0, 10, 20, 30, 40, 50]
release = [250, 251, 252, 253, 254, 255]

[instruments.secondary.left]
press = [0, 10, 20, 30, 40, 50]
release = [250, 251, 252, 253, 254, 255]

[instruments.secondary.right]
press = [0, 10, 20, 30, 40, 50]
release = [250, 251, 252, 253, 254, 255]

[instruments.secondary.register_overrides]
register_a = [60, 160]
register_b = [160, 60]
"#;

pub const FINGERING_YAML: &str = r#"
fingering_map:
  - note: C4
    left: [Thumb, Index, Middle, Ring]
    right: [Index, Middle, Ring, Little]
  - note: D4
    left: [Thumb, Index, Middle, Ring]
    right: [Index, Middle, Ring]
  - note: E4
    left: [Thumb, Index, Middle]
    right: []
  - note: A5
    left: [Thumb1, Index]
    right: []
  - note: B5
    left: [Thumb2, Index]
    right: []
"#;

pub fn rig_config() -> RigConfig {
    RigConfig::from_toml_str(RIG_TOML).unwrap()
}

pub fn fingering() -> FingeringMap {
    FingeringMap::from_yaml_str(FINGERING_YAML).unwrap()
}

pub fn preprocessor(instrument: InstrumentKind, bpm: f64, delay_ms: u32) -> SequencePreprocessor {
    SequencePreprocessor::new(&rig_config(), instrument, fingering(), bpm, delay_ms).unwrap()
}

/// Timeline from `[note, beats]` pairs
pub fn timeline(entries: &[(&str, f64)]) -> Timeline {
    Timeline {
        meta: Default::default(),
        timeline: entries
            .iter()
            .map(|(note, beats)| vec![Value::from(*note), Value::from(*beats)])
            .collect(),
    }
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
