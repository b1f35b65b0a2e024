//! Execution sequence: the preprocessed, absolute-timestamped action plan
//!
//! This is the only persisted artifact between preprocessing and replay, so
//! the JSON layout is a compatibility boundary:
//!
//! ```json
//! {
//!   "meta": {"source_file": "song.json", "instrument": "secondary", "bpm": 60.0, ...},
//!   "events": [
//!     {"t": 0.0, "d": 985.0, "n": "C4",
//!      "frames": [{"hand": "left", "id": "0x28", "d": [1, 0, 0, 0, 0, 255, 255]}],
//!      "serial": "on"},
//!     {"t": 985.0, "d": 30.0, "n": "TONGUE", "serial": "off"}
//!   ]
//! }
//! ```
//!
//! `frames` is omitted when empty and `serial` when the event leaves the air
//! supply unchanged.

use crate::fingering::{ControlFrame, Hand, InstrumentKind, OP_CODE};
use crate::timing::MAX_SEQUENCE_MS;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Format version written into new sequences
pub const SEQUENCE_FORMAT_VERSION: &str = "1.0";

/// Label of the tongue-gap event between repeated notes
pub const TONGUE_LABEL: &str = "TONGUE";
/// Label of the release slice of a rest
pub const REST_LABEL: &str = "REST";
/// Label of the terminal release event
pub const END_LABEL: &str = "END";
/// Prefix of the pre-positioning slice at the end of a rest
pub const PRE_LABEL_PREFIX: &str = "PRE_";

/// One control frame addressed to a logical hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFrame {
    pub hand: Hand,
    /// Device id as `0x%X`
    pub id: String,
    #[serde(rename = "d")]
    pub data: ControlFrame,
}

/// Air-supply command carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialCommand {
    On,
    Off,
}

impl SerialCommand {
    pub fn is_on(self) -> bool {
        self == SerialCommand::On
    }
}

/// One timestamped action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Absolute offset from sequence start (ms)
    #[serde(rename = "t")]
    pub timestamp_ms: f64,
    #[serde(rename = "d")]
    pub duration_ms: f64,
    /// Note name, `REST`, `TONGUE`, `PRE_<note>` or `END`
    #[serde(rename = "n")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<SequenceFrame>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_serial"
    )]
    pub serial: Option<SerialCommand>,
}

impl ExecutionEvent {
    pub fn is_rest(&self) -> bool {
        self.label == REST_LABEL
    }
}

// An empty string means "no change", same as an absent key
fn deserialize_serial<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<SerialCommand>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("on") => Ok(Some(SerialCommand::On)),
        Some(s) if s.eq_ignore_ascii_case("off") => Ok(Some(SerialCommand::Off)),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unknown serial command '{}'",
            other
        ))),
    }
}

/// Provenance and replay parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceMeta {
    pub source_file: String,
    pub instrument: InstrumentKind,
    pub bpm: f64,
    pub tonguing_delay_ms: u32,
    pub total_duration_ms: f64,
    pub total_events: usize,
    pub generated_at: DateTime<Utc>,
    pub version: String,
}

/// Complete execution sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSequence {
    pub meta: SequenceMeta,
    pub events: Vec<ExecutionEvent>,
}

impl ExecutionSequence {
    /// Parse and validate sequence JSON
    pub fn from_json_str(text: &str) -> Result<Self> {
        let sequence: ExecutionSequence = serde_json::from_str(text)?;
        sequence.validate()?;
        if sequence.meta.version != SEQUENCE_FORMAT_VERSION {
            warn!(
                "Sequence format version {} (expected {})",
                sequence.meta.version, SEQUENCE_FORMAT_VERSION
            );
        }
        Ok(sequence)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a sequence file; a malformed file is rejected before any replay
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let sequence = Self::from_json_str(&text).map_err(|e| match e {
            Error::Json(inner) => {
                Error::Sequence(format!("Malformed sequence file {}: {}", path.display(), inner))
            }
            other => other,
        })?;
        info!(
            "Loaded execution sequence {} ({} events, {:.2}s)",
            path.display(),
            sequence.events.len(),
            sequence.meta.total_duration_ms / 1000.0
        );
        Ok(sequence)
    }

    /// Write the sequence as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_string()?)?;
        info!("Saved execution sequence to {}", path.display());
        Ok(())
    }

    /// Structural checks the replay loop relies on
    pub fn validate(&self) -> Result<()> {
        if !(self.meta.bpm.is_finite() && self.meta.bpm > 0.0) {
            return Err(Error::Sequence(format!("Invalid BPM {}", self.meta.bpm)));
        }
        if self.meta.total_events != self.events.len() {
            return Err(Error::Sequence(format!(
                "Metadata lists {} events, file has {}",
                self.meta.total_events,
                self.events.len()
            )));
        }

        let mut last = 0.0_f64;
        for (i, event) in self.events.iter().enumerate() {
            if !event.timestamp_ms.is_finite() || !event.duration_ms.is_finite() {
                return Err(Error::Sequence(format!("Event {} has a non-finite time", i)));
            }
            if event.timestamp_ms > MAX_SEQUENCE_MS || event.duration_ms > MAX_SEQUENCE_MS {
                return Err(Error::Sequence(format!(
                    "Event {} ({}) lies beyond the {:.0}ms sequence limit",
                    i, event.label, MAX_SEQUENCE_MS
                )));
            }
            if event.timestamp_ms < last {
                return Err(Error::Sequence(format!(
                    "Event {} ({}) at {:.1}ms precedes the previous event at {:.1}ms",
                    i, event.label, event.timestamp_ms, last
                )));
            }
            if event.duration_ms < 0.0 {
                return Err(Error::Sequence(format!("Event {} has a negative duration", i)));
            }
            if let Some(frame) = event.frames.iter().find(|f| f.data.op_code() != OP_CODE) {
                return Err(Error::Sequence(format!(
                    "Event {} has a {} hand frame with op code 0x{:02X}",
                    i,
                    frame.hand,
                    frame.data.op_code()
                )));
            }
            last = event.timestamp_ms;
        }
        Ok(())
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.meta.total_duration_ms
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
