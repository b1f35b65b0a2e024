//! Fingering maps and the per-note control frame encoder
//!
//! A fingering map says which fingers each hand presses for a note; the
//! [`frame`] encoder turns that into the 7-byte control frame one hand's
//! actuator board understands.

pub mod frame;

pub use frame::{
    build_frame, build_release_frame, finger_channel, needs_release_step, ControlFrame,
    FrameEncoder, ThumbRegister, OP_CODE,
};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Logical hand designation, resolved to a bus address only at dispatch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub(crate) fn slot(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }
}

impl std::fmt::Display for Hand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hand::Left => write!(f, "left"),
            Hand::Right => write!(f, "right"),
        }
    }
}

/// Instrument selection
///
/// `Secondary` is the extended-register instrument with the two special
/// thumb registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    #[serde(alias = "sks")]
    Primary,
    #[serde(alias = "sn")]
    Secondary,
}

impl InstrumentKind {
    /// Whether the instrument has the extended-register thumb mechanism
    pub fn has_extended_register(self) -> bool {
        self == InstrumentKind::Secondary
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentKind::Primary => write!(f, "primary"),
            InstrumentKind::Secondary => write!(f, "secondary"),
        }
    }
}

impl std::str::FromStr for InstrumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "sks" => Ok(InstrumentKind::Primary),
            "secondary" | "sn" => Ok(InstrumentKind::Secondary),
            other => Err(Error::Config(format!("Unknown instrument '{}'", other))),
        }
    }
}

/// Fingers each hand presses for one note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingeringEntry {
    pub note: String,
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
}

impl FingeringEntry {
    pub fn fingers(&self, hand: Hand) -> &[String] {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FingeringFile {
    fingering_map: Vec<FingeringEntry>,
}

/// Note name → fingering lookup for one instrument
#[derive(Debug, Clone, Default)]
pub struct FingeringMap {
    entries: HashMap<String, FingeringEntry>,
}

impl FingeringMap {
    /// Build a map from entries; a later entry for the same note wins
    pub fn from_entries(entries: impl IntoIterator<Item = FingeringEntry>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            if let Some(previous) = map.insert(entry.note.clone(), entry) {
                warn!("Duplicate fingering entry for note {}, keeping the last one", previous.note);
            }
        }
        Self { entries: map }
    }

    /// Parse a YAML fingering file (`fingering_map: [{note, left, right}, ...]`)
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: FingeringFile = serde_yaml::from_str(text)?;
        Ok(Self::from_entries(file.fingering_map))
    }

    /// Load a YAML fingering file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let map = Self::from_yaml_str(&text)?;
        info!("Loaded {} fingering entries from {}", map.len(), path.display());
        Ok(map)
    }

    /// Strict lookup: a missing note is a mapping error
    pub fn lookup(&self, note: &str) -> Result<&FingeringEntry> {
        self.entries
            .get(note)
            .ok_or_else(|| Error::MissingFingering(note.to_string()))
    }

    pub fn get(&self, note: &str) -> Option<&FingeringEntry> {
        self.entries.get(note)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
