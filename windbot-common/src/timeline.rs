//! Symbolic note timelines
//!
//! On disk a timeline is `{"meta": {...}, "timeline": [["C4", 1], ["NO", 2], ...]}`.
//! Entries stay as raw JSON values here; [`crate::preprocess::parse_timeline`]
//! turns them into [`NoteEvent`]s and reports the offending index on bad input.

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Reserved note name marking silence
pub const REST_NOTE: &str = "NO";

/// One parsed timeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub note: String,
    pub duration_beats: f64,
    /// 1-based position in the source timeline
    pub index: usize,
}

impl NoteEvent {
    pub fn new(note: impl Into<String>, duration_beats: f64, index: usize) -> Self {
        Self {
            note: note.into(),
            duration_beats,
            index,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.note == REST_NOTE
    }

    /// Same sounding pitch as `other` (two rests never count as a repetition)
    pub fn repeats(&self, other: &NoteEvent) -> bool {
        !self.is_rest() && self.note == other.note
    }
}

/// Raw timeline file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub timeline: Vec<Vec<Value>>,
}

impl Timeline {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Tempo recorded in the timeline metadata, as a number or numeric string
    pub fn bpm(&self) -> Option<f64> {
        let bpm = match self.meta.get("bpm")? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (bpm.is_finite() && bpm > 0.0).then_some(bpm)
    }
}
