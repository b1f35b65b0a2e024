//! Playback status and replay diagnostics shared with status consumers

use serde::{Deserialize, Serialize};

/// Significance threshold in beats
pub const SIGNIFICANT_REST_BEATS: f64 = 4.0;

/// Significance threshold in seconds
pub const SIGNIFICANT_REST_SECS: f64 = 1.0;

/// Wall-clock measurement of one rest during replay (diagnostic only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestTiming {
    /// Offset of the rest's start from session start (s)
    pub start_offset_sec: f64,
    /// Offset where the whole rest ends (s)
    pub end_offset_sec: f64,
    pub duration_sec: f64,
    pub beats: f64,
    pub significant: bool,
}

impl RestTiming {
    pub fn new(start_offset_sec: f64, duration_sec: f64, beats: f64) -> Self {
        Self {
            start_offset_sec,
            end_offset_sec: start_offset_sec + duration_sec,
            duration_sec,
            beats,
            significant: is_significant_rest(beats, duration_sec),
        }
    }
}

/// A rest is significant when it lasts at least 4 beats or at least 1 second
pub fn is_significant_rest(beats: f64, duration_sec: f64) -> bool {
    beats >= SIGNIFICANT_REST_BEATS || duration_sec >= SIGNIFICANT_REST_SECS
}

/// How a playback session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum PlaybackOutcome {
    Completed,
    Stopped,
    Failed(String),
}

/// Point-in-time playback snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub is_paused: bool,
    pub current_file: Option<String>,
    pub current_note_index: usize,
    pub total_notes: usize,
    pub progress_pct: f64,
    /// Wall-clock seconds since the session started
    pub elapsed_time: f64,
    /// Sequence duration in seconds
    pub theoretical_duration: f64,
    /// Wall-clock seconds the finished session took
    pub actual_duration: f64,
    pub significant_rests: Vec<RestTiming>,
    pub last_outcome: Option<PlaybackOutcome>,
}

impl PlaybackStatus {
    /// Progress percentage for `current` of `total` events
    pub fn progress_for(current: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            current as f64 / total as f64 * 100.0
        }
    }
}
