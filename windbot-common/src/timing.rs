//! Beat-based timing for the sequence preprocessor and replay diagnostics
//!
//! Timelines express durations in beats; execution sequences carry absolute
//! milliseconds from sequence start. All conversions go through this module so
//! the preprocessor and the replay diagnostics agree on the arithmetic.
//!
//! # Conversions
//!
//! ```text
//! duration_beats ──beats_to_ms(bpm)──▶ duration_ms   (60000 / bpm per beat)
//! duration_ms    ──ms_to_beats(bpm)──▶ duration_beats
//! ```
//!
//! # Rest split
//!
//! A rest is replayed as a release slice covering [`REST_RELEASE_SHARE`] of its
//! duration followed (when a note comes next) by a pre-positioning slice for
//! the remainder.

use crate::{Error, Result};

/// Milliseconds per minute
pub const MS_PER_MINUTE: f64 = 60_000.0;

/// Share of a rest spent with fingers released and air off
pub const REST_RELEASE_SHARE: f64 = 0.8;

/// Fallback tempo when neither caller, configuration nor timeline supplies one
pub const DEFAULT_BPM: f64 = 60.0;

/// Longest sequence accepted anywhere (24 h, in ms)
pub const MAX_SEQUENCE_MS: f64 = 24.0 * 60.0 * MS_PER_MINUTE;

/// Whether `ms` is a usable sequence offset or duration
pub fn is_schedulable_ms(ms: f64) -> bool {
    ms.is_finite() && (0.0..=MAX_SEQUENCE_MS).contains(&ms)
}

/// Reject tempos the arithmetic cannot use
pub fn validate_bpm(bpm: f64) -> Result<f64> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(bpm)
    } else {
        Err(Error::Config(format!("BPM must be a positive number, got {}", bpm)))
    }
}

/// Milliseconds in one beat at `bpm`
pub fn ms_per_beat(bpm: f64) -> f64 {
    MS_PER_MINUTE / bpm
}

/// Convert a beat count to milliseconds: `(60 / bpm) * beats * 1000`
pub fn beats_to_ms(beats: f64, bpm: f64) -> f64 {
    (60.0 / bpm) * beats * 1000.0
}

/// Convert milliseconds back to beats at `bpm`
pub fn ms_to_beats(ms: f64, bpm: f64) -> f64 {
    ms / ms_per_beat(bpm)
}

/// Split an inter-note articulation gap proportionally to the two notes' beats
///
/// Returns `(left, right)`: the part paid by the first note and the part the
/// second note inherits. `left + right == delay_ms`.
pub fn split_tonguing_gap(delay_ms: f64, beats_a: f64, beats_b: f64) -> (f64, f64) {
    let total = beats_a + beats_b;
    if total <= 0.0 {
        return (0.0, delay_ms);
    }
    let left = delay_ms * (beats_a / total);
    (left, delay_ms - left)
}
