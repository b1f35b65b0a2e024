//! Replay diagnostics: rest timing and the end-of-session report
//!
//! A `REST` dispatch opens a record and the next non-rest dispatch closes it,
//! so a run of consecutive rests forms one record. The replayed rest events
//! only cover the release slice of each rest, so values are scaled back to the
//! whole rest before the significance test.

use serde::Serialize;
use tracing::info;
use windbot_common::sequence::ExecutionEvent;
use windbot_common::status::RestTiming;
use windbot_common::time::format_seconds;
use windbot_common::timing::{ms_to_beats, REST_RELEASE_SHARE};

#[derive(Debug, Clone, Copy)]
struct OpenRest {
    wall_start_sec: f64,
    sequence_start_ms: f64,
    release_ms: f64,
}

/// Tracks rests as events are dispatched
#[derive(Debug, Clone)]
pub struct RestTracker {
    bpm: f64,
    open: Option<OpenRest>,
    closed: Vec<RestTiming>,
}

impl RestTracker {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm,
            open: None,
            closed: Vec::new(),
        }
    }

    /// Record a dispatch of `event` at `wall_offset_sec` since session start
    pub fn observe(&mut self, event: &ExecutionEvent, wall_offset_sec: f64) {
        if event.is_rest() {
            match self.open.as_mut() {
                Some(open) => open.release_ms += event.duration_ms,
                None => {
                    self.open = Some(OpenRest {
                        wall_start_sec: wall_offset_sec,
                        sequence_start_ms: event.timestamp_ms,
                        release_ms: event.duration_ms,
                    })
                }
            }
            return;
        }

        let Some(open) = self.open.take() else {
            return;
        };

        let full_ms = open.release_ms / REST_RELEASE_SHARE;
        let nominal_elapsed_ms = event.timestamp_ms - open.sequence_start_ms;
        let measured_sec = (wall_offset_sec - open.wall_start_sec).max(0.0);
        // Stretch the measured part to the rest's full nominal length
        let duration_sec = if nominal_elapsed_ms > 0.0 {
            measured_sec * full_ms / nominal_elapsed_ms
        } else {
            full_ms / 1000.0
        };

        self.closed.push(RestTiming::new(
            open.wall_start_sec,
            duration_sec,
            ms_to_beats(full_ms, self.bpm),
        ));
    }

    pub fn rests(&self) -> &[RestTiming] {
        &self.closed
    }

    pub fn into_rests(self) -> Vec<RestTiming> {
        self.closed
    }
}

/// Summary of one replay, complete or cancelled
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaybackReport {
    pub theoretical_duration_sec: f64,
    pub actual_duration_sec: f64,
    pub events_dispatched: usize,
    pub total_events: usize,
    pub dispatch_failures: usize,
    pub rests: Vec<RestTiming>,
}

impl PlaybackReport {
    pub fn significant_rests(&self) -> Vec<RestTiming> {
        self.rests.iter().filter(|r| r.significant).cloned().collect()
    }

    /// Wall-clock minus nominal duration (s)
    pub fn drift_sec(&self) -> f64 {
        self.actual_duration_sec - self.theoretical_duration_sec
    }

    pub fn log_summary(&self) {
        let significant = self.significant_rests();
        info!(
            "Replay finished: {}/{} events, nominal {}, actual {}, drift {}",
            self.events_dispatched,
            self.total_events,
            format_seconds(self.theoretical_duration_sec),
            format_seconds(self.actual_duration_sec),
            format_seconds(self.drift_sec())
        );
        info!(
            "Rests: {} ({} significant), dispatch failures: {}",
            self.rests.len(),
            significant.len(),
            self.dispatch_failures
        );
        for (i, rest) in significant.iter().enumerate() {
            info!(
                "  rest {}: {:.2}s -> {:.2}s, {:.2}s ({:.1} beats)",
                i + 1,
                rest.start_offset_sec,
                rest.end_offset_sec,
                rest.duration_sec,
                rest.beats
            );
        }
    }
}
