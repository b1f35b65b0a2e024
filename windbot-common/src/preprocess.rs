//! Sequence preprocessor: timeline + fingering map → execution sequence
//!
//! All timing decisions happen here, once, so replay only has to wait and
//! dispatch. Per note the base duration is `(60 / bpm) * beats * 1000` ms.
//!
//! **Rests** are split 80/20: a release slice (`REST`, fingers released, air
//! off) followed, when the next entry is a note, by a `PRE_<note>` slice that
//! loads the next fingering with the air still off. Compensation resets after
//! a rest.
//!
//! **Repeated notes** are articulated with a tongue gap of `tonguing_delay_ms`
//! (air off). The gap is paid by both neighbours in proportion to their beats:
//! `gL = d * a / (a + b)` from the first, `gR = d - gL` from the second. An
//! interior note of a run of three or more pays on both sides. A note that
//! repeats its predecessor carries no frames since the fingering is already in
//! place.
//!
//! Every sequence ends with a zero-length `END` event that releases both hands
//! and turns the air off.

use crate::config::RigConfig;
use crate::fingering::{FingeringMap, FrameEncoder, InstrumentKind};
use crate::sequence::{
    ExecutionEvent, ExecutionSequence, SequenceFrame, SequenceMeta, SerialCommand, END_LABEL,
    PRE_LABEL_PREFIX, REST_LABEL, SEQUENCE_FORMAT_VERSION, TONGUE_LABEL,
};
use crate::timeline::{NoteEvent, Timeline};
use crate::timing::{
    beats_to_ms, is_schedulable_ms, split_tonguing_gap, validate_bpm, DEFAULT_BPM, MAX_SEQUENCE_MS,
    REST_RELEASE_SHARE,
};
use crate::{Error, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Parse raw timeline entries into note events
///
/// Each entry must be `[note, beats, ...]` with a non-empty note name and a
/// positive numeric duration. Errors cite the 1-based entry index; an empty
/// timeline is reported against index 0.
pub fn parse_timeline(timeline: &Timeline) -> Result<Vec<NoteEvent>> {
    if timeline.timeline.is_empty() {
        return Err(Error::validation(0, "timeline has no entries"));
    }

    timeline
        .timeline
        .iter()
        .enumerate()
        .map(|(i, entry)| parse_entry(i + 1, entry))
        .collect()
}

fn parse_entry(index: usize, entry: &[Value]) -> Result<NoteEvent> {
    let note = match entry.first() {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) | None => return Err(Error::validation(index, "missing note name")),
        Some(other) => {
            return Err(Error::validation(
                index,
                format!("note name must be a string, got {}", other),
            ))
        }
    };

    let duration = match entry.get(1) {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| Error::validation(index, format!("duration {} is not a number", value)))?,
        None => return Err(Error::validation(index, format!("missing duration for {}", note))),
    };

    if !duration.is_finite() || duration <= 0.0 {
        return Err(Error::validation(
            index,
            format!("duration must be positive, got {}", duration),
        ));
    }

    Ok(NoteEvent::new(note, duration, index))
}

/// Tempo precedence: explicit override > configured > timeline metadata > 60
pub fn resolve_bpm(override_bpm: Option<f64>, config_bpm: Option<f64>, timeline: &Timeline) -> Result<f64> {
    let bpm = override_bpm
        .or(config_bpm)
        .or_else(|| timeline.bpm())
        .unwrap_or(DEFAULT_BPM);
    validate_bpm(bpm)
}

/// Conventional file name for a preprocessed sequence:
/// `<stem>_<instrument>_<bpm>_<delay>.exec.json`
pub fn exec_file_name(source: &Path, instrument: InstrumentKind, bpm: f64, tonguing_delay_ms: u32) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sequence".to_string());
    format!("{}_{}_{}_{}.exec.json", stem, instrument, bpm, tonguing_delay_ms)
}

/// Compiles timelines into execution sequences for one instrument and tempo
#[derive(Debug, Clone)]
pub struct SequencePreprocessor {
    encoder: FrameEncoder,
    fingering: FingeringMap,
    bpm: f64,
    tonguing_delay_ms: u32,
}

impl SequencePreprocessor {
    /// Bind the rig's profile for `instrument`, its fingering map and the tempo
    pub fn new(
        config: &RigConfig,
        instrument: InstrumentKind,
        fingering: FingeringMap,
        bpm: f64,
        tonguing_delay_ms: u32,
    ) -> Result<Self> {
        let profile = config.instrument(instrument)?.clone();
        let encoder = FrameEncoder::new(instrument, profile, &config.hands)?;
        Self::with_encoder(encoder, fingering, bpm, tonguing_delay_ms)
    }

    pub fn with_encoder(
        encoder: FrameEncoder,
        fingering: FingeringMap,
        bpm: f64,
        tonguing_delay_ms: u32,
    ) -> Result<Self> {
        Ok(Self {
            encoder,
            fingering,
            bpm: validate_bpm(bpm)?,
            tonguing_delay_ms,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn tonguing_delay_ms(&self) -> u32 {
        self.tonguing_delay_ms
    }

    /// Parse and compile a timeline; nothing is produced if any entry fails
    pub fn generate(&self, timeline: &Timeline, source_file: &str) -> Result<ExecutionSequence> {
        let notes = parse_timeline(timeline)?;
        self.generate_from_notes(&notes, source_file)
    }

    /// Compile already-parsed notes
    pub fn generate_from_notes(&self, notes: &[NoteEvent], source_file: &str) -> Result<ExecutionSequence> {
        // Register tracking is per sequence
        let mut encoder = self.encoder.clone();
        let delay = f64::from(self.tonguing_delay_ms);

        let mut events: Vec<ExecutionEvent> = Vec::with_capacity(notes.len() * 2 + 1);
        let mut now_ms = 0.0_f64;
        let mut inherited_ms = 0.0_f64;

        for (i, note) in notes.iter().enumerate() {
            let base_ms = beats_to_ms(note.duration_beats, self.bpm);
            if !is_schedulable_ms(base_ms) {
                return Err(Error::validation(
                    note.index,
                    format!("{} beats at {} BPM is not a playable duration", note.duration_beats, self.bpm),
                ));
            }
            let next = notes.get(i + 1);

            if note.is_rest() {
                let release_ms = base_ms * REST_RELEASE_SHARE;
                events.push(event(now_ms, release_ms, REST_LABEL, encoder.release_all(), Some(SerialCommand::Off)));

                if let Some(next) = next.filter(|n| !n.is_rest()) {
                    let frames = encoder.encode_note(self.fingering.lookup(&next.note)?);
                    events.push(event(
                        now_ms + release_ms,
                        base_ms - release_ms,
                        &format!("{}{}", PRE_LABEL_PREFIX, next.note),
                        frames,
                        None,
                    ));
                }

                now_ms += base_ms;
                inherited_ms = 0.0;
                check_length(now_ms, note)?;
                continue;
            }

            let repeats_previous = i > 0 && note.repeats(&notes[i - 1]);
            let repeats_next = next.filter(|n| note.repeats(n));

            let mut compensation_ms = inherited_ms;
            inherited_ms = 0.0;
            if let Some(next) = repeats_next {
                let (left, right) = split_tonguing_gap(delay, note.duration_beats, next.duration_beats);
                compensation_ms += left;
                inherited_ms = right;
            }

            let play_ms = (base_ms - compensation_ms).max(0.0);
            let frames = if repeats_previous {
                Vec::new()
            } else {
                encoder.encode_note(self.fingering.lookup(&note.note)?)
            };

            debug!(
                "#{} {} at {:.1}ms for {:.1}ms (compensation {:.1}ms)",
                note.index, note.note, now_ms, play_ms, compensation_ms
            );
            events.push(event(now_ms, play_ms, &note.note, frames, Some(SerialCommand::On)));
            now_ms += play_ms;

            if repeats_next.is_some() {
                events.push(event(now_ms, delay, TONGUE_LABEL, Vec::new(), Some(SerialCommand::Off)));
                now_ms += delay;
            }
            check_length(now_ms, note)?;
        }

        events.push(event(now_ms, 0.0, END_LABEL, encoder.release_all(), Some(SerialCommand::Off)));

        let sequence = ExecutionSequence {
            meta: SequenceMeta {
                source_file: source_file.to_string(),
                instrument: encoder.instrument(),
                bpm: self.bpm,
                tonguing_delay_ms: self.tonguing_delay_ms,
                total_duration_ms: now_ms,
                total_events: events.len(),
                generated_at: crate::time::now(),
                version: SEQUENCE_FORMAT_VERSION.to_string(),
            },
            events,
        };

        info!(
            "Preprocessed {}: {} notes -> {} events, {:.2}s at {} BPM",
            source_file,
            notes.len(),
            sequence.events.len(),
            now_ms / 1000.0,
            self.bpm
        );
        Ok(sequence)
    }
}

fn check_length(now_ms: f64, note: &NoteEvent) -> Result<()> {
    if is_schedulable_ms(now_ms) {
        Ok(())
    } else {
        Err(Error::validation(
            note.index,
            format!("sequence exceeds {:.0}ms at {}", MAX_SEQUENCE_MS, note.note),
        ))
    }
}

fn event(
    timestamp_ms: f64,
    duration_ms: f64,
    label: &str,
    frames: Vec<SequenceFrame>,
    serial: Option<SerialCommand>,
) -> ExecutionEvent {
    ExecutionEvent {
        timestamp_ms,
        duration_ms,
        label: label.to_string(),
        frames,
        serial,
    }
}
