//! Test helpers for windbot-player integration tests
//!
//! Recording transports stand in for the bus bridge and the air supply so
//! tests can check what reached the rig, in which order and when.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use windbot_common::config::HandsConfig;
use windbot_common::fingering::{ControlFrame, Hand, InstrumentKind, OP_CODE};
use windbot_common::sequence::{
    ExecutionEvent, ExecutionSequence, SequenceFrame, SequenceMeta, SerialCommand, END_LABEL,
    REST_LABEL, SEQUENCE_FORMAT_VERSION,
};
use windbot_player::transport::{AirSupply, BusAddress, FrameSink, Transports};
use windbot_player::Error;

/// Channel value of every finger in a release frame
pub const RELEASED: u8 = 255;

/// A frame as it reached the sink
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub at: Instant,
    pub address: BusAddress,
    pub data: Vec<u8>,
}

/// Frame sink that records every frame; can be told to fail
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentFrame>>,
    failing: AtomicBool,
    latency: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sink whose every send takes `latency`
    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Self::default()
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().unwrap().clone()
    }

    /// First data byte after the op code, per sent frame, for one interface
    pub fn first_channels(&self, interface: &str) -> Vec<u8> {
        self.sent()
            .iter()
            .filter(|f| f.address.interface == interface)
            .map(|f| f.data[1])
            .collect()
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_frame(&self, address: &BusAddress, data: &[u8]) -> windbot_player::Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!("{} unreachable", address)));
        }
        self.sent.lock().unwrap().push(SentFrame {
            at: Instant::now(),
            address: address.clone(),
            data: data.to_vec(),
        });
        Ok(())
    }
}

/// Air supply that records every state change; can be told to panic once
#[derive(Default)]
pub struct RecordingAir {
    states: Mutex<Vec<(Instant, bool)>>,
    panic_next: AtomicBool,
}

impl RecordingAir {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Air supply whose first `set` panics; later calls record normally
    pub fn panicking_once() -> Arc<Self> {
        Arc::new(Self {
            panic_next: AtomicBool::new(true),
            ..Self::default()
        })
    }

    pub fn states(&self) -> Vec<bool> {
        self.states.lock().unwrap().iter().map(|(_, on)| *on).collect()
    }

    pub fn last(&self) -> Option<bool> {
        self.states().last().copied()
    }
}

#[async_trait]
impl AirSupply for RecordingAir {
    async fn set(&self, on: bool) -> windbot_player::Result<()> {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("air valve driver crashed");
        }
        self.states.lock().unwrap().push((Instant::now(), on));
        Ok(())
    }
}

pub fn transports(sink: &Arc<RecordingSink>, air: &Arc<RecordingAir>) -> Transports {
    Transports::new(sink.clone(), air.clone(), &HandsConfig::default())
}

/// Frame whose first finger channel carries `marker`; the rest are released
pub fn frame(hand: Hand, marker: u8) -> SequenceFrame {
    let mut bytes = [RELEASED; 7];
    bytes[0] = OP_CODE;
    bytes[1] = marker;
    SequenceFrame {
        hand,
        id: "0x28".to_string(),
        data: ControlFrame::from_bytes(bytes),
    }
}

pub fn release_frames() -> Vec<SequenceFrame> {
    vec![frame(Hand::Left, RELEASED), frame(Hand::Right, RELEASED)]
}

/// Builds small sequences by hand, timestamps in ms
pub struct SequenceBuilder {
    bpm: f64,
    events: Vec<ExecutionEvent>,
}

impl SequenceBuilder {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm,
            events: Vec::new(),
        }
    }

    pub fn event(
        mut self,
        t: f64,
        d: f64,
        label: &str,
        frames: Vec<SequenceFrame>,
        serial: Option<SerialCommand>,
    ) -> Self {
        self.events.push(ExecutionEvent {
            timestamp_ms: t,
            duration_ms: d,
            label: label.to_string(),
            frames,
            serial,
        });
        self
    }

    /// Note pressing both hands with `marker`, air on
    pub fn note(self, t: f64, d: f64, label: &str, marker: u8) -> Self {
        self.event(
            t,
            d,
            label,
            vec![frame(Hand::Left, marker), frame(Hand::Right, marker)],
            Some(SerialCommand::On),
        )
    }

    pub fn rest(self, t: f64, d: f64) -> Self {
        self.event(t, d, REST_LABEL, release_frames(), Some(SerialCommand::Off))
    }

    pub fn end(self, t: f64) -> Self {
        self.event(t, 0.0, END_LABEL, release_frames(), Some(SerialCommand::Off))
    }

    pub fn build(self) -> ExecutionSequence {
        let total_duration_ms = self
            .events
            .last()
            .map(|e| e.timestamp_ms + e.duration_ms)
            .unwrap_or(0.0);
        ExecutionSequence {
            meta: SequenceMeta {
                source_file: "test.json".to_string(),
                instrument: InstrumentKind::Secondary,
                bpm: self.bpm,
                tonguing_delay_ms: 30,
                total_duration_ms,
                total_events: self.events.len(),
                generated_at: Utc::now(),
                version: SEQUENCE_FORMAT_VERSION.to_string(),
            },
            events: self.events,
        }
    }
}

/// Three notes over 150ms, then END
pub fn short_sequence() -> ExecutionSequence {
    SequenceBuilder::new(120.0)
        .note(0.0, 50.0, "C4", 10)
        .note(50.0, 50.0, "D4", 20)
        .note(100.0, 50.0, "E4", 30)
        .end(150.0)
        .build()
}
