//! # windbot Player Library (windbot-player)
//!
//! Replays preprocessed execution sequences on the rig.
//!
//! **Purpose:** Drive the hand actuator boards and the air supply from an
//! execution sequence with strict timing, while a shared controller exposes
//! status and lifecycle control.
//!
//! **Architecture:** tokio timing loop with fire-and-forget dispatch tasks;
//! transports behind async traits (HTTP bus bridge, serial air supply).

pub mod error;
pub mod playback;
pub mod transport;

pub use error::{Error, Result};
pub use playback::{ExecutionEngine, PlaybackController, PlaybackOptions};
