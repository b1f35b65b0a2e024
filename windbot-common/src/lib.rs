//! # windbot Common Library
//!
//! Shared code for the windbot rig tools including:
//! - Rig configuration loading
//! - Fingering maps and the control frame encoder
//! - Timeline parsing and the sequence preprocessor
//! - The execution sequence file format
//! - Playback status types

pub mod config;
pub mod error;
pub mod fingering;
pub mod preprocess;
pub mod sequence;
pub mod status;
pub mod time;
pub mod timeline;
pub mod timing;

pub use error::{Error, Result};
pub use fingering::{FingeringMap, Hand, InstrumentKind};
pub use sequence::ExecutionSequence;
