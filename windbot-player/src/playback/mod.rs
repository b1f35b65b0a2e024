//! Sequence replay, dispatch and session control

pub mod controller;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;

pub use controller::{PlaybackController, PlaybackPhase, SessionHandle, SessionInfo};
pub use diagnostics::{PlaybackReport, RestTracker};
pub use dispatch::DispatchGroup;
pub use engine::{ExecutionEngine, PlaybackOptions};
