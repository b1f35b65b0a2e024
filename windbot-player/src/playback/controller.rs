//! Playback controller
//!
//! Single shared session object coordinating at most one replay at a time.
//!
//! ```text
//!          start()               request_stop()            finish()
//!   Idle ──────────▶ Playing ───────────────────▶ Stopping ─────────▶ Idle
//!                     │   ▲                          ▲
//!    request_pause()  ▼   │ request_resume()         │ request_stop()
//!                    Paused ─────────────────────────┘
//! ```
//!
//! All state lives behind one `RwLock`; the lock is held only for the field
//! updates, never across another await. Lifecycle signals reach the replay
//! loop through the session's cancellation token and pause channel.

use crate::error::{Error, Result};
use crate::playback::diagnostics::PlaybackReport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use windbot_common::fingering::InstrumentKind;
use windbot_common::status::{PlaybackOutcome, PlaybackStatus};

/// Controller lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Paused,
    Stopping,
}

impl PlaybackPhase {
    /// A session is bound in every phase except `Idle`
    pub fn is_active(self) -> bool {
        self != PlaybackPhase::Idle
    }
}

/// What a session replays
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub source_file: String,
    pub instrument: InstrumentKind,
    pub total_events: usize,
    pub theoretical_duration_sec: f64,
}

/// Signals handed to the replay loop of a started session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub cancel: CancellationToken,
    pub pause: watch::Receiver<bool>,
}

struct ActiveSession {
    id: u64,
    info: SessionInfo,
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    started: Instant,
}

struct ControllerState {
    phase: PlaybackPhase,
    status: PlaybackStatus,
    session: Option<ActiveSession>,
    next_id: u64,
}

pub struct PlaybackController {
    state: RwLock<ControllerState>,
    phase_tx: watch::Sender<PlaybackPhase>,
}

impl PlaybackController {
    pub fn new() -> Self {
        let (phase_tx, _) = watch::channel(PlaybackPhase::Idle);
        Self {
            state: RwLock::new(ControllerState {
                phase: PlaybackPhase::Idle,
                status: PlaybackStatus::default(),
                session: None,
                next_id: 1,
            }),
            phase_tx,
        }
    }

    fn set_phase(&self, state: &mut ControllerState, phase: PlaybackPhase) {
        debug!("Playback phase {:?} -> {:?}", state.phase, phase);
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Bind a new session; rejected while another session is active
    pub async fn start(&self, info: SessionInfo) -> Result<SessionHandle> {
        let mut state = self.state.write().await;
        if state.phase.is_active() {
            return Err(Error::InvalidState(format!(
                "Cannot start playback while {:?}",
                state.phase
            )));
        }

        let id = state.next_id;
        state.next_id += 1;
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);

        state.status = PlaybackStatus {
            is_playing: true,
            current_file: Some(info.source_file.clone()),
            total_notes: info.total_events,
            theoretical_duration: info.theoretical_duration_sec,
            ..PlaybackStatus::default()
        };
        info!(
            "Session {} started: {} ({}, {} events)",
            id, info.source_file, info.instrument, info.total_events
        );
        state.session = Some(ActiveSession {
            id,
            info,
            cancel: cancel.clone(),
            pause_tx,
            started: Instant::now(),
        });
        self.set_phase(&mut state, PlaybackPhase::Playing);

        Ok(SessionHandle {
            id,
            cancel,
            pause: pause_rx,
        })
    }

    /// Ask the active session to stop; `false` when nothing is playing
    pub async fn request_stop(&self) -> bool {
        let mut state = self.state.write().await;
        match state.phase {
            PlaybackPhase::Playing | PlaybackPhase::Paused => {
                if let Some(session) = &state.session {
                    session.cancel.cancel();
                    session.pause_tx.send_replace(false);
                }
                state.status.is_paused = false;
                self.set_phase(&mut state, PlaybackPhase::Stopping);
                info!("Stop requested");
                true
            }
            PlaybackPhase::Stopping => true,
            PlaybackPhase::Idle => false,
        }
    }

    pub async fn request_pause(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match state.phase {
            PlaybackPhase::Playing => {
                if let Some(session) = &state.session {
                    session.pause_tx.send_replace(true);
                }
                state.status.is_paused = true;
                self.set_phase(&mut state, PlaybackPhase::Paused);
                Ok(())
            }
            PlaybackPhase::Paused => Ok(()),
            other => Err(Error::InvalidState(format!("Cannot pause while {:?}", other))),
        }
    }

    pub async fn request_resume(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match state.phase {
            PlaybackPhase::Paused => {
                if let Some(session) = &state.session {
                    session.pause_tx.send_replace(false);
                }
                state.status.is_paused = false;
                self.set_phase(&mut state, PlaybackPhase::Playing);
                Ok(())
            }
            PlaybackPhase::Playing => Ok(()),
            other => Err(Error::InvalidState(format!("Cannot resume while {:?}", other))),
        }
    }

    /// Record that `current` of `total` events have been dispatched
    pub async fn update_progress(&self, current: usize, total: usize) {
        let mut state = self.state.write().await;
        let elapsed = state.session.as_ref().map(|s| s.started.elapsed().as_secs_f64());
        let status = &mut state.status;
        status.current_note_index = current;
        status.total_notes = total;
        status.progress_pct = PlaybackStatus::progress_for(current, total);
        if let Some(elapsed) = elapsed {
            status.elapsed_time = elapsed;
        }
    }

    /// Close the session and publish its outcome
    pub async fn finish(&self, outcome: PlaybackOutcome, report: Option<&PlaybackReport>) {
        let mut state = self.state.write().await;
        let Some(session) = state.session.take() else {
            warn!("finish() called with no active session");
            return;
        };

        let wall = session.started.elapsed().as_secs_f64();
        let status = &mut state.status;
        status.is_playing = false;
        status.is_paused = false;
        status.elapsed_time = wall;
        status.actual_duration = report.map(|r| r.actual_duration_sec).unwrap_or(wall);
        status.significant_rests = report.map(|r| r.significant_rests()).unwrap_or_default();
        status.last_outcome = Some(outcome.clone());

        match &outcome {
            PlaybackOutcome::Failed(message) => {
                tracing::error!("Session {} failed: {}", session.id, message)
            }
            other => info!("Session {} ended: {:?}", session.id, other),
        }
        self.set_phase(&mut state, PlaybackPhase::Idle);
    }

    /// Copy of the current status
    pub async fn snapshot(&self) -> PlaybackStatus {
        let state = self.state.read().await;
        let mut status = state.status.clone();
        if let Some(session) = &state.session {
            status.elapsed_time = session.started.elapsed().as_secs_f64();
        }
        status
    }

    pub async fn phase(&self) -> PlaybackPhase {
        self.state.read().await.phase
    }

    pub async fn bound_session(&self) -> Option<SessionInfo> {
        self.state.read().await.session.as_ref().map(|s| s.info.clone())
    }

    /// Wait for the controller to return to `Idle`; `false` on timeout
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let mut phases = self.phase_tx.subscribe();
        let idle = phases.wait_for(|phase| *phase == PlaybackPhase::Idle);
        let reached = matches!(tokio::time::timeout(timeout, idle).await, Ok(Ok(_)));
        reached
    }
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}
