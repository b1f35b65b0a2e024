//! Execution engine: replays a preprocessed sequence against the clock
//!
//! **Timing:** every event has an absolute deadline, `session start +
//! timestamp`, shifted by the time spent paused. Waiting for a deadline races
//! the session's cancellation token, so a stop interrupts the wait itself.
//! Because deadlines are absolute, scheduling jitter on one event does not
//! carry into the next.
//!
//! **Dispatch:** an event's frames and air command are handed to the
//! [`DispatchGroup`] and the loop moves on without waiting for delivery. The
//! frames for one hand go out in order from a single task (a register release
//! step must reach the board before its pressed frame); different hands and
//! the air supply proceed concurrently. A failed dispatch is logged and
//! counted, never retried, and never stops the loop.
//!
//! **Entry points:** [`ExecutionEngine::run`] for batch callers and
//! [`ExecutionEngine::spawn`] for callers that keep serving status while the
//! replay runs. Both replay on an inner task and end with the same cleanup,
//! run exactly once per session even if the replay panics: settle
//! dispatches, air off, release both hands, publish the outcome.

use crate::error::{Error, Result};
use crate::playback::controller::{PlaybackController, SessionHandle, SessionInfo};
use crate::playback::diagnostics::{PlaybackReport, RestTracker};
use crate::playback::dispatch::DispatchGroup;
use crate::transport::Transports;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use windbot_common::config::RigConfig;
use windbot_common::fingering::{FrameEncoder, Hand, InstrumentKind};
use windbot_common::sequence::{ExecutionEvent, ExecutionSequence, SequenceFrame, END_LABEL};
use windbot_common::status::PlaybackOutcome;
use windbot_common::time::millis_to_duration;

/// Default wait for in-flight dispatches at shutdown
pub const DEFAULT_GRACE: Duration = Duration::from_millis(100);

/// Session tunables
#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Upper bound on the shutdown join of outstanding dispatches
    pub grace: Duration,
    /// Release both hands and hold this long before the first event
    pub ready_hold: Option<Duration>,
    /// Frames used for the ready gesture and cleanup; when empty the
    /// sequence's terminal release event supplies them
    pub release_frames: Vec<SequenceFrame>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GRACE,
            ready_hold: None,
            release_frames: Vec::new(),
        }
    }
}

impl PlaybackOptions {
    /// Options from the rig configuration for a sequence of `instrument`
    pub fn from_config(config: &RigConfig, instrument: InstrumentKind) -> Self {
        let release_frames = config
            .instrument(instrument)
            .and_then(|profile| FrameEncoder::new(instrument, profile.clone(), &config.hands))
            .map(|mut encoder| encoder.release_all())
            .unwrap_or_else(|e| {
                debug!("No release profile from config ({}), using the sequence's", e);
                Vec::new()
            });

        Self {
            grace: Duration::from_millis(config.playback.grace_ms),
            ready_hold: config
                .ready
                .enabled
                .then(|| Duration::from_millis(config.ready.hold_ms)),
            release_frames,
        }
    }
}

/// Per-replay bookkeeping
struct Replay {
    started: Instant,
    paused: Duration,
    dispatched: usize,
    air_on: bool,
    rests: RestTracker,
}

impl Replay {
    fn new(bpm: f64) -> Self {
        Self {
            started: Instant::now(),
            paused: Duration::ZERO,
            dispatched: 0,
            air_on: false,
            rests: RestTracker::new(bpm),
        }
    }

    fn deadline(&self, event: &ExecutionEvent) -> Result<Instant> {
        let offset = self.paused.saturating_add(millis_to_duration(event.timestamp_ms));
        self.started.checked_add(offset).ok_or_else(|| {
            Error::Playback(format!(
                "{} at {:.1}ms is beyond the schedulable range",
                event.label, event.timestamp_ms
            ))
        })
    }

    /// Seconds since start, not counting pauses
    fn active_offset_sec(&self) -> f64 {
        self.started.elapsed().saturating_sub(self.paused).as_secs_f64()
    }
}

pub struct ExecutionEngine {
    sequence: ExecutionSequence,
    transports: Transports,
    options: PlaybackOptions,
    controller: Arc<PlaybackController>,
    dispatch: DispatchGroup,
    release_frames: Vec<SequenceFrame>,
    last_report: Mutex<Option<PlaybackReport>>,
    cleanup_pending: AtomicBool,
}

impl ExecutionEngine {
    pub fn new(
        sequence: ExecutionSequence,
        transports: Transports,
        options: PlaybackOptions,
        controller: Arc<PlaybackController>,
    ) -> Result<Self> {
        sequence.validate()?;

        let release_frames = if options.release_frames.is_empty() {
            sequence
                .events
                .iter()
                .rev()
                .find(|e| e.label == END_LABEL)
                .map(|e| e.frames.clone())
                .unwrap_or_default()
        } else {
            options.release_frames.clone()
        };
        if release_frames.is_empty() {
            warn!("No release frames available; cleanup will only turn the air off");
        }

        Ok(Self {
            sequence,
            transports,
            options,
            controller,
            dispatch: DispatchGroup::new(),
            release_frames,
            last_report: Mutex::new(None),
            cleanup_pending: AtomicBool::new(false),
        })
    }

    pub fn sequence(&self) -> &ExecutionSequence {
        &self.sequence
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    /// Report of the most recent replay, complete or cancelled
    pub fn last_report(&self) -> Option<PlaybackReport> {
        self.last_report.lock().ok().and_then(|slot| slot.clone())
    }

    fn session_info(&self) -> SessionInfo {
        SessionInfo {
            source_file: self.sequence.meta.source_file.clone(),
            instrument: self.sequence.meta.instrument,
            total_events: self.sequence.events.len(),
            theoretical_duration_sec: self.sequence.meta.total_duration_ms / 1000.0,
        }
    }

    async fn begin(&self) -> Result<SessionHandle> {
        let session = self.controller.start(self.session_info()).await?;
        self.cleanup_pending.store(true, Ordering::Release);
        self.dispatch.reset_failures();
        if let Ok(mut slot) = self.last_report.lock() {
            *slot = None;
        }
        Ok(session)
    }

    /// Batch entry: claim the session, replay, clean up
    pub async fn run(self: &Arc<Self>) -> Result<PlaybackReport> {
        let session = self.begin().await?;
        self.replay_then_cleanup(session).await
    }

    /// Background entry: the session is claimed (status "playing") before
    /// this returns; the handle resolves once cleanup has run
    pub async fn spawn(self: Arc<Self>) -> Result<JoinHandle<Result<PlaybackReport>>> {
        let session = self.begin().await?;
        Ok(tokio::spawn(async move { self.replay_then_cleanup(session).await }))
    }

    // The replay runs in its own task so a panic inside the loop still
    // reaches the cleanup.
    async fn replay_then_cleanup(self: &Arc<Self>, session: SessionHandle) -> Result<PlaybackReport> {
        let engine = self.clone();
        let replay = tokio::spawn(async move { engine.ready_then_play(&session).await });

        let result = match replay.await {
            Ok(result) => result,
            Err(e) => {
                error!("Replay task aborted: {}", e);
                Err(Error::Playback(format!("replay task aborted: {}", e)))
            }
        };
        self.cleanup(&result).await;
        result
    }

    async fn ready_then_play(&self, session: &SessionHandle) -> Result<PlaybackReport> {
        self.ready_gesture(&session.cancel).await?;
        self.play(&session.cancel, session.pause.clone()).await
    }

    /// Timing loop
    ///
    /// Returns [`Error::Cancelled`] when the token fires; the partial report
    /// is still available from [`last_report`](Self::last_report).
    pub async fn play(
        &self,
        cancel: &CancellationToken,
        mut pause: watch::Receiver<bool>,
    ) -> Result<PlaybackReport> {
        let meta = &self.sequence.meta;
        info!(
            "Playing {} ({}, {} BPM): {} events, {:.2}s",
            meta.source_file,
            meta.instrument,
            meta.bpm,
            self.sequence.events.len(),
            meta.total_duration_ms / 1000.0
        );

        let mut replay = Replay::new(meta.bpm);
        let result = self.replay(cancel, &mut pause, &mut replay).await;

        if result.as_ref().is_err_and(Error::is_cancelled) {
            info!("Playback stopped after {} events", replay.dispatched);
        }

        let report = PlaybackReport {
            theoretical_duration_sec: meta.total_duration_ms / 1000.0,
            actual_duration_sec: replay.started.elapsed().as_secs_f64(),
            events_dispatched: replay.dispatched,
            total_events: self.sequence.events.len(),
            dispatch_failures: self.dispatch.failures(),
            rests: replay.rests.into_rests(),
        };
        report.log_summary();
        if let Ok(mut slot) = self.last_report.lock() {
            *slot = Some(report.clone());
        }

        result.map(|()| report)
    }

    async fn replay(
        &self,
        cancel: &CancellationToken,
        pause: &mut watch::Receiver<bool>,
        replay: &mut Replay,
    ) -> Result<()> {
        let total = self.sequence.events.len();

        for (i, event) in self.sequence.events.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.wait_for_deadline(event, cancel, pause, replay).await?;

            self.dispatch_event(event);
            if let Some(command) = event.serial {
                replay.air_on = command.is_on();
            }
            replay.dispatched += 1;
            replay.rests.observe(event, replay.active_offset_sec());

            self.controller.update_progress(i + 1, total).await;
        }
        Ok(())
    }

    async fn wait_for_deadline(
        &self,
        event: &ExecutionEvent,
        cancel: &CancellationToken,
        pause: &mut watch::Receiver<bool>,
        replay: &mut Replay,
    ) -> Result<()> {
        let mut pause_open = true;
        loop {
            if *pause.borrow_and_update() {
                self.hold_while_paused(cancel, pause, replay).await?;
            }

            let deadline = replay.deadline(event)?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                changed = pause.changed(), if pause_open => {
                    if changed.is_err() {
                        pause_open = false;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
            }
        }
    }

    /// Block at an event boundary until resumed; the air is off meanwhile
    async fn hold_while_paused(
        &self,
        cancel: &CancellationToken,
        pause: &mut watch::Receiver<bool>,
        replay: &mut Replay,
    ) -> Result<()> {
        let since = Instant::now();
        info!("Paused after {} events", replay.dispatched);
        self.spawn_air(false);

        loop {
            if !*pause.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    replay.paused += since.elapsed();
                    return Err(Error::Cancelled);
                }
                changed = pause.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let held = since.elapsed();
        replay.paused += held;
        info!("Resumed after {:.2}s", held.as_secs_f64());
        if replay.air_on {
            self.spawn_air(true);
        }
        Ok(())
    }

    fn dispatch_event(&self, event: &ExecutionEvent) {
        debug!(
            "Dispatch {} at {:.1}ms: {} frames, serial {:?}",
            event.label,
            event.timestamp_ms,
            event.frames.len(),
            event.serial
        );

        if let Some(command) = event.serial {
            self.spawn_air(command.is_on());
        }

        for hand in Hand::BOTH {
            let mut batch = Vec::new();
            for frame in event.frames.iter().filter(|f| f.hand == hand) {
                match self.transports.address(frame) {
                    Ok(address) => batch.push((address, *frame.data.as_bytes())),
                    Err(e) => warn!("Skipping {} frame of {}: {}", hand, event.label, e),
                }
            }
            if batch.is_empty() {
                continue;
            }

            let sink = self.transports.frames.clone();
            self.dispatch
                .spawn(format!("{} {} frames", event.label, hand), async move {
                    let mut result = Ok(());
                    for (address, data) in &batch {
                        if let Err(e) = sink.send_frame(address, data).await {
                            result = Err(e);
                        }
                    }
                    result
                });
        }
    }

    fn spawn_air(&self, on: bool) {
        let air = self.transports.air.clone();
        let what = if on { "air on" } else { "air off" };
        self.dispatch
            .spawn(what.to_string(), async move { air.set(on).await });
    }

    async fn ready_gesture(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(hold) = self.options.ready_hold else {
            return Ok(());
        };

        info!("Ready gesture: releasing hands, holding {:?}", hold);
        if let Err(e) = self.transports.air.set(false).await {
            warn!("Air supply off failed during ready gesture: {}", e);
        }
        self.release_hands().await;

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(hold) => Ok(()),
        }
    }

    async fn release_hands(&self) {
        for frame in &self.release_frames {
            let result = match self.transports.address(frame) {
                Ok(address) => {
                    self.transports
                        .frames
                        .send_frame(&address, frame.data.as_bytes())
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Release frame for {} hand failed: {}", frame.hand, e);
            }
        }
    }

    /// Bounded join of outstanding dispatches
    pub async fn settle(&self, grace: Duration) -> Result<()> {
        self.dispatch.settle(grace).await
    }

    async fn cleanup(&self, result: &Result<PlaybackReport>) {
        if !self.cleanup_pending.swap(false, Ordering::AcqRel) {
            debug!("Cleanup already ran for this session");
            return;
        }

        if let Err(e) = self.settle(self.options.grace).await {
            debug!("Finalizing with dispatches outstanding: {}", e);
        }
        if let Err(e) = self.transports.air.set(false).await {
            warn!("Failed to turn air supply off: {}", e);
        }
        self.release_hands().await;

        let outcome = match result {
            Ok(_) => PlaybackOutcome::Completed,
            Err(Error::Cancelled) => PlaybackOutcome::Stopped,
            Err(e) => PlaybackOutcome::Failed(e.to_string()),
        };
        let report = self.last_report();
        self.controller.finish(outcome, report.as_ref()).await;
    }
}
