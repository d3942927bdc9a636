//! SessionController: training session orchestration layer.
//!
//! Owns one `TrainingSession` and drives it through
//! `Idle → Acquiring → Running → Stopping → Idle`. The host calls `tick()`
//! once per display refresh; everything else is a command (`start`, `stop`,
//! `select_genre`, `select_track`, `play_comparison`). State leaves the
//! controller only as snapshots, visualization frames and events published
//! on broadcast channels.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::analysis::{FrameAnalyzer, FrameReadings};
use crate::audio::{CpalPlayback, PlaybackDevice, RecordedClip};
use crate::config::AppConfig;
use crate::engine::backend::{
    CaptureBackend, CaptureEvent, CpalBackend, SystemTimeSource, TimeSource,
};
use crate::error::{log_training_error, ErrorCode, TrainingError};
use crate::library::{ReferenceTrack, TrackLibrary};
use crate::managers::{BroadcastChannelManager, CaptureManager};
use crate::scoring::{ScoreCard, ScoringEngine};
use crate::session::{format_elapsed, LiveReadouts, TrainingSession};
use crate::telemetry::{self, DiagnosticError, LifecyclePhase};
use crate::visualization::{VisualizationFeed, VisualizationFrame};

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// Lifecycle phase of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Acquiring,
    Running,
    Stopping,
}

/// Lifecycle event emitted by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp_ms: u64,
    pub kind: SessionEventKind,
}

/// Types of lifecycle events supported by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEventKind {
    Started,
    Stopped { manual: bool },
    GenreChanged { genre: String },
    TrackChanged { genre: String, track_id: String },
    CaptureFailed { code: i32, message: String },
    TickSkipped { reason: String },
    RecordingReady { bytes: usize, duration_secs: f32 },
}

/// Read-only view of the session for renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSnapshot {
    pub phase: SessionPhase,
    pub is_training: bool,
    pub genre: String,
    pub track_id: String,
    pub track_title: String,
    pub elapsed_secs: f64,
    /// `MM:SS`
    pub elapsed_text: String,
    pub scores: ScoreCard,
    pub readouts: LiveReadouts,
    pub active_lyric: Option<usize>,
    pub lyric_text: Option<String>,
    pub has_recording: bool,
}

/// Result of one `tick()` call
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No session running; nothing was analysed
    Idle,
    Analysed {
        snapshot: TrainingSnapshot,
        readings: FrameReadings,
    },
    /// Frame rejected; the session keeps running
    Skipped { reason: String },
    /// Capture broke; the session was stopped and the controller is idle
    Failed(TrainingError),
}

/// SessionController orchestrates capture, analysis, scoring and playback.
pub struct SessionController {
    config: AppConfig,
    library: Arc<TrackLibrary>,
    session: TrainingSession,
    analyzer: FrameAnalyzer,
    scoring: ScoringEngine,
    feed: VisualizationFeed,
    capture: CaptureManager,
    playback: Box<dyn PlaybackDevice>,
    pub(crate) broadcasts: BroadcastChannelManager,
    time_source: Arc<dyn TimeSource>,
    start_instant: Instant,
    phase: SessionPhase,
    tick_scheduled: bool,
    recording: Option<RecordedClip>,
}

impl SessionController {
    /// Create a controller on the configured default genre's first track.
    pub fn new(
        config: AppConfig,
        library: Arc<TrackLibrary>,
        backend: Arc<dyn CaptureBackend>,
        playback: Box<dyn PlaybackDevice>,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self, TrainingError> {
        let (genre_id, track) = {
            let genre = library
                .genre_or_first(&config.session.default_genre)
                .ok_or_else(|| TrainingError::UnknownTrack {
                    genre: config.session.default_genre.clone(),
                    track: None,
                })?;
            let track = genre
                .first_track()
                .cloned()
                .ok_or_else(|| TrainingError::UnknownTrack {
                    genre: genre.id.clone(),
                    track: None,
                })?;
            (genre.id.clone(), track)
        };

        let start_instant = time_source.now();
        let mut controller = Self {
            session: TrainingSession::new(genre_id, Arc::clone(&track), &config),
            analyzer: FrameAnalyzer::new(&config),
            scoring: ScoringEngine::new(config.scoring.clone()),
            feed: VisualizationFeed::new(&config.session),
            capture: CaptureManager::new(backend),
            playback,
            broadcasts: BroadcastChannelManager::new(),
            time_source,
            start_instant,
            phase: SessionPhase::Idle,
            tick_scheduled: false,
            recording: None,
            library,
            config,
        };
        controller.load_reference(&track);

        tracing::info!(
            "[SessionController] Ready: backend={} genre={} track={}",
            controller.capture.backend_name(),
            controller.session.genre(),
            track.id
        );
        Ok(controller)
    }

    /// Controller wired to the default microphone and speakers.
    pub fn desktop(config: AppConfig, library: Arc<TrackLibrary>) -> Result<Self, TrainingError> {
        Self::new(
            config,
            library,
            Arc::new(CpalBackend::new()),
            Box::new(CpalPlayback::new()),
            Arc::new(SystemTimeSource::default()),
        )
    }

    fn publish_event(
        broadcasts: &BroadcastChannelManager,
        time_source: &Arc<dyn TimeSource>,
        start_instant: Instant,
        kind: SessionEventKind,
    ) {
        let timestamp_ms = time_source
            .now()
            .saturating_duration_since(start_instant)
            .as_millis() as u64;
        broadcasts.publish_event(SessionEvent { timestamp_ms, kind });
    }

    fn emit_event(&self, kind: SessionEventKind) {
        Self::publish_event(
            &self.broadcasts,
            &self.time_source,
            self.start_instant,
            kind,
        );
    }

    // ========================================================================
    // SESSION LIFECYCLE
    // ========================================================================

    /// Acquire the microphone and begin a session.
    ///
    /// Starting while a session runs stops it first (non-manual, so no final
    /// scores) and then starts a fresh one.
    ///
    /// # Errors
    /// - `RecordingUnsupported` when the backend cannot record
    /// - `DeviceUnavailable` / `PermissionDenied` / `CaptureFailure` from acquisition
    ///
    /// On error the controller is idle and holds no capture.
    pub fn start(&mut self) -> Result<(), TrainingError> {
        if self.phase == SessionPhase::Running {
            tracing::info!("[SessionController] Start while running; restarting session");
            self.stop_session(false);
        }

        if !self.capture.supports_recording() {
            let err = TrainingError::RecordingUnsupported;
            self.report_failure(&err, "SessionController::start");
            return Err(err);
        }

        self.phase = SessionPhase::Acquiring;
        if let Err(err) = self.capture.acquire(&self.config.audio) {
            self.phase = SessionPhase::Idle;
            self.report_failure(&err, "SessionController::start");
            return Err(err);
        }

        self.recording = None;
        self.session.begin(self.time_source.now());
        if self.session.track().audio.is_some() {
            if let Err(err) = self.playback.play_reference_from_start() {
                log_training_error(&err, "SessionController::start");
            }
        }

        self.phase = SessionPhase::Running;
        self.tick_scheduled = true;
        telemetry::hub().record_lifecycle(LifecyclePhase::SessionStarted);
        self.emit_event(SessionEventKind::Started);
        self.publish_state();

        tracing::info!(
            "[SessionController] Session started: genre={} track={}",
            self.session.genre(),
            self.session.track().id
        );
        Ok(())
    }

    /// Run one analysis iteration.
    ///
    /// Does nothing unless a session is running. A rejected frame skips the
    /// tick; a capture failure stops the session.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != SessionPhase::Running || !self.tick_scheduled {
            return TickOutcome::Idle;
        }
        let tick_started = Instant::now();

        if let Some(event) = self.capture.poll_event() {
            let err = match event {
                CaptureEvent::Failure { reason } => TrainingError::CaptureFailure { reason },
                CaptureEvent::Ended => TrainingError::CaptureFailure {
                    reason: "capture stream ended".to_string(),
                },
            };
            self.fail_session(&err);
            return TickOutcome::Failed(err);
        }

        let frame = match self.capture.frame() {
            Ok(frame) => frame,
            Err(err) => {
                self.fail_session(&err);
                return TickOutcome::Failed(err);
            }
        };

        let elapsed = self.session.elapsed_at(self.time_source.now());
        let readings = match self
            .analyzer
            .analyse(&frame, elapsed, self.session.beat_times_mut())
        {
            Ok(readings) => readings,
            Err(err) => {
                let reason = err.to_string();
                tracing::debug!("[SessionController] Tick skipped: {}", reason);
                telemetry::hub().record_error(DiagnosticError::FrameRejected, reason.clone());
                self.emit_event(SessionEventKind::TickSkipped {
                    reason: reason.clone(),
                });
                return TickOutcome::Skipped { reason };
            }
        };

        let record = self.session.record_tick(elapsed, &readings);
        if record.lyric_changed {
            tracing::debug!(
                "[SessionController] Lyric line now {:?} at {:.2}s",
                record.lyric_index,
                elapsed
            );
        }

        let scores = self.scoring.live(self.session.metrics());
        self.session.set_scores(scores);
        let snapshot = self.publish_state();

        telemetry::hub().record_tick_latency(tick_started.elapsed().as_secs_f32() * 1_000_000.0);
        TickOutcome::Analysed { snapshot, readings }
    }

    /// Stop the session at the user's request.
    ///
    /// Idempotent: returns `None` when nothing is running. Otherwise returns
    /// the final scores, with untested metrics resolved to the neutral score.
    pub fn stop(&mut self) -> Option<ScoreCard> {
        self.stop_session(true)
    }

    fn stop_session(&mut self, manual: bool) -> Option<ScoreCard> {
        if self.phase != SessionPhase::Running {
            tracing::debug!("[SessionController] Stop ignored; no session running");
            return None;
        }

        self.phase = SessionPhase::Stopping;
        self.tick_scheduled = false;
        self.session.end(self.time_source.now());

        match self.capture.release() {
            Ok(Some(clip)) => {
                self.emit_event(SessionEventKind::RecordingReady {
                    bytes: clip.bytes.len(),
                    duration_secs: clip.duration_secs,
                });
                self.recording = Some(clip);
            }
            Ok(None) => {}
            Err(err) => {
                log_training_error(&err, "SessionController::stop");
                telemetry::hub().record_error(DiagnosticError::RecordingEncode, err.to_string());
            }
        }
        self.playback.pause_reference();

        let final_scores = if manual {
            let scores = self.scoring.finalize(self.session.metrics());
            self.session.set_scores(scores);
            telemetry::hub().record_session_summary(
                self.session.genre(),
                &self.session.track().id,
                self.session.elapsed_secs(),
                scores,
            );
            Some(scores)
        } else {
            None
        };

        self.phase = SessionPhase::Idle;
        telemetry::hub().record_lifecycle(LifecyclePhase::SessionStopped);
        self.emit_event(SessionEventKind::Stopped { manual });
        self.publish_state();

        tracing::info!(
            "[SessionController] Session stopped after {}: manual={} scores=[{}]",
            format_elapsed(self.session.elapsed_secs()),
            manual,
            self.session.scores()
        );
        final_scores
    }

    fn fail_session(&mut self, err: &TrainingError) {
        self.stop_session(false);
        self.report_failure(err, "SessionController::tick");
    }

    fn report_failure(&self, err: &TrainingError, context: &str) {
        log_training_error(err, context);
        telemetry::hub().record_error(DiagnosticError::from(err), err.to_string());
        self.emit_event(SessionEventKind::CaptureFailed {
            code: err.code(),
            message: err.message(),
        });
        self.publish_state();
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    /// Switch genre.
    ///
    /// With `keep_track` the current track survives when the new genre also
    /// contains it; otherwise the genre's first track is applied.
    pub fn select_genre(&mut self, genre: &str, keep_track: bool) -> Result<(), TrainingError> {
        let library = Arc::clone(&self.library);
        let entry = library
            .genre(genre)
            .ok_or_else(|| TrainingError::UnknownTrack {
                genre: genre.to_string(),
                track: None,
            })?;

        let keeps_current = keep_track && entry.track(&self.session.track().id).is_some();
        if keeps_current {
            self.session.set_genre(entry.id.clone());
            self.emit_event(SessionEventKind::GenreChanged {
                genre: entry.id.clone(),
            });
            self.publish_state();
            return Ok(());
        }

        let first = entry
            .first_track()
            .cloned()
            .ok_or_else(|| TrainingError::UnknownTrack {
                genre: entry.id.clone(),
                track: None,
            })?;
        self.emit_event(SessionEventKind::GenreChanged {
            genre: entry.id.clone(),
        });
        self.apply_track(entry.id.clone(), first);
        Ok(())
    }

    /// Switch to a track of the current genre.
    ///
    /// A running session is stopped (non-manual) and every buffer restarts
    /// for the new track.
    pub fn select_track(&mut self, track_id: &str) -> Result<(), TrainingError> {
        let track = self.library.get_track(self.session.genre(), track_id)?;
        let genre = self.session.genre().to_string();
        self.apply_track(genre, track);
        Ok(())
    }

    fn apply_track(&mut self, genre: String, track: Arc<ReferenceTrack>) {
        if self.phase == SessionPhase::Running {
            self.stop_session(false);
        }

        self.session.set_track(genre.clone(), Arc::clone(&track));
        self.playback.pause_reference();
        self.load_reference(&track);

        self.emit_event(SessionEventKind::TrackChanged {
            genre,
            track_id: track.id.clone(),
        });
        self.publish_state();
    }

    fn load_reference(&mut self, track: &ReferenceTrack) {
        if let Err(err) = self.playback.load_reference(track.audio.as_deref()) {
            log_training_error(&err, "SessionController::load_reference");
        }
    }

    // ========================================================================
    // PLAYBACK
    // ========================================================================

    /// Play the reference track, then the last recording.
    pub fn play_comparison(&mut self) -> Result<(), TrainingError> {
        let clip = self.recording.as_ref().ok_or(TrainingError::NoRecording)?;
        let reference = self.session.track().audio.clone();
        self.playback.play_comparison(reference.as_deref(), clip)
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn snapshot(&self) -> TrainingSnapshot {
        let track = self.session.track();
        let elapsed_secs = self.session.elapsed_secs();
        let active_lyric = self.session.last_lyric_index();

        TrainingSnapshot {
            phase: self.phase,
            is_training: self.session.is_training(),
            genre: self.session.genre().to_string(),
            track_id: track.id.clone(),
            track_title: track.title.clone(),
            elapsed_secs,
            elapsed_text: format_elapsed(elapsed_secs),
            scores: self.session.scores(),
            readouts: self.session.readouts(),
            active_lyric,
            lyric_text: active_lyric
                .and_then(|index| track.lyrics.get(index))
                .map(|line| line.text.clone()),
            has_recording: self.recording.is_some(),
        }
    }

    pub fn visualization(&self) -> VisualizationFrame {
        self.feed.frame(&self.session)
    }

    fn publish_state(&self) -> TrainingSnapshot {
        let snapshot = self.snapshot();
        self.broadcasts.publish_snapshot(snapshot.clone());
        self.broadcasts.publish_visualization(self.visualization());
        snapshot
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_training(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn session(&self) -> &TrainingSession {
        &self.session
    }

    pub fn library(&self) -> &Arc<TrackLibrary> {
        &self.library
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn recording(&self) -> Option<&RecordedClip> {
        self.recording.as_ref()
    }

    /// Milliseconds since the controller was created, on its time source
    pub fn uptime_ms(&self) -> u64 {
        self.time_source
            .now()
            .saturating_duration_since(self.start_instant)
            .as_millis() as u64
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop_session(false);
    }
}

// ========================================================================
// TEST HELPERS
// ========================================================================

#[cfg(test)]
mod tests;
