//! Diagnostic metric types surfaced to the CLI and the debug HTTP server.

use serde::{Deserialize, Serialize};

use crate::error::TrainingError;
use crate::scoring::ScoreCard;

/// Capture and session milestones
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    CaptureRequested,
    CaptureOpened,
    CaptureDenied,
    CaptureReleased,
    SessionStarted,
    SessionStopped,
}

/// Failure classes counted by the hub
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    FrameRejected,
    /// Capture samples dropped because the queue was full
    CaptureOverrun,
    CaptureStream,
    DeviceUnavailable,
    PermissionDenied,
    UnknownTrack,
    RecordingUnsupported,
    RecordingMissing,
    RecordingEncode,
    Playback,
    LockPoisoned,
}

impl From<&TrainingError> for DiagnosticError {
    fn from(err: &TrainingError) -> Self {
        match err {
            TrainingError::DeviceUnavailable { .. } => DiagnosticError::DeviceUnavailable,
            TrainingError::PermissionDenied => DiagnosticError::PermissionDenied,
            TrainingError::CaptureFailure { .. } => DiagnosticError::CaptureStream,
            TrainingError::UnknownTrack { .. } => DiagnosticError::UnknownTrack,
            TrainingError::RecordingUnsupported => DiagnosticError::RecordingUnsupported,
            TrainingError::NoRecording => DiagnosticError::RecordingMissing,
            TrainingError::LockPoisoned { .. } => DiagnosticError::LockPoisoned,
            TrainingError::PlaybackFailure { .. } => DiagnosticError::Playback,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    /// Rolling summary over the last latency window
    TickLatency {
        avg_us: f32,
        max_us: f32,
        sample_count: usize,
    },
    /// Capture queue fill level, emitted only on a noticeable change
    QueueFill {
        channel: String,
        percent: f32,
    },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
    /// Final scores of a manually stopped session
    SessionSummary {
        genre: String,
        track_id: String,
        elapsed_secs: f64,
        scores: ScoreCard,
    },
}
