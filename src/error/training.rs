// Training session error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Training error code constants
///
/// Single source of truth for the numeric codes attached to
/// [`TrainingError`] variants.
///
/// Error code range: 3001-3008
pub struct TrainingErrorCodes {}

impl TrainingErrorCodes {
    /// No microphone or no capture API available
    pub const DEVICE_UNAVAILABLE: i32 = 3001;

    /// Microphone permission denied
    pub const PERMISSION_DENIED: i32 = 3002;

    /// Capture stream failed mid-session
    pub const CAPTURE_FAILURE: i32 = 3003;

    /// Genre or track id not present in the library
    pub const UNKNOWN_TRACK: i32 = 3004;

    /// No encoder available for the session recording
    pub const RECORDING_UNSUPPORTED: i32 = 3005;

    /// Comparison playback requested before any recording exists
    pub const NO_RECORDING: i32 = 3006;

    /// Mutex guarding capture state was poisoned
    pub const LOCK_POISONED: i32 = 3007;

    /// Output device could not play the clip
    pub const PLAYBACK_FAILURE: i32 = 3008;
}

/// Log a training error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_training_error(err: &TrainingError, context: &str) {
    error!(
        "Training error in {}: code={}, component=SessionController, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Training session errors
///
/// All variants are recoverable: the controller returns to idle and the
/// caller may retry.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// No input device, or the platform exposes no capture facility
    DeviceUnavailable { reason: String },

    /// Microphone permission denied
    PermissionDenied,

    /// Capture stream reported an I/O error while running
    CaptureFailure { reason: String },

    /// Store miss for a genre or a track inside a genre
    UnknownTrack {
        genre: String,
        track: Option<String>,
    },

    /// The capture backend cannot record a playable clip
    RecordingUnsupported,

    /// No finished recording is available yet
    NoRecording,

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Clip or reference playback failed
    PlaybackFailure { reason: String },
}

impl ErrorCode for TrainingError {
    fn code(&self) -> i32 {
        match self {
            TrainingError::DeviceUnavailable { .. } => TrainingErrorCodes::DEVICE_UNAVAILABLE,
            TrainingError::PermissionDenied => TrainingErrorCodes::PERMISSION_DENIED,
            TrainingError::CaptureFailure { .. } => TrainingErrorCodes::CAPTURE_FAILURE,
            TrainingError::UnknownTrack { .. } => TrainingErrorCodes::UNKNOWN_TRACK,
            TrainingError::RecordingUnsupported => TrainingErrorCodes::RECORDING_UNSUPPORTED,
            TrainingError::NoRecording => TrainingErrorCodes::NO_RECORDING,
            TrainingError::LockPoisoned { .. } => TrainingErrorCodes::LOCK_POISONED,
            TrainingError::PlaybackFailure { .. } => TrainingErrorCodes::PLAYBACK_FAILURE,
        }
    }

    fn message(&self) -> String {
        match self {
            TrainingError::DeviceUnavailable { reason } => {
                format!("No usable microphone: {}", reason)
            }
            TrainingError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            TrainingError::CaptureFailure { reason } => {
                format!("Audio capture failed: {}", reason)
            }
            TrainingError::UnknownTrack { genre, track } => match track {
                Some(track) => format!("Track '{}' not found in genre '{}'", track, genre),
                None => format!("Genre '{}' not found", genre),
            },
            TrainingError::RecordingUnsupported => {
                "Recording is not supported by this capture backend".to_string()
            }
            TrainingError::NoRecording => {
                "No recording available. Finish a session before comparing.".to_string()
            }
            TrainingError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            TrainingError::PlaybackFailure { reason } => {
                format!("Playback failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrainingError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for TrainingError {}

impl From<std::io::Error> for TrainingError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => TrainingError::PermissionDenied,
            std::io::ErrorKind::NotFound => TrainingError::DeviceUnavailable {
                reason: err.to_string(),
            },
            _ => TrainingError::CaptureFailure {
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_error_codes() {
        assert_eq!(
            TrainingError::DeviceUnavailable {
                reason: "none".to_string()
            }
            .code(),
            TrainingErrorCodes::DEVICE_UNAVAILABLE
        );
        assert_eq!(
            TrainingError::PermissionDenied.code(),
            TrainingErrorCodes::PERMISSION_DENIED
        );
        assert_eq!(
            TrainingError::CaptureFailure {
                reason: "x".to_string()
            }
            .code(),
            3003
        );
        assert_eq!(
            TrainingError::UnknownTrack {
                genre: "g".to_string(),
                track: None
            }
            .code(),
            3004
        );
        assert_eq!(TrainingError::RecordingUnsupported.code(), 3005);
        assert_eq!(TrainingError::NoRecording.code(), 3006);
        assert_eq!(
            TrainingError::LockPoisoned {
                component: "AudioGraph".to_string()
            }
            .code(),
            3007
        );
        assert_eq!(
            TrainingError::PlaybackFailure {
                reason: "x".to_string()
            }
            .code(),
            3008
        );
    }

    #[test]
    fn test_unknown_track_messages() {
        let err = TrainingError::UnknownTrack {
            genre: "kunqu".to_string(),
            track: Some("missing".to_string()),
        };
        assert_eq!(err.message(), "Track 'missing' not found in genre 'kunqu'");

        let err = TrainingError::UnknownTrack {
            genre: "opera".to_string(),
            track: None,
        };
        assert_eq!(err.message(), "Genre 'opera' not found");
    }

    #[test]
    fn test_training_error_display() {
        let err = TrainingError::PermissionDenied;
        let display = format!("{}", err);
        assert!(display.contains("TrainingError"));
        assert!(display.contains("3002"));
        assert!(display.contains("permission denied"));
    }

    #[test]
    fn test_from_io_error() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(TrainingError::from(denied), TrainingError::PermissionDenied);

        let other = std::io::Error::other("device unplugged");
        match TrainingError::from(other) {
            TrainingError::CaptureFailure { reason } => assert!(reason.contains("unplugged")),
            other => panic!("Expected CaptureFailure, got {:?}", other),
        }
    }
}
