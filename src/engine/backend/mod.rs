//! Capture backend abstractions for the session controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::AnalysisChannels;
use crate::config::AudioConfig;
use crate::error::TrainingError;

/// Parameters handed to a backend when a session acquires the microphone.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub buffer_pool_size: usize,
    pub buffer_size: usize,
}

impl CaptureRequest {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
            buffer_pool_size: config.buffer_pool_size.max(2),
            buffer_size: config.buffer_size.max(64),
        }
    }
}

/// Asynchronous notifications from a live capture stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// The stream reported an error and no longer delivers audio
    Failure { reason: String },
    /// The device went away or the stream finished on its own
    Ended,
}

/// Owner of the capture tracks for one session.
///
/// Dropping the handle without calling `stop_tracks` is a leak the backend
/// may report; the controller always stops explicitly.
pub trait CaptureHandle: Send {
    /// Release the microphone; calling twice is a no-op
    fn stop_tracks(&mut self);
    fn is_live(&self) -> bool;
}

/// Everything a backend hands back after opening the microphone.
pub struct OpenedCapture {
    pub sample_rate: u32,
    pub channels: AnalysisChannels,
    pub events: mpsc::UnboundedReceiver<CaptureEvent>,
    pub handle: Box<dyn CaptureHandle>,
}

/// Trait implemented by capture providers (cpal on desktop, synthetic in
/// tests and replays).
pub trait CaptureBackend: Send + Sync {
    fn open(&self, request: &CaptureRequest) -> Result<OpenedCapture, TrainingError>;

    /// Whether sessions opened through this backend can be recorded
    fn supports_recording(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Trait representing a monotonic time source for session clocks and
/// event timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic time source driven by the caller.
///
/// Time only moves when `advance` is called, so replays and tests produce
/// identical elapsed times on every run.
pub struct ManualTimeSource {
    start: Instant,
    offset_us: AtomicU64,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_us: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_us
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::SeqCst))
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

mod cpal;
pub use cpal::CpalBackend;

mod synthetic;
pub use synthetic::{SyntheticBackend, SyntheticFeeder};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time_source_moves_only_when_advanced() {
        let clock = ManualTimeSource::new();
        let first = clock.now();
        assert_eq!(clock.now(), first);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now().duration_since(first), Duration::from_millis(250));
    }

    #[test]
    fn test_capture_request_floors_pool_sizes() {
        let config = AudioConfig {
            buffer_pool_size: 0,
            buffer_size: 1,
            ..AudioConfig::default()
        };
        let request = CaptureRequest::from_config(&config);
        assert_eq!(request.buffer_pool_size, 2);
        assert_eq!(request.buffer_size, 64);
        assert!(request.echo_cancellation);
        assert!(request.noise_suppression);
    }
}
