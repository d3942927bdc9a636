use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::audio::{BufferPool, CaptureChannels};
use crate::error::TrainingError;

use super::{CaptureBackend, CaptureEvent, CaptureHandle, CaptureRequest, OpenedCapture};

struct LiveCapture {
    channels: CaptureChannels,
    events: mpsc::UnboundedSender<CaptureEvent>,
    live: Arc<AtomicBool>,
}

#[derive(Default)]
struct SyntheticState {
    failure: Option<TrainingError>,
    current: Option<LiveCapture>,
    handles: Vec<Arc<AtomicBool>>,
    opened: usize,
}

fn lock_state(state: &Mutex<SyntheticState>) -> MutexGuard<'_, SyntheticState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Capture backend fed by the caller instead of a microphone.
///
/// Used for deterministic CLI replays and tests. Every opened capture is
/// tracked so a test can assert that no microphone stays live.
#[derive(Clone)]
pub struct SyntheticBackend {
    state: Arc<Mutex<SyntheticState>>,
    sample_rate: u32,
    supports_recording: bool,
}

impl SyntheticBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SyntheticState::default())),
            sample_rate,
            supports_recording: true,
        }
    }

    /// Backend whose sessions cannot be recorded
    pub fn without_recording(sample_rate: u32) -> Self {
        Self {
            supports_recording: false,
            ..Self::new(sample_rate)
        }
    }

    /// Make every following `open` fail with `err` (`None` clears it)
    pub fn fail_with(&self, err: Option<TrainingError>) {
        lock_state(&self.state).failure = err;
    }

    /// Handle for pushing samples into whichever capture is current
    pub fn feeder(&self) -> SyntheticFeeder {
        SyntheticFeeder {
            state: Arc::clone(&self.state),
        }
    }

    /// Captures opened and not yet stopped
    pub fn live_captures(&self) -> usize {
        lock_state(&self.state)
            .handles
            .iter()
            .filter(|live| live.load(Ordering::SeqCst))
            .count()
    }

    pub fn opened_count(&self) -> usize {
        lock_state(&self.state).opened
    }
}

impl CaptureBackend for SyntheticBackend {
    fn open(&self, request: &CaptureRequest) -> Result<OpenedCapture, TrainingError> {
        let mut state = lock_state(&self.state);
        if let Some(err) = state.failure.clone() {
            return Err(err);
        }

        let (capture, analysis) =
            BufferPool::new(request.buffer_pool_size, request.buffer_size).split_for_threads();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicBool::new(true));

        state.current = Some(LiveCapture {
            channels: capture,
            events: event_tx,
            live: Arc::clone(&live),
        });
        state.handles.push(Arc::clone(&live));
        state.opened += 1;

        log::debug!("[SyntheticBackend] Capture #{} opened", state.opened);

        Ok(OpenedCapture {
            sample_rate: self.sample_rate,
            channels: analysis,
            events: event_rx,
            handle: Box::new(SyntheticCaptureHandle {
                state: Arc::clone(&self.state),
                live,
            }),
        })
    }

    fn supports_recording(&self) -> bool {
        self.supports_recording
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

/// Caller-side input of a [`SyntheticBackend`]
#[derive(Clone)]
pub struct SyntheticFeeder {
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticFeeder {
    /// Push mono samples into the current capture
    ///
    /// # Returns
    /// Samples accepted; zero when no capture is live
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut state = lock_state(&self.state);
        match state.current.as_mut() {
            Some(capture) => samples.len() - capture.channels.push_interleaved(samples, 1, |s| s),
            None => 0,
        }
    }

    /// Report a stream failure on the current capture
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.send(CaptureEvent::Failure {
            reason: reason.into(),
        })
    }

    /// Report that the current capture ended on its own
    pub fn end(&self) -> bool {
        self.send(CaptureEvent::Ended)
    }

    pub fn is_capturing(&self) -> bool {
        lock_state(&self.state).current.is_some()
    }

    fn send(&self, event: CaptureEvent) -> bool {
        lock_state(&self.state)
            .current
            .as_ref()
            .map(|capture| capture.events.send(event).is_ok())
            .unwrap_or(false)
    }
}

struct SyntheticCaptureHandle {
    state: Arc<Mutex<SyntheticState>>,
    live: Arc<AtomicBool>,
}

impl CaptureHandle for SyntheticCaptureHandle {
    fn stop_tracks(&mut self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut state = lock_state(&self.state);
        let is_current = state
            .current
            .as_ref()
            .map(|capture| Arc::ptr_eq(&capture.live, &self.live))
            .unwrap_or(false);
        if is_current {
            state.current = None;
        }
        log::debug!("[SyntheticBackend] Capture stopped");
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;

    fn request() -> CaptureRequest {
        CaptureRequest::from_config(&AudioConfig::default())
    }

    #[test]
    fn test_feeder_reaches_open_capture() {
        let backend = SyntheticBackend::new(8_000);
        let feeder = backend.feeder();
        assert_eq!(feeder.push(&[0.5; 10]), 0);

        let mut opened = backend.open(&request()).unwrap();
        assert_eq!(opened.sample_rate, 8_000);
        assert_eq!(feeder.push(&[0.5; 100]), 100);

        let mut drained = 0;
        opened.channels.drain(|chunk| drained += chunk.len());
        assert_eq!(drained, 100);
    }

    #[test]
    fn test_stop_tracks_releases_capture() {
        let backend = SyntheticBackend::new(8_000);
        let mut opened = backend.open(&request()).unwrap();
        assert_eq!(backend.live_captures(), 1);
        assert!(opened.handle.is_live());

        opened.handle.stop_tracks();
        opened.handle.stop_tracks();
        assert_eq!(backend.live_captures(), 0);
        assert!(!backend.feeder().is_capturing());
    }

    #[test]
    fn test_failure_is_injected() {
        let backend = SyntheticBackend::new(8_000);
        backend.fail_with(Some(TrainingError::PermissionDenied));
        assert_eq!(
            backend.open(&request()).err(),
            Some(TrainingError::PermissionDenied)
        );
        assert_eq!(backend.opened_count(), 0);

        backend.fail_with(None);
        let mut opened = backend.open(&request()).unwrap();
        assert!(backend.feeder().fail("device unplugged"));
        assert_eq!(
            opened.events.try_recv().unwrap(),
            CaptureEvent::Failure {
                reason: "device unplugged".to_string()
            }
        );
    }

    #[test]
    fn test_recording_support_flag() {
        assert!(SyntheticBackend::new(8_000).supports_recording());
        assert!(!SyntheticBackend::without_recording(8_000).supports_recording());
    }
}
