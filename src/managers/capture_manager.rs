// CaptureManager: Focused manager for microphone capture lifecycle
//
// Single Responsibility: acquire/release of the capture stream and its graph

use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;

use crate::analysis::AudioFrame;
use crate::audio::{AudioGraph, RecordedClip};
use crate::config::AudioConfig;
use crate::engine::backend::{CaptureBackend, CaptureEvent, CaptureHandle, CaptureRequest};
use crate::error::{log_training_error, TrainingError};
use crate::telemetry::{self, LifecyclePhase};

/// Capture resources held while a session runs
struct ActiveCapture {
    graph: AudioGraph,
    handle: Box<dyn CaptureHandle>,
    events: tokio::sync::mpsc::UnboundedReceiver<CaptureEvent>,
}

/// Manages the capture stream and analysis graph for one controller
///
/// Single Responsibility: capture acquisition and guaranteed release
///
/// At most one capture is held at a time. Acquiring while a capture is held
/// releases the old one first, so a double start never leaks a microphone.
pub struct CaptureManager {
    backend: Arc<dyn CaptureBackend>,
    active: Option<ActiveCapture>,
}

impl CaptureManager {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            active: None,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn supports_recording(&self) -> bool {
        self.backend.supports_recording()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Open the microphone and build the analysis graph
    ///
    /// # Returns
    /// * `Ok(sample_rate)` - capture running, recorder started
    /// * `Err(TrainingError)` - nothing is held on failure
    pub fn acquire(&mut self, config: &AudioConfig) -> Result<u32, TrainingError> {
        if self.active.is_some() {
            log::warn!("[CaptureManager] Capture already held; releasing before re-acquiring");
            if let Err(err) = self.release() {
                log_training_error(&err, "CaptureManager::acquire");
            }
        }

        telemetry::hub().record_lifecycle(LifecyclePhase::CaptureRequested);
        let request = CaptureRequest::from_config(config);
        let opened = self.backend.open(&request).map_err(|err| {
            telemetry::hub().record_lifecycle(LifecyclePhase::CaptureDenied);
            err
        })?;

        let mut handle = opened.handle;
        let graph = match AudioGraph::new(opened.channels, opened.sample_rate, config) {
            Ok(graph) => graph,
            Err(err) => {
                handle.stop_tracks();
                return Err(err);
            }
        };

        telemetry::hub().record_lifecycle(LifecyclePhase::CaptureOpened);
        log::info!(
            "[CaptureManager] Capture acquired via {} at {} Hz",
            self.backend.name(),
            opened.sample_rate
        );

        self.active = Some(ActiveCapture {
            graph,
            handle,
            events: opened.events,
        });
        Ok(opened.sample_rate)
    }

    /// Next pending stream notification, if any
    pub fn poll_event(&mut self) -> Option<CaptureEvent> {
        let active = self.active.as_mut()?;
        match active.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Copy the newest analysis frame out of the graph
    pub fn frame(&mut self) -> Result<AudioFrame, TrainingError> {
        match self.active.as_mut() {
            Some(active) => active.graph.snapshot_frame(),
            None => Err(TrainingError::CaptureFailure {
                reason: "no active capture".to_string(),
            }),
        }
    }

    /// Finish the recording, stop the tracks and close the graph
    ///
    /// Tracks are stopped even when finishing the recording fails. Releasing
    /// with nothing held returns `Ok(None)`.
    pub fn release(&mut self) -> Result<Option<RecordedClip>, TrainingError> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };

        let clip = active.graph.close();
        active.handle.stop_tracks();
        telemetry::hub().record_lifecycle(LifecyclePhase::CaptureReleased);
        log::info!("[CaptureManager] Capture released");
        clip
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log_training_error(&err, "CaptureManager::drop");
        }
    }
}
