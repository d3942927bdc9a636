//! CPAL-based capture backend for desktop platforms (Linux, macOS, Windows)
//!
//! `cpal::Stream` is not `Send` on every host, so each capture lives on a
//! dedicated thread that builds the stream, reports the open result, and
//! parks until the handle asks it to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;

use crate::audio::{BufferPool, CaptureChannels};
use crate::error::TrainingError;

use super::{CaptureBackend, CaptureEvent, CaptureHandle, CaptureRequest, OpenedCapture};

/// Default-input-device capture through cpal
#[derive(Debug, Default)]
pub struct CpalBackend {
    _unit: (),
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureBackend for CpalBackend {
    fn open(&self, request: &CaptureRequest) -> Result<OpenedCapture, TrainingError> {
        if request.echo_cancellation || request.noise_suppression {
            log::debug!("[CpalBackend] Echo cancellation / noise suppression hints are not applied by cpal");
        }

        let (capture, analysis) =
            BufferPool::new(request.buffer_pool_size, request.buffer_size).split_for_threads();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let live = Arc::new(AtomicBool::new(false));
        let thread_live = Arc::clone(&live);

        let thread = thread::Builder::new()
            .name("vocal-capture-stream".to_string())
            .spawn(move || {
                let stream = match build_input_stream(capture, event_tx) {
                    Ok((stream, sample_rate)) => {
                        thread_live.store(true, Ordering::SeqCst);
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                // Blocks until stop_tracks sends or the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                thread_live.store(false, Ordering::SeqCst);
                log::info!("[CpalBackend] Input stream released");
            })
            .map_err(|err| TrainingError::CaptureFailure {
                reason: format!("Failed to spawn capture thread: {}", err),
            })?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(TrainingError::CaptureFailure {
                    reason: "capture thread exited before opening the stream".to_string(),
                });
            }
        };

        log::info!("[CpalBackend] Input stream opened at {} Hz", sample_rate);

        Ok(OpenedCapture {
            sample_rate,
            channels: analysis,
            events: event_rx,
            handle: Box::new(CpalCaptureHandle {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
                live,
            }),
        })
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

struct CpalCaptureHandle {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    live: Arc<AtomicBool>,
}

impl CaptureHandle for CpalCaptureHandle {
    fn stop_tracks(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("[CpalBackend] Capture thread panicked");
            }
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for CpalCaptureHandle {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

fn build_input_stream(
    mut channels: CaptureChannels,
    events: mpsc::UnboundedSender<CaptureEvent>,
) -> Result<(cpal::Stream, u32), TrainingError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| TrainingError::DeviceUnavailable {
            reason: "No default input device found".to_string(),
        })?;

    let config = device
        .default_input_config()
        .map_err(|e| TrainingError::DeviceUnavailable {
            reason: format!("Failed to get default input config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = config.clone().into();
    let channels_count = stream_config.channels as usize;
    let sample_rate = stream_config.sample_rate.0;

    let err_fn = move |err: cpal::StreamError| {
        log::error!("[CpalBackend] Input stream error: {}", err);
        let event = match err {
            cpal::StreamError::DeviceNotAvailable => CaptureEvent::Ended,
            other => CaptureEvent::Failure {
                reason: other.to_string(),
            },
        };
        let _ = events.send(event);
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                channels.push_interleaved(data, channels_count, |s| s);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                channels.push_interleaved(data, channels_count, |s| {
                    s as f32 / i16::MAX as f32
                });
            },
            err_fn,
            None,
        ),
        other => {
            return Err(TrainingError::DeviceUnavailable {
                reason: format!("Unsupported input sample format {:?}", other),
            })
        }
    }
    .map_err(map_build_error)?;

    stream.play().map_err(|e| TrainingError::CaptureFailure {
        reason: format!("Input start failed: {}", e),
    })?;

    Ok((stream, sample_rate))
}

fn map_build_error(err: cpal::BuildStreamError) -> TrainingError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => TrainingError::DeviceUnavailable {
            reason: "Input device not available".to_string(),
        },
        cpal::BuildStreamError::BackendSpecific { err } => {
            // Hosts report a refused microphone through their own error text
            let lowered = err.description.to_lowercase();
            if lowered.contains("permission") || lowered.contains("denied") {
                TrainingError::PermissionDenied
            } else {
                TrainingError::CaptureFailure {
                    reason: err.description,
                }
            }
        }
        other => TrainingError::CaptureFailure {
            reason: format!("{:?}", other),
        },
    }
}
