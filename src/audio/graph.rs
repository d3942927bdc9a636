// AudioGraph - analyser plus recorder fed from the capture queue
//
// The graph owns the analysis half of the buffer pool. Drained samples go
// into a sliding time-domain window of `fft_size` samples and into the clip
// recorder. A pump thread keeps draining between ticks so recording does not
// stall when ticks are suspended; every tick drains again before it copies
// its frame, so analysis always sees the newest samples.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::analysis::{AudioFrame, SpectrumAnalyser};
use crate::audio::buffer_pool::AnalysisChannels;
use crate::audio::recorder::{ClipRecorder, RecordedClip};
use crate::config::AudioConfig;
use crate::error::TrainingError;
use crate::telemetry::{self, DiagnosticError};

/// Interval between background drains
const PUMP_INTERVAL: Duration = Duration::from_millis(5);

struct GraphInner {
    channels: AnalysisChannels,
    window: VecDeque<f32>,
    window_size: usize,
    samples_seen: u64,
}

impl GraphInner {
    fn drain(&mut self, recorder: &ClipRecorder) -> Result<usize, TrainingError> {
        let window = &mut self.window;
        let window_size = self.window_size;
        let mut record_result = Ok(());

        let drained = self.channels.drain(|samples| {
            for &sample in samples {
                if window.len() == window_size {
                    window.pop_front();
                }
                window.push_back(sample);
            }
            if record_result.is_ok() {
                record_result = recorder.append(samples);
            }
        });

        self.samples_seen += drained as u64;
        let hub = telemetry::hub();
        hub.record_queue_fill("capture_queue", self.channels.occupancy_percent());
        let dropped = self.channels.take_new_drops();
        if dropped > 0 {
            tracing::warn!("[AudioGraph] Capture queue overran: {} samples dropped", dropped);
            hub.record_error(
                DiagnosticError::CaptureOverrun,
                format!("{} samples dropped", dropped),
            );
        }
        record_result.map(|_| drained)
    }
}

/// Live analysis graph for one session
pub struct AudioGraph {
    inner: Arc<Mutex<GraphInner>>,
    recorder: Arc<ClipRecorder>,
    spectrum: SpectrumAnalyser,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    closed: bool,
}

impl AudioGraph {
    /// Build the graph and start recording
    ///
    /// # Arguments
    /// * `channels` - analysis half of the capture buffer pool
    /// * `sample_rate` - capture sample rate in Hz
    /// * `config` - analyser settings; `background_pump` starts the drain thread
    pub fn new(
        channels: AnalysisChannels,
        sample_rate: u32,
        config: &AudioConfig,
    ) -> Result<Self, TrainingError> {
        let window_size = config.fft_size.max(2);
        // Analyser windows start out silent, like a freshly connected node
        let window = std::iter::repeat(0.0).take(window_size).collect();

        let inner = Arc::new(Mutex::new(GraphInner {
            channels,
            window,
            window_size,
            samples_seen: 0,
        }));
        let recorder = Arc::new(ClipRecorder::new(sample_rate));
        recorder.start()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let pump = if config.background_pump {
            Some(spawn_pump(
                Arc::clone(&inner),
                Arc::clone(&recorder),
                Arc::clone(&shutdown),
            )?)
        } else {
            None
        };

        tracing::debug!(
            "[AudioGraph] Opened: sample_rate={} fft_size={} pump={}",
            sample_rate,
            window_size,
            pump.is_some()
        );

        Ok(Self {
            inner,
            recorder,
            spectrum: SpectrumAnalyser::new(config),
            sample_rate,
            shutdown,
            pump,
            closed: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Move every queued capture buffer into the window and recorder
    pub fn drain(&self) -> Result<usize, TrainingError> {
        lock_inner(&self.inner)?.drain(&self.recorder)
    }

    /// Total samples received since the graph opened
    pub fn samples_seen(&self) -> Result<u64, TrainingError> {
        Ok(lock_inner(&self.inner)?.samples_seen)
    }

    /// Drain, then copy the current window and its spectrum
    pub fn snapshot_frame(&mut self) -> Result<AudioFrame, TrainingError> {
        if self.closed {
            return Err(TrainingError::CaptureFailure {
                reason: "audio graph is closed".to_string(),
            });
        }

        let samples: Vec<f32> = {
            let mut inner = lock_inner(&self.inner)?;
            inner.drain(&self.recorder)?;
            inner.window.iter().copied().collect()
        };
        let spectrum = self.spectrum.analyse(&samples);

        Ok(AudioFrame {
            samples,
            spectrum,
            sample_rate: self.sample_rate,
        })
    }

    /// Stop the pump, flush the last samples and finish the recording
    ///
    /// Safe to call more than once; later calls return `Ok(None)`.
    pub fn close(&mut self) -> Result<Option<RecordedClip>, TrainingError> {
        if self.closed {
            return Ok(None);
        }
        self.closed = true;

        self.stop_pump();
        let flushed = self.drain();
        let clip = self.recorder.stop();

        tracing::debug!("[AudioGraph] Closed");
        flushed?;
        clip
    }

    fn stop_pump(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.pump.take() {
            if handle.join().is_err() {
                tracing::warn!("[AudioGraph] Pump thread panicked");
            }
        }
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

fn lock_inner(inner: &Mutex<GraphInner>) -> Result<MutexGuard<'_, GraphInner>, TrainingError> {
    inner.lock().map_err(|_| TrainingError::LockPoisoned {
        component: "AudioGraph".to_string(),
    })
}

fn spawn_pump(
    inner: Arc<Mutex<GraphInner>>,
    recorder: Arc<ClipRecorder>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, TrainingError> {
    thread::Builder::new()
        .name("vocal-capture-pump".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                let result = lock_inner(&inner).and_then(|mut guard| guard.drain(&recorder));
                if let Err(err) = result {
                    tracing::warn!("[AudioGraph] Pump stopped: {}", err);
                    break;
                }
                thread::sleep(PUMP_INTERVAL);
            }
        })
        .map_err(|err| TrainingError::CaptureFailure {
            reason: format!("Failed to spawn capture pump: {}", err),
        })
}
