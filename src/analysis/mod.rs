// Analysis module - per-tick vocal estimators
//
// Each tick the session controller takes one AudioFrame from the capture
// graph and hands it to the FrameAnalyzer by value. Estimators are pure:
// they return readings and never touch session state.
//
// Pipeline:
// - PitchEstimator: autocorrelation over the time-domain window
// - TempoEstimator: peak-amplitude onsets into the beat buffer
// - ClarityEstimator: mid-band share of the byte spectrum

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::session::RollingBuffer;

pub mod clarity;
pub mod pitch;
pub mod spectrum;
pub mod tempo;

pub use clarity::ClarityEstimator;
pub use pitch::PitchEstimator;
pub use spectrum::SpectrumAnalyser;
pub use tempo::{TempoEstimator, TempoReading};

/// One analysis window, copied out of the live graph
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Time-domain samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Byte magnitude spectrum (`samples.len() / 2` bins)
    pub spectrum: Vec<u8>,
    pub sample_rate: u32,
}

/// Reasons a frame is rejected; the tick is skipped, the session continues
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    EmptyFrame,
    InvalidSampleRate,
    NonFiniteSample { index: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::EmptyFrame => write!(f, "frame has no samples"),
            FrameError::InvalidSampleRate => write!(f, "frame sample rate is zero"),
            FrameError::NonFiniteSample { index } => {
                write!(f, "frame sample {} is not finite", index)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Estimator outputs for one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameReadings {
    /// Detected fundamental in Hz, `None` when unvoiced
    pub pitch: Option<f32>,
    pub beat_detected: bool,
    pub tempo: Option<TempoReading>,
    pub clarity: f32,
}

/// Bundles the three estimators with their configuration
#[derive(Debug, Clone)]
pub struct FrameAnalyzer {
    pitch: PitchEstimator,
    tempo: TempoEstimator,
    clarity: ClarityEstimator,
}

impl FrameAnalyzer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            pitch: PitchEstimator::new(config.pitch.clone()),
            tempo: TempoEstimator::new(config.tempo.clone()),
            clarity: ClarityEstimator::new(config.clarity.clone()),
        }
    }

    /// Run all estimators on one frame
    ///
    /// `now` is elapsed session time in seconds; detected beats are appended
    /// to `beats`.
    pub fn analyse(
        &self,
        frame: &AudioFrame,
        now: f64,
        beats: &mut RollingBuffer<f64>,
    ) -> Result<FrameReadings, FrameError> {
        validate_frame(frame)?;

        let pitch = self.pitch.estimate(&frame.samples, frame.sample_rate);
        let observation = self.tempo.observe(&frame.samples, now, beats);
        let clarity = self.clarity.clarity(&frame.spectrum);

        Ok(FrameReadings {
            pitch,
            beat_detected: observation.beat_detected,
            tempo: observation.reading,
            clarity,
        })
    }
}

impl Default for FrameAnalyzer {
    fn default() -> Self {
        Self::new(&AppConfig::default())
    }
}

fn validate_frame(frame: &AudioFrame) -> Result<(), FrameError> {
    if frame.samples.is_empty() {
        return Err(FrameError::EmptyFrame);
    }
    if frame.sample_rate == 0 {
        return Err(FrameError::InvalidSampleRate);
    }
    if let Some(index) = frame.samples.iter().position(|s| !s.is_finite()) {
        return Err(FrameError::NonFiniteSample { index });
    }
    Ok(())
}
