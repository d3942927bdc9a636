//! Tempo estimator - peak-energy beat tracking
//!
//! An onset is registered when the frame's peak absolute amplitude crosses
//! the onset threshold and the debounce interval has passed since the last
//! recorded beat. Tempo is `60 / mean(consecutive beat deltas)` over the
//! retained beat timestamps.

use serde::{Deserialize, Serialize};

use crate::config::TempoConfig;
use crate::session::RollingBuffer;

/// Running tempo estimate derived from recorded beats
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoReading {
    /// Beats per minute
    pub bpm: f32,
    /// Mean spacing between consecutive beats in seconds
    pub mean_interval: f64,
    /// Number of beat timestamps the estimate was computed from
    pub beat_count: usize,
}

/// Result of feeding one frame to the estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoObservation {
    pub beat_detected: bool,
    pub reading: Option<TempoReading>,
}

/// Peak-energy beat detector
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    config: TempoConfig,
}

impl TempoEstimator {
    pub fn new(config: TempoConfig) -> Self {
        Self { config }
    }

    /// Whether this frame registers a new beat at `now` seconds
    ///
    /// A beat exactly `debounce_ms` after the previous one is accepted.
    pub fn is_onset(&self, samples: &[f32], now: f64, last_beat: Option<f64>) -> bool {
        if peak_amplitude(samples) <= self.config.onset_threshold {
            return false;
        }
        let debounce = self.config.debounce_ms as f64 / 1000.0;
        match last_beat {
            // Tolerance absorbs tick clocks that land a hair short of the interval
            Some(last) => now - last + 1e-9 >= debounce,
            None => true,
        }
    }

    /// Detect an onset, append it to `beats`, and return the current tempo
    pub fn observe(
        &self,
        samples: &[f32],
        now: f64,
        beats: &mut RollingBuffer<f64>,
    ) -> TempoObservation {
        let beat_detected = self.is_onset(samples, now, beats.last().copied());
        if beat_detected {
            beats.push(now);
        }
        TempoObservation {
            beat_detected,
            reading: tempo_from_beats(beats),
        }
    }
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::new(TempoConfig::default())
    }
}

/// Largest absolute sample value in the frame
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples
        .iter()
        .filter(|s| s.is_finite())
        .fold(0.0_f32, |peak, s| peak.max(s.abs()))
}

/// Tempo from beat timestamps, `None` with fewer than two beats
pub fn tempo_from_beats(beats: &RollingBuffer<f64>) -> Option<TempoReading> {
    if beats.len() < 2 {
        return None;
    }

    let deltas: Vec<f64> = beats
        .iter()
        .zip(beats.iter().skip(1))
        .map(|(earlier, later)| later - earlier)
        .collect();
    let mean_interval = deltas.iter().sum::<f64>() / deltas.len() as f64;
    if mean_interval <= 0.0 || !mean_interval.is_finite() {
        return None;
    }

    Some(TempoReading {
        bpm: (60.0 / mean_interval) as f32,
        mean_interval,
        beat_count: beats.len(),
    })
}

/// Relative deviation of the measured beat interval from the expected one
pub fn beat_deviation(mean_interval: f64, expected_interval: f64) -> Option<f32> {
    if expected_interval <= 0.0 || !mean_interval.is_finite() {
        return None;
    }
    Some(((mean_interval - expected_interval).abs() / expected_interval) as f32)
}
