//! Pitch estimator - autocorrelation fundamental-frequency detection
//!
//! Finds the lag at which a frame best matches a delayed copy of itself.
//! Correlations are normalized by the energy of both overlapping windows so
//! the confidence threshold means the same thing for quiet and loud input.
//!
//! Scan rules:
//! - frames below the silence RMS return `None` before any correlation work
//! - a lag is a candidate only while the correlation is above the threshold
//!   and still rising; this skips the short-lag shoulder that every low
//!   voice produces and would otherwise be read as an octave error
//! - the first non-rising lag after a candidate ends the scan, and the peak
//!   is refined with parabolic interpolation over its neighbours

use crate::config::PitchConfig;

/// Autocorrelation pitch detector
#[derive(Debug, Clone)]
pub struct PitchEstimator {
    config: PitchConfig,
}

impl PitchEstimator {
    pub fn new(config: PitchConfig) -> Self {
        Self { config }
    }

    /// Estimate the fundamental frequency of one frame
    ///
    /// # Arguments
    /// * `samples` - time-domain samples normalized to [-1, 1]
    /// * `sample_rate` - sample rate in Hz
    ///
    /// # Returns
    /// Frequency in Hz, or `None` when no voiced signal is present
    pub fn estimate(&self, samples: &[f32], sample_rate: u32) -> Option<f32> {
        let min_lag = self.config.min_lag.max(1);
        let max_lag = samples.len() / 2;
        if sample_rate == 0 || max_lag <= min_lag + 1 {
            return None;
        }

        let rms = frame_rms(samples);
        if !rms.is_finite() || rms < self.config.silence_rms {
            return None;
        }

        let energy = prefix_energy(samples);
        let threshold = self.config.confidence_threshold;

        // correlations[i] holds the value at lag (min_lag - 1 + i)
        let mut correlations = Vec::with_capacity(max_lag - min_lag + 2);
        correlations.push(normalized_correlation(samples, &energy, min_lag - 1));

        let mut best_lag: Option<usize> = None;
        let mut best_correlation = 0.0_f32;

        for lag in min_lag..max_lag {
            let correlation = normalized_correlation(samples, &energy, lag);
            let previous = correlations[correlations.len() - 1];
            correlations.push(correlation);

            if correlation > threshold && correlation >= previous {
                if correlation > best_correlation {
                    best_correlation = correlation;
                    best_lag = Some(lag);
                }
            } else if let Some(peak) = best_lag {
                let index = peak + 1 - min_lag;
                let refined = peak as f32
                    + parabolic_offset(
                        correlations[index - 1],
                        correlations[index],
                        correlations[index + 1],
                    );
                return Some(sample_rate as f32 / refined);
            }
        }

        best_lag.map(|lag| sample_rate as f32 / lag as f32)
    }
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self::new(PitchConfig::default())
    }
}

/// Root-mean-square level of a frame (0.0 for an empty frame)
pub fn frame_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// energy[i] = sum of squares of samples[..i]
fn prefix_energy(samples: &[f32]) -> Vec<f64> {
    let mut energy = Vec::with_capacity(samples.len() + 1);
    let mut running = 0.0_f64;
    energy.push(running);
    for &sample in samples {
        running += (sample as f64) * (sample as f64);
        energy.push(running);
    }
    energy
}

/// Correlation of `samples[..n-lag]` with `samples[lag..]`, scaled to [-1, 1]
fn normalized_correlation(samples: &[f32], energy: &[f64], lag: usize) -> f32 {
    let n = samples.len();
    if lag >= n {
        return 0.0;
    }

    let overlap = n - lag;
    let sum: f64 = samples[..overlap]
        .iter()
        .zip(&samples[lag..])
        .map(|(&a, &b)| a as f64 * b as f64)
        .sum();

    let head = energy[overlap] - energy[0];
    let tail = energy[n] - energy[lag];
    let denominator = (head * tail).sqrt();
    if denominator <= f64::EPSILON {
        0.0
    } else {
        (sum / denominator) as f32
    }
}

/// Vertex offset of the parabola through three equally spaced points,
/// relative to the middle one and limited to half a sample
fn parabolic_offset(left: f32, centre: f32, right: f32) -> f32 {
    let denominator = left - 2.0 * centre + right;
    if denominator.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::signals::{silence, sine_frame, white_noise};

    fn assert_within(actual: Option<f32>, expected: f32, tolerance: f32) {
        let actual = actual.unwrap_or_else(|| panic!("no pitch for {} Hz", expected));
        let error = (actual - expected).abs() / expected;
        assert!(
            error <= tolerance,
            "expected {} Hz, got {} Hz ({:.2}% error)",
            expected,
            actual,
            error * 100.0
        );
    }

    #[test]
    fn test_sine_frames_across_voice_range() {
        let estimator = PitchEstimator::default();
        for &sample_rate in &[44_100_u32, 48_000] {
            for &freq in &[100.0_f32, 147.0, 220.0, 330.0, 440.0, 523.0, 660.0, 800.0] {
                let frame = sine_frame(freq, sample_rate, 2048, 0.5);
                assert_within(estimator.estimate(&frame, sample_rate), freq, 0.02);
            }
        }
    }

    #[test]
    fn test_quiet_sine_above_floor_is_still_detected() {
        let estimator = PitchEstimator::default();
        // 0.075 amplitude gives RMS of about 0.053
        let frame = sine_frame(261.6, 44_100, 2048, 0.075);
        assert_within(estimator.estimate(&frame, 44_100), 261.6, 0.02);
    }

    #[test]
    fn test_silence_returns_none() {
        let estimator = PitchEstimator::default();
        assert_eq!(estimator.estimate(&silence(2048), 44_100), None);

        let whisper = sine_frame(220.0, 44_100, 2048, 0.005);
        assert_eq!(estimator.estimate(&whisper, 44_100), None);
    }

    #[test]
    fn test_short_or_empty_frames_return_none() {
        let estimator = PitchEstimator::default();
        assert_eq!(estimator.estimate(&[], 44_100), None);
        assert_eq!(estimator.estimate(&[0.5; 12], 44_100), None);
        assert_eq!(estimator.estimate(&sine_frame(220.0, 44_100, 2048, 0.5), 0), None);
    }

    #[test]
    fn test_white_noise_is_unvoiced() {
        let estimator = PitchEstimator::default();
        let noise = white_noise(2048, 0.5, 7);
        assert_eq!(estimator.estimate(&noise, 44_100), None);
    }

    #[test]
    fn test_estimate_is_amplitude_independent() {
        let estimator = PitchEstimator::default();
        let loud = estimator.estimate(&sine_frame(196.0, 48_000, 2048, 0.9), 48_000);
        let soft = estimator.estimate(&sine_frame(196.0, 48_000, 2048, 0.1), 48_000);
        let (loud, soft) = (loud.unwrap(), soft.unwrap());
        assert!((loud - soft).abs() < 0.5);
    }

    #[test]
    fn test_peak_beyond_scan_range_uses_last_rising_lag() {
        let estimator = PitchEstimator::default();
        // Period of 1030 samples; the scan stops at lag 1023 while still climbing
        let frame = sine_frame(44_100.0 / 1030.0, 44_100, 2048, 0.5);

        let pitch = estimator.estimate(&frame, 44_100).expect("voiced frame");
        assert_eq!(pitch, 44_100.0 / 1023.0);
    }

    #[test]
    fn test_parabolic_offset() {
        assert_eq!(parabolic_offset(0.5, 1.0, 0.5), 0.0);
        assert!(parabolic_offset(0.9, 1.0, 0.5) < 0.0);
        assert!(parabolic_offset(0.5, 1.0, 0.9) > 0.0);
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_frame_rms() {
        assert_eq!(frame_rms(&[]), 0.0);
        assert!((frame_rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }
}
