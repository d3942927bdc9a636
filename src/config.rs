//! Configuration management for dynamic parameter tuning
//!
//! Runtime configuration is loaded from a JSON file so detector thresholds
//! and scoring coefficients can be recalibrated without recompilation.
//! Every section falls back to its defaults when a field is missing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "VOCAL_TRAINER_CONFIG";

/// Default config file location relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "assets/trainer_config.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pitch: PitchConfig,
    pub tempo: TempoConfig,
    pub clarity: ClarityConfig,
    pub scoring: ScoringConfig,
    pub session: SessionConfig,
    pub audio: AudioConfig,
}

/// Autocorrelation pitch detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Frames with RMS below this are treated as silence
    pub silence_rms: f32,
    /// Smallest lag scanned; rejects implausibly high frequencies
    pub min_lag: usize,
    /// Normalized correlation a peak must exceed to count as voiced
    pub confidence_threshold: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            silence_rms: 0.01,
            min_lag: 8,
            confidence_threshold: 0.9,
        }
    }
}

/// Peak-energy beat detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Peak absolute amplitude that registers an onset
    pub onset_threshold: f32,
    /// Minimum spacing between two recorded beats
    pub debounce_ms: u64,
    /// Number of recent beat timestamps retained
    pub beat_capacity: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            onset_threshold: 0.2,
            debounce_ms: 250,
            beat_capacity: 12,
        }
    }
}

/// Spectral band split used by the clarity heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClarityConfig {
    /// Share of bins (from the bottom) assigned to the low band
    pub low_band_fraction: f32,
    /// Share of bins assigned to the mid band; the rest is high band
    pub mid_band_fraction: f32,
}

impl Default for ClarityConfig {
    fn default() -> Self {
        Self {
            low_band_fraction: 0.2,
            mid_band_fraction: 0.45,
        }
    }
}

/// Score mapping coefficients
///
/// These are empirical tuning constants, not acoustically derived:
/// - pitch = 100 - mean(pitch_error) * pitch_error_weight
/// - rhythm = 100 - mean(beat_diff) * beat_diff_weight
/// - pronunciation = pronunciation_baseline + mean(clarity) * clarity_weight
///
/// All scores are clamped to 0..=100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub pitch_error_weight: f32,
    pub beat_diff_weight: f32,
    pub pronunciation_baseline: f32,
    pub clarity_weight: f32,
    /// Score assigned at session end to metrics that never received samples
    pub untested_score: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            pitch_error_weight: 450.0,
            beat_diff_weight: 400.0,
            pronunciation_baseline: 60.0,
            clarity_weight: 50.0,
            untested_score: 60,
        }
    }
}

/// Session bookkeeping and visualization parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of each rolling metric buffer
    pub metric_capacity: usize,
    /// Capacity of the pitch history used by the visualization
    pub history_capacity: usize,
    /// Width of the visualization window in seconds
    pub visualization_window_secs: f32,
    /// Genre selected when the controller is created
    pub default_genre: String,
    /// Frequency range a renderer should map onto its vertical axis
    pub display_min_hz: f32,
    pub display_max_hz: f32,
    /// Refresh rate of the desktop tick driver
    pub refresh_hz: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            metric_capacity: 200,
            history_capacity: 600,
            visualization_window_secs: 15.0,
            default_genre: "baiju".to_string(),
            display_min_hz: 150.0,
            display_max_hz: 400.0,
            refresh_hz: 60,
        }
    }
}

/// Capture graph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Analysis frame length in samples (time-domain window and FFT size)
    pub fft_size: usize,
    /// Exponential smoothing applied to the spectrum across frames
    pub smoothing_time_constant: f32,
    /// dB range mapped onto the 0..255 spectrum scale
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Size of buffer pool for real-time audio transfer
    pub buffer_pool_size: usize,
    /// Size of each audio buffer in samples
    pub buffer_size: usize,
    /// Capture hints forwarded to the backend
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// Keep draining capture on a background thread between ticks
    pub background_pump: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.6,
            min_decibels: -100.0,
            max_decibels: -30.0,
            buffer_pool_size: 32,
            buffer_size: 1024,
            echo_cancellation: true,
            noise_suppression: true,
            background_pump: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from `VOCAL_TRAINER_CONFIG` or the default asset path
    pub fn load() -> Self {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::load_from_file(path),
            _ => Self::load_from_file(DEFAULT_CONFIG_PATH),
        }
    }
}
