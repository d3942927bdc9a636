// Spectrum analyser - windowed FFT with temporal smoothing
//
// Converts the current time-domain window into a byte magnitude spectrum:
// Hann window, forward FFT, magnitude / N, exponential smoothing across
// frames, then dB mapped linearly from [min_db, max_db] onto [0, 255].

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::AudioConfig;

/// Stateful analyser; smoothing carries over from one frame to the next
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window for FFT (pre-computed)
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl SpectrumAnalyser {
    pub fn new(config: &AudioConfig) -> Self {
        let fft_size = config.fft_size.max(2);
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let (min_db, max_db) = if config.max_decibels > config.min_decibels {
            (config.min_decibels, config.max_decibels)
        } else {
            (-100.0, -30.0)
        };

        Self {
            fft,
            fft_size,
            window,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            smoothing: config.smoothing_time_constant.clamp(0.0, 1.0),
            min_db,
            max_db,
        }
    }

    /// Number of output bins (`fft_size / 2`)
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyse one window and return byte magnitudes
    ///
    /// Shorter input is zero-padded; samples beyond `fft_size` are ignored.
    pub fn analyse(&mut self, samples: &[f32]) -> Vec<u8> {
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            let sample = if sample.is_finite() { sample } else { 0.0 };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_db - self.min_db;
        let mut bytes = Vec::with_capacity(self.smoothed.len());
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            let db = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (db - self.min_db) / range;
            bytes.push(scaled.clamp(0.0, 255.0) as u8);
        }
        bytes
    }

    /// Forget smoothing history
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }
}
