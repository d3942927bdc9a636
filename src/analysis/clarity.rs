//! Pronunciation clarity heuristic
//!
//! Splits the magnitude spectrum into low, mid and high bands by bin index
//! and reports the mid band's share of total energy. Vocal formants sit
//! mostly in the mid band, so the ratio is a cheap articulation proxy. It is
//! not a formant tracker and carries no acoustic calibration.

use crate::config::ClarityConfig;

/// Band energies of one spectrum
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandEnergy {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandEnergy {
    pub fn total(&self) -> f32 {
        self.low + self.mid + self.high
    }
}

/// Mid-band energy ratio estimator
#[derive(Debug, Clone)]
pub struct ClarityEstimator {
    config: ClarityConfig,
}

impl ClarityEstimator {
    pub fn new(config: ClarityConfig) -> Self {
        Self { config }
    }

    /// Sum bin magnitudes per band; negative or non-finite bins count as zero
    pub fn band_energy<T: Copy + Into<f32>>(&self, spectrum: &[T]) -> BandEnergy {
        let low_fraction = self.config.low_band_fraction as f64;
        let mid_fraction = self.config.mid_band_fraction as f64;
        let low_end = band_boundary(spectrum.len(), low_fraction);
        let mid_end = band_boundary(spectrum.len(), low_fraction + mid_fraction);

        let mut bands = BandEnergy::default();
        for (index, &bin) in spectrum.iter().enumerate() {
            let value: f32 = bin.into();
            let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
            if index < low_end {
                bands.low += value;
            } else if index < mid_end {
                bands.mid += value;
            } else {
                bands.high += value;
            }
        }
        bands
    }

    /// Mid-band share of total energy, in [0, 1]
    ///
    /// An all-zero or empty spectrum yields 0.0: the total is treated as 1.
    pub fn clarity<T: Copy + Into<f32>>(&self, spectrum: &[T]) -> f32 {
        let bands = self.band_energy(spectrum);
        let total = bands.total();
        let total = if total > 0.0 { total } else { 1.0 };
        (bands.mid / total).clamp(0.0, 1.0)
    }
}

/// First bin index at or above `len * fraction`
///
/// The small tolerance keeps exact products such as `100 * 0.2` from being
/// pushed up a bin by f32 rounding in the configured fractions.
fn band_boundary(len: usize, fraction: f64) -> usize {
    let edge = len as f64 * fraction.clamp(0.0, 1.0);
    ((edge - 1e-4).ceil().max(0.0) as usize).min(len)
}

impl Default for ClarityEstimator {
    fn default() -> Self {
        Self::new(ClarityConfig::default())
    }
}
