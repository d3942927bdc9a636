//! Synthetic PCM generators.
//!
//! Every generator is deterministic: noise is drawn from a seeded `StdRng`
//! so a failing test reproduces bit-for-bit.

use std::f32::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::library::ReferenceTrack;

/// Length of one synthetic click in seconds
const CLICK_SECS: f32 = 0.005;

/// `len` samples of digital silence
pub fn silence(len: usize) -> Vec<f32> {
    vec![0.0; len]
}

/// Pure sine of `len` samples starting at phase zero
pub fn sine_frame(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    let step = 2.0 * PI * freq / sample_rate as f32;
    (0..len)
        .map(|i| amplitude * (step * i as f32).sin())
        .collect()
}

/// Uniform white noise in `[-amplitude, amplitude]`
pub fn white_noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| rng.gen_range(-amplitude..=amplitude))
        .collect()
}

/// Short decaying clicks every `interval_secs`, the first at `offset_secs`
///
/// Between clicks the signal is silent, so peak amplitude only crosses an
/// onset threshold while a click is inside the analysis window.
pub fn click_train(
    sample_rate: u32,
    interval_secs: f32,
    offset_secs: f32,
    duration_secs: f32,
    amplitude: f32,
) -> Vec<f32> {
    let total = (duration_secs * sample_rate as f32).round() as usize;
    let mut out = silence(total);
    if interval_secs <= 0.0 {
        return out;
    }

    let click_len = ((CLICK_SECS * sample_rate as f32) as usize).max(1);
    let mut at = offset_secs;
    while at < duration_secs {
        let start = (at * sample_rate as f32).round() as usize;
        for i in 0..click_len {
            let Some(slot) = out.get_mut(start + i) else {
                break;
            };
            let decay = 1.0 - i as f32 / click_len as f32;
            let polarity = if i % 2 == 0 { 1.0 } else { -1.0 };
            *slot = amplitude * decay * polarity;
        }
        at += interval_secs;
    }
    out
}

/// Tone that follows a track's reference contour for `duration_secs`
///
/// Frequency is re-evaluated every sample and the phase accumulated, so the
/// glides between contour points stay continuous.
pub fn contour_tone(
    track: &ReferenceTrack,
    sample_rate: u32,
    duration_secs: f32,
    amplitude: f32,
) -> Vec<f32> {
    contour_tone_scaled(track, sample_rate, duration_secs, amplitude, 1.0)
}

/// Like [`contour_tone`], with every frequency multiplied by `ratio`
pub fn contour_tone_scaled(
    track: &ReferenceTrack,
    sample_rate: u32,
    duration_secs: f32,
    amplitude: f32,
    ratio: f32,
) -> Vec<f32> {
    let total = (duration_secs * sample_rate as f32).round() as usize;
    let mut phase = 0.0_f32;
    let mut out = Vec::with_capacity(total);
    for i in 0..total {
        let t = i as f64 / sample_rate as f64;
        let freq = track.expected_pitch_at(t).unwrap_or(0.0) * ratio;
        out.push(amplitude * phase.sin());
        phase += 2.0 * PI * freq / sample_rate as f32;
        if phase > 2.0 * PI {
            phase -= 2.0 * PI;
        }
    }
    out
}

/// Sample-wise sum of two signals, padded to the longer one
pub fn mix(a: &[f32], b: &[f32]) -> Vec<f32> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0.0) + b.get(i).copied().unwrap_or(0.0))
        .collect()
}
