//! Scoring engine
//!
//! Reduces the three rolling metric buffers to 0-100 scores. The mapping is
//! linear with empirical coefficients taken from [`ScoringConfig`]:
//!
//! | score          | formula                                      | default          |
//! |----------------|----------------------------------------------|------------------|
//! | pitch          | `100 - mean(pitch_error) * pitch_error_weight` | weight 450       |
//! | rhythm         | `100 - mean(beat_diff) * beat_diff_weight`     | weight 400       |
//! | pronunciation  | `baseline + mean(clarity) * clarity_weight`    | 60 + 50 × clarity |
//!
//! Results are clamped to 0..=100 and rounded half away from zero. A metric
//! with no samples stays unset while live and resolves to `untested_score`
//! when a session is finalized.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::session::MetricBuffers;

/// Three optional scores; `None` renders as "-"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreCard {
    pub pitch: Option<u8>,
    pub rhythm: Option<u8>,
    pub pronunciation: Option<u8>,
}

impl ScoreCard {
    /// Card with no scores set
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.pitch.is_some() && self.rhythm.is_some() && self.pronunciation.is_some()
    }
}

fn display_score(score: Option<u8>) -> String {
    score
        .map(|value| value.to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for ScoreCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pitch {} | rhythm {} | pronunciation {}",
            display_score(self.pitch),
            display_score(self.rhythm),
            display_score(self.pronunciation)
        )
    }
}

/// Pure reducer from metric buffers to scores
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Scores from the current buffers, unset where a buffer is empty
    pub fn live(&self, metrics: &MetricBuffers) -> ScoreCard {
        ScoreCard {
            pitch: metrics
                .pitch_error
                .mean()
                .map(|error| to_score(100.0 - error * self.config.pitch_error_weight)),
            rhythm: metrics
                .beat_diff
                .mean()
                .map(|diff| to_score(100.0 - diff * self.config.beat_diff_weight)),
            pronunciation: metrics.clarity.mean().map(|clarity| {
                to_score(self.config.pronunciation_baseline + clarity * self.config.clarity_weight)
            }),
        }
    }

    /// Final card for a manually stopped session; unset scores become untested
    pub fn finalize(&self, metrics: &MetricBuffers) -> ScoreCard {
        let live = self.live(metrics);
        let untested = self.config.untested_score.min(100);
        ScoreCard {
            pitch: Some(live.pitch.unwrap_or(untested)),
            rhythm: Some(live.rhythm.unwrap_or(untested)),
            pronunciation: Some(live.pronunciation.unwrap_or(untested)),
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

/// Clamp to 0..=100 and round half away from zero
fn to_score(raw: f32) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0).round() as u8
}
