//! Visualization feed
//!
//! Pure projection of session state into what a renderer draws each tick:
//! the last few seconds of pitch history as an expected polyline and a set
//! of actual-pitch segments, plus the active lyric line.

use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::session::{PitchSample, TrainingSession};

/// One vertex of a pitch curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub time: f64,
    pub freq: f32,
}

/// Connected run of points
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<PlotPoint>,
}

impl Polyline {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Per-tick renderer payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationFrame {
    pub window_start: f64,
    pub window_end: f64,
    /// Reference contour; entries without an expected value are skipped and
    /// the curve stays connected across them
    pub expected: Polyline,
    /// Detected pitch, broken into a new segment at every unvoiced entry
    pub actual: Vec<Polyline>,
    pub active_lyric: Option<usize>,
    /// Frequency range mapped onto the vertical axis
    pub display_min_hz: f32,
    pub display_max_hz: f32,
}

/// Windowing and gap-breaking over the pitch history
#[derive(Debug, Clone)]
pub struct VisualizationFeed {
    window_secs: f64,
    display_min_hz: f32,
    display_max_hz: f32,
}

impl VisualizationFeed {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            window_secs: config.visualization_window_secs.max(0.0) as f64,
            display_min_hz: config.display_min_hz,
            display_max_hz: config.display_max_hz,
        }
    }

    /// Frame for the session's current state
    pub fn frame(&self, session: &TrainingSession) -> VisualizationFrame {
        self.project(
            session.pitch_history().iter().copied(),
            session.elapsed_secs(),
            session.last_lyric_index(),
        )
    }

    /// Frame from raw history entries ending at `now`
    pub fn project(
        &self,
        history: impl IntoIterator<Item = PitchSample>,
        now: f64,
        active_lyric: Option<usize>,
    ) -> VisualizationFrame {
        let window_start = (now - self.window_secs).max(0.0);

        let mut expected = Polyline::default();
        let mut actual = Vec::new();
        let mut segment = Polyline::default();

        for sample in history
            .into_iter()
            .filter(|sample| sample.time >= window_start && sample.time <= now)
        {
            if let Some(freq) = sample.expected {
                expected.points.push(PlotPoint {
                    time: sample.time,
                    freq,
                });
            }

            match sample.actual {
                Some(freq) => segment.points.push(PlotPoint {
                    time: sample.time,
                    freq,
                }),
                None => {
                    if !segment.is_empty() {
                        actual.push(std::mem::take(&mut segment));
                    }
                }
            }
        }
        if !segment.is_empty() {
            actual.push(segment);
        }

        VisualizationFrame {
            window_start,
            window_end: now,
            expected,
            actual,
            active_lyric,
            display_min_hz: self.display_min_hz,
            display_max_hz: self.display_max_hz,
        }
    }
}

impl Default for VisualizationFeed {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}
