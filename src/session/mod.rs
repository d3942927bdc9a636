//! Training session state
//!
//! A single mutable session owned by the controller. Estimators return
//! readings; only [`TrainingSession::record_tick`] writes them in.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::analysis::FrameReadings;
use crate::analysis::tempo::beat_deviation;
use crate::config::AppConfig;
use crate::library::ReferenceTrack;
use crate::scoring::ScoreCard;

mod buffers;

pub use buffers::{MetricBuffers, RollingBuffer};

/// One pitch-history entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchSample {
    /// Seconds since session start
    pub time: f64,
    /// Detected pitch, `None` when the tick was unvoiced
    pub actual: Option<f32>,
    /// Reference pitch at `time`, `None` when the track has no contour
    pub expected: Option<f32>,
}

/// Latest scalar readouts for display
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LiveReadouts {
    pub pitch_hz: Option<f32>,
    pub tempo_bpm: Option<f32>,
    pub clarity: Option<f32>,
}

/// What changed in the session during one recorded tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRecord {
    pub lyric_index: Option<usize>,
    pub lyric_changed: bool,
}

#[derive(Debug, Clone)]
pub struct TrainingSession {
    genre: String,
    track: Arc<ReferenceTrack>,
    is_training: bool,
    started_at: Option<Instant>,
    elapsed_secs: f64,
    expected_beat_interval: f64,
    metrics: MetricBuffers,
    pitch_history: RollingBuffer<PitchSample>,
    beat_times: RollingBuffer<f64>,
    last_lyric_index: Option<usize>,
    scores: ScoreCard,
    readouts: LiveReadouts,
}

impl TrainingSession {
    pub fn new(genre: impl Into<String>, track: Arc<ReferenceTrack>, config: &AppConfig) -> Self {
        let expected_beat_interval = track.expected_beat_interval();
        Self {
            genre: genre.into(),
            track,
            is_training: false,
            started_at: None,
            elapsed_secs: 0.0,
            expected_beat_interval,
            metrics: MetricBuffers::new(config.session.metric_capacity),
            pitch_history: RollingBuffer::new(config.session.history_capacity),
            beat_times: RollingBuffer::new(config.tempo.beat_capacity),
            last_lyric_index: None,
            scores: ScoreCard::unset(),
            readouts: LiveReadouts::default(),
        }
    }

    /// Clear every per-session buffer, the lyric cursor and the scoreboard
    pub fn reset(&mut self) {
        self.metrics.clear();
        self.pitch_history.clear();
        self.beat_times.clear();
        self.last_lyric_index = None;
        self.elapsed_secs = 0.0;
        self.scores = ScoreCard::unset();
        self.readouts = LiveReadouts::default();
    }

    /// Switch reference track; buffers restart for the new track
    pub fn set_track(&mut self, genre: impl Into<String>, track: Arc<ReferenceTrack>) {
        self.genre = genre.into();
        self.expected_beat_interval = track.expected_beat_interval();
        self.track = track;
        self.reset();
    }

    pub fn set_genre(&mut self, genre: impl Into<String>) {
        self.genre = genre.into();
    }

    /// Mark the session running from `started_at` with fresh buffers
    pub fn begin(&mut self, started_at: Instant) {
        self.reset();
        self.started_at = Some(started_at);
        self.is_training = true;
    }

    /// Mark the session stopped, freezing elapsed time at `now`
    pub fn end(&mut self, now: Instant) {
        if let Some(started_at) = self.started_at {
            self.elapsed_secs = now.saturating_duration_since(started_at).as_secs_f64();
        }
        self.is_training = false;
    }

    /// Seconds since `begin`, measured at `now`
    pub fn elapsed_at(&self, now: Instant) -> f64 {
        self.started_at
            .map(|started_at| now.saturating_duration_since(started_at).as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Write one tick's readings into the session buffers
    pub fn record_tick(&mut self, elapsed: f64, readings: &FrameReadings) -> TickRecord {
        self.elapsed_secs = elapsed;

        let expected = self.track.expected_pitch_at(elapsed);
        self.pitch_history.push(PitchSample {
            time: elapsed,
            actual: readings.pitch,
            expected,
        });

        if let (Some(actual), Some(expected)) = (readings.pitch, expected) {
            if expected > 0.0 {
                self.metrics
                    .pitch_error
                    .push((actual - expected).abs() / expected);
            }
        }

        if let Some(tempo) = readings.tempo {
            if let Some(diff) = beat_deviation(tempo.mean_interval, self.expected_beat_interval) {
                self.metrics.beat_diff.push(diff);
            }
        }

        self.metrics.clarity.push(readings.clarity);

        self.readouts = LiveReadouts {
            pitch_hz: readings.pitch,
            tempo_bpm: readings.tempo.map(|t| t.bpm),
            clarity: Some(readings.clarity),
        };

        let lyric_index = self.track.lyric_index_at(elapsed);
        let lyric_changed = lyric_index != self.last_lyric_index;
        self.last_lyric_index = lyric_index;

        TickRecord {
            lyric_index,
            lyric_changed,
        }
    }

    pub fn set_scores(&mut self, scores: ScoreCard) {
        self.scores = scores;
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    pub fn track(&self) -> &Arc<ReferenceTrack> {
        &self.track
    }

    pub fn is_training(&self) -> bool {
        self.is_training
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn expected_beat_interval(&self) -> f64 {
        self.expected_beat_interval
    }

    pub fn metrics(&self) -> &MetricBuffers {
        &self.metrics
    }

    pub fn pitch_history(&self) -> &RollingBuffer<PitchSample> {
        &self.pitch_history
    }

    pub fn beat_times(&self) -> &RollingBuffer<f64> {
        &self.beat_times
    }

    /// Beat buffer handed to the tempo estimator during a tick
    pub(crate) fn beat_times_mut(&mut self) -> &mut RollingBuffer<f64> {
        &mut self.beat_times
    }

    pub fn last_lyric_index(&self) -> Option<usize> {
        self.last_lyric_index
    }

    pub fn scores(&self) -> ScoreCard {
        self.scores
    }

    pub fn readouts(&self) -> LiveReadouts {
        self.readouts
    }
}

/// `MM:SS` rendering of elapsed seconds
pub fn format_elapsed(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TempoReading;
    use crate::library::TrackLibrary;
    use std::time::Duration;

    fn session() -> TrainingSession {
        let library = TrackLibrary::builtin().unwrap();
        let track = library.get_track("baiju", "baiju-qinhuai").unwrap();
        TrainingSession::new("baiju", track, &AppConfig::default())
    }

    fn readings(pitch: Option<f32>, tempo: Option<TempoReading>, clarity: f32) -> FrameReadings {
        FrameReadings {
            pitch,
            beat_detected: false,
            tempo,
            clarity,
        }
    }

    #[test]
    fn test_expected_beat_interval_from_tempo() {
        let session = session();
        assert!((session.expected_beat_interval() - 60.0 / 72.0).abs() < 1e-9);
    }

    #[test]
    fn test_pitch_error_only_when_voiced() {
        let mut session = session();
        let expected = session.track().expected_pitch_at(0.5).unwrap();

        session.record_tick(0.5, &readings(None, None, 0.4));
        assert!(session.metrics().pitch_error.is_empty());
        assert_eq!(session.pitch_history().len(), 1);
        assert_eq!(session.pitch_history().last().unwrap().actual, None);

        session.record_tick(0.6, &readings(Some(expected * 1.1), None, 0.4));
        assert_eq!(session.metrics().pitch_error.len(), 1);
        assert_eq!(session.metrics().clarity.len(), 2);
    }

    #[test]
    fn test_beat_diff_recorded_with_tempo() {
        let mut session = session();
        let expected = session.expected_beat_interval();
        let tempo = TempoReading {
            bpm: 60.0,
            mean_interval: expected * 1.2,
            beat_count: 3,
        };
        session.record_tick(1.0, &readings(None, Some(tempo), 0.5));
        let diff = *session.metrics().beat_diff.last().unwrap();
        assert!((diff - 0.2).abs() < 1e-5);
        assert_eq!(session.readouts().tempo_bpm, Some(60.0));
    }

    #[test]
    fn test_lyric_change_reported_once() {
        let mut session = session();
        let first = session.record_tick(0.1, &readings(None, None, 0.0));
        assert!(first.lyric_changed);
        assert_eq!(first.lyric_index, Some(0));

        let same = session.record_tick(0.2, &readings(None, None, 0.0));
        assert!(!same.lyric_changed);

        let next_start = session.track().lyrics[1].start;
        let next = session.record_tick(next_start, &readings(None, None, 0.0));
        assert!(next.lyric_changed);
        assert_eq!(next.lyric_index, Some(1));
    }

    #[test]
    fn test_history_capacity_is_enforced() {
        let mut session = session();
        for i in 0..700 {
            session.record_tick(i as f64 / 60.0, &readings(None, None, 0.2));
        }
        assert_eq!(session.pitch_history().len(), 600);
        assert_eq!(session.metrics().clarity.len(), 200);
    }

    #[test]
    fn test_set_track_resets_everything() {
        let library = TrackLibrary::builtin().unwrap();
        let mut session = session();
        session.record_tick(0.5, &readings(Some(300.0), None, 0.6));
        session.beat_times_mut().push(0.5);
        session.set_scores(ScoreCard {
            pitch: Some(80),
            rhythm: None,
            pronunciation: Some(70),
        });

        let other = library.get_track("kunqu", "kunqu-youyuan").unwrap();
        session.set_track("kunqu", other);

        assert!(session.metrics().is_empty());
        assert!(session.pitch_history().is_empty());
        assert!(session.beat_times().is_empty());
        assert_eq!(session.last_lyric_index(), None);
        assert_eq!(session.scores(), ScoreCard::unset());
        assert_eq!(session.genre(), "kunqu");
        assert!((session.expected_beat_interval() - 60.0 / 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_begin_and_end_track_elapsed() {
        let mut session = session();
        let start = Instant::now();
        session.begin(start);
        assert!(session.is_training());
        assert!((session.elapsed_at(start + Duration::from_millis(1500)) - 1.5).abs() < 1e-9);

        session.end(start + Duration::from_secs(3));
        assert!(!session.is_training());
        assert!((session.elapsed_secs() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0.0), "00:00");
        assert_eq!(format_elapsed(61.9), "01:01");
        assert_eq!(format_elapsed(-3.0), "00:00");
        assert_eq!(format_elapsed(3599.0), "59:59");
    }
}
