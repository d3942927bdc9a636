//! Offline replay harness for deterministic CLI and CI runs.
//!
//! A WAV recording is streamed through a real `SessionController` backed by
//! the synthetic capture backend and a manual clock: each tick pushes one
//! refresh interval of audio, advances the clock by exactly that much and
//! runs the analysis loop. The session is stopped manually at the end of the
//! file, so the report carries final scores. Optional JSON expectations bound
//! those scores for regression checks.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::SilentPlayback;
use crate::config::AppConfig;
use crate::engine::{ManualTimeSource, SessionController, SyntheticBackend, TickOutcome};
use crate::library::TrackLibrary;
use crate::scoring::ScoreCard;

/// Tick rate used when the caller does not pick one
pub const DEFAULT_TICK_HZ: u32 = 60;

/// Decoded replay input
#[derive(Debug, Clone)]
pub struct ReplayAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Outcome of one replayed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub genre: String,
    pub track_id: String,
    pub duration_secs: f64,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub voiced_ticks: u64,
    pub beats_detected: u64,
    pub mean_pitch_hz: Option<f32>,
    pub final_scores: ScoreCard,
    pub clip_secs: Option<f32>,
}

impl ReplayReport {
    /// Share of analysed ticks with a detected pitch
    pub fn voiced_ratio(&self) -> f32 {
        if self.ticks == 0 {
            0.0
        } else {
            self.voiced_ticks as f32 / self.ticks as f32
        }
    }
}

/// Streams recorded audio through a controller at a fixed tick rate
pub struct SessionReplay {
    config: AppConfig,
    library: Arc<TrackLibrary>,
    tick_hz: u32,
}

impl SessionReplay {
    pub fn new(mut config: AppConfig, library: Arc<TrackLibrary>) -> Self {
        // Replays must not race a drain thread against the manual clock
        config.audio.background_pump = false;
        Self {
            config,
            library,
            tick_hz: DEFAULT_TICK_HZ,
        }
    }

    pub fn with_tick_rate(mut self, tick_hz: u32) -> Self {
        if tick_hz > 0 {
            self.tick_hz = tick_hz;
        }
        self
    }

    /// Config whose capture pool holds one whole tick of audio
    ///
    /// The pump is off during replays, so each chunk sits in the pool until
    /// the tick drains it.
    fn config_for_chunk(&self, chunk: usize) -> AppConfig {
        let mut config = self.config.clone();
        let needed = chunk.div_ceil(config.audio.buffer_size.max(1));
        if needed > config.audio.buffer_pool_size {
            log::debug!(
                "[SessionReplay] Growing capture pool to {} buffers for {}-sample ticks",
                needed,
                chunk
            );
            config.audio.buffer_pool_size = needed;
        }
        config
    }

    /// Replay a WAV file
    pub fn run_file<P: AsRef<Path>>(&self, path: P, genre: &str, track_id: &str) -> Result<ReplayReport> {
        let audio = read_wav(path.as_ref())?;
        self.run(&audio, genre, track_id)
    }

    /// Replay decoded samples against `genre`/`track_id`
    pub fn run(&self, audio: &ReplayAudio, genre: &str, track_id: &str) -> Result<ReplayReport> {
        if audio.sample_rate == 0 {
            return Err(anyhow!("replay audio has a zero sample rate"));
        }

        let chunk = ((audio.sample_rate as f64 / self.tick_hz as f64).round() as usize).max(1);
        let config = self.config_for_chunk(chunk);

        let backend = SyntheticBackend::new(audio.sample_rate);
        let feeder = backend.feeder();
        let clock = Arc::new(ManualTimeSource::new());
        let mut controller = SessionController::new(
            config,
            Arc::clone(&self.library),
            Arc::new(backend),
            Box::new(SilentPlayback::new()),
            clock.clone(),
        )
        .context("creating replay controller")?;

        controller
            .select_genre(genre, false)
            .with_context(|| format!("selecting genre {}", genre))?;
        controller
            .select_track(track_id)
            .with_context(|| format!("selecting track {}", track_id))?;
        controller.start().context("starting replay session")?;

        let mut report = ReplayReport {
            genre: genre.to_string(),
            track_id: track_id.to_string(),
            duration_secs: audio.samples.len() as f64 / audio.sample_rate as f64,
            ticks: 0,
            skipped_ticks: 0,
            voiced_ticks: 0,
            beats_detected: 0,
            mean_pitch_hz: None,
            final_scores: ScoreCard::unset(),
            clip_secs: None,
        };
        let mut pitch_sum = 0.0_f64;

        for block in audio.samples.chunks(chunk) {
            let accepted = feeder.push(block);
            if accepted != block.len() {
                return Err(anyhow!(
                    "capture queue accepted {} of {} samples at tick {}",
                    accepted,
                    block.len(),
                    report.ticks + report.skipped_ticks + 1
                ));
            }
            clock.advance(Duration::from_secs_f64(
                block.len() as f64 / audio.sample_rate as f64,
            ));

            match controller.tick() {
                TickOutcome::Analysed { readings, .. } => {
                    report.ticks += 1;
                    if let Some(pitch) = readings.pitch {
                        report.voiced_ticks += 1;
                        pitch_sum += pitch as f64;
                    }
                    if readings.beat_detected {
                        report.beats_detected += 1;
                    }
                }
                TickOutcome::Skipped { .. } => report.skipped_ticks += 1,
                TickOutcome::Idle => break,
                TickOutcome::Failed(err) => {
                    return Err(anyhow!(err).context("replay capture failed"));
                }
            }
        }

        report.final_scores = controller
            .stop()
            .ok_or_else(|| anyhow!("replay session was not running at end of input"))?;
        report.clip_secs = controller.recording().map(|clip| clip.duration_secs);
        if report.voiced_ticks > 0 {
            report.mean_pitch_hz = Some((pitch_sum / report.voiced_ticks as f64) as f32);
        }

        log::info!(
            "[SessionReplay] {} / {}: {} ticks, {} voiced, scores [{}]",
            report.genre,
            report.track_id,
            report.ticks,
            report.voiced_ticks,
            report.final_scores
        );
        Ok(report)
    }
}

/// Inclusive score bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    #[serde(default)]
    pub min: u8,
    #[serde(default = "default_max_score")]
    pub max: u8,
}

fn default_max_score() -> u8 {
    100
}

impl ScoreRange {
    pub fn contains(&self, score: u8) -> bool {
        score >= self.min && score <= self.max
    }
}

/// JSON expectation schema for replay verification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayExpectations {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub pitch: Option<ScoreRange>,
    #[serde(default)]
    pub rhythm: Option<ScoreRange>,
    #[serde(default)]
    pub pronunciation: Option<ScoreRange>,
    /// Lower bound on the share of voiced ticks
    #[serde(default)]
    pub min_voiced_ratio: Option<f32>,
}

impl ReplayExpectations {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading expectation {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn verify(&self, report: &ReplayReport) -> std::result::Result<(), ExpectationDiff> {
        let mut failures = Vec::new();

        let scores = [
            ("pitch", self.pitch, report.final_scores.pitch),
            ("rhythm", self.rhythm, report.final_scores.rhythm),
            (
                "pronunciation",
                self.pronunciation,
                report.final_scores.pronunciation,
            ),
        ];
        for (metric, range, actual) in scores {
            let Some(range) = range else {
                continue;
            };
            if !actual.map(|score| range.contains(score)).unwrap_or(false) {
                failures.push(ExpectationFailure {
                    metric: metric.to_string(),
                    expected: format!("{}..={}", range.min, range.max),
                    actual: actual.map(f32::from),
                });
            }
        }

        if let Some(min_ratio) = self.min_voiced_ratio {
            let ratio = report.voiced_ratio();
            if ratio < min_ratio {
                failures.push(ExpectationFailure {
                    metric: "voiced_ratio".to_string(),
                    expected: format!(">= {:.2}", min_ratio),
                    actual: Some(ratio),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff { failures })
        }
    }
}

/// Outcome of comparing a report with expectations
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationDiff {
    pub failures: Vec<ExpectationFailure>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failures": self.failures.iter().map(|failure| {
                serde_json::json!({
                    "metric": failure.metric,
                    "expected": failure.expected,
                    "actual": failure.actual,
                })
            }).collect::<Vec<_>>()
        })
    }
}

/// Detailed diff entry for a single failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationFailure {
    pub metric: String,
    pub expected: String,
    pub actual: Option<f32>,
}

/// Decode a WAV file to mono f32, keeping the first channel
pub fn read_wav(path: &Path) -> Result<ReplayAudio> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            match spec.bits_per_sample {
                8 | 16 | 24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| {
                        sample
                            .map(|value| value as f32 / max)
                            .map_err(|err| anyhow!(err))
                    })
                    .collect::<Result<Vec<f32>>>()?,
                other => {
                    return Err(anyhow!(
                        "Unsupported bits per sample {} in {}",
                        other,
                        path.display()
                    ))
                }
            }
        }
    };

    let samples = interleaved.chunks(channels).map(|frame| frame[0]).collect();
    Ok(ReplayAudio {
        sample_rate: spec.sample_rate,
        samples,
    })
}
