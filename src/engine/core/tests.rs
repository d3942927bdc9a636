use super::*;

use std::time::Duration;

use crate::audio::{PlaybackAction, SilentPlayback};
use crate::engine::backend::{ManualTimeSource, SyntheticBackend};
use crate::library::{GenreDocument, LyricLine, PitchPoint};
use crate::testing::signals::sine_frame;

const SAMPLE_RATE: u32 = 44_100;
const TICK: Duration = Duration::from_micros(16_667);

struct Harness {
    controller: SessionController,
    backend: SyntheticBackend,
    playback: SilentPlayback,
    clock: Arc<ManualTimeSource>,
}

impl Harness {
    fn new() -> Self {
        Self::with_backend(SyntheticBackend::new(SAMPLE_RATE))
    }

    fn with_backend(backend: SyntheticBackend) -> Self {
        let library = Arc::new(TrackLibrary::builtin().unwrap());
        Self::with_library(backend, library, test_config())
    }

    fn with_library(backend: SyntheticBackend, library: Arc<TrackLibrary>, config: AppConfig) -> Self {
        let playback = SilentPlayback::new();
        let clock = Arc::new(ManualTimeSource::new());
        let controller = SessionController::new(
            config,
            library,
            Arc::new(backend.clone()),
            Box::new(playback.clone()),
            clock.clone(),
        )
        .unwrap();
        Self {
            controller,
            backend,
            playback,
            clock,
        }
    }

    /// Push one refresh interval of tone, advance the clock and tick
    fn sing(&mut self, freq: f32) -> TickOutcome {
        let samples = sine_frame(freq, SAMPLE_RATE, 735, 0.5);
        self.backend.feeder().push(&samples);
        self.clock.advance(TICK);
        self.controller.tick()
    }

    /// Fill the analysis window so the next frame is entirely new audio
    fn prime(&mut self, freq: f32) {
        self.backend
            .feeder()
            .push(&sine_frame(freq, SAMPLE_RATE, 2048, 0.5));
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.audio.background_pump = false;
    config
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

fn simple_track(id: &str) -> ReferenceTrack {
    ReferenceTrack {
        id: id.to_string(),
        title: id.to_uppercase(),
        audio: None,
        tempo: 60.0,
        lyrics: vec![LyricLine {
            text: "la".to_string(),
            start: 0.0,
            end: 4.0,
        }],
        pitch_contour: vec![
            PitchPoint {
                time: 0.0,
                freq: 200.0,
            },
            PitchPoint {
                time: 4.0,
                freq: 240.0,
            },
        ],
    }
}

#[test]
fn test_controller_starts_idle_on_default_genre() {
    let harness = Harness::new();
    let snapshot = harness.controller.snapshot();

    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert!(!snapshot.is_training);
    assert_eq!(snapshot.genre, "baiju");
    assert_eq!(snapshot.track_id, "baiju-qinhuai");
    assert_eq!(snapshot.scores, ScoreCard::unset());
    assert_eq!(snapshot.elapsed_text, "00:00");
    assert!(matches!(
        harness.playback.actions().first(),
        Some(PlaybackAction::Load(Some(_)))
    ));
}

#[test]
fn test_start_tick_stop_lifecycle() {
    let mut harness = Harness::new();
    harness.controller.start().unwrap();

    assert_eq!(harness.controller.phase(), SessionPhase::Running);
    assert_eq!(harness.backend.live_captures(), 1);
    assert!(harness.playback.is_reference_playing());

    harness.prime(220.0);
    match harness.sing(220.0) {
        TickOutcome::Analysed { snapshot, readings } => {
            let pitch = readings.pitch.unwrap();
            assert!((pitch - 220.0).abs() < 220.0 * 0.02, "pitch {}", pitch);
            assert_eq!(snapshot.readouts.pitch_hz, readings.pitch);
            assert!(snapshot.scores.pitch.is_some());
            assert_eq!(snapshot.active_lyric, Some(0));
        }
        other => panic!("unexpected tick outcome {:?}", other),
    }

    let scores = harness.controller.stop().unwrap();
    assert!(scores.is_complete());
    assert_eq!(harness.controller.phase(), SessionPhase::Idle);
    assert_eq!(harness.backend.live_captures(), 0);
    assert!(!harness.playback.is_reference_playing());
    assert!(harness.controller.recording().is_some());
    assert!(harness.controller.snapshot().has_recording);
}

#[test]
fn test_stop_is_idempotent() {
    let mut harness = Harness::new();
    assert_eq!(harness.controller.stop(), None);

    harness.controller.start().unwrap();
    assert!(harness.controller.stop().is_some());
    assert_eq!(harness.controller.stop(), None);
    assert_eq!(harness.backend.live_captures(), 0);
}

#[test]
fn test_double_start_holds_one_capture() {
    let mut harness = Harness::new();
    let mut events = harness.controller.event_receiver();

    harness.controller.start().unwrap();
    harness.controller.start().unwrap();

    assert_eq!(harness.backend.opened_count(), 2);
    assert_eq!(harness.backend.live_captures(), 1);
    assert_eq!(
        drain_events(&mut events),
        vec![
            SessionEventKind::Started,
            SessionEventKind::Stopped { manual: false },
            SessionEventKind::Started,
        ]
    );

    harness.controller.stop();
    assert_eq!(harness.backend.live_captures(), 0);
}

#[test]
fn test_untested_scores_resolve_to_sixty() {
    let mut harness = Harness::new();
    harness.controller.start().unwrap();
    assert_eq!(harness.controller.snapshot().scores, ScoreCard::unset());

    let scores = harness.controller.stop().unwrap();
    assert_eq!(scores.pitch, Some(60));
    assert_eq!(scores.rhythm, Some(60));
    assert_eq!(scores.pronunciation, Some(60));
}

#[test]
fn test_permission_denied_returns_to_idle() {
    let backend = SyntheticBackend::new(SAMPLE_RATE);
    backend.fail_with(Some(TrainingError::PermissionDenied));
    let mut harness = Harness::with_backend(backend);
    let mut events = harness.controller.event_receiver();

    assert_eq!(
        harness.controller.start(),
        Err(TrainingError::PermissionDenied)
    );
    assert_eq!(harness.controller.phase(), SessionPhase::Idle);
    assert_eq!(harness.backend.live_captures(), 0);
    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [SessionEventKind::CaptureFailed { code: 3002, .. }]
    ));

    // Retry succeeds once permission is granted
    harness.backend.fail_with(None);
    harness.controller.start().unwrap();
    assert!(harness.controller.is_training());
}

#[test]
fn test_recording_unsupported_never_opens_capture() {
    let mut harness = Harness::with_backend(SyntheticBackend::without_recording(SAMPLE_RATE));
    assert_eq!(
        harness.controller.start(),
        Err(TrainingError::RecordingUnsupported)
    );
    assert_eq!(harness.backend.opened_count(), 0);
    assert_eq!(harness.controller.phase(), SessionPhase::Idle);
}

#[test]
fn test_start_failures_are_counted_by_their_own_category() {
    let count = |code: DiagnosticError| {
        telemetry::hub()
            .snapshot()
            .errors
            .get(&code)
            .copied()
            .unwrap_or(0)
    };
    let denied_before = count(DiagnosticError::PermissionDenied);
    let unsupported_before = count(DiagnosticError::RecordingUnsupported);

    let backend = SyntheticBackend::new(SAMPLE_RATE);
    backend.fail_with(Some(TrainingError::PermissionDenied));
    let mut denied = Harness::with_backend(backend);
    assert!(denied.controller.start().is_err());

    let mut unsupported =
        Harness::with_backend(SyntheticBackend::without_recording(SAMPLE_RATE));
    assert!(unsupported.controller.start().is_err());

    assert!(count(DiagnosticError::PermissionDenied) > denied_before);
    assert!(count(DiagnosticError::RecordingUnsupported) > unsupported_before);
}

#[test]
fn test_capture_failure_mid_session_stops() {
    let mut harness = Harness::new();
    harness.controller.start().unwrap();
    harness.backend.feeder().fail("device unplugged");

    match harness.controller.tick() {
        TickOutcome::Failed(TrainingError::CaptureFailure { reason }) => {
            assert_eq!(reason, "device unplugged")
        }
        other => panic!("unexpected tick outcome {:?}", other),
    }
    assert_eq!(harness.controller.phase(), SessionPhase::Idle);
    assert_eq!(harness.backend.live_captures(), 0);
    assert_eq!(harness.controller.tick(), TickOutcome::Idle);
}

#[test]
fn test_non_finite_frame_skips_tick_without_stopping() {
    let mut harness = Harness::new();
    harness.controller.start().unwrap();

    harness.backend.feeder().push(&[f32::NAN; 64]);
    assert!(matches!(
        harness.controller.tick(),
        TickOutcome::Skipped { .. }
    ));
    assert_eq!(harness.controller.phase(), SessionPhase::Running);

    harness.prime(330.0);
    assert!(matches!(
        harness.sing(330.0),
        TickOutcome::Analysed { .. }
    ));
}

#[test]
fn test_track_switch_mid_session_resets_state() {
    let mut harness = Harness::new();
    harness.controller.start().unwrap();
    harness.prime(220.0);
    for _ in 0..30 {
        harness.sing(220.0);
    }
    assert!(!harness.controller.session().metrics().is_empty());
    assert!(harness.controller.session().last_lyric_index().is_some());

    harness.controller.select_track("baiju-modern").unwrap();

    let session = harness.controller.session();
    assert_eq!(harness.controller.phase(), SessionPhase::Idle);
    assert_eq!(harness.backend.live_captures(), 0);
    assert_eq!(session.track().id, "baiju-modern");
    assert!(session.metrics().is_empty());
    assert!(session.pitch_history().is_empty());
    assert!(session.beat_times().is_empty());
    assert_eq!(session.last_lyric_index(), None);
    assert_eq!(session.scores(), ScoreCard::unset());
    assert!((session.expected_beat_interval() - 60.0 / 76.0).abs() < 1e-9);
}

#[test]
fn test_unknown_selection_leaves_state_unchanged() {
    let mut harness = Harness::new();
    let before = harness.controller.snapshot();

    assert_eq!(
        harness.controller.select_track("missing"),
        Err(TrainingError::UnknownTrack {
            genre: "baiju".to_string(),
            track: Some("missing".to_string()),
        })
    );
    assert!(harness.controller.select_genre("opera", false).is_err());
    assert_eq!(harness.controller.snapshot(), before);
}

#[test]
fn test_select_genre_applies_first_track() {
    let mut harness = Harness::new();
    harness.controller.select_genre("yangju", true).unwrap();

    let snapshot = harness.controller.snapshot();
    assert_eq!(snapshot.genre, "yangju");
    assert_eq!(snapshot.track_id, "yangju-lotus");
}

#[test]
fn test_select_genre_keeps_shared_track() {
    let library = TrackLibrary::new(vec![
        GenreDocument {
            id: "a".to_string(),
            name: "A".to_string(),
            reference_hint: String::new(),
            tracks: vec![simple_track("one"), simple_track("shared")],
        },
        GenreDocument {
            id: "b".to_string(),
            name: "B".to_string(),
            reference_hint: String::new(),
            tracks: vec![simple_track("two"), simple_track("shared")],
        },
    ])
    .unwrap();
    let mut config = test_config();
    config.session.default_genre = "a".to_string();
    let mut harness = Harness::with_library(
        SyntheticBackend::new(SAMPLE_RATE),
        Arc::new(library),
        config,
    );

    harness.controller.select_track("shared").unwrap();
    harness.controller.select_genre("b", true).unwrap();
    assert_eq!(harness.controller.snapshot().genre, "b");
    assert_eq!(harness.controller.snapshot().track_id, "shared");

    harness.controller.select_genre("a", false).unwrap();
    assert_eq!(harness.controller.snapshot().track_id, "one");
}

#[test]
fn test_play_comparison_requires_recording() {
    let mut harness = Harness::new();
    assert_eq!(
        harness.controller.play_comparison(),
        Err(TrainingError::NoRecording)
    );

    harness.controller.start().unwrap();
    harness.prime(220.0);
    harness.sing(220.0);
    harness.controller.stop();

    harness.controller.play_comparison().unwrap();
    assert!(matches!(
        harness.playback.actions().last(),
        Some(PlaybackAction::Compare {
            reference: Some(_),
            ..
        })
    ));
}

#[test]
fn test_lyric_follows_elapsed_time() {
    let mut harness = Harness::new();
    harness.controller.start().unwrap();

    harness.clock.advance(Duration::from_millis(3_500));
    harness.prime(220.0);
    match harness.sing(220.0) {
        TickOutcome::Analysed { snapshot, .. } => {
            assert_eq!(snapshot.active_lyric, Some(1));
            assert_eq!(snapshot.lyric_text.as_deref(), Some("游人如织喜盈盈。"));
            assert_eq!(snapshot.elapsed_text, "00:03");
        }
        other => panic!("unexpected tick outcome {:?}", other),
    }
}

#[test]
fn test_events_carry_clock_timestamps() {
    let mut harness = Harness::new();
    let mut events = harness.controller.event_receiver();

    harness.clock.advance(Duration::from_secs(2));
    harness.controller.start().unwrap();

    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, SessionEventKind::Started);
    assert_eq!(event.timestamp_ms, 2_000);
    assert_eq!(harness.controller.uptime_ms(), 2_000);
}

#[test]
fn test_snapshots_published_per_tick() {
    let mut harness = Harness::new();
    let mut snapshots = harness.controller.snapshot_receiver();
    let mut frames = harness.controller.broadcasts().subscribe_visualization();

    harness.controller.start().unwrap();
    harness.prime(220.0);
    harness.sing(220.0);

    let mut last = None;
    while let Ok(snapshot) = snapshots.try_recv() {
        last = Some(snapshot);
    }
    let last = last.unwrap();
    assert!(last.is_training);
    assert!(last.readouts.clarity.is_some());

    let mut frame = None;
    while let Ok(next) = frames.try_recv() {
        frame = Some(next);
    }
    let frame = frame.unwrap();
    assert_eq!(frame.expected.len(), 1);
    assert_eq!(frame.actual.len(), 1);
}
