use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use serde_json::Value;
use vocal_trainer::fixtures::{read_wav, SessionReplay};
use vocal_trainer::testing::signals::{contour_tone, silence};
use vocal_trainer::{AppConfig, TrackLibrary};

const SAMPLE_RATE: u32 = 22_050;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_vocal_cli"))
}

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vocal_trainer_{}_{}", std::process::id(), name))
}

fn write_wav(name: &str, samples: &[f32]) -> PathBuf {
    let path = scratch_file(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create WAV");
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize WAV");
    path
}

fn qinhuai_take(name: &str) -> PathBuf {
    let library = TrackLibrary::builtin().expect("builtin library");
    let track = library
        .get_track("baiju", "baiju-qinhuai")
        .expect("bundled track");
    write_wav(name, &contour_tone(&track, SAMPLE_RATE, 3.0, 0.5))
}

#[test]
fn tracks_lists_bundled_genres_as_json() {
    let output = cli()
        .args(["tracks", "--json"])
        .output()
        .expect("failed to run vocal_cli tracks");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let json: Value = serde_json::from_str(stdout.trim()).expect("genre listing JSON");
    let ids: Vec<&str> = json
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|genre| genre["id"].as_str())
        .collect();
    assert!(ids.contains(&"baiju"));
    assert!(ids.contains(&"yangju"));
}

#[test]
fn replay_reports_scores() {
    let wav = qinhuai_take("replay_ok.wav");
    let output = cli()
        .args(["replay", "--genre", "baiju", "--track", "baiju-qinhuai", "--wav"])
        .arg(&wav)
        .output()
        .expect("failed to run vocal_cli replay");
    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status.code()
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let json: Value = serde_json::from_str(stdout.trim()).expect("replay report JSON");
    assert_eq!(json["track_id"], "baiju-qinhuai");
    assert!(json["final_scores"]["pitch"].as_u64().unwrap_or_default() >= 75);
    let _ = std::fs::remove_file(wav);
}

#[test]
fn replay_flags_unmet_expectations() {
    let wav = write_wav("replay_silent.wav", &silence(SAMPLE_RATE as usize * 2));
    let expect = scratch_file("replay_silent.expect.json");
    std::fs::write(
        &expect,
        r#"{ "notes": "silence cannot be voiced", "min_voiced_ratio": 0.5 }"#,
    )
    .expect("write expectation");

    let output = cli()
        .args(["replay", "--genre", "baiju", "--track", "baiju-qinhuai", "--wav"])
        .arg(&wav)
        .arg("--expect")
        .arg(&expect)
        .output()
        .expect("failed to run mismatch replay");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(
        stderr.contains("\"failures\""),
        "expected diff JSON in stderr, got {stderr}"
    );
    let _ = std::fs::remove_file(wav);
    let _ = std::fs::remove_file(expect);
}

#[test]
fn replay_is_deterministic() {
    let wav = qinhuai_take("original.wav");
    let library = Arc::new(TrackLibrary::builtin().expect("builtin library"));
    let replay = SessionReplay::new(AppConfig::default(), library);

    let first = replay
        .run_file(&wav, "baiju", "baiju-qinhuai")
        .expect("first replay");
    assert!((first.clip_secs.expect("clip") - 3.0).abs() < 0.1);

    let audio = read_wav(&wav).expect("read original");
    let second = replay
        .run(&audio, "baiju", "baiju-qinhuai")
        .expect("second replay");
    assert_eq!(first, second);
    let _ = std::fs::remove_file(wav);
}
