use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use vocal_trainer::config::AppConfig;
use vocal_trainer::engine::{drive, SessionController};
use vocal_trainer::fixtures::{ExpectationDiff, ReplayExpectations, ReplayReport, SessionReplay};
use vocal_trainer::library::TrackLibrary;
use vocal_trainer::scoring::ScoreCard;

#[derive(Parser, Debug)]
#[command(
    name = "vocal_cli",
    about = "Headless front end for the vocal training engine"
)]
struct Cli {
    /// Load the track library from a JSON file instead of the bundled one
    #[arg(long)]
    library: Option<PathBuf>,
    /// Trainer configuration (defaults to VOCAL_TRAINER_CONFIG or assets/trainer_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List genres and their reference tracks
    Tracks {
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Sing along with the microphone and print scores when the session ends
    Train {
        #[arg(long)]
        genre: String,
        #[arg(long)]
        track: Option<String>,
        /// Stop automatically after this many seconds (Ctrl-C stops earlier)
        #[arg(long)]
        seconds: Option<u64>,
        /// Write the session recording to this WAV path
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Replay a WAV file through the engine and optionally check expectations
    Replay {
        #[arg(long)]
        wav: PathBuf,
        #[arg(long)]
        genre: String,
        #[arg(long)]
        track: String,
        #[arg(long)]
        expect: Option<PathBuf>,
        #[arg(long, default_value_t = vocal_trainer::fixtures::DEFAULT_TICK_HZ)]
        tick_hz: u32,
    },
}

fn main() -> ExitCode {
    vocal_trainer::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_else(AppConfig::load);
    let library = Arc::new(match cli.library {
        Some(path) => TrackLibrary::load_from_file(&path)
            .with_context(|| format!("loading library {}", path.display()))?,
        None => TrackLibrary::builtin()?,
    });

    match cli.command {
        Commands::Tracks { genre, json } => run_tracks(&library, genre.as_deref(), json),
        Commands::Train {
            genre,
            track,
            seconds,
            save,
        } => run_train(config, library, &genre, track.as_deref(), seconds, save),
        Commands::Replay {
            wav,
            genre,
            track,
            expect,
            tick_hz,
        } => run_replay(config, library, &wav, &genre, &track, expect, tick_hz),
    }
}

fn run_tracks(library: &TrackLibrary, genre: Option<&str>, json: bool) -> Result<ExitCode> {
    let infos = match genre {
        Some(id) => vec![library
            .genre(id)
            .ok_or_else(|| anyhow!("unknown genre: {id}"))?
            .info()],
        None => library.genres().map(|genre| genre.info()).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(ExitCode::from(0));
    }

    for info in infos {
        println!("{} ({})", info.name, info.id);
        for track in info.tracks {
            println!("  {:<20} {:>5.0} BPM  {}", track.id, track.tempo, track.title);
        }
    }
    Ok(ExitCode::from(0))
}

fn run_train(
    config: AppConfig,
    library: Arc<TrackLibrary>,
    genre: &str,
    track: Option<&str>,
    seconds: Option<u64>,
    save: Option<PathBuf>,
) -> Result<ExitCode> {
    let refresh_hz = config.session.refresh_hz;
    let mut controller = SessionController::desktop(config, library)?;
    controller.select_genre(genre, false)?;
    if let Some(track) = track {
        controller.select_track(track)?;
    }
    vocal_trainer::http::spawn_if_enabled(&controller);

    let mut snapshots = controller.subscribe_snapshots();
    controller.start()?;
    println!(
        "Singing {} / {}. Press Ctrl-C to finish.",
        controller.session().genre(),
        controller.session().track().title
    );

    let shared = Arc::new(Mutex::new(controller));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let drive_result = runtime.block_on(async {
        let driver = tokio::spawn(drive(Arc::clone(&shared), refresh_hz));
        let printer = tokio::spawn(async move {
            let mut last_second = u64::MAX;
            while let Some(snapshot) = snapshots.recv().await {
                let second = snapshot.elapsed_secs as u64;
                if second != last_second {
                    last_second = second;
                    println!(
                        "[{}] {}  {}",
                        snapshot.elapsed_text,
                        snapshot.scores,
                        snapshot.lyric_text.unwrap_or_default()
                    );
                }
            }
        });

        let time_limit = async {
            match seconds {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        let finished = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            _ = time_limit => None,
            result = driver => Some(result),
        };
        printer.abort();
        finished
    });

    let mut controller = shared
        .lock()
        .map_err(|_| anyhow!("session controller lock poisoned"))?;

    if let Some(Ok(Err(err))) = drive_result {
        eprintln!("Session ended: {err}");
        return Ok(ExitCode::from(1));
    }

    let scores = controller.stop().unwrap_or_else(ScoreCard::unset);
    println!("Final: {scores}");

    if let Some(path) = save {
        match controller.recording() {
            Some(clip) => {
                clip.write_to(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Saved {:.1}s recording to {}", clip.duration_secs, path.display());
            }
            None => eprintln!("No recording captured"),
        }
    }
    Ok(ExitCode::from(0))
}

fn run_replay(
    config: AppConfig,
    library: Arc<TrackLibrary>,
    wav: &Path,
    genre: &str,
    track: &str,
    expect: Option<PathBuf>,
    tick_hz: u32,
) -> Result<ExitCode> {
    let replay = SessionReplay::new(config, library).with_tick_rate(tick_hz);
    let report = replay
        .run_file(wav, genre, track)
        .with_context(|| format!("replaying {}", wav.display()))?;

    emit_report(wav, &report)?;

    if let Some(path) = expect {
        let expectations = ReplayExpectations::load(&path)?;
        if let Err(diff) = expectations.verify(&report) {
            emit_diff(&diff)?;
            return Ok(ExitCode::from(2));
        }
    }
    Ok(ExitCode::from(0))
}

fn emit_report(wav: &Path, report: &ReplayReport) -> Result<()> {
    let payload = ReplayReportPayload {
        wav: wav.display().to_string(),
        voiced_ratio: report.voiced_ratio(),
        report,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct ReplayReportPayload<'a> {
    wav: String,
    voiced_ratio: f32,
    #[serde(flatten)]
    report: &'a ReplayReport,
}
