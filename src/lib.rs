// Vocal Trainer Core - real-time singing practice engine
// Microphone capture, pitch/tempo/clarity analysis and live scoring

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod http;
pub mod library;
pub mod managers;
pub mod scoring;
pub mod session;
pub mod telemetry;
pub mod testing;
pub mod visualization;

// Re-exports for convenience
pub use config::AppConfig;
pub use engine::{
    SessionController, SessionEvent, SessionEventKind, SessionPhase, TickOutcome,
    TrainingSnapshot,
};
pub use error::{ErrorCode, LibraryError, TrainingError};
pub use library::{Genre, GenreInfo, ReferenceTrack, TrackLibrary};
pub use scoring::ScoreCard;

/// Environment variable selecting the log level (`error` .. `trace`)
pub const LOG_LEVEL_ENV: &str = "VOCAL_TRAINER_LOG";

/// Install the tracing subscriber for desktop hosts.
///
/// Logs go to stderr so CLI JSON on stdout stays machine-readable.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging() {
    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|raw| raw.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);

    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        log::info!("[VocalTrainer] Logging initialised at {}", level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
