//! Desktop refresh loop.
//!
//! Hosts with a display callback call `SessionController::tick` themselves.
//! Headless hosts (the CLI) use `drive`, which ticks on a tokio interval at
//! the refresh rate and skips missed ticks rather than bursting to catch up.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::engine::core::{SessionController, TickOutcome};
use crate::error::TrainingError;

/// Tallies of one driven session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveSummary {
    pub analysed: u64,
    pub skipped: u64,
}

/// Tick `controller` at `refresh_hz` until the session leaves `Running`
///
/// # Returns
/// * `Ok(DriveSummary)` - session stopped by another caller
/// * `Err(TrainingError)` - capture failed; the controller is already idle
pub async fn drive(
    controller: Arc<Mutex<SessionController>>,
    refresh_hz: u32,
) -> Result<DriveSummary, TrainingError> {
    let period = Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut summary = DriveSummary::default();

    loop {
        ticker.tick().await;

        let outcome = {
            let mut guard = controller.lock().map_err(|_| TrainingError::LockPoisoned {
                component: "SessionController".to_string(),
            })?;
            guard.tick()
        };

        match outcome {
            TickOutcome::Analysed { .. } => summary.analysed += 1,
            TickOutcome::Skipped { .. } => summary.skipped += 1,
            TickOutcome::Idle => {
                tracing::debug!(
                    "[Driver] Session ended after {} ticks ({} skipped)",
                    summary.analysed,
                    summary.skipped
                );
                return Ok(summary);
            }
            TickOutcome::Failed(err) => return Err(err),
        }
    }
}
