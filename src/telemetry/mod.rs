//! Process-wide diagnostics for the training engine.
//!
//! One global hub records tick latency, capture queue fill, capture and
//! session milestones, rejected frames and finished-session summaries. The
//! most recent events are kept in a bounded log for `/metrics` and the CLI;
//! live observers can subscribe to the broadcast feed.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub mod events;

pub use events::{DiagnosticError, LifecyclePhase, MetricEvent};

use crate::scoring::ScoreCard;

static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Fill changes smaller than this many percentage points are not reported
const QUEUE_FILL_STEP: f32 = 2.5;

/// Point-in-time view of the hub for reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    /// Events pushed out of the bounded log
    pub evicted_events: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub errors: BTreeMap<DiagnosticError, u64>,
}

/// Recover poisoned locks; diagnostics never abort the analysis loop.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bounded in-memory log with eviction count
struct EventLog {
    events: VecDeque<MetricEvent>,
    capacity: usize,
    evicted: u64,
}

impl EventLog {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    fn push(&mut self, event: MetricEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }
}

/// Rolling window of tick durations with a running sum
struct LatencyWindow {
    samples: VecDeque<f32>,
    capacity: usize,
    sum: f32,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// Add one sample and return (avg, max, count) over the window
    fn observe(&mut self, micros: f32) -> (f32, f32, usize) {
        if self.samples.len() == self.capacity {
            if let Some(evicted) = self.samples.pop_front() {
                self.sum -= evicted;
            }
        }
        let micros = micros.abs();
        self.samples.push_back(micros);
        self.sum += micros;

        let count = self.samples.len();
        let max = self.samples.iter().copied().fold(0.0_f32, f32::max);
        (self.sum / count as f32, max, count)
    }
}

/// Global diagnostics state
pub struct TelemetryHub {
    tx: broadcast::Sender<MetricEvent>,
    log: Mutex<EventLog>,
    latency: Mutex<LatencyWindow>,
    queue_fill: Mutex<HashMap<&'static str, f32>>,
    errors: Mutex<BTreeMap<DiagnosticError, u64>>,
    /// Tick latency is summarised once per this many ticks
    latency_report_every: u64,
    ticks: AtomicU64,
    total_events: AtomicU64,
    sessions_started: AtomicU64,
    sessions_completed: AtomicU64,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, log_capacity: usize, latency_window: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            tx,
            log: Mutex::new(EventLog::new(log_capacity)),
            latency: Mutex::new(LatencyWindow::new(latency_window)),
            queue_fill: Mutex::new(HashMap::new()),
            errors: Mutex::new(BTreeMap::new()),
            latency_report_every: latency_window.max(1) as u64,
            ticks: AtomicU64::new(0),
            total_events: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
        }
    }

    fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        lock_recovering(&self.log).push(event.clone());
        let _ = self.tx.send(event);
    }

    /// Live feed of every recorded event
    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let log = lock_recovering(&self.log);
        TelemetrySnapshot {
            recent: log.events.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            evicted_events: log.evicted,
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            errors: lock_recovering(&self.errors).clone(),
        }
    }

    /// Observe how long one analysis tick took.
    ///
    /// Only one summary per latency window is logged; at the refresh rate a
    /// per-tick event would evict everything else.
    pub fn record_tick_latency(&self, micros: f32) {
        let (avg_us, max_us, sample_count) = lock_recovering(&self.latency).observe(micros);
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % self.latency_report_every == 0 {
            self.publish(MetricEvent::TickLatency {
                avg_us,
                max_us,
                sample_count,
            });
        }
    }

    pub fn record_queue_fill(&self, channel: &'static str, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        {
            let mut last = lock_recovering(&self.queue_fill);
            match last.get(channel) {
                Some(previous) if (previous - percent).abs() < QUEUE_FILL_STEP => return,
                _ => {
                    last.insert(channel, percent);
                }
            }
        }
        self.publish(MetricEvent::QueueFill {
            channel: channel.to_string(),
            percent,
        });
    }

    pub fn record_lifecycle(&self, phase: LifecyclePhase) {
        if phase == LifecyclePhase::SessionStarted {
            self.sessions_started.fetch_add(1, Ordering::Relaxed);
        }
        self.publish(MetricEvent::Lifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        *lock_recovering(&self.errors).entry(code).or_insert(0) += 1;
        self.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }

    pub fn record_session_summary(
        &self,
        genre: &str,
        track_id: &str,
        elapsed_secs: f64,
        scores: ScoreCard,
    ) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        self.publish(MetricEvent::SessionSummary {
            genre: genre.to_string(),
            track_id: track_id.to_string(),
            elapsed_secs,
            scores,
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle(hub: &TelemetryHub) -> Vec<LifecyclePhase> {
        hub.snapshot()
            .recent
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::Lifecycle { phase, .. } => Some(phase),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn log_evicts_oldest_when_full() {
        let hub = TelemetryHub::new(8, 2, 4);
        hub.record_lifecycle(LifecyclePhase::CaptureRequested);
        hub.record_lifecycle(LifecyclePhase::CaptureOpened);
        hub.record_lifecycle(LifecyclePhase::SessionStarted);

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.evicted_events, 1);
        assert_eq!(
            lifecycle(&hub),
            vec![LifecyclePhase::CaptureOpened, LifecyclePhase::SessionStarted]
        );
    }

    #[test]
    fn tick_latency_is_summarised_per_window() {
        let hub = TelemetryHub::new(8, 16, 4);
        for micros in [100.0, 300.0, 200.0, 400.0, 50.0] {
            hub.record_tick_latency(micros);
        }

        let summaries: Vec<MetricEvent> = hub
            .snapshot()
            .recent
            .into_iter()
            .filter(|event| matches!(event, MetricEvent::TickLatency { .. }))
            .collect();
        assert_eq!(
            summaries,
            vec![MetricEvent::TickLatency {
                avg_us: 250.0,
                max_us: 400.0,
                sample_count: 4,
            }]
        );
    }

    #[test]
    fn latency_window_drops_old_samples_from_average() {
        let mut window = LatencyWindow::new(2);
        window.observe(100.0);
        window.observe(300.0);
        let (avg, max, count) = window.observe(500.0);
        assert_eq!(count, 2);
        assert!((avg - 400.0).abs() < 1e-3);
        assert_eq!(max, 500.0);
    }

    #[test]
    fn queue_fill_ignores_small_changes() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_queue_fill("capture_queue", 10.0);
        hub.record_queue_fill("capture_queue", 11.0);
        hub.record_queue_fill("capture_queue", 25.0);
        hub.record_queue_fill("capture_queue", 140.0);

        let fills: Vec<f32> = hub
            .snapshot()
            .recent
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::QueueFill { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(fills, vec![10.0, 25.0, 100.0]);
    }

    #[test]
    fn errors_are_counted_per_code() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_error(DiagnosticError::FrameRejected, "tick 12");
        hub.record_error(DiagnosticError::FrameRejected, "tick 13");
        hub.record_error(DiagnosticError::CaptureStream, "stream ended");

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.errors.get(&DiagnosticError::FrameRejected), Some(&2));
        assert_eq!(snapshot.errors.get(&DiagnosticError::CaptureStream), Some(&1));
        assert_eq!(
            snapshot.recent[0],
            MetricEvent::Error {
                code: DiagnosticError::FrameRejected,
                context: "tick 12".to_string()
            }
        );
    }

    #[test]
    fn session_counters_follow_lifecycle_and_summaries() {
        let hub = TelemetryHub::new(8, 8, 4);
        let mut feed = hub.subscribe();
        hub.record_lifecycle(LifecyclePhase::SessionStarted);
        hub.record_session_summary("baiju", "baiju-qinhuai", 12.5, ScoreCard::default());

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.sessions_started, 1);
        assert_eq!(snapshot.sessions_completed, 1);
        assert!(matches!(
            feed.try_recv(),
            Ok(MetricEvent::Lifecycle {
                phase: LifecyclePhase::SessionStarted,
                ..
            })
        ));
        assert!(matches!(
            feed.try_recv(),
            Ok(MetricEvent::SessionSummary { .. })
        ));
    }
}
