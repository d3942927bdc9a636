// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use tokio::sync::broadcast;

use crate::engine::{SessionEvent, TrainingSnapshot};
use crate::visualization::VisualizationFrame;

/// Manages the controller's outbound broadcast channels
///
/// Single Responsibility: Broadcast channel lifecycle and subscription
///
/// Channels are created eagerly so observers can subscribe before the first
/// session starts. Cloning the manager shares the same channels.
///
/// # Channel Types
/// - Snapshots: Session state after every tick and every command
/// - Visualization: Pitch curves and active lyric, one frame per tick
/// - Events: Lifecycle notifications (start, stop, selection, failures)
#[derive(Clone)]
pub struct BroadcastChannelManager {
    snapshots: broadcast::Sender<TrainingSnapshot>,
    visualization: broadcast::Sender<VisualizationFrame>,
    events: broadcast::Sender<SessionEvent>,
}

impl BroadcastChannelManager {
    /// Create all channels
    ///
    /// # Notes
    /// - Snapshot and visualization buffers: 120 messages (two seconds at 60 Hz)
    /// - Event buffer: 64 messages; events are sparse
    /// - Lagged subscribers drop the oldest messages
    pub fn new() -> Self {
        let (snapshots, _) = broadcast::channel(120);
        let (visualization, _) = broadcast::channel(120);
        let (events, _) = broadcast::channel(64);
        Self {
            snapshots,
            visualization,
            events,
        }
    }

    // ========================================================================
    // SNAPSHOT CHANNEL
    // ========================================================================

    /// Publish a snapshot; having no subscribers is not an error
    pub fn publish_snapshot(&self, snapshot: TrainingSnapshot) {
        let _ = self.snapshots.send(snapshot);
    }

    /// Subscribe to session snapshots
    ///
    /// Each subscriber gets an independent receiver and must keep up with
    /// the tick rate or it will lag.
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<TrainingSnapshot> {
        self.snapshots.subscribe()
    }

    // ========================================================================
    // VISUALIZATION CHANNEL
    // ========================================================================

    pub fn publish_visualization(&self, frame: VisualizationFrame) {
        let _ = self.visualization.send(frame);
    }

    pub fn subscribe_visualization(&self) -> broadcast::Receiver<VisualizationFrame> {
        self.visualization.subscribe()
    }

    // ========================================================================
    // EVENT CHANNEL
    // ========================================================================

    pub fn publish_event(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of live snapshot subscribers
    pub fn snapshot_subscribers(&self) -> usize {
        self.snapshots.receiver_count()
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SessionEventKind;

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let manager = BroadcastChannelManager::new();
        manager.publish_event(SessionEvent {
            timestamp_ms: 0,
            kind: SessionEventKind::Started,
        });
        assert_eq!(manager.snapshot_subscribers(), 0);
    }

    #[test]
    fn test_clones_share_channels() {
        let manager = BroadcastChannelManager::new();
        let mut rx = manager.clone().subscribe_events();
        manager.publish_event(SessionEvent {
            timestamp_ms: 42,
            kind: SessionEventKind::Stopped { manual: true },
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.timestamp_ms, 42);
        assert_eq!(event.kind, SessionEventKind::Stopped { manual: true });
    }
}
