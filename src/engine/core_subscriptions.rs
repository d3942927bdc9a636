use futures::Stream;
use tokio::runtime::Builder;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{SessionController, SessionEvent, TrainingSnapshot};
use crate::managers::BroadcastChannelManager;
use crate::visualization::VisualizationFrame;

/// Forward a broadcast receiver into an unbounded mpsc channel
///
/// Runs on its own thread with a current-thread runtime so callers need not
/// be inside a Tokio context. Lagged messages are skipped; the forwarder
/// ends when either side closes.
fn forward<T: Clone + Send + 'static>(
    mut broadcast_rx: broadcast::Receiver<T>,
) -> mpsc::UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let rt = match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(err) => {
                log::error!("[SessionController] Failed to create forwarding runtime: {}", err);
                return;
            }
        };
        rt.block_on(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(item) => {
                        if tx.send(item).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("[SessionController] Subscriber lagged by {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    });

    rx
}

impl SessionController {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe_snapshots(&self) -> mpsc::UnboundedReceiver<TrainingSnapshot> {
        forward(self.broadcasts.subscribe_snapshots())
    }

    pub fn subscribe_visualization(&self) -> mpsc::UnboundedReceiver<VisualizationFrame> {
        forward(self.broadcasts.subscribe_visualization())
    }

    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        forward(self.broadcasts.subscribe_events())
    }

    pub fn snapshot_receiver(&self) -> broadcast::Receiver<TrainingSnapshot> {
        self.broadcasts.subscribe_snapshots()
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcasts.subscribe_events()
    }

    /// Shared handle on the outbound channels, for observers that outlive a
    /// borrow of the controller (debug HTTP, CLI printers)
    pub fn broadcasts(&self) -> BroadcastChannelManager {
        self.broadcasts.clone()
    }

    // ========================================================================
    // ASYNC STREAM ADAPTERS
    // ========================================================================

    pub fn snapshot_stream(&self) -> impl Stream<Item = TrainingSnapshot> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_snapshots())
    }

    pub fn visualization_stream(&self) -> impl Stream<Item = VisualizationFrame> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_visualization())
    }

    pub fn event_stream(&self) -> impl Stream<Item = SessionEvent> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_events())
    }
}
