use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::managers::BroadcastChannelManager;

pub type SnapshotStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Build a Server-Sent Events stream of session snapshots.
///
/// Lagged receivers drop the missed snapshots and keep streaming.
pub fn snapshots(broadcasts: &BroadcastChannelManager) -> SnapshotStream {
    let receiver = broadcasts.subscribe_snapshots();

    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(snapshot) => match serde_json::to_string(&snapshot) {
                Ok(payload) => Some(Ok(Event::default().event("snapshot").data(payload))),
                Err(_) => None,
            },
            Err(_) => None,
        }
    });

    Sse::new(Box::pin(stream) as Pin<Box<_>>).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("debug-keepalive"),
    )
}
