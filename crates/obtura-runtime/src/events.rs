//! The background event dispatcher.
//!
//! One task per registry, spawned on the first `start` and bound to the
//! bootstrap cancellation token. Each dequeued event fans out to every
//! subscriber in its own task: subscribers observe no ordering relative to
//! one another, and one handler's failure never affects the rest; delivery
//! is best-effort by design.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use obtura_core::event::Event;

use crate::registry::Registry;

/// Spawns the dispatcher task for `registry`.
///
/// The task exits when `shutdown` is cancelled or every sender is dropped.
/// Cancellation stops event pickup; handlers already spawned run to
/// completion.
pub(crate) fn spawn_dispatcher(
    registry: Arc<Registry>,
    mut rx: mpsc::Receiver<Event>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("event dispatcher shutting down");
                    break;
                }
                maybe = rx.recv() => match maybe {
                    Some(event) => event,
                    None => break,
                },
            };

            // Snapshot under the read lock; handlers run outside it.
            let handlers = registry.subscribers_for(&event.name);
            for (plugin, handler) in handlers {
                let event = event.clone();
                tokio::spawn(async move {
                    if let Err(error) = handler.call(event).await {
                        debug!(plugin = %plugin, error = %error, "event handler failed");
                    }
                });
            }
        }
    });
}
