use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::responder::InteractiveResponder;
use crate::telegram::{self, TelegramClient, Update};
use crate::transport::TransportError;

/// Server-side long-poll wait for `getUpdates`.
pub const LONG_POLL_SECS: u64 = 30;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Source of inbound updates, consumed in `update_id` order.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Updates with `update_id >= offset`; earlier ones are confirmed.
    async fn poll(&self, offset: i64) -> Result<Vec<Update>, TransportError>;
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        self.get_updates(offset, LONG_POLL_SECS).await
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Poll for updates and hand each interaction to the responder on its own task,
/// until `shutdown` turns `true` or its sender is dropped.
///
/// Poll errors back off exponentially up to a minute. Handler errors are
/// logged and never stop the loop.
pub async fn run_update_loop(
    source: Arc<dyn UpdateSource>,
    responder: Arc<InteractiveResponder>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset = 0i64;
    let mut backoff = INITIAL_BACKOFF;
    info!("update loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let polled = tokio::select! {
            polled = source.poll(offset) => polled,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        let updates = match polled {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                updates
            }
            Err(e) => {
                warn!(retry_in_secs = backoff.as_secs(), "polling updates failed: {e}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => {}
                }
                backoff = next_backoff(backoff);
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(interaction) = telegram::interaction(&update) else {
                debug!(update_id = update.update_id, "ignoring update");
                continue;
            };
            let responder = responder.clone();
            tokio::spawn(async move {
                match responder.handle(interaction).await {
                    Ok(outcome) => debug!(?outcome, "interaction handled"),
                    Err(e) => warn!("interaction failed: {e}"),
                }
            });
        }
    }

    info!("update loop stopped");
}
