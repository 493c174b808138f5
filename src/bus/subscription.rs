//! # Attached subscriber workers.
//!
//! ```text
//! broadcast ──► listener ──try_send──► [bounded queue] ──► worker ──► sub.on_event()
//!                  │                                          └──► panic → warn, continue
//!                  └──► queue full → warn, drop for this subscriber only
//! ```
//!
//! ## Rules
//! - **Per-subscriber FIFO**: each subscriber sees events in bus order.
//! - **Isolation**: a slow or panicking subscriber affects nobody else.
//! - **Lag**: if the listener itself falls behind the broadcast ring, the
//!   skipped count is logged and delivery resumes.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::subscribe::Subscribe;
use crate::events::EventRef;

/// Handle of an attached subscriber.
///
/// Dropping the handle stops the subscriber.
pub struct Subscription {
    name: &'static str,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Subscription {
    pub(crate) fn spawn(
        sub: Arc<dyn Subscribe>,
        mut rx: broadcast::Receiver<EventRef>,
        capacity: usize,
    ) -> Self {
        let name = sub.name();
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (tx, mut queue) = mpsc::channel::<EventRef>(capacity.max(1));

        let listener_token = token.clone();
        tracker.spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = listener_token.cancelled() => break,
                    res = rx.recv() => match res {
                        Ok(ev) => ev,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(subscriber = name, skipped = n, "subscriber listener lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                match tx.try_send(ev) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(ev)) => {
                        warn!(subscriber = name, event_type = %ev.event_type(), "subscriber queue full, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });

        let worker_token = token.clone();
        tracker.spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = worker_token.cancelled() => break,
                    ev = queue.recv() => match ev {
                        Some(ev) => ev,
                        None => break,
                    },
                };
                let fut = sub.on_event(ev.as_ref());
                if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    warn!(
                        subscriber = name,
                        info = %panic_message(panic_err.as_ref()),
                        "subscriber panicked"
                    );
                }
            }
            debug!(subscriber = name, "subscriber worker stopped");
        });
        tracker.close();

        Self {
            name,
            token,
            tracker,
        }
    }

    /// Name of the attached subscriber.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops delivery without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stops delivery and waits for the worker to finish its current event.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.wait().await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
