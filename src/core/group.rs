//! # Task group owned by one active object.
//!
//! Every background task of an object (bus forwarder, mailbox consumer, init
//! publisher, drain watcher) is spawned through its [`TaskGroup`]. Cancelling
//! the group is a hard stop: each task is dropped at its next await point.
//!
//! ```text
//! TaskGroup { token, tracker }
//!   ├─► spawn(forwarder)  ──┐
//!   ├─► spawn(consumer)   ──┼── select { token.cancelled(), fut }
//!   └─► spawn(watcher)    ──┘
//! cancel() ─► token.cancel() ─► every task returns
//! ```

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancellable set of tasks belonging to one owner.
#[derive(Clone, Default)]
pub(crate) struct TaskGroup {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `fut`; it is dropped as soon as the group is cancelled.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
    }

    /// Cancels every task of the group, including the caller if it belongs to it.
    pub fn cancel(&self) {
        self.token.cancel();
        self.tracker.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until the group is cancelled and all its tasks have returned.
    pub async fn wait(&self) {
        self.token.cancelled().await;
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancel_stops_pending_tasks() {
        let group = TaskGroup::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

        for _ in 0..3 {
            let tx = tx.clone();
            group.spawn(async move {
                let _keep = tx;
                std::future::pending::<()>().await;
            });
        }
        drop(tx);

        group.cancel();
        tokio::time::timeout(Duration::from_secs(1), group.wait())
            .await
            .expect("group stopped");
        // All senders were dropped with their tasks.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_task_may_cancel_its_own_group() {
        let group = TaskGroup::new();
        let g = group.clone();
        group.spawn(async move {
            g.cancel();
            std::future::pending::<()>().await;
        });
        tokio::time::timeout(Duration::from_secs(1), group.wait())
            .await
            .expect("self-cancel completes");
        assert!(group.is_cancelled());
    }
}
