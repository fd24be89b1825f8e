use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use shared::domain::UserId;
use tokio::sync::mpsc;
use tracing::debug;

struct Worker<T> {
    tx: mpsc::UnboundedSender<T>,
    /// Queued plus in-flight items.
    pending: Arc<AtomicUsize>,
}

/// Routes each user's updates to a worker task of their own, in arrival order.
///
/// A user's worker exists only while it has items queued; different users run in parallel.
pub struct Dispatcher<T, F> {
    handler: Arc<F>,
    workers: HashMap<UserId, Worker<T>>,
}

impl<T, F, Fut> Dispatcher<T, F>
where
    T: Send + 'static,
    F: Fn(UserId, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler: Arc::new(handler),
            workers: HashMap::new(),
        }
    }

    /// Queues `item` behind everything already queued for `user_id`. Never waits on the handler.
    pub fn dispatch(&mut self, user_id: UserId, item: T) {
        self.workers
            .retain(|_, worker| worker.pending.load(Ordering::Acquire) > 0);

        if let Some(worker) = self.workers.get(&user_id) {
            worker.pending.fetch_add(1, Ordering::AcqRel);
            match worker.tx.send(item) {
                Ok(()) => return,
                Err(mpsc::error::SendError(item)) => {
                    self.workers.remove(&user_id);
                    self.spawn_worker(user_id, item);
                    return;
                }
            }
        }

        self.spawn_worker(user_id, item);
    }

    fn spawn_worker(&mut self, user_id: UserId, item: T) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(1));
        // Receiver is alive until the task below ends.
        let _ = tx.send(item);

        let handler = self.handler.clone();
        let remaining = pending.clone();
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                handler(user_id, item).await;
                remaining.fetch_sub(1, Ordering::AcqRel);
            }
            debug!(%user_id, "user worker finished");
        });

        self.workers.insert(user_id, Worker { tx, pending });
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
