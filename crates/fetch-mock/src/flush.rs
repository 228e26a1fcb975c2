//! Tracking of in-flight responses so callers can await them.
//!
//! Every dispatched call holds a delivery slot until its response future
//! settles; every body read holds a body-read slot while it runs. A slot is a
//! oneshot channel whose sender lives in a [`PendingGuard`], so dropping the
//! guard (completion, failure, abort, or the future being dropped) settles it.

use futures::future::{join_all, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

type Slot = Shared<oneshot::Receiver<()>>;

/// Settles its slot when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    _settle: oneshot::Sender<()>,
}

#[derive(Default)]
pub struct FlushCoordinator {
    deliveries: Mutex<Vec<Slot>>,
    body_reads: Mutex<Vec<Slot>>,
}

impl std::fmt::Debug for FlushCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushCoordinator")
            .field("deliveries", &self.deliveries.lock().len())
            .field("body_reads", &self.body_reads.lock().len())
            .finish()
    }
}

impl FlushCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold_delivery(&self) -> PendingGuard {
        Self::hold(&self.deliveries)
    }

    pub fn hold_body_read(&self) -> PendingGuard {
        Self::hold(&self.body_reads)
    }

    fn hold(slots: &Mutex<Vec<Slot>>) -> PendingGuard {
        let (tx, rx) = oneshot::channel();
        let mut slots = slots.lock();
        slots.retain(|slot| slot.peek().is_none());
        slots.push(rx.shared());
        PendingGuard { _settle: tx }
    }

    /// Number of unsettled delivery slots.
    pub fn pending_deliveries(&self) -> usize {
        Self::snapshot(&self.deliveries).len()
    }

    fn snapshot(slots: &Mutex<Vec<Slot>>) -> Vec<Slot> {
        let mut slots = slots.lock();
        slots.retain(|slot| slot.peek().is_none());
        slots.clone()
    }

    /// Resolve once every pending delivery (and, with `wait_for_body`, every
    /// body read) has settled, including ones started while waiting.
    pub async fn flush(&self, wait_for_body: bool) {
        loop {
            let mut pending = Self::snapshot(&self.deliveries);
            if wait_for_body {
                pending.extend(Self::snapshot(&self.body_reads));
            }
            if pending.is_empty() {
                return;
            }
            trace!(pending = pending.len(), "waiting for pending responses");
            join_all(pending).await;
        }
    }
}
