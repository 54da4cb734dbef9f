// src/live/subscription.rs

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use super::hub::HubInner;
use super::query::LiveQuery;
use crate::domain::history::HistoryEntry;
use crate::error::AppError;

/// Shared, immutable query result
pub type Snapshot = Arc<Vec<HistoryEntry>>;

/// One delivery: a fresh snapshot, or the error the re-evaluation hit
pub type LiveResult = Result<Snapshot, Arc<AppError>>;

pub type SubscriptionId = u64;

/// Receiving end of a live query.
///
/// Every delivered snapshot reflects a committed state; consecutive
/// snapshots may be identical. Dropping the subscription cancels it.
pub struct Subscription {
    id: SubscriptionId,
    query: LiveQuery,
    receiver: mpsc::UnboundedReceiver<LiveResult>,
    hub: Weak<HubInner>,
    cancelled: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        query: LiveQuery,
        receiver: mpsc::UnboundedReceiver<LiveResult>,
        hub: Weak<HubInner>,
    ) -> Self {
        Self {
            id,
            query,
            receiver,
            hub,
            cancelled: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn query(&self) -> &LiveQuery {
        &self.query
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Wait for the next snapshot. `None` once cancelled or the hub shut down.
    pub async fn next(&mut self) -> Option<LiveResult> {
        if self.cancelled {
            return None;
        }
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`next`](Self::next)
    pub fn try_next(&mut self) -> Option<LiveResult> {
        if self.cancelled {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Stop delivery immediately.
    ///
    /// Does not wait for an in-flight re-evaluation; its result is simply
    /// never delivered here. Snapshots already buffered are discarded.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;

        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.query, self.id);
        }

        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}

        log::debug!("Cancelled subscription {} to {}", self.id, self.query);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
