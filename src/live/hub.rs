// src/live/hub.rs
//
// Live Query Hub - re-runs queries after every committed write
//
// CRITICAL RULES:
// - One re-evaluation task per active live query, spawned on first
//   subscription and aborted when the last subscriber leaves
// - Bus handlers only bump a watch counter; they never block the writer
// - Queries run on the blocking pool, never on a runtime worker
// - A burst of commits may coalesce into one evaluation; each delivered
//   snapshot is read after the commit that triggered it

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::query::LiveQuery;
use super::subscription::{LiveResult, Subscription, SubscriptionId};
use crate::error::AppError;
use crate::events::{
    DomainEvent, EventBus, HistoryCleared, HistoryCompacted, HistoryEntryDeleted,
    HistoryEntryInserted, HistoryEntryUpdated,
};
use crate::repositories::HistoryRepository;

struct Subscriber {
    id: SubscriptionId,
    sender: mpsc::UnboundedSender<LiveResult>,
}

type SubscriberList = Arc<Mutex<Vec<Subscriber>>>;

struct QuerySlot {
    invalidate: watch::Sender<u64>,
    subscribers: SubscriberList,
    task: JoinHandle<()>,
}

impl QuerySlot {
    fn close(self) {
        self.task.abort();
        // Dropping the senders ends every subscriber's stream
        lock(&self.subscribers).clear();
    }
}

pub(crate) struct HubInner {
    repository: Arc<dyn HistoryRepository>,
    runtime: Handle,
    queries: Mutex<HashMap<LiveQuery, QuerySlot>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HubInner {
    fn invalidate_all(&self) {
        let queries = lock(&self.queries);
        for slot in queries.values() {
            slot.invalidate.send_modify(|version| *version = version.wrapping_add(1));
        }
    }

    fn spawn_slot(&self, query: &LiveQuery) -> QuerySlot {
        let (invalidate, changes) = watch::channel(0u64);
        let subscribers: SubscriberList = Arc::new(Mutex::new(Vec::new()));

        let task = self.runtime.spawn(run_live_query(
            query.clone(),
            Arc::clone(&self.repository),
            changes,
            Arc::clone(&subscribers),
        ));

        log::debug!("Started live query {}", query);

        QuerySlot {
            invalidate,
            subscribers,
            task,
        }
    }

    pub(crate) fn unsubscribe(&self, query: &LiveQuery, id: SubscriptionId) {
        let mut queries = lock(&self.queries);

        let now_empty = match queries.get(query) {
            Some(slot) => {
                let mut subscribers = lock(&slot.subscribers);
                subscribers.retain(|s| s.id != id);
                subscribers.is_empty()
            }
            None => false,
        };

        if now_empty {
            if let Some(slot) = queries.remove(query) {
                slot.close();
                log::debug!("Stopped live query {} (no subscribers left)", query);
            }
        }
    }

    fn shutdown(&self) {
        let slots: Vec<(LiveQuery, QuerySlot)> = lock(&self.queries).drain().collect();
        for (query, slot) in slots {
            slot.close();
            log::debug!("Stopped live query {} (shutdown)", query);
        }
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Re-evaluation loop for one live query
async fn run_live_query(
    query: LiveQuery,
    repository: Arc<dyn HistoryRepository>,
    mut changes: watch::Receiver<u64>,
    subscribers: SubscriberList,
) {
    while changes.changed().await.is_ok() {
        changes.borrow_and_update();

        let repo = Arc::clone(&repository);
        let q = query.clone();
        let result = match tokio::task::spawn_blocking(move || q.evaluate(repo.as_ref())).await {
            Ok(result) => result,
            Err(join_error) => Err(AppError::from(join_error)),
        };

        let item: LiveResult = match result {
            Ok(entries) => Ok(Arc::new(entries)),
            Err(e) => {
                log::error!("Live query {} failed: {}", query, e);
                Err(Arc::new(e))
            }
        };

        let mut subscribers = lock(&subscribers);
        subscribers.retain(|s| s.sender.send(item.clone()).is_ok());
    }
}

/// Subscription manager for live history queries.
///
/// Construct it once per open store; it registers itself on the event bus
/// and stays registered for the bus's lifetime (the handlers become no-ops
/// once the hub is dropped).
pub struct LiveQueryHub {
    inner: Arc<HubInner>,
}

impl LiveQueryHub {
    pub fn new(
        repository: Arc<dyn HistoryRepository>,
        event_bus: &EventBus,
        runtime: Handle,
    ) -> Self {
        let inner = Arc::new(HubInner {
            repository,
            runtime,
            queries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        register_invalidation::<HistoryEntryInserted>(event_bus, &inner);
        register_invalidation::<HistoryEntryUpdated>(event_bus, &inner);
        register_invalidation::<HistoryEntryDeleted>(event_bus, &inner);
        register_invalidation::<HistoryCleared>(event_bus, &inner);
        register_invalidation::<HistoryCompacted>(event_bus, &inner);

        Self { inner }
    }

    /// Subscribe to a live query. The current state is delivered first.
    pub fn subscribe(&self, query: LiveQuery) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut queries = lock(&self.inner.queries);
            let slot = queries
                .entry(query.clone())
                .or_insert_with(|| self.inner.spawn_slot(&query));

            lock(&slot.subscribers).push(Subscriber { id, sender });
            slot.invalidate.send_modify(|version| *version = version.wrapping_add(1));
        }

        log::debug!("Subscription {} to {}", id, query);
        Subscription::new(id, query, receiver, Arc::downgrade(&self.inner))
    }

    pub fn recent_history(&self, limit: usize) -> Subscription {
        self.subscribe(LiveQuery::Recent { limit })
    }

    pub fn incomplete_history(&self) -> Subscription {
        self.subscribe(LiveQuery::Incomplete)
    }

    /// Force every active query to re-run
    pub fn invalidate(&self) {
        self.inner.invalidate_all();
    }

    /// Number of queries with a running re-evaluation task
    pub fn active_queries(&self) -> usize {
        lock(&self.inner.queries).len()
    }

    pub fn subscriber_count(&self, query: &LiveQuery) -> usize {
        lock(&self.inner.queries)
            .get(query)
            .map(|slot| lock(&slot.subscribers).len())
            .unwrap_or(0)
    }

    /// Stop every re-evaluation task and end every subscription stream.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

fn register_invalidation<E>(event_bus: &EventBus, inner: &Arc<HubInner>)
where
    E: DomainEvent + 'static,
{
    let hub = Arc::downgrade(inner);
    event_bus.subscribe::<E, _>(move |event| {
        if let Some(hub) = hub.upgrade() {
            log::trace!("{} invalidates live queries", event.event_type());
            hub.invalidate_all();
        }
    });
}
