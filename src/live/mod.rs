// src/live/mod.rs
//
// Live queries: observable views over the history table that re-run after
// every committed write and push fresh snapshots to subscribers.

mod hub;
mod query;
mod subscription;

pub use hub::LiveQueryHub;
pub use query::LiveQuery;
pub use subscription::{LiveResult, Snapshot, Subscription, SubscriptionId};
