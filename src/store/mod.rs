//! Boundary to the replicated tree store.
//!
//! The store is an external collaborator: a path-addressed tree with
//! last-write-wins semantics per path and change notifications. Sessions only
//! ever talk to it through the [`ReplicatedStore`] trait; [`memory`] provides
//! the in-process backend used by tests and local play.

pub mod memory;

use std::error::Error;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::{MemoryConn, MemoryStore};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle to a store connection.
pub type SharedStore = Arc<dyn ReplicatedStore>;

/// Error raised by store backends regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Human readable description of the failing operation.
        message: String,
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The connection this handle belongs to has been closed.
    #[error("store connection closed")]
    Closed,
}

impl StoreError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StoreError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Snapshot of a subscribed subtree after a change.
///
/// `value` is the full new value of the subtree, `None` when the path was
/// removed. A `Null` value is equivalent to removal.
#[derive(Debug, Clone)]
pub struct PathEvent {
    /// The subscribed path this event belongs to.
    pub path: String,
    /// Full value of the subtree after the change.
    pub value: Option<Value>,
}

/// Live subscription to one path of the tree.
///
/// Dropping the subscription unsubscribes best-effort; teardown failures are
/// swallowed since they only affect resource cleanup, never correctness.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<PathEvent>,
    _guard: SubscriptionGuard,
}

impl Subscription {
    /// Build a subscription from a receiving channel and an unsubscribe hook.
    pub fn new(
        events: mpsc::UnboundedReceiver<PathEvent>,
        on_drop: Option<Box<dyn FnOnce() + Send>>,
    ) -> Self {
        Self {
            events,
            _guard: SubscriptionGuard { on_drop },
        }
    }

    /// Wait for the next change event. Returns `None` once the store side
    /// closed the channel.
    pub async fn next(&mut self) -> Option<PathEvent> {
        self.events.recv().await
    }
}

struct SubscriptionGuard {
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.on_drop.take() {
            unsubscribe();
        }
    }
}

/// Abstraction over one client's connection to the replicated tree store.
///
/// Paths are `/`-separated segment strings (see [`crate::paths`]). Every
/// method is asynchronous and may complete out of submission order relative to
/// unrelated paths; per-path writes are last-write-wins.
pub trait ReplicatedStore: Send + Sync {
    /// Replace the subtree at `path` with `value`.
    fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StoreResult<()>>;

    /// Apply a batched shallow merge below `path`.
    ///
    /// Each entry is a path relative to `path` paired with its new value. The
    /// whole batch becomes visible atomically so observers never see a torn
    /// intermediate state.
    fn update(
        &self,
        path: &str,
        entries: Vec<(String, Value)>,
    ) -> BoxFuture<'static, StoreResult<()>>;

    /// Remove the subtree at `path`.
    fn remove(&self, path: &str) -> BoxFuture<'static, StoreResult<()>>;

    /// Read the current value at `path`, `None` when absent.
    fn read(&self, path: &str) -> BoxFuture<'static, StoreResult<Option<Value>>>;

    /// Subscribe to changes of the subtree at `path`.
    ///
    /// The subscription fires once immediately with the current value, then on
    /// every subsequent change.
    fn subscribe(&self, path: &str) -> BoxFuture<'static, StoreResult<Subscription>>;

    /// Register `path` for automatic removal when this connection drops.
    fn on_disconnect_remove(&self, path: &str) -> BoxFuture<'static, StoreResult<()>>;
}
