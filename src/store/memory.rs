//! In-process reference backend for the replicated tree store.
//!
//! One [`MemoryStore`] plays the role of the remote database; every client
//! obtains its own [`MemoryConn`] via [`MemoryStore::connect`], mirroring how
//! each real client holds its own connection. Used by the integration tests
//! and for single-machine play.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::{PathEvent, ReplicatedStore, StoreResult, Subscription};

struct Subscriber {
    path: String,
    tx: mpsc::UnboundedSender<PathEvent>,
}

struct Shared {
    tree: Mutex<Value>,
    subscribers: DashMap<u64, Subscriber>,
    /// Per-connection list of paths removed when that connection drops.
    cleanups: DashMap<u64, Vec<String>>,
    next_id: AtomicU64,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send the current value of every overlapping subscription.
    fn notify(&self, tree: &Value, changed: &[String]) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            let sub = entry.value();
            if !changed.iter().any(|path| overlaps(&sub.path, path)) {
                continue;
            }
            let event = PathEvent {
                path: sub.path.clone(),
                value: tree_get(tree, &sub.path).cloned().filter(|v| !v.is_null()),
            };
            if sub.tx.send(event).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }

    async fn apply(&self, path: &str, value: Option<Value>) {
        let mut tree = self.tree.lock().await;
        tree_set(&mut tree, path, value);
        self.notify(&tree, &[path.to_string()]);
    }

    /// Apply a batch of relative writes under `base` as one visible step.
    async fn apply_batch(&self, base: &str, entries: Vec<(String, Value)>) {
        let mut tree = self.tree.lock().await;
        let mut changed = Vec::with_capacity(entries.len());
        for (relative, value) in entries {
            let path = join(base, &relative);
            tree_set(&mut tree, &path, Some(value));
            changed.push(path);
        }
        self.notify(&tree, &changed);
    }
}

/// Shared in-memory tree acting as the store backend.
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Value::Object(Map::new())),
                subscribers: DashMap::new(),
                cleanups: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new client connection onto this store.
    pub fn connect(&self) -> MemoryConn {
        MemoryConn {
            shared: self.shared.clone(),
            conn_id: self.shared.next_id(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's connection to a [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryConn {
    shared: Arc<Shared>,
    conn_id: u64,
}

impl MemoryConn {
    /// Simulate this client dropping off: every path registered through
    /// [`ReplicatedStore::on_disconnect_remove`] is removed from the tree.
    pub async fn disconnect(&self) {
        let Some((_, paths)) = self.shared.cleanups.remove(&self.conn_id) else {
            return;
        };
        debug!(count = paths.len(), "running disconnect cleanups");
        for path in paths {
            self.shared.apply(&path, None).await;
        }
    }
}

impl ReplicatedStore for MemoryConn {
    fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StoreResult<()>> {
        let shared = self.shared.clone();
        let path = path.to_string();
        Box::pin(async move {
            shared.apply(&path, Some(value)).await;
            Ok(())
        })
    }

    fn update(
        &self,
        path: &str,
        entries: Vec<(String, Value)>,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let shared = self.shared.clone();
        let path = path.to_string();
        Box::pin(async move {
            shared.apply_batch(&path, entries).await;
            Ok(())
        })
    }

    fn remove(&self, path: &str) -> BoxFuture<'static, StoreResult<()>> {
        let shared = self.shared.clone();
        let path = path.to_string();
        Box::pin(async move {
            shared.apply(&path, None).await;
            Ok(())
        })
    }

    fn read(&self, path: &str) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let shared = self.shared.clone();
        let path = path.to_string();
        Box::pin(async move {
            let tree = shared.tree.lock().await;
            Ok(tree_get(&tree, &path).cloned().filter(|v| !v.is_null()))
        })
    }

    fn subscribe(&self, path: &str) -> BoxFuture<'static, StoreResult<Subscription>> {
        let shared = self.shared.clone();
        let path = path.to_string();
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let initial = {
                let tree = shared.tree.lock().await;
                tree_get(&tree, &path).cloned().filter(|v| !v.is_null())
            };
            let _ = tx.send(PathEvent {
                path: path.clone(),
                value: initial,
            });
            let sub_id = shared.next_id();
            shared.subscribers.insert(
                sub_id,
                Subscriber {
                    path,
                    tx,
                },
            );
            let unsubscribe = {
                let shared = shared.clone();
                move || {
                    shared.subscribers.remove(&sub_id);
                }
            };
            Ok(Subscription::new(rx, Some(Box::new(unsubscribe))))
        })
    }

    fn on_disconnect_remove(&self, path: &str) -> BoxFuture<'static, StoreResult<()>> {
        let shared = self.shared.clone();
        let conn_id = self.conn_id;
        let path = path.to_string();
        Box::pin(async move {
            shared.cleanups.entry(conn_id).or_default().push(path);
            Ok(())
        })
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Two paths overlap when one is a segment-wise prefix of the other.
fn overlaps(a: &str, b: &str) -> bool {
    segments(a).zip(segments(b)).all(|(x, y)| x == y)
}

fn join(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{relative}")
    }
}

fn tree_get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments(path) {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn tree_set(root: &mut Value, path: &str, value: Option<Value>) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        *root = value.unwrap_or(Value::Object(Map::new()));
        return;
    };

    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            if value.is_none() {
                // Removing below a leaf: nothing to do.
                return;
            }
            *node = Value::Object(Map::new());
        }
        let map = match node.as_object_mut() {
            Some(map) => map,
            None => return,
        };
        if !map.contains_key(*segment) {
            if value.is_none() {
                return;
            }
            map.insert((*segment).to_string(), Value::Object(Map::new()));
        }
        node = match map.get_mut(*segment) {
            Some(child) => child,
            None => return,
        };
    }

    if !node.is_object() {
        if value.is_none() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        match value {
            Some(value) => {
                map.insert((*last).to_string(), value);
            }
            None => {
                map.remove(*last);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlap_is_prefix_both_ways() {
        assert!(overlaps("rooms/AB12", "rooms/AB12/players/x"));
        assert!(overlaps("rooms/AB12/players/x", "rooms/AB12"));
        assert!(!overlaps("rooms/AB12", "rooms/CD34"));
        assert!(!overlaps("rooms/AB12/meta", "rooms/AB12/players"));
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let store = MemoryStore::new();
        let conn = store.connect();
        conn.write("rooms/AB12/meta", json!({"state": "waiting"}))
            .await
            .unwrap();
        let value = conn.read("rooms/AB12/meta/state").await.unwrap();
        assert_eq!(value, Some(json!("waiting")));
        assert_eq!(conn.read("rooms/ZZ99").await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_is_one_visible_step() {
        let store = MemoryStore::new();
        let conn = store.connect();
        conn.write("rooms/AB12", json!({"meta": {"state": "waiting"}}))
            .await
            .unwrap();

        let mut sub = conn.subscribe("rooms/AB12").await.unwrap();
        // Initial snapshot.
        assert!(sub.next().await.is_some());

        conn.update(
            "rooms/AB12",
            vec![
                ("meta/state".into(), json!("playing")),
                ("countdown".into(), json!(0)),
            ],
        )
        .await
        .unwrap();

        // A single event carrying both fields, never a torn intermediate.
        let event = sub.next().await.unwrap();
        let value = event.value.unwrap();
        assert_eq!(value["meta"]["state"], json!("playing"));
        assert_eq!(value["countdown"], json!(0));
    }

    #[tokio::test]
    async fn subscribe_fires_immediately_and_on_removal() {
        let store = MemoryStore::new();
        let conn = store.connect();
        conn.write("game/AB12/phase", json!("lobby")).await.unwrap();

        let mut sub = conn.subscribe("game/AB12/phase").await.unwrap();
        assert_eq!(sub.next().await.unwrap().value, Some(json!("lobby")));

        conn.remove("game/AB12/phase").await.unwrap();
        assert_eq!(sub.next().await.unwrap().value, None);
    }

    #[tokio::test]
    async fn disconnect_runs_registered_cleanups() {
        let store = MemoryStore::new();
        let alice = store.connect();
        let bob = store.connect();

        alice
            .write("rooms/AB12/players/a", json!({"name": "alice"}))
            .await
            .unwrap();
        alice
            .on_disconnect_remove("rooms/AB12/players/a")
            .await
            .unwrap();
        bob.write("rooms/AB12/players/b", json!({"name": "bob"}))
            .await
            .unwrap();

        alice.disconnect().await;

        assert_eq!(bob.read("rooms/AB12/players/a").await.unwrap(), None);
        assert!(bob.read("rooms/AB12/players/b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropped_subscription_stops_receiving() {
        let store = MemoryStore::new();
        let conn = store.connect();
        let sub = conn.subscribe("rooms/AB12").await.unwrap();
        drop(sub);
        // The subscriber table is purged by the drop guard.
        conn.write("rooms/AB12", json!({"x": 1})).await.unwrap();
        assert!(conn.shared.subscribers.is_empty());
    }
}
