//! in-memory stand-ins for backend sessions
use crate::backend::node_store::{
    EventReceiver, NodeEvent, NodeEventKind, NodeStat, NodeStore, Subscription,
};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Node store keeping every node in a map
///
/// Subscriptions behave like the real thing: they fire once and cannot be withdrawn. The store keeps the sending
/// half until the node changes, so [MemoryNodeStore::live_subscriptions] shows whether a watcher still listens.
#[derive(Default)]
pub(crate) struct MemoryNodeStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, Vec<u8>>,
    subscriptions: Vec<Pending>,
    failing: BTreeSet<String>,
    vanishing: BTreeSet<String>,
}

struct Pending {
    path: String,
    subscription: Subscription,
    sender: oneshot::Sender<Result<NodeEvent>>,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        None | Some(0) => "/",
        Some(index) => &path[..index],
    }
}

impl Inner {
    fn ensure(&mut self, path: &str) {
        if path == "/" || self.nodes.contains_key(path) {
            return;
        }

        let parent = parent_of(path).to_string();
        self.ensure(&parent);
        self.nodes.insert(path.to_string(), Vec::new());
        self.fire(&parent, Subscription::Children, NodeEventKind::ChildrenChanged);
    }

    fn contains(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|key| key.as_str() != path && parent_of(key) == path)
            .map(|key| key[key.rfind('/').unwrap_or(0) + 1..].to_string())
            .collect()
    }

    /// Remove `path` and everything below it
    fn remove(&mut self, path: &str) {
        let below = format!("{path}/");
        let removed: Vec<String> = self
            .nodes
            .keys()
            .filter(|key| key.as_str() == path || key.starts_with(&below))
            .cloned()
            .collect();

        for node in &removed {
            self.nodes.remove(node);
            self.fire(node, Subscription::Data, NodeEventKind::Deleted);
            self.fire(node, Subscription::Children, NodeEventKind::Deleted);
        }

        if !removed.is_empty() {
            self.fire(parent_of(path), Subscription::Children, NodeEventKind::ChildrenChanged);
        }
    }

    fn fire(&mut self, path: &str, subscription: Subscription, kind: NodeEventKind) {
        let (matching, rest) = std::mem::take(&mut self.subscriptions)
            .into_iter()
            .partition(|pending: &Pending| {
                pending.path == path && pending.subscription == subscription
            });
        self.subscriptions = rest;

        for pending in matching {
            let _ = pending.sender.send(Ok(NodeEvent {
                kind,
                path: path.to_string(),
            }));
        }
    }
}

impl MemoryNodeStore {
    pub(crate) fn with_nodes<const N: usize>(nodes: [(&str, &str); N]) -> Arc<Self> {
        let store = Self::default();
        for (path, value) in nodes {
            store.set(path, value);
        }
        Arc::new(store)
    }

    /// Create or update a node, creating missing parents
    pub(crate) fn set(&self, path: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure(path);
        inner.nodes.insert(path.to_string(), value.as_bytes().to_vec());
        inner.fire(path, Subscription::Data, NodeEventKind::DataChanged);
    }

    /// Delete a node together with its subtree
    pub(crate) fn delete(&self, path: &str) {
        self.inner.lock().unwrap().remove(path);
    }

    /// Delete `path` right before the next existence check on it
    ///
    /// Simulates another client removing a node between a children listing and the following read.
    pub(crate) fn delete_before_next_check(&self, path: &str) {
        self.inner.lock().unwrap().vanishing.insert(path.to_string());
    }

    pub(crate) fn fail_subscriptions_on(&self, path: &str) {
        self.inner.lock().unwrap().failing.insert(path.to_string());
    }

    /// Subscriptions whose receiver has not been dropped yet
    pub(crate) fn live_subscriptions(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|pending| !pending.sender.is_closed())
            .count()
    }
}

#[async_trait::async_trait]
impl NodeStore for MemoryNodeStore {
    async fn exists(&self, path: &str) -> Result<Option<NodeStat>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.vanishing.remove(path) {
            inner.remove(path);
        }
        if !inner.contains(path) {
            return Ok(None);
        }

        Ok(Some(NodeStat {
            num_children: inner.children(path).len(),
        }))
    }

    async fn children(&self, path: &str) -> Result<(Vec<String>, NodeStat)> {
        let inner = self.inner.lock().unwrap();
        if !inner.contains(path) {
            return Err(Error::NotFound(path.to_string()));
        }

        let children = inner.children(path);
        let stat = NodeStat {
            num_children: children.len(),
        };
        Ok((children, stat))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        match inner.nodes.get(path) {
            Some(value) => Ok(value.clone()),
            None if path == "/" => Ok(Vec::new()),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    async fn subscribe(&self, path: &str, subscription: Subscription) -> Result<EventReceiver> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing.contains(path) {
            return Err(Error::transport(format!("session expired while watching {path}")));
        }
        if !inner.contains(path) {
            return Err(Error::NotFound(path.to_string()));
        }

        let (sender, receiver) = oneshot::channel();
        inner.subscriptions.push(Pending {
            path: path.to_string(),
            subscription,
            sender,
        });
        Ok(receiver)
    }
}
