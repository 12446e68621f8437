//! hierarchical node store backend
//!
//! Stores in the style of ZooKeeper: every node has a value and children, and change notification works
//! through one-shot subscriptions on single nodes.
//!
//! ### Reading
//!
//! A node without children is a leaf and contributes its value. Every other node is only a directory. Between
//! listing children and reading them another client may delete nodes, so each child is checked again before it is
//! read.
//!
//! ### Watching
//!
//! Subscriptions fire at most once and cannot be re-armed. Every [NodeStoreBackend::watch_prefix] call therefore
//! builds its watch targets from a fresh snapshot:
//!
//! ```text
//! /app/db/host  (matches filter "/app/db")
//!   -> watch /app          (children changed: sibling of /app/db created or deleted)
//!   -> watch /app/db       (children changed: /app/db/port created)
//!   -> watch /app/db/host  (value changed)
//! ```
//!
//! One task per target waits for the first event and relays it. The first relayed event ends the call and every
//! other task is cancelled.
use crate::backend::{is_stopped, matches_any, Backend, Cursor, Snapshot, StopSignal};
use crate::error::{Error, Result, WatchError};
use crate::value::join_path;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Node metadata as returned by the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStat {
    pub num_children: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    Created,
    Deleted,
    DataChanged,
    ChildrenChanged,
}

/// Notification delivered by a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub kind: NodeEventKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// Fires when the node's value changes (or the node is deleted)
    Data,
    /// Fires when a child is created or deleted (or the node is deleted)
    Children,
}

/// Receiving end of a one-shot subscription
///
/// Dropping it abandons the subscription. The store may still hold the other end until it fires.
pub type EventReceiver = oneshot::Receiver<Result<NodeEvent>>;

/// Session with a hierarchical node store
#[async_trait::async_trait]
pub trait NodeStore: Send + Sync + 'static {
    /// `None` when the node does not exist
    async fn exists(&self, path: &str) -> Result<Option<NodeStat>>;

    /// Names (not paths) of all children
    async fn children(&self, path: &str) -> Result<(Vec<String>, NodeStat)>;

    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Register a one-shot subscription on a single node
    async fn subscribe(&self, path: &str, subscription: Subscription) -> Result<EventReceiver>;
}

/// [Backend] for hierarchical node stores
#[derive(derive_new::new)]
pub struct NodeStoreBackend {
    store: Arc<dyn NodeStore>,
}

impl NodeStoreBackend {
    /// Record all leaves below `path`
    ///
    /// Failures inside nested branches are logged and skipped, only failures at the level of `path` itself are
    /// returned.
    fn walk<'a>(
        &'a self,
        path: &'a str,
        vars: &'a mut Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let (children, stat) = self.store.children(path).await?;

            if stat.num_children == 0 {
                self.read_leaf(path, vars).await?;
                return Ok(());
            }

            for child in children {
                let child_path = join_path(path, &child);

                // may have been deleted since listing
                let Some(stat) = self.store.exists(&child_path).await? else {
                    return Err(Error::NotFound(child_path));
                };

                if stat.num_children == 0 {
                    self.read_leaf(&child_path, vars).await?;
                } else if let Err(err) = self.walk(&child_path, vars).await {
                    tracing::warn!(path = %child_path, %err, "skipping branch");
                }
            }

            Ok(())
        })
    }

    async fn read_leaf(&self, path: &str, vars: &mut Snapshot) -> Result<()> {
        let value = self.store.get(path).await?;
        vars.insert(path.to_string(), String::from_utf8_lossy(&value).into_owned());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Backend for NodeStoreBackend {
    fn name(&self) -> &'static str {
        "node-store"
    }

    async fn get_values(&self, keys: &[String]) -> Result<Snapshot> {
        let mut vars = Snapshot::new();

        for key in keys {
            let path = match key.trim_end_matches("/*") {
                "" => "/",
                path => path,
            };

            if self.store.exists(path).await?.is_none() {
                return Err(Error::NotFound(path.to_string()));
            }

            self.walk(path, &mut vars).await?;
        }

        Ok(vars)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(%prefix))]
    async fn watch_prefix(
        &self,
        prefix: &str,
        keys: &[String],
        cursor: Cursor,
        mut stop: StopSignal,
    ) -> std::result::Result<Cursor, WatchError> {
        let entries = match self.get_values(&[prefix.to_string()]).await {
            Ok(entries) => entries,
            Err(err) => return Err(WatchError::new(cursor, err)),
        };

        let targets = watch_targets(&entries, keys);
        let cancel = CancellationToken::new();
        // cancels every node watch on all exit paths, including this future being dropped
        let _cancel_guard = cancel.clone().drop_guard();

        // every task relays at most once, sends never block
        let (relay, mut events) = mpsc::channel(targets.len().max(1));
        let mut tasks = JoinSet::new();
        for target in targets {
            tracing::debug!(path = %target, "watching");
            tasks.spawn(run_node_watch(
                self.store.clone(),
                target,
                cancel.clone(),
                relay.clone(),
            ));
        }
        drop(relay);

        let outcome = if is_stopped(&stop) {
            Ok(())
        } else {
            tokio::select! {
                Some(event) = events.recv() => event.map(|event| {
                    tracing::debug!(path = %event.path, kind = ?event.kind, "change detected");
                }),
                _ = stop.changed() => {
                    tracing::debug!("watch stopped");
                    Ok(())
                }
            }
        };

        cancel.cancel();
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(%err, "node watch task failed");
            }
        }

        match outcome {
            Ok(()) => Ok(cursor),
            Err(err) => Err(WatchError::new(cursor, err)),
        }
    }
}

/// All nodes to subscribe to for the keys in `entries` that match a filter
///
/// Each matching key contributes itself and every ancestor directory except `/`.
pub(crate) fn watch_targets(entries: &Snapshot, filters: &[String]) -> BTreeSet<String> {
    let mut targets = BTreeSet::new();

    for key in entries.keys().filter(|key| matches_any(key, filters)) {
        for dir in std::iter::successors(parent(key), |dir| parent(*dir)) {
            targets.insert(dir.to_string());
        }
        targets.insert(key.clone());
    }

    targets
}

fn parent(path: &str) -> Option<&str> {
    match path.rfind('/') {
        None | Some(0) => None,
        Some(index) => Some(&path[..index]),
    }
}

/// Live data and children subscriptions on one node
///
/// Consumed by its first event.
struct NodeWatch {
    path: String,
    data: EventReceiver,
    children: EventReceiver,
}

impl NodeWatch {
    async fn subscribe(store: &dyn NodeStore, path: String) -> Result<Self> {
        let data = store.subscribe(&path, Subscription::Data).await?;
        let children = store.subscribe(&path, Subscription::Children).await?;

        Ok(Self {
            path,
            data,
            children,
        })
    }

    async fn next_event(self) -> Result<NodeEvent> {
        let NodeWatch {
            path,
            data,
            children,
        } = self;

        let received = tokio::select! {
            event = data => event,
            event = children => event,
        };

        match received {
            Ok(event) => event,
            Err(_) => Err(Error::transport(format!("subscription on {path} closed"))),
        }
    }
}

async fn run_node_watch(
    store: Arc<dyn NodeStore>,
    path: String,
    cancel: CancellationToken,
    relay: mpsc::Sender<Result<NodeEvent>>,
) {
    let watch = async {
        let watch = NodeWatch::subscribe(store.as_ref(), path.clone()).await?;
        watch.next_event().await
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            // the store cannot withdraw a subscription, dropping the receivers abandons it
            tracing::trace!(%path, "stop watching");
        }
        event = watch => {
            // the watch call may already be gone
            let _ = relay.send(event).await;
        }
    }
}
