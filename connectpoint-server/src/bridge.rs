//! Turns store change notifications into full collection snapshots.
//!
//! One task per collection waits on its [`ChangeStream`], re-reads the whole
//! collection on every wake and hands the result to the router. Feeds are
//! opened once at startup and never re-established.

use std::sync::Arc;

use connectpoint_proto::message::ChatMessage;
use connectpoint_proto::task::Task;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::{Collection, Record, Store};

/// Capacity of the bridge → router channel.
pub const SNAPSHOT_BUFFER: usize = 32;

/// A full re-read of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// Every stored message.
    Messages(Vec<ChatMessage>),
    /// Every stored task.
    Tasks(Vec<Task>),
}

/// Running watch tasks.
pub struct ChangeBridge {
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeBridge {
    /// Opens a change stream per collection and spawns its watch task.
    ///
    /// A collection whose stream cannot be opened is logged once and left
    /// without live updates; the other collection is unaffected.
    #[must_use]
    pub fn start(store: &Arc<Store>, snapshots: &mpsc::Sender<Snapshot>) -> Self {
        let tasks = [
            watch_collection(
                Arc::clone(store),
                |s| &s.messages,
                Snapshot::Messages,
                snapshots.clone(),
            ),
            watch_collection(
                Arc::clone(store),
                |s| &s.tasks,
                Snapshot::Tasks,
                snapshots.clone(),
            ),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self { tasks }
    }

    /// Number of collections with a live feed.
    #[must_use]
    pub fn live_feeds(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Stops every watch task.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn watch_collection<T: Record>(
    store: Arc<Store>,
    select: fn(&Store) -> &Collection<T>,
    wrap: fn(Vec<T>) -> Snapshot,
    tx: mpsc::Sender<Snapshot>,
) -> Option<JoinHandle<()>> {
    let collection = select(&store).name();
    let mut changes = match select(&store).watch() {
        Ok(changes) => changes,
        Err(e) => {
            tracing::warn!(
                collection,
                error = %e,
                "change stream unavailable, real-time updates disabled"
            );
            return None;
        }
    };

    tracing::info!(collection, "watching for changes");
    Some(tokio::spawn(async move {
        while changes.next().await.is_some() {
            let records = select(&store).find_all().await;
            tracing::debug!(collection, count = records.len(), "collection changed");
            if tx.send(wrap(records)).await.is_err() {
                tracing::debug!(collection, "router gone, stopping watch");
                return;
            }
        }
        tracing::warn!(collection, "change stream ended, real-time updates stopped");
    }))
}
