//! Routes client events to the store or straight to other sockets, and fans
//! collection snapshots out to everyone.
//!
//! Writes never broadcast directly: the store's change feed wakes the bridge,
//! which re-reads the collection and feeds [`BroadcastRouter::run`]. Meeting
//! events are not persisted and are relayed as they arrive.

use std::sync::Arc;

use chrono::Utc;
use connectpoint_proto::event::{ClientEvent, OperationFailure, ServerEvent};
use connectpoint_proto::message::{ChatMessage, group_by_channel};
use connectpoint_proto::task::{Task, TaskMutation};
use tokio::sync::mpsc;

use crate::bridge::Snapshot;
use crate::registry::{ConnectionHandle, ConnectionRegistry, RegistryError};
use crate::store::{Store, StoreError};

/// Event name reported when a frame could not be decoded at all.
pub const UNKNOWN_EVENT: &str = "unknown";

/// Why a client event was dropped.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The store refused or failed the write.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The relay could not be delivered.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Dispatches client events and broadcasts snapshots.
pub struct BroadcastRouter {
    store: Arc<Store>,
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    /// Creates a router over a store and a connection registry.
    #[must_use]
    pub const fn new(store: Arc<Store>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// The frames a newly connected socket receives first: every message
    /// grouped by channel, then every task.
    pub async fn initial_sync(&self) -> Vec<ServerEvent> {
        let messages = self.store.messages.find_all().await;
        let tasks = self.store.tasks.find_all().await;
        vec![
            ServerEvent::InitialMessages(group_by_channel(messages)),
            ServerEvent::TasksUpdated(tasks),
        ]
    }

    /// Broadcasts every snapshot the bridge produces until the bridge side
    /// of the channel closes.
    pub async fn run(self: Arc<Self>, mut snapshots: mpsc::Receiver<Snapshot>) {
        while let Some(snapshot) = snapshots.recv().await {
            let event = Self::format(snapshot);
            match self.registry.broadcast(&event).await {
                Ok(delivered) => {
                    tracing::debug!(event = event.name(), delivered, "snapshot broadcast");
                }
                Err(e) => {
                    tracing::error!(event = event.name(), error = %e, "snapshot broadcast failed");
                }
            }
        }
        tracing::info!("snapshot channel closed, router stopping");
    }

    /// Turns a bridge snapshot into the event clients expect.
    #[must_use]
    pub fn format(snapshot: Snapshot) -> ServerEvent {
        match snapshot {
            Snapshot::Messages(messages) => ServerEvent::InitialMessages(group_by_channel(messages)),
            Snapshot::Tasks(tasks) => ServerEvent::TasksUpdated(tasks),
        }
    }

    /// Handles one decoded client event.
    ///
    /// Failures are logged and reported to the triggering socket with
    /// `operation-failed`; nothing is retried.
    pub async fn handle(&self, conn: &ConnectionHandle, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.dispatch(conn, event).await {
            tracing::warn!(session = %conn.id(), event = name, error = %e, "operation failed");
            Self::report_failure(conn, name, &e.to_string());
        }
    }

    /// Answers a socket with `operation-failed`.
    pub fn report_failure(conn: &ConnectionHandle, event: &str, reason: &str) {
        let failure = ServerEvent::OperationFailed(OperationFailure {
            event: event.to_string(),
            reason: reason.to_string(),
        });
        if let Err(e) = conn.emit(&failure) {
            tracing::debug!(session = %conn.id(), error = %e, "could not report failure");
        }
    }

    async fn dispatch(&self, conn: &ConnectionHandle, event: ClientEvent) -> Result<(), RouterError> {
        match event {
            ClientEvent::SendMessage(new) => {
                let channel = new.channel_id.clone();
                let id = self
                    .store
                    .messages
                    .insert(ChatMessage::from_new(new, Utc::now()))
                    .await?;
                tracing::info!(session = %conn.id(), channel = %channel, id = %id, "message stored");
            }
            ClientEvent::AddTask(new) => {
                let id = self.store.tasks.insert(Task::from_new(new)).await?;
                tracing::info!(session = %conn.id(), id = %id, "task created");
            }
            ClientEvent::UpdateTask(change) => {
                let op = change.updates.name();
                self.store
                    .tasks
                    .update_by_id(change.task_id.as_str(), |task| task.apply(change.updates))
                    .await?;
                tracing::info!(session = %conn.id(), task = %change.task_id, op, "task updated");
            }
            ClientEvent::AddUpdateToTask(note) => {
                self.store
                    .tasks
                    .update_by_id(note.task_id.as_str(), |task| {
                        task.apply(TaskMutation::AppendUpdate(note.update))
                    })
                    .await?;
                tracing::info!(session = %conn.id(), task = %note.task_id, "task update appended");
            }
            ClientEvent::StartMeeting(info) => {
                tracing::info!(
                    session = %conn.id(),
                    channel = %info.channel_id,
                    "meeting started"
                );
                conn.broadcast(&ServerEvent::MeetingStarted(info)).await?;
            }
            ClientEvent::UserJoinedMeeting(presence) => {
                tracing::info!(
                    session = %conn.id(),
                    channel = %presence.channel_id,
                    user = %presence.username,
                    "user joined meeting"
                );
                conn.broadcast_except_self(&ServerEvent::UserJoined(presence))
                    .await?;
            }
            ClientEvent::UserLeftMeeting(presence) => {
                tracing::info!(
                    session = %conn.id(),
                    channel = %presence.channel_id,
                    user = %presence.username,
                    "user left meeting"
                );
                conn.broadcast_except_self(&ServerEvent::UserLeft(presence))
                    .await?;
            }
        }
        Ok(())
    }
}
