//! Client-side reconciliation of server events.
//!
//! The server only ever sends whole collections, so reconciling is
//! replacement: `initial-messages` swaps the message map, `tasks-updated`
//! swaps the task list. Meeting events only touch local state.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use connectpoint_proto::board::Board;
use connectpoint_proto::event::{MeetingInfo, OperationFailure, ServerEvent};
use connectpoint_proto::message::{ChannelMessages, ChatMessage, MessageId};
use connectpoint_proto::task::Task;

/// Prefix of ids given to notices that only exist on this client.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Everything the client knows about the workspace.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    messages: ChannelMessages,
    tasks: Vec<Task>,
    active_channel: String,
    participants: HashMap<String, BTreeSet<String>>,
    last_error: Option<OperationFailure>,
    messages_synced: bool,
    tasks_synced: bool,
}

impl ClientState {
    /// Empty state viewing `active_channel`.
    #[must_use]
    pub fn new(active_channel: impl Into<String>) -> Self {
        Self {
            active_channel: active_channel.into(),
            ..Self::default()
        }
    }

    /// Reconciles one server event.
    pub fn apply(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::InitialMessages(messages) => {
                self.messages = messages;
                self.messages_synced = true;
            }
            ServerEvent::TasksUpdated(tasks) => {
                self.tasks = tasks;
                self.tasks_synced = true;
            }
            ServerEvent::MeetingStarted(info) => self.note_meeting(&info),
            ServerEvent::UserJoined(presence) => {
                self.participants
                    .entry(presence.channel_id)
                    .or_default()
                    .insert(presence.username);
            }
            ServerEvent::UserLeft(presence) => {
                if let Some(present) = self.participants.get_mut(&presence.channel_id) {
                    present.remove(&presence.username);
                }
            }
            ServerEvent::OperationFailed(failure) => {
                tracing::warn!(event = %failure.event, reason = %failure.reason, "server rejected request");
                self.last_error = Some(failure);
            }
        }
    }

    fn note_meeting(&mut self, info: &MeetingInfo) {
        if info.channel_id != self.active_channel {
            return;
        }
        let notice = ChatMessage::system_notice(
            MessageId::new(format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::now_v7())),
            info.channel_id.clone(),
            format!("A meeting has started in #{}", info.channel_name),
            Utc::now(),
        );
        self.messages
            .entry(info.channel_id.clone())
            .or_default()
            .push(notice);
    }

    /// Whether both initial snapshots have arrived.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.messages_synced && self.tasks_synced
    }

    /// Channel currently on screen.
    #[must_use]
    pub fn active_channel(&self) -> &str {
        &self.active_channel
    }

    /// Switches the channel on screen.
    pub fn set_active_channel(&mut self, channel: impl Into<String>) {
        self.active_channel = channel.into();
    }

    /// Messages of one channel, oldest first.
    #[must_use]
    pub fn messages(&self, channel: &str) -> &[ChatMessage] {
        self.messages
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Messages of the active channel.
    #[must_use]
    pub fn active_messages(&self) -> &[ChatMessage] {
        self.messages(&self.active_channel)
    }

    /// All tasks in server order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Messages in `channel` that `author` posted with exactly `text`.
    #[must_use]
    pub fn authored(&self, channel: &str, author: &str, text: &str) -> usize {
        self.messages(channel)
            .iter()
            .filter(|m| m.user.name == author && m.text.as_deref() == Some(text))
            .count()
    }

    /// Tasks titled `title` that are assigned to `assignee`.
    #[must_use]
    pub fn assigned(&self, title: &str, assignee: &str) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.title == title && t.assignee.name == assignee)
            .count()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id.as_str() == id)
    }

    /// Tasks split into board columns.
    #[must_use]
    pub fn board(&self) -> Board<'_> {
        Board::categorize(&self.tasks)
    }

    /// Users currently in the call of `channel`, sorted.
    #[must_use]
    pub fn participants(&self, channel: &str) -> Vec<&str> {
        self.participants
            .get(channel)
            .map(|p| p.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// The most recent `operation-failed`, if any.
    #[must_use]
    pub const fn last_error(&self) -> Option<&OperationFailure> {
        self.last_error.as_ref()
    }

    /// Clears and returns the last failure.
    pub fn take_last_error(&mut self) -> Option<OperationFailure> {
        self.last_error.take()
    }
}
