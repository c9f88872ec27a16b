//! The event catalog exchanged over a client connection.
//!
//! Every frame is a JSON object `{"event": <name>, "payload": <shape>}`.
//! [`ClientEvent`] lists what clients may send, [`ServerEvent`] what the
//! server pushes. Both sets are closed: anything else fails to decode.

use serde::{Deserialize, Serialize};

use crate::message::{ChannelMessages, NewMessage};
use crate::task::{NewTask, Task, TaskId, TaskMutation, Update};
use crate::validate::{Validate, ValidationError};

/// Payload of `update-task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskChange {
    /// Task to change.
    pub task_id: TaskId,
    /// How to change it.
    pub updates: TaskMutation,
}

/// Payload of `add-update-to-task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskNote {
    /// Task to annotate.
    pub task_id: TaskId,
    /// The note to append.
    pub update: Update,
}

/// Payload of `start-meeting` and `meeting-started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MeetingInfo {
    /// Channel hosting the call.
    pub channel_id: String,
    /// Display name of that channel.
    pub channel_name: String,
}

/// Payload of the meeting membership events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MeetingPresence {
    /// Channel hosting the call.
    pub channel_id: String,
    /// Who joined or left.
    pub username: String,
}

/// Payload of `operation-failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationFailure {
    /// Name of the client event that failed, or `unknown` if the frame
    /// could not be decoded.
    pub event: String,
    /// Human-readable cause.
    pub reason: String,
}

/// Events a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ClientEvent {
    /// Post a chat message.
    SendMessage(NewMessage),
    /// Create a task.
    AddTask(NewTask),
    /// Change a task through one mutation intent.
    UpdateTask(TaskChange),
    /// Append a progress note to a task.
    AddUpdateToTask(TaskNote),
    /// Announce a call in a channel.
    StartMeeting(MeetingInfo),
    /// The sender joined a call.
    UserJoinedMeeting(MeetingPresence),
    /// The sender left a call.
    UserLeftMeeting(MeetingPresence),
}

impl ClientEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "send-message",
            Self::AddTask(_) => "add-task",
            Self::UpdateTask(_) => "update-task",
            Self::AddUpdateToTask(_) => "add-update-to-task",
            Self::StartMeeting(_) => "start-meeting",
            Self::UserJoinedMeeting(_) => "user-joined-meeting",
            Self::UserLeftMeeting(_) => "user-left-meeting",
        }
    }
}

impl Validate for ClientEvent {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::SendMessage(msg) => msg.validate(),
            Self::AddTask(task) => task.validate(),
            Self::UpdateTask(change) => {
                if change.task_id.is_unassigned() {
                    return Err(ValidationError::EmptyTaskId);
                }
                change.updates.validate()
            }
            Self::AddUpdateToTask(note) => {
                if note.task_id.is_unassigned() {
                    return Err(ValidationError::EmptyTaskId);
                }
                note.update.validate()
            }
            Self::StartMeeting(info) => {
                if info.channel_id.trim().is_empty() {
                    return Err(ValidationError::EmptyChannel);
                }
                Ok(())
            }
            Self::UserJoinedMeeting(presence) | Self::UserLeftMeeting(presence) => {
                if presence.channel_id.trim().is_empty() {
                    return Err(ValidationError::EmptyChannel);
                }
                if presence.username.trim().is_empty() {
                    return Err(ValidationError::EmptyUsername);
                }
                Ok(())
            }
        }
    }
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ServerEvent {
    /// Every stored message, grouped by channel.
    InitialMessages(ChannelMessages),
    /// Every stored task, in insertion order.
    TasksUpdated(Vec<Task>),
    /// A call started somewhere.
    MeetingStarted(MeetingInfo),
    /// Someone else joined a call.
    UserJoined(MeetingPresence),
    /// Someone else left a call.
    UserLeft(MeetingPresence),
    /// A request from this client was dropped.
    OperationFailed(OperationFailure),
}

impl ServerEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InitialMessages(_) => "initial-messages",
            Self::TasksUpdated(_) => "tasks-updated",
            Self::MeetingStarted(_) => "meeting-started",
            Self::UserJoined(_) => "user-joined",
            Self::UserLeft(_) => "user-left",
            Self::OperationFailed(_) => "operation-failed",
        }
    }

    /// Whether this event carries a full-state snapshot.
    #[must_use]
    pub const fn is_snapshot(&self) -> bool {
        matches!(self, Self::InitialMessages(_) | Self::TasksUpdated(_))
    }
}
