//! Turns user intents into client events.
//!
//! Every intent is checked locally first: permissions, a pending proposal
//! where one is required, and the same payload rules the server enforces.
//! A refused intent produces an [`ActionError`] and nothing is sent.

use chrono::{DateTime, Utc};
use connectpoint_proto::event::{ClientEvent, MeetingInfo, MeetingPresence, TaskChange, TaskNote};
use connectpoint_proto::message::{FileAttachment, NewMessage};
use connectpoint_proto::task::{
    NewTask, PendingUpdate, Priority, Progress, Task, TaskId, TaskMutation, Team, Update,
    UpdateContent,
};
use connectpoint_proto::validate::{Validate, ValidationError};

use crate::auth::AuthenticatedUser;

/// Why an intent was refused locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Only admins may do this.
    #[error("only admins can {0}")]
    NotAuthorized(&'static str),

    /// Approve or reject on a task without a proposal.
    #[error("task {0} has no pending update")]
    NothingPending(TaskId),

    /// The resulting payload would be rejected by the server.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// A signed-in user acting on the workspace.
#[derive(Debug, Clone)]
pub struct Actor {
    user: AuthenticatedUser,
}

impl Actor {
    /// Wraps a signed-in user.
    #[must_use]
    pub const fn new(user: AuthenticatedUser) -> Self {
        Self { user }
    }

    /// The signed-in user.
    #[must_use]
    pub const fn user(&self) -> &AuthenticatedUser {
        &self.user
    }

    /// Posts text to a channel. `@name` tokens become mentions.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Invalid`] for an empty channel or text.
    pub fn send_message(&self, channel_id: &str, text: &str) -> Result<ClientEvent, ActionError> {
        let msg = NewMessage::text(self.user.user_ref(), channel_id, text);
        Self::checked(ClientEvent::SendMessage(msg))
    }

    /// Shares a file in a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Invalid`] for an empty channel.
    pub fn share_file(
        &self,
        channel_id: &str,
        file: FileAttachment,
    ) -> Result<ClientEvent, ActionError> {
        let msg = NewMessage {
            user: self.user.user_ref(),
            text: None,
            image: None,
            file: Some(file),
            mentions: Vec::new(),
            channel_id: channel_id.to_string(),
        };
        Self::checked(ClientEvent::SendMessage(msg))
    }

    /// Creates a task assigned to the current user with no progress.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Invalid`] for an empty or overlong title.
    pub fn add_task(
        &self,
        title: &str,
        priority: Priority,
        team: Team,
        due_date: DateTime<Utc>,
    ) -> Result<ClientEvent, ActionError> {
        Self::checked(ClientEvent::AddTask(NewTask {
            title: title.to_string(),
            priority,
            assignee: self.user.user_ref(),
            progress: Progress::ZERO,
            due_date,
            team,
        }))
    }

    /// Edits a task's title and/or progress.
    ///
    /// Admins change the task directly. Anyone else files a proposal for an
    /// admin to review; fields left out keep the task's current values.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Invalid`] if nothing changes or the title is
    /// not acceptable.
    pub fn edit_task(
        &self,
        task: &Task,
        title: Option<String>,
        progress: Option<Progress>,
    ) -> Result<ClientEvent, ActionError> {
        let updates = if self.user.is_admin() {
            TaskMutation::SetFields { title, progress }
        } else {
            if title.is_none() && progress.is_none() {
                return Err(ValidationError::EmptyFieldUpdate.into());
            }
            TaskMutation::SetPendingUpdate(PendingUpdate {
                title: title.unwrap_or_else(|| task.title.clone()),
                progress: progress.unwrap_or(task.progress),
            })
        };
        Self::checked(ClientEvent::UpdateTask(TaskChange {
            task_id: task.id.clone(),
            updates,
        }))
    }

    /// Accepts the task's pending proposal as currently seen.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotAuthorized`] for non-admins and
    /// [`ActionError::NothingPending`] if there is nothing to approve.
    pub fn approve(&self, task: &Task) -> Result<ClientEvent, ActionError> {
        let pending = self.review(task, "approve updates")?;
        Self::checked(ClientEvent::UpdateTask(TaskChange {
            task_id: task.id.clone(),
            updates: TaskMutation::ApprovePendingUpdate(pending.clone()),
        }))
    }

    /// Discards the task's pending proposal.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotAuthorized`] for non-admins and
    /// [`ActionError::NothingPending`] if there is nothing to reject.
    pub fn reject(&self, task: &Task) -> Result<ClientEvent, ActionError> {
        self.review(task, "reject updates")?;
        Self::checked(ClientEvent::UpdateTask(TaskChange {
            task_id: task.id.clone(),
            updates: TaskMutation::ClearPendingUpdate,
        }))
    }

    /// Attaches a progress note to a task.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Invalid`] if the task has no id.
    pub fn add_update(&self, task: &Task, content: UpdateContent) -> Result<ClientEvent, ActionError> {
        Self::checked(ClientEvent::AddUpdateToTask(TaskNote {
            task_id: task.id.clone(),
            update: Update {
                id: uuid::Uuid::now_v7().to_string(),
                content,
                author: self.user.username.clone(),
                timestamp: Utc::now(),
            },
        }))
    }

    /// Announces a call in a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Invalid`] for an empty channel.
    pub fn start_meeting(
        &self,
        channel_id: &str,
        channel_name: &str,
    ) -> Result<ClientEvent, ActionError> {
        Self::checked(ClientEvent::StartMeeting(MeetingInfo {
            channel_id: channel_id.to_string(),
            channel_name: channel_name.to_string(),
        }))
    }

    /// Joins the call in a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Invalid`] for an empty channel.
    pub fn join_meeting(&self, channel_id: &str) -> Result<ClientEvent, ActionError> {
        Self::checked(ClientEvent::UserJoinedMeeting(self.presence(channel_id)))
    }

    /// Leaves the call in a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Invalid`] for an empty channel.
    pub fn leave_meeting(&self, channel_id: &str) -> Result<ClientEvent, ActionError> {
        Self::checked(ClientEvent::UserLeftMeeting(self.presence(channel_id)))
    }

    fn presence(&self, channel_id: &str) -> MeetingPresence {
        MeetingPresence {
            channel_id: channel_id.to_string(),
            username: self.user.username.clone(),
        }
    }

    fn review<'t>(
        &self,
        task: &'t Task,
        action: &'static str,
    ) -> Result<&'t PendingUpdate, ActionError> {
        if !self.user.is_admin() {
            return Err(ActionError::NotAuthorized(action));
        }
        task.pending_update
            .as_ref()
            .ok_or_else(|| ActionError::NothingPending(task.id.clone()))
    }

    fn checked(event: ClientEvent) -> Result<ClientEvent, ActionError> {
        event.validate()?;
        Ok(event)
    }
}
