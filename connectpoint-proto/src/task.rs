//! Task board model and the mutation intents that may change a task.
//!
//! A task is only ever changed through a [`TaskMutation`]. Arbitrary partial
//! records are not accepted, so a client cannot overwrite `id` or rewrite the
//! `updates` history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{FileAttachment, UserRef};
use crate::validate::{Validate, ValidationError, validate_title};

/// Server-assigned task identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a fresh time-ordered identifier (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the store has not assigned an identity yet.
    #[must_use]
    pub const fn is_unassigned(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Needs attention first.
    High,
    /// Default priority.
    Medium,
    /// Can wait.
    Low,
}

/// Team that owns a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    /// Cross-team work.
    General,
    /// Design team.
    Design,
    /// Frontend developers.
    Frontend,
    /// Backend developers.
    Backend,
}

/// Completion percentage, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Progress(u8);

/// A progress value above 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("progress must be between 0 and 100, got {0}")]
pub struct ProgressOutOfRange(pub u8);

impl Progress {
    /// No work done.
    pub const ZERO: Self = Self(0);
    /// Finished.
    pub const COMPLETE: Self = Self(100);

    /// Creates a progress value.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressOutOfRange`] for values above 100.
    pub const fn new(value: u8) -> Result<Self, ProgressOutOfRange> {
        if value > 100 {
            Err(ProgressOutOfRange(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Returns the percentage.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Progress {
    type Error = ProgressOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Progress> for u8 {
    fn from(progress: Progress) -> Self {
        progress.0
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Board column of a task, derived from its progress. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// `progress == 0`.
    Todo,
    /// `0 < progress < 100`.
    InProgress,
    /// `progress == 100`.
    Done,
}

impl TaskStatus {
    /// Derives the status for a progress value.
    #[must_use]
    pub const fn from_progress(progress: Progress) -> Self {
        match progress.value() {
            0 => Self::Todo,
            100 => Self::Done,
            _ => Self::InProgress,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// One entry of a checklist update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChecklistItem {
    /// Client-assigned item id.
    pub id: String,
    /// Item text.
    pub text: String,
    /// Whether the item is ticked.
    pub completed: bool,
}

/// A recorded voice note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceNote {
    /// Where the recording can be fetched.
    pub url: String,
    /// Recording length in milliseconds.
    pub duration: u64,
}

/// Body of a task update. Serialized as the `type` / `content` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum UpdateContent {
    /// Free text.
    Text(String),
    /// An ordered checklist.
    Checklist(Vec<ChecklistItem>),
    /// A voice recording.
    Voice(VoiceNote),
    /// An attached file.
    File(FileAttachment),
}

/// An append-only progress note on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Client-assigned id.
    pub id: String,
    /// What was attached.
    #[serde(flatten)]
    pub content: UpdateContent,
    /// Username of the author.
    pub author: String,
    /// When the author created the update.
    pub timestamp: DateTime<Utc>,
}

impl Validate for Update {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::IncompleteUpdate("id"));
        }
        if self.author.trim().is_empty() {
            return Err(ValidationError::IncompleteUpdate("author"));
        }
        Ok(())
    }
}

/// A proposed title/progress change awaiting approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingUpdate {
    /// Proposed title.
    pub title: String,
    /// Proposed progress.
    pub progress: Progress,
}

impl Validate for PendingUpdate {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }
}

/// A task on the shared board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-assigned identity.
    pub id: TaskId,
    /// Title.
    pub title: String,
    /// Priority.
    pub priority: Priority,
    /// Person responsible.
    pub assignee: UserRef,
    /// Completion percentage.
    pub progress: Progress,
    /// Deadline.
    pub due_date: DateTime<Utc>,
    /// Owning team.
    pub team: Team,
    /// Progress notes, in arrival order.
    #[serde(default)]
    pub updates: Vec<Update>,
    /// At most one outstanding proposal.
    #[serde(default)]
    pub pending_update: Option<PendingUpdate>,
}

impl Task {
    /// Builds a task from a client submission: no updates, nothing pending.
    /// The identity is assigned by the store on insert.
    #[must_use]
    pub fn from_new(new: NewTask) -> Self {
        Self {
            id: TaskId::default(),
            title: new.title,
            priority: new.priority,
            assignee: new.assignee,
            progress: new.progress,
            due_date: new.due_date,
            team: new.team,
            updates: Vec::new(),
            pending_update: None,
        }
    }

    /// Derived board column.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        TaskStatus::from_progress(self.progress)
    }

    /// Applies one mutation intent in place.
    ///
    /// Approval copies the proposal carried by the mutation, which is the one
    /// the approver saw. It is applied even if the task's own proposal has
    /// since been replaced or cleared (last write wins).
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] and leaves the task untouched if the
    /// mutation is invalid.
    pub fn apply(&mut self, mutation: TaskMutation) -> Result<(), ValidationError> {
        mutation.validate()?;
        match mutation {
            TaskMutation::SetFields { title, progress } => {
                if let Some(title) = title {
                    self.title = title;
                }
                if let Some(progress) = progress {
                    self.progress = progress;
                }
            }
            TaskMutation::SetPendingUpdate(pending) => {
                self.pending_update = Some(pending);
            }
            TaskMutation::ApprovePendingUpdate(pending) => {
                self.title = pending.title;
                self.progress = pending.progress;
                self.pending_update = None;
            }
            TaskMutation::ClearPendingUpdate => {
                self.pending_update = None;
            }
            TaskMutation::AppendUpdate(update) => {
                self.updates.push(update);
            }
        }
        Ok(())
    }
}

/// Payload of `add-task`: a task as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTask {
    /// Title.
    pub title: String,
    /// Priority.
    pub priority: Priority,
    /// Person responsible.
    pub assignee: UserRef,
    /// Initial progress.
    pub progress: Progress,
    /// Deadline.
    pub due_date: DateTime<Utc>,
    /// Owning team.
    pub team: Team,
}

impl Validate for NewTask {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }
}

/// The ways a stored task may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum TaskMutation {
    /// Direct edit by a privileged user.
    SetFields {
        /// New title, if changing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// New progress, if changing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<Progress>,
    },
    /// Proposal by a non-privileged user. Replaces any earlier proposal.
    SetPendingUpdate(PendingUpdate),
    /// Accept a proposal: apply its fields and clear it.
    ApprovePendingUpdate(PendingUpdate),
    /// Reject a proposal without applying it.
    ClearPendingUpdate,
    /// Append a progress note.
    AppendUpdate(Update),
}

impl TaskMutation {
    /// Short name used in logs and failure reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetFields { .. } => "set-fields",
            Self::SetPendingUpdate(_) => "set-pending-update",
            Self::ApprovePendingUpdate(_) => "approve-pending-update",
            Self::ClearPendingUpdate => "clear-pending-update",
            Self::AppendUpdate(_) => "append-update",
        }
    }
}

impl Validate for TaskMutation {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::SetFields { title, progress } => {
                if title.is_none() && progress.is_none() {
                    return Err(ValidationError::EmptyFieldUpdate);
                }
                title.as_deref().map_or(Ok(()), validate_title)
            }
            Self::SetPendingUpdate(pending) | Self::ApprovePendingUpdate(pending) => {
                pending.validate()
            }
            Self::ClearPendingUpdate => Ok(()),
            Self::AppendUpdate(update) => update.validate(),
        }
    }
}
