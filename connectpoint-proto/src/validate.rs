//! Payload validation shared by the codec and the server write path.
//!
//! Serde already rejects payloads of the wrong shape. The checks here cover
//! the invariants a well-formed JSON document can still violate.

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// A payload that decoded cleanly but breaks a model invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A message or meeting event named no channel.
    #[error("channel id cannot be empty")]
    EmptyChannel,
    /// A chat message had no text, image or file.
    #[error("message has no text, image or file")]
    EmptyMessage,
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    EmptyTitle,
    /// Task title exceeds [`MAX_TASK_TITLE_LENGTH`].
    #[error("task title too long (max {MAX_TASK_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// A task mutation or update referenced no task.
    #[error("task id cannot be empty")]
    EmptyTaskId,
    /// `SetFields` carried neither a title nor a progress value.
    #[error("field update changes nothing")]
    EmptyFieldUpdate,
    /// A meeting presence event named no user.
    #[error("username cannot be empty")]
    EmptyUsername,
    /// A task update had no id or no author.
    #[error("task update is missing its {0}")]
    IncompleteUpdate(&'static str),
}

/// Checks the invariants of an inbound payload.
pub trait Validate {
    /// Returns the first violated invariant, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the violation.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Validates a task title against the length and emptiness rules.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyTitle`] or [`ValidationError::TitleTooLong`].
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(())
}
