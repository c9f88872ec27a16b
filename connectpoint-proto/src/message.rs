//! Chat message model, mention extraction and per-channel grouping.
//!
//! Messages are immutable once stored. The server assigns the identity and
//! the timestamp; everything else comes from the sending client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validate::{Validate, ValidationError};

/// Messages of every channel, keyed by channel id, each bucket ordered by
/// timestamp ascending.
pub type ChannelMessages = BTreeMap<String, Vec<ChatMessage>>;

/// Server-assigned message identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
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

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display identity of a person (message author, task assignee).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRef {
    /// Display name.
    pub name: String,
    /// Avatar URL, empty for system users.
    pub avatar: String,
}

impl UserRef {
    /// Creates a user reference.
    #[must_use]
    pub fn new(name: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: avatar.into(),
        }
    }

    /// The synthetic author of server and client notices.
    #[must_use]
    pub fn system() -> Self {
        Self::new("System", "")
    }
}

/// A file shared in a chat message or attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileAttachment {
    /// Where the file can be fetched.
    pub url: String,
    /// Original file name.
    pub name: String,
    /// Human-readable size, as reported by the uploader.
    pub size: String,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned identity.
    pub id: MessageId,
    /// Author.
    pub user: UserRef,
    /// Text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Attached file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
    /// Usernames mentioned with `@`, in order of appearance.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// When the server accepted the message.
    pub timestamp: DateTime<Utc>,
    /// Channel the message belongs to. Never changes after creation.
    pub channel_id: String,
}

impl ChatMessage {
    /// Builds a message from a client submission, stamping it with the
    /// server's clock. The identity is assigned by the store on insert.
    #[must_use]
    pub fn from_new(new: NewMessage, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::default(),
            user: new.user,
            text: new.text,
            image: new.image,
            file: new.file,
            mentions: new.mentions,
            timestamp,
            channel_id: new.channel_id,
        }
    }

    /// A local notice authored by [`UserRef::system`].
    #[must_use]
    pub fn system_notice(
        id: MessageId,
        channel_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user: UserRef::system(),
            text: Some(text.into()),
            image: None,
            file: None,
            mentions: Vec::new(),
            timestamp,
            channel_id: channel_id.into(),
        }
    }
}

/// Payload of `send-message`: a message as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewMessage {
    /// Author.
    pub user: UserRef,
    /// Text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Attached file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
    /// Mentions extracted by the client before sending.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// Target channel.
    pub channel_id: String,
}

impl NewMessage {
    /// A text message with its mentions extracted.
    #[must_use]
    pub fn text(user: UserRef, channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            user,
            mentions: extract_mentions(&text),
            text: Some(text),
            image: None,
            file: None,
            channel_id: channel_id.into(),
        }
    }
}

impl Validate for NewMessage {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.channel_id.trim().is_empty() {
            return Err(ValidationError::EmptyChannel);
        }
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text && self.image.is_none() && self.file.is_none() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(())
    }
}

/// Collects `@` mentions from message text.
///
/// Every whitespace-delimited token starting with `@` contributes the token
/// without its marker. Duplicates are kept and nothing is checked against
/// real usernames.
#[must_use]
pub fn extract_mentions(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|token| token.strip_prefix('@'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Groups messages by channel.
///
/// All messages are stably sorted by timestamp first, so each bucket is in
/// non-decreasing timestamp order and ties keep their input order.
#[must_use]
pub fn group_by_channel(mut messages: Vec<ChatMessage>) -> ChannelMessages {
    messages.sort_by_key(|m| m.timestamp);
    let mut grouped = ChannelMessages::new();
    for msg in messages {
        grouped.entry(msg.channel_id.clone()).or_default().push(msg);
    }
    grouped
}
