//! Baseline content for a fresh workspace.

use chrono::{DateTime, Duration, Utc};
use connectpoint_proto::message::{ChatMessage, MessageId, UserRef};
use connectpoint_proto::task::{Priority, Progress, ProgressOutOfRange, Task, TaskId, Team};

use crate::store::{Store, StoreError};

/// Channel that receives the welcome message.
pub const WELCOME_CHANNEL: &str = "channel-1";

const WELCOME_TEXT: &str = "Welcome to ConnectPoint! This is the #general channel.";
const PLACEHOLDER_AVATAR: &str = "https://placehold.co/32x32.png";

/// What a seeding pass inserted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    /// Tasks inserted.
    pub tasks: usize,
    /// Messages inserted.
    pub messages: usize,
}

/// Inserts the baseline tasks and welcome message into empty collections.
///
/// Each collection is seeded independently and only when it is empty, so
/// running this against a populated store is a no-op.
///
/// # Errors
///
/// Returns a [`StoreError`] if an insert fails.
pub async fn seed_if_empty(store: &Store) -> Result<SeedReport, StoreError> {
    let mut report = SeedReport::default();
    let now = Utc::now();

    if store.tasks.count().await == 0 {
        let tasks = baseline_tasks(now).map_err(|e| StoreError::Storage(e.to_string()))?;
        report.tasks = store.tasks.insert_many(tasks).await?.len();
        tracing::info!(count = report.tasks, "seeded baseline tasks");
    }

    if store.messages.count().await == 0 {
        store.messages.insert(welcome_message(now)).await?;
        report.messages = 1;
        tracing::info!(channel = WELCOME_CHANNEL, "seeded welcome message");
    }

    Ok(report)
}

fn welcome_message(now: DateTime<Utc>) -> ChatMessage {
    ChatMessage::system_notice(MessageId::default(), WELCOME_CHANNEL, WELCOME_TEXT, now)
}

fn baseline_tasks(now: DateTime<Utc>) -> Result<Vec<Task>, ProgressOutOfRange> {
    let task = |title: &str,
                priority: Priority,
                assignee: &str,
                progress: u8,
                due_in_days: i64,
                team: Team|
     -> Result<Task, ProgressOutOfRange> {
        Ok(Task {
            id: TaskId::default(),
            title: title.to_string(),
            priority,
            assignee: UserRef::new(assignee, PLACEHOLDER_AVATAR),
            progress: Progress::new(progress)?,
            due_date: now + Duration::days(due_in_days),
            team,
            updates: Vec::new(),
            pending_update: None,
        })
    };

    Ok(vec![
        task(
            "Design final UI mockups for the new landing page",
            Priority::High,
            "Alice",
            15,
            2,
            Team::Design,
        )?,
        task(
            "Setup CI/CD pipeline",
            Priority::Medium,
            "Bob",
            0,
            5,
            Team::Backend,
        )?,
        task(
            "Develop user authentication flow",
            Priority::High,
            "Charlie",
            75,
            7,
            Team::Frontend,
        )?,
        task(
            "Initial project setup and dependency installation",
            Priority::Low,
            "David",
            100,
            -2,
            Team::General,
        )?,
    ])
}
