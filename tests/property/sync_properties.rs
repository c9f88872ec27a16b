//! Property-based tests for the shared sync model.
//!
//! Uses proptest to verify:
//! 1. Channel grouping keeps every message, in its own channel, in
//!    non-decreasing timestamp order.
//! 2. Mention extraction only ever yields `@` tokens, without the marker.
//! 3. Task mutations keep their invariants: approval clears the proposal,
//!    rejection changes nothing else, updates are append-only and invalid
//!    mutations leave the task untouched.
//! 4. Derived status follows progress, and board columns partition the task
//!    list by it.
//! 5. Arbitrary frames never cause a panic in `decode_client`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use connectpoint_proto::board::Board;
use connectpoint_proto::codec;
use connectpoint_proto::message::{
    ChatMessage, MessageId, UserRef, extract_mentions, group_by_channel,
};
use connectpoint_proto::task::{
    PendingUpdate, Priority, Progress, Task, TaskId, TaskMutation, TaskStatus, Team, Update,
    UpdateContent,
};
use proptest::prelude::*;

// --- Strategies ---

fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..1_000_000).prop_map(|secs| Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs))
}

fn arb_channel() -> impl Strategy<Value = String> {
    (1u8..5).prop_map(|n| format!("channel-{n}"))
}

fn arb_progress() -> impl Strategy<Value = Progress> {
    (0u8..=100).prop_map(|p| Progress::new(p).unwrap())
}

fn arb_title() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,40}"
}

fn arb_messages() -> impl Strategy<Value = Vec<ChatMessage>> {
    prop::collection::vec((arb_channel(), arb_timestamp()), 0..40).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (channel, ts))| ChatMessage {
                id: MessageId::new(format!("m{i}")),
                user: UserRef::new("test", ""),
                text: Some(format!("message {i}")),
                image: None,
                file: None,
                mentions: Vec::new(),
                timestamp: ts,
                channel_id: channel,
            })
            .collect()
    })
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        arb_title(),
        arb_progress(),
        arb_timestamp(),
        prop::option::of((arb_title(), arb_progress())),
    )
        .prop_map(|(title, progress, due_date, pending)| Task {
            id: TaskId::new("t-1"),
            title,
            priority: Priority::Medium,
            assignee: UserRef::new("Bob", ""),
            progress,
            due_date,
            team: Team::Backend,
            updates: Vec::new(),
            pending_update: pending.map(|(title, progress)| PendingUpdate { title, progress }),
        })
}

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(arb_task(), 0..30).prop_map(|tasks| {
        tasks
            .into_iter()
            .enumerate()
            .map(|(i, mut t)| {
                t.id = TaskId::new(format!("t-{i}"));
                t
            })
            .collect()
    })
}

// --- Properties ---

proptest! {
    #[test]
    fn grouping_keeps_every_message_in_order(messages in arb_messages()) {
        let total = messages.len();
        let grouped = group_by_channel(messages);

        prop_assert_eq!(grouped.values().map(Vec::len).sum::<usize>(), total);
        for (channel, bucket) in &grouped {
            prop_assert!(!bucket.is_empty());
            prop_assert!(bucket.iter().all(|m| &m.channel_id == channel));
            prop_assert!(bucket.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn grouping_ties_keep_input_order(channel in arb_channel(), n in 1usize..20) {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let messages: Vec<_> = (0..n)
            .map(|i| ChatMessage::system_notice(MessageId::new(format!("m{i}")), channel.clone(), "x", ts))
            .collect();
        let grouped = group_by_channel(messages);
        let ids: Vec<_> = grouped[&channel].iter().map(|m| m.id.as_str().to_string()).collect();
        let expected: Vec<_> = (0..n).map(|i| format!("m{i}")).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn mentions_come_from_at_tokens(text in "[a-z@ ]{0,80}") {
        let mentions = extract_mentions(&text);
        let expected = text
            .split_whitespace()
            .filter(|t| t.starts_with('@') && t.len() > 1)
            .count();
        prop_assert_eq!(mentions.len(), expected);
        for mention in &mentions {
            prop_assert!(!mention.is_empty());
            prop_assert!(!mention.contains(char::is_whitespace));
            let token = format!("@{mention}");
            prop_assert!(text.split_whitespace().any(|t| t == token));
        }
    }

    #[test]
    fn approval_applies_and_clears(mut task in arb_task(), proposal_title in arb_title(), proposal_progress in arb_progress()) {
        let proposal = PendingUpdate { title: proposal_title, progress: proposal_progress };
        task.apply(TaskMutation::ApprovePendingUpdate(proposal.clone())).unwrap();
        prop_assert_eq!(&task.title, &proposal.title);
        prop_assert_eq!(task.progress, proposal.progress);
        prop_assert!(task.pending_update.is_none());
    }

    #[test]
    fn rejection_only_clears_proposal(task in arb_task()) {
        let mut rejected = task.clone();
        rejected.apply(TaskMutation::ClearPendingUpdate).unwrap();
        prop_assert!(rejected.pending_update.is_none());
        prop_assert_eq!(rejected.title, task.title);
        prop_assert_eq!(rejected.progress, task.progress);
    }

    #[test]
    fn updates_are_append_only(mut task in arb_task(), notes in prop::collection::vec("[a-z ]{1,20}", 1..10)) {
        let mut seen: Vec<Update> = Vec::new();
        for (i, note) in notes.into_iter().enumerate() {
            let update = Update {
                id: format!("u{i}"),
                content: UpdateContent::Text(note),
                author: "test".to_string(),
                timestamp: Utc::now(),
            };
            task.apply(TaskMutation::AppendUpdate(update.clone())).unwrap();
            seen.push(update);
            prop_assert_eq!(&task.updates, &seen);
        }
    }

    #[test]
    fn invalid_mutation_leaves_task_untouched(task in arb_task(), progress in arb_progress()) {
        let mut attempted = task.clone();
        let result = attempted.apply(TaskMutation::SetPendingUpdate(PendingUpdate {
            title: "   ".to_string(),
            progress,
        }));
        prop_assert!(result.is_err());
        prop_assert_eq!(attempted, task);
    }

    #[test]
    fn progress_accepts_exactly_zero_to_hundred(value in any::<u8>()) {
        prop_assert_eq!(Progress::new(value).is_ok(), value <= 100);
        let parsed: Result<Progress, _> = serde_json::from_str(&value.to_string());
        prop_assert_eq!(parsed.is_ok(), value <= 100);
    }

    #[test]
    fn status_follows_progress(progress in arb_progress()) {
        let expected = match progress.value() {
            0 => TaskStatus::Todo,
            100 => TaskStatus::Done,
            _ => TaskStatus::InProgress,
        };
        prop_assert_eq!(TaskStatus::from_progress(progress), expected);
    }

    #[test]
    fn board_partitions_by_status(tasks in arb_tasks()) {
        let board = Board::categorize(&tasks);
        prop_assert_eq!(board.todo.len() + board.in_progress.len() + board.done.len(), tasks.len());
        prop_assert!(board.todo.iter().all(|t| t.status() == TaskStatus::Todo));
        prop_assert!(board.in_progress.iter().all(|t| t.status() == TaskStatus::InProgress));
        prop_assert!(board.done.iter().all(|t| t.progress.value() == 100));

        let upcoming = board.upcoming();
        prop_assert_eq!(upcoming.len(), board.todo.len() + board.in_progress.len());
        prop_assert!(upcoming.windows(2).all(|w| w[0].due_date <= w[1].due_date));
    }

    #[test]
    fn decode_client_never_panics(frame in ".{0,200}") {
        let _ = codec::decode_client(&frame);
    }

    #[test]
    fn decode_client_never_panics_on_event_shapes(
        name in "[a-z-]{0,24}",
        payload in "[{}\\[\\]\":,a-zA-Z0-9 ]{0,80}",
    ) {
        let frame = format!(r#"{{"event":"{name}","payload":{payload}}}"#);
        let _ = codec::decode_client(&frame);
    }
}
