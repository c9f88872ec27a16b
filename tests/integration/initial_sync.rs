//! Integration tests for connecting to the workspace.
//!
//! Validates what a freshly connected client sees:
//! - The seeded workspace, messages first then tasks
//! - Messages written earlier, grouped by channel in timestamp order
//! - A reconnect starting a new session with a fresh initial sync

use std::sync::Arc;
use std::time::Duration;

use connectpoint::actions::Actor;
use connectpoint::auth;
use connectpoint::state::ClientState;
use connectpoint::transport::SyncClient;
use connectpoint_proto::event::ServerEvent;
use connectpoint_proto::task::{Task, TaskStatus};
use connectpoint_server::config::StoreConfig;
use connectpoint_server::server::{self, AppState};

/// Start the server in-process and return a ws:// URL.
async fn start(config: &StoreConfig) -> (String, Arc<AppState>) {
    let state = AppState::connect(config).await.expect("failed to open store");
    let (addr, _handle) = server::start_server("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start server");
    (format!("ws://{addr}/ws"), state)
}

/// Read events until `done` holds for the client's state.
async fn wait_until(client: &SyncClient, done: impl Fn(&ClientState) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&client.state()) {
            client.next_event().await.expect("connection closed");
        }
    })
    .await
    .expect("timed out waiting for state");
}

async fn synced_client(url: &str) -> SyncClient {
    let client = SyncClient::connect(url, "channel-1").await.unwrap();
    wait_until(&client, ClientState::is_synced).await;
    client
}

#[tokio::test]
async fn first_frames_are_messages_then_tasks() {
    let (url, _state) = start(&StoreConfig::in_memory("connectpoint")).await;
    let client = SyncClient::connect(&url, "channel-1").await.unwrap();

    let first = client.next_event().await.unwrap();
    let second = client.next_event().await.unwrap();

    match first {
        ServerEvent::InitialMessages(grouped) => {
            let welcome = &grouped["channel-1"];
            assert_eq!(welcome.len(), 1);
            assert_eq!(welcome[0].user.name, "System");
            assert_eq!(
                welcome[0].text.as_deref(),
                Some("Welcome to ConnectPoint! This is the #general channel.")
            );
        }
        other => panic!("expected initial-messages first, got {other:?}"),
    }
    match second {
        ServerEvent::TasksUpdated(tasks) => {
            assert_eq!(tasks.len(), 4);
            let statuses: Vec<_> = tasks.iter().map(Task::status).collect();
            assert_eq!(
                statuses,
                vec![
                    TaskStatus::InProgress,
                    TaskStatus::Todo,
                    TaskStatus::InProgress,
                    TaskStatus::Done,
                ]
            );
        }
        other => panic!("expected tasks-updated second, got {other:?}"),
    }
}

#[tokio::test]
async fn seeded_board_columns_and_upcoming() {
    let (url, _state) = start(&StoreConfig::in_memory("connectpoint")).await;
    let client = synced_client(&url).await;

    let state = client.state();
    let board = state.board();
    assert_eq!(board.todo.len(), 1);
    assert_eq!(board.in_progress.len(), 2);
    assert_eq!(board.done.len(), 1);

    let upcoming: Vec<_> = board.upcoming().iter().map(|t| t.title.clone()).collect();
    assert_eq!(
        upcoming,
        vec![
            "Design final UI mockups for the new landing page",
            "Setup CI/CD pipeline",
            "Develop user authentication flow",
        ]
    );
}

#[tokio::test]
async fn late_joiner_sees_earlier_messages_grouped() {
    let (url, _state) = start(&StoreConfig::in_memory("connectpoint")).await;
    let actor = Actor::new(auth::authenticate("test", "12345").unwrap());

    let writer = synced_client(&url).await;
    for (channel, text) in [("channel-2", "first"), ("channel-1", "hello"), ("channel-2", "second")] {
        writer
            .send(&actor.send_message(channel, text).unwrap())
            .await
            .unwrap();
    }
    wait_until(&writer, |s| s.messages("channel-2").len() == 2).await;

    let late = synced_client(&url).await;
    let state = late.state();
    let channel_two: Vec<_> = state
        .messages("channel-2")
        .iter()
        .map(|m| m.text.clone().unwrap_or_default())
        .collect();
    assert_eq!(channel_two, vec!["first", "second"]);
    assert_eq!(state.messages("channel-1").len(), 2);
    assert!(
        state
            .messages("channel-2")
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    );
}

#[tokio::test]
async fn reconnect_starts_a_fresh_session() {
    let (url, state) = start(&StoreConfig::in_memory("connectpoint")).await;
    let actor = Actor::new(auth::authenticate("admin", "12345").unwrap());

    let first = synced_client(&url).await;
    first
        .send(&actor.send_message("channel-1", "before reconnect").unwrap())
        .await
        .unwrap();
    wait_until(&first, |s| s.messages("channel-1").len() == 2).await;
    first.close().await;
    assert!(!first.is_connected());

    let second = synced_client(&url).await;
    {
        let view = second.state();
        assert_eq!(view.messages("channel-1").len(), 2);
        assert_eq!(
            view.messages("channel-1")[1].text.as_deref(),
            Some("before reconnect")
        );
        assert_eq!(view.tasks().len(), 4);
    }

    // Seeding is not repeated for the new session.
    assert_eq!(state.store.messages.count().await, 2);
    assert_eq!(state.store.tasks.count().await, 4);
}
