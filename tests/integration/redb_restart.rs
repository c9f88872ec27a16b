//! Integration tests for a redb-backed server across restarts.
//!
//! Writes made through a running server must survive a restart:
//! - A new server on the same directory serves the earlier writes
//! - The seed is not applied again to collections that already have rows

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use connectpoint::actions::Actor;
use connectpoint::auth;
use connectpoint::state::ClientState;
use connectpoint::transport::SyncClient;
use connectpoint_proto::task::{Priority, Team};
use connectpoint_server::config::StoreConfig;
use connectpoint_server::server::{self, AppState};
use tokio::task::JoinHandle;

fn redb_config(dir: &tempfile::TempDir) -> StoreConfig {
    StoreConfig {
        uri: format!("redb://{}", dir.path().display()),
        ..StoreConfig::in_memory("connectpoint")
    }
}

async fn start(state: &Arc<AppState>) -> (String, JoinHandle<()>) {
    let (addr, handle) = server::start_server("127.0.0.1:0", Arc::clone(state))
        .await
        .expect("failed to start server");
    (format!("ws://{addr}/ws"), handle)
}

/// Opens the store, retrying while a stopped server's tasks still hold the
/// database file.
async fn reopen(config: &StoreConfig) -> Arc<AppState> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match AppState::connect(config).await {
                Ok(state) => return state,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .expect("database was never released")
}

async fn wait_until(client: &SyncClient, done: impl Fn(&ClientState) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&client.state()) {
            client.next_event().await.expect("connection closed");
        }
    })
    .await
    .expect("timed out waiting for state");
}

#[tokio::test]
async fn writes_survive_a_server_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let actor = Actor::new(auth::authenticate("test", "12345").unwrap());

    let state = reopen(&config).await;
    let (url, handle) = start(&state).await;
    let client = SyncClient::connect(&url, "channel-1").await.unwrap();
    wait_until(&client, ClientState::is_synced).await;

    client
        .send(&actor.send_message("channel-1", "still here?").unwrap())
        .await
        .unwrap();
    client
        .send(
            &actor
                .add_task("Survive restart", Priority::High, Team::Backend, Utc::now())
                .unwrap(),
        )
        .await
        .unwrap();
    wait_until(&client, |s| {
        s.messages("channel-1").len() == 2 && s.tasks().len() == 5
    })
    .await;

    client.close().await;
    state.shutdown().await;
    handle.abort();
    let _ = handle.await;
    drop(state);

    let state = reopen(&config).await;
    assert_eq!(state.store.messages.count().await, 2);
    assert_eq!(state.store.tasks.count().await, 5);

    let (url, _handle) = start(&state).await;
    let client = SyncClient::connect(&url, "channel-1").await.unwrap();
    wait_until(&client, ClientState::is_synced).await;
    let view = client.state();
    let texts: Vec<_> = view
        .messages("channel-1")
        .iter()
        .filter_map(|m| m.text.as_deref())
        .collect();
    assert_eq!(
        texts,
        vec!["Welcome to ConnectPoint! This is the #general channel.", "still here?"]
    );
    assert!(view.tasks().iter().any(|t| t.title == "Survive restart"));
    assert_eq!(view.tasks().len(), 5);
}
