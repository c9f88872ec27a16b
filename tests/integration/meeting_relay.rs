//! Integration tests for meeting announcements and presence.
//!
//! Meeting events are relayed, never stored:
//! - `start-meeting` reaches every client, the starter included
//! - The local notice only appears for clients viewing that channel
//! - Join and leave reach everyone except the sender
//! - A client connecting later sees no trace of the meeting

use std::sync::Arc;
use std::time::Duration;

use connectpoint::actions::Actor;
use connectpoint::auth;
use connectpoint::state::{ClientState, LOCAL_ID_PREFIX};
use connectpoint::transport::SyncClient;
use connectpoint_proto::event::ServerEvent;
use connectpoint_server::config::StoreConfig;
use connectpoint_server::server::{self, AppState};

async fn start() -> (String, Arc<AppState>) {
    let state = AppState::connect(&StoreConfig::in_memory("connectpoint"))
        .await
        .expect("failed to open store");
    let (addr, _handle) = server::start_server("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start server");
    (format!("ws://{addr}/ws"), state)
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

async fn sign_in(url: &str, username: &str, channel: &str) -> (SyncClient, Actor) {
    let actor = Actor::new(auth::authenticate(username, "12345").unwrap());
    let client = SyncClient::connect(url, channel).await.unwrap();
    wait_until(&client, ClientState::is_synced).await;
    (client, actor)
}

/// Waits until the next `meeting-started` event arrives.
async fn next_meeting(client: &SyncClient) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = client.next_event().await.expect("connection closed");
            if matches!(event, ServerEvent::MeetingStarted(_)) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for meeting-started")
}

#[tokio::test]
async fn meeting_start_reaches_everyone() {
    let (url, _state) = start().await;
    let (admin, admin_actor) = sign_in(&url, "admin", "channel-1").await;
    let (viewer, _) = sign_in(&url, "test", "channel-1").await;
    let (elsewhere, _) = sign_in(&url, "test", "channel-2").await;

    admin
        .send(&admin_actor.start_meeting("channel-1", "general").unwrap())
        .await
        .unwrap();

    for client in [&admin, &viewer, &elsewhere] {
        match next_meeting(client).await {
            ServerEvent::MeetingStarted(info) => {
                assert_eq!(info.channel_id, "channel-1");
                assert_eq!(info.channel_name, "general");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    for client in [&admin, &viewer] {
        let state = client.state();
        let notice = state.messages("channel-1").last().unwrap();
        assert_eq!(notice.text.as_deref(), Some("A meeting has started in #general"));
        assert_eq!(notice.user.name, "System");
        assert!(notice.id.as_str().starts_with(LOCAL_ID_PREFIX));
    }
    // Not viewing the channel: no notice, only the welcome message.
    assert_eq!(elsewhere.state().messages("channel-1").len(), 1);
}

#[tokio::test]
async fn presence_skips_the_sender() {
    let (url, _state) = start().await;
    let (admin, admin_actor) = sign_in(&url, "admin", "channel-1").await;
    let (user, user_actor) = sign_in(&url, "test", "channel-1").await;

    user.send(&user_actor.join_meeting("channel-1").unwrap())
        .await
        .unwrap();
    wait_until(&admin, |s| s.participants("channel-1") == ["test"]).await;

    admin
        .send(&admin_actor.join_meeting("channel-1").unwrap())
        .await
        .unwrap();
    wait_until(&user, |s| s.participants("channel-1") == ["admin"]).await;

    // Everything is delivered in order, so once the admin sees its own
    // meeting-started, a self-echo of its join would already have arrived.
    admin
        .send(&admin_actor.start_meeting("channel-1", "general").unwrap())
        .await
        .unwrap();
    next_meeting(&admin).await;
    assert_eq!(admin.state().participants("channel-1"), ["test"]);

    user.send(&user_actor.leave_meeting("channel-1").unwrap())
        .await
        .unwrap();
    wait_until(&admin, |s| s.participants("channel-1").is_empty()).await;
    assert_eq!(user.state().participants("channel-1"), ["admin"]);
}

#[tokio::test]
async fn meetings_are_not_stored() {
    let (url, state) = start().await;
    let (admin, admin_actor) = sign_in(&url, "admin", "channel-1").await;

    admin
        .send(&admin_actor.join_meeting("channel-1").unwrap())
        .await
        .unwrap();
    admin
        .send(&admin_actor.start_meeting("channel-1", "general").unwrap())
        .await
        .unwrap();
    next_meeting(&admin).await;

    let (late, _) = sign_in(&url, "test", "channel-1").await;
    assert_eq!(state.store.messages.count().await, 1);
    let view = late.state();
    assert_eq!(view.messages("channel-1").len(), 1);
    assert!(view.participants("channel-1").is_empty());
}
