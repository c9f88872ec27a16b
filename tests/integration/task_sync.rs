//! Integration tests for the shared task board.
//!
//! Two clients, an admin and a regular user, watch the same server:
//! - A created task reaches both boards
//! - A user's edit becomes a proposal; approval applies it, rejection drops it
//! - Admin edits apply directly
//! - Progress notes are appended in order
//! - Requests for unknown tasks fail only for the sender

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use connectpoint::actions::Actor;
use connectpoint::auth;
use connectpoint::state::ClientState;
use connectpoint::transport::SyncClient;
use connectpoint_proto::event::{ClientEvent, TaskChange};
use connectpoint_proto::task::{
    PendingUpdate, Priority, Progress, Task, TaskId, TaskMutation, TaskStatus, Team,
    UpdateContent,
};
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

/// Signs in and connects a synced client.
async fn sign_in(url: &str, username: &str) -> (SyncClient, Actor) {
    let actor = Actor::new(auth::authenticate(username, "12345").unwrap());
    let client = SyncClient::connect(url, "channel-1").await.unwrap();
    wait_until(&client, ClientState::is_synced).await;
    (client, actor)
}

fn find_by_title(state: &ClientState, title: &str) -> Option<Task> {
    state.tasks().iter().find(|t| t.title == title).cloned()
}

/// Creates a task as `actor` and waits until `observer` sees it.
async fn create_task(client: &SyncClient, actor: &Actor, observer: &SyncClient, title: &str) -> Task {
    let event = actor
        .add_task(title, Priority::Medium, Team::Backend, Utc::now())
        .unwrap();
    client.send(&event).await.unwrap();
    wait_until(observer, |s| find_by_title(s, title).is_some()).await;
    find_by_title(&observer.state(), title).unwrap()
}

#[tokio::test]
async fn new_task_reaches_every_board() {
    let (url, _state) = start().await;
    let (admin, _) = sign_in(&url, "admin").await;
    let (user, user_actor) = sign_in(&url, "test").await;

    let task = create_task(&user, &user_actor, &admin, "X").await;
    wait_until(&user, |s| s.tasks().len() == 5).await;

    assert!(!task.id.as_str().is_empty());
    assert_eq!(task.assignee.name, "test");
    assert_eq!(task.progress, Progress::ZERO);
    assert_eq!(task.status(), TaskStatus::Todo);
    assert!(task.updates.is_empty());
    assert!(task.pending_update.is_none());

    assert_eq!(admin.state().tasks().len(), 5);
    assert_eq!(admin.state().board().todo.len(), 2);
    assert_eq!(user.state().task(task.id.as_str()), Some(&task));
}

#[tokio::test]
async fn user_edit_waits_for_approval() {
    let (url, _state) = start().await;
    let (admin, admin_actor) = sign_in(&url, "admin").await;
    let (user, user_actor) = sign_in(&url, "test").await;
    let task = create_task(&user, &user_actor, &admin, "Draft release notes").await;

    let edit = user_actor
        .edit_task(&task, Some("Publish release notes".to_string()), Some(Progress::new(60).unwrap()))
        .unwrap();
    user.send(&edit).await.unwrap();
    wait_until(&admin, |s| {
        s.task(task.id.as_str())
            .is_some_and(|t| t.pending_update.is_some())
    })
    .await;

    let proposed = admin.state().task(task.id.as_str()).cloned().unwrap();
    assert_eq!(proposed.title, "Draft release notes");
    assert_eq!(proposed.progress, Progress::ZERO);
    assert_eq!(
        proposed.pending_update,
        Some(PendingUpdate {
            title: "Publish release notes".to_string(),
            progress: Progress::new(60).unwrap(),
        })
    );

    admin.send(&admin_actor.approve(&proposed).unwrap()).await.unwrap();
    let applied = |s: &ClientState| {
        s.task(task.id.as_str())
            .is_some_and(|t| t.pending_update.is_none() && t.title == "Publish release notes")
    };
    wait_until(&admin, applied).await;
    wait_until(&user, applied).await;

    let approved = user.state().task(task.id.as_str()).cloned().unwrap();
    assert_eq!(approved.progress.value(), 60);
    assert_eq!(approved.status(), TaskStatus::InProgress);
}

#[tokio::test]
async fn rejection_only_drops_the_proposal() {
    let (url, _state) = start().await;
    let (admin, admin_actor) = sign_in(&url, "admin").await;
    let (user, user_actor) = sign_in(&url, "test").await;
    let task = create_task(&user, &user_actor, &admin, "Audit logs").await;

    let edit = user_actor
        .edit_task(&task, None, Some(Progress::new(100).unwrap()))
        .unwrap();
    user.send(&edit).await.unwrap();
    wait_until(&admin, |s| {
        s.task(task.id.as_str())
            .is_some_and(|t| t.pending_update.is_some())
    })
    .await;

    let proposed = admin.state().task(task.id.as_str()).cloned().unwrap();
    admin.send(&admin_actor.reject(&proposed).unwrap()).await.unwrap();
    wait_until(&user, |s| {
        s.task(task.id.as_str())
            .is_some_and(|t| t.pending_update.is_none())
    })
    .await;

    let after = user.state().task(task.id.as_str()).cloned().unwrap();
    assert_eq!(after.title, "Audit logs");
    assert_eq!(after.progress, Progress::ZERO);
}

#[tokio::test]
async fn admin_edit_applies_directly() {
    let (url, _state) = start().await;
    let (admin, admin_actor) = sign_in(&url, "admin").await;
    let (user, _) = sign_in(&url, "test").await;

    let setup = find_by_title(&admin.state(), "Setup CI/CD pipeline").unwrap();
    let edit = admin_actor
        .edit_task(&setup, None, Some(Progress::new(100).unwrap()))
        .unwrap();
    admin.send(&edit).await.unwrap();

    wait_until(&user, |s| {
        s.task(setup.id.as_str())
            .is_some_and(|t| t.status() == TaskStatus::Done)
    })
    .await;
    let state = user.state();
    let done = state.task(setup.id.as_str()).unwrap();
    assert_eq!(done.title, "Setup CI/CD pipeline");
    assert!(done.pending_update.is_none());
    assert_eq!(state.board().done.len(), 2);
}

#[tokio::test]
async fn progress_notes_append_in_order() {
    let (url, _state) = start().await;
    let (admin, _) = sign_in(&url, "admin").await;
    let (user, user_actor) = sign_in(&url, "test").await;
    let task = create_task(&user, &user_actor, &admin, "Write docs").await;

    for note in ["outline done", "first draft"] {
        let event = user_actor
            .add_update(&task, UpdateContent::Text(note.to_string()))
            .unwrap();
        user.send(&event).await.unwrap();
    }
    wait_until(&admin, |s| {
        s.task(task.id.as_str()).is_some_and(|t| t.updates.len() == 2)
    })
    .await;

    let state = admin.state();
    let updates = &state.task(task.id.as_str()).unwrap().updates;
    assert_eq!(updates[0].content, UpdateContent::Text("outline done".to_string()));
    assert_eq!(updates[1].content, UpdateContent::Text("first draft".to_string()));
    assert!(updates.iter().all(|u| u.author == "test"));
    assert_ne!(updates[0].id, updates[1].id);
}

#[tokio::test]
async fn unknown_task_fails_only_for_sender() {
    let (url, _state) = start().await;
    let (admin, _) = sign_in(&url, "admin").await;
    let (user, user_actor) = sign_in(&url, "test").await;

    let event = ClientEvent::UpdateTask(TaskChange {
        task_id: TaskId::new("no-such-task"),
        updates: TaskMutation::ClearPendingUpdate,
    });
    user.send(&event).await.unwrap();
    wait_until(&user, |s| s.last_error().is_some()).await;

    let failure = user.state().take_last_error().unwrap();
    assert_eq!(failure.event, "update-task");
    assert!(failure.reason.contains("no-such-task"));

    // A later write still reaches both clients, and the admin saw no failure.
    create_task(&user, &user_actor, &admin, "After failure").await;
    assert!(admin.state().last_error().is_none());
    assert_eq!(admin.state().tasks().len(), 5);
}
