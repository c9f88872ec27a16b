//! `ConnectPoint` headless client.
//!
//! Signs in with one of the workspace accounts, connects to the server and
//! either watches the live workspace or performs a single action.
//!
//! ```bash
//! # Watch everything as the admin
//! cargo run --bin connectpoint -- --username admin --password 12345
//!
//! # Post a message
//! cargo run --bin connectpoint -- -u test --password 12345 send channel-1 "hi @admin"
//!
//! # Or via environment variables
//! CONNECTPOINT_URL=ws://127.0.0.1:3000/ws CONNECTPOINT_USERNAME=test \
//!     CONNECTPOINT_PASSWORD=12345 cargo run --bin connectpoint -- board
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use connectpoint_proto::event::ServerEvent;
use connectpoint_proto::task::{Priority, Task, Team};
use tracing_appender::non_blocking::WorkerGuard;

use connectpoint::actions::{ActionError, Actor};
use connectpoint::auth::{self, AuthError};
use connectpoint::config::{CliArgs, ClientConfig, Command};
use connectpoint::state::ClientState;
use connectpoint::transport::{SyncClient, TransportError};

/// How long a one-shot command waits for the server to confirm.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a command did not complete.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no credentials configured (use --username and --password)")]
    MissingCredentials,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("timed out waiting for the server")]
    Timeout,

    /// The server answered with `operation-failed`.
    #[error("{event} failed: {reason}")]
    Rejected { event: String, reason: String },

    #[error("unknown {kind} {value:?} (expected {expected})")]
    InvalidArgument {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(url = %config.server_url, "connectpoint starting");

    if let Err(e) = run(cli.command.unwrap_or_default(), &config).await {
        eprintln!("Error: {e}");
        tracing::error!(error = %e, "connectpoint failed");
        std::process::exit(1);
    }
    tracing::info!("connectpoint exiting");
}

/// Initialize file-based logging.
///
/// Stdout is reserved for command output. Returns a [`WorkerGuard`] that
/// must be held until shutdown to ensure all buffered log entries are
/// flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("connectpoint.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, config: &ClientConfig) -> Result<(), CliError> {
    let (Some(username), Some(password)) = (&config.username, &config.password) else {
        return Err(CliError::MissingCredentials);
    };
    let actor = Actor::new(auth::authenticate(username, password)?);
    let me = actor.user().username.clone();

    let client =
        SyncClient::connect_with_timeout(&config.server_url, &config.channel, config.connect_timeout)
            .await?;
    wait_for(&client, ClientState::is_synced, CONFIRM_TIMEOUT).await?;

    let result = match command {
        Command::Watch => watch(&client).await,
        Command::Board => {
            print_board(&client.state());
            Ok(())
        }
        Command::Send { channel, text } => {
            let before = client.state().authored(&channel, &me, &text);
            let event = actor.send_message(&channel, &text)?;
            client.send(&event).await?;
            wait_for(
                &client,
                |s| s.authored(&channel, &me, &text) > before,
                CONFIRM_TIMEOUT,
            )
            .await?;
            println!("sent to #{channel}");
            Ok(())
        }
        Command::AddTask {
            title,
            priority,
            team,
            due_in_days,
        } => {
            let before = client.state().assigned(&title, &me);
            let event = actor.add_task(
                &title,
                parse_priority(&priority)?,
                parse_team(&team)?,
                Utc::now() + chrono::Duration::days(due_in_days),
            )?;
            client.send(&event).await?;
            wait_for(
                &client,
                |s| s.assigned(&title, &me) > before,
                CONFIRM_TIMEOUT,
            )
            .await?;
            println!("created task {title:?}");
            Ok(())
        }
    };

    client.close().await;
    result
}

/// Reads events until `done` holds for the reconciled state, the server
/// reports a failure, or `timeout` passes.
async fn wait_for(
    client: &SyncClient,
    done: impl Fn(&ClientState) -> bool,
    timeout: Duration,
) -> Result<(), CliError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if done(&client.state()) {
            return Ok(());
        }
        let event = tokio::time::timeout_at(deadline, client.next_event())
            .await
            .map_err(|_| CliError::Timeout)??;
        if let ServerEvent::OperationFailed(failure) = event {
            return Err(CliError::Rejected {
                event: failure.event,
                reason: failure.reason,
            });
        }
    }
}

async fn watch(client: &SyncClient) -> Result<(), CliError> {
    print_board(&client.state());
    loop {
        let event = match client.next_event().await {
            Ok(event) => event,
            Err(e) => {
                println!("disconnected: {e}");
                return Ok(());
            }
        };
        let state = client.state();
        match &event {
            ServerEvent::InitialMessages(_) => {
                if let Some(last) = state.active_messages().last() {
                    println!(
                        "[#{}] {}: {}",
                        state.active_channel(),
                        last.user.name,
                        last.text.as_deref().unwrap_or("<attachment>")
                    );
                }
            }
            ServerEvent::TasksUpdated(_) => print_board(&state),
            ServerEvent::MeetingStarted(info) => {
                println!("meeting started in #{}", info.channel_name);
            }
            ServerEvent::UserJoined(p) | ServerEvent::UserLeft(p) => {
                println!(
                    "meeting in {}: {}",
                    p.channel_id,
                    state.participants(&p.channel_id).join(", ")
                );
            }
            ServerEvent::OperationFailed(f) => println!("{} failed: {}", f.event, f.reason),
        }
    }
}

fn print_board(state: &ClientState) {
    let board = state.board();
    let line = |t: &Task| {
        let pending = if t.pending_update.is_some() { " (pending review)" } else { "" };
        println!("  [{}] {} {} @{}{}", t.id, t.title, t.progress, t.assignee.name, pending);
    };
    println!("To do:");
    board.todo.iter().copied().for_each(line);
    println!("In progress:");
    board.in_progress.iter().copied().for_each(line);
    println!("Done:");
    board.done.iter().copied().for_each(line);
    println!("Upcoming:");
    for task in board.upcoming() {
        println!("  {} due {}", task.title, task.due_date.format("%Y-%m-%d"));
    }
}

fn parse_priority(raw: &str) -> Result<Priority, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "high" => Ok(Priority::High),
        "medium" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        other => Err(CliError::InvalidArgument {
            kind: "priority",
            value: other.to_string(),
            expected: "high, medium, low",
        }),
    }
}

fn parse_team(raw: &str) -> Result<Team, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "general" => Ok(Team::General),
        "design" => Ok(Team::Design),
        "frontend" => Ok(Team::Frontend),
        "backend" => Ok(Team::Backend),
        other => Err(CliError::InvalidArgument {
            kind: "team",
            value: other.to_string(),
            expected: "general, design, frontend, backend",
        }),
    }
}
