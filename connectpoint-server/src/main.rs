//! `ConnectPoint` server -- real-time sync for chat and the task board.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store on the default port 3000
//! STORE_URI=memory:// DB_NAME=connectpoint cargo run --bin connectpoint-server
//!
//! # Persist to ./data/connectpoint.redb on port 8080
//! cargo run --bin connectpoint-server -- --store-uri redb://./data --db-name connectpoint --port 8080
//! ```

use clap::Parser;
use connectpoint_server::config::{ServerCliArgs, ServerConfig};
use connectpoint_server::server::{self, AppState};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr(),
        database = %config.store.database,
        change_feed = config.store.change_feed,
        "starting connectpoint server"
    );

    let state = match AppState::connect(&config.store).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            std::process::exit(1);
        }
    };

    match server::start_server(&config.bind_addr(), state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
