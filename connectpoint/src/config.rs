//! Configuration system for the `ConnectPoint` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/connectpoint/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::transport::CONNECT_TIMEOUT;

/// Server URL used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000/ws";

/// Channel shown when none is configured.
pub const DEFAULT_CHANNEL: &str = "channel-1";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    account: AccountFileConfig,
    chat: ChatFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
}

/// `[account]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AccountFileConfig {
    username: Option<String>,
    password: Option<String>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    channel: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// What the client should do.
#[derive(clap::Subcommand, Debug, Clone, Default, PartialEq, Eq)]
pub enum Command {
    /// Stay connected and log every change.
    #[default]
    Watch,
    /// Post a message and wait until it is stored.
    Send {
        /// Target channel id.
        channel: String,
        /// Message text. `@name` tokens become mentions.
        text: String,
    },
    /// Create a task assigned to yourself.
    AddTask {
        /// Task title.
        title: String,
        /// high, medium or low.
        #[arg(long, default_value = "medium")]
        priority: String,
        /// general, design, frontend or backend.
        #[arg(long, default_value = "general")]
        team: String,
        /// Days from now until the task is due.
        #[arg(long, default_value_t = 7)]
        due_in_days: i64,
    },
    /// Print the task board.
    Board,
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "ConnectPoint headless client")]
pub struct CliArgs {
    /// What to do (default: watch).
    #[command(subcommand)]
    pub command: Option<Command>,

    /// WebSocket URL of the server.
    #[arg(long, env = "CONNECTPOINT_URL")]
    pub url: Option<String>,

    /// Account to sign in as.
    #[arg(short, long, env = "CONNECTPOINT_USERNAME")]
    pub username: Option<String>,

    /// Password for the account.
    #[arg(long, env = "CONNECTPOINT_PASSWORD")]
    pub password: Option<String>,

    /// Channel to view.
    #[arg(long)]
    pub channel: Option<String>,

    /// Path to config file (default: `~/.config/connectpoint/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (default: `connectpoint.log` in the temp directory).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server WebSocket URL.
    pub server_url: String,
    /// Account name, if configured.
    pub username: Option<String>,
    /// Account password, if configured.
    pub password: Option<String>,
    /// Channel to view.
    pub channel: String,
    /// Timeout for the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            username: None,
            password: None,
            channel: DEFAULT_CHANNEL.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli
                .url
                .clone()
                .or_else(|| file.server.url.clone())
                .unwrap_or(defaults.server_url),
            username: cli
                .username
                .clone()
                .or_else(|| file.account.username.clone()),
            password: cli
                .password
                .clone()
                .or_else(|| file.account.password.clone()),
            channel: cli
                .channel
                .clone()
                .or_else(|| file.chat.channel.clone())
                .unwrap_or(defaults.channel),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
        }
    }
}

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("connectpoint").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
