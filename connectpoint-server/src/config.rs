//! Configuration system for the `ConnectPoint` server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/connectpoint-server/config.toml`)
//! 4. Compiled defaults
//!
//! The store URI and database name have no default. Missing either one, or
//! a port that is not a number, is fatal before any socket is bound.

use std::path::PathBuf;

/// Default port when none is configured.
pub const DEFAULT_PORT: u16 = 3000;

/// Errors that can occur when loading server configuration.
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

    /// No store connection string was given.
    #[error("no store URI configured (set STORE_URI or --store-uri)")]
    MissingStoreUri,

    /// No database name was given.
    #[error("no database name configured (set DB_NAME or --db-name)")]
    MissingDatabaseName,

    /// The port is not a number in `0..=65535`.
    #[error("invalid port number: {0:?}")]
    InvalidPort(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the server.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerFileConfig,
    store: StoreFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    uri: Option<String>,
    database: Option<String>,
    change_feed: Option<bool>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "ConnectPoint synchronization server")]
pub struct ServerCliArgs {
    /// Port to listen on (default 3000).
    #[arg(short, long, env = "PORT")]
    pub port: Option<String>,

    /// Interface to bind (default 0.0.0.0).
    #[arg(long, env = "CONNECTPOINT_HOST")]
    pub host: Option<String>,

    /// Store connection string: `memory://` or `redb://<directory>`.
    #[arg(long, env = "STORE_URI")]
    pub store_uri: Option<String>,

    /// Database name inside the store.
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    /// Run without store change notifications (no live fan-out).
    #[arg(long)]
    pub disable_change_feed: bool,

    /// Path to config file (default: `~/.config/connectpoint-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CONNECTPOINT_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Where and how to open the persisted collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store connection string.
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Whether the store publishes change notifications.
    pub change_feed: bool,
}

impl StoreConfig {
    /// In-memory store with change notifications, for tests and demos.
    #[must_use]
    pub fn in_memory(database: &str) -> Self {
        Self {
            uri: "memory://".to_string(),
            database: database.to_string(),
            change_feed: true,
        }
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Store settings.
    pub store: StoreConfig,
    /// Log level filter string.
    pub log_level: String,
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, a mandatory store setting is missing, or the port is not
    /// numeric.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Address string for the listener, e.g. `0.0.0.0:3000`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Result<Self, ConfigError> {
        let port = match cli.port.as_deref() {
            Some(raw) => parse_port(raw)?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        let uri = cli
            .store_uri
            .clone()
            .or_else(|| file.store.uri.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingStoreUri)?;

        let database = cli
            .db_name
            .clone()
            .or_else(|| file.store.database.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseName)?;

        let change_feed = !cli.disable_change_feed && file.store.change_feed.unwrap_or(true);

        Ok(Self {
            host: cli
                .host
                .clone()
                .or_else(|| file.server.host.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            store: StoreConfig {
                uri,
                database,
                change_feed,
            },
            log_level: cli.log_level.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Parses a port given on the command line or in the environment.
///
/// Accepts the `--port=3000` spelling some launchers forward verbatim.
fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let raw = raw.trim();
    raw.strip_prefix("--port=")
        .unwrap_or(raw)
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort(raw.to_string()))
}

/// Load and parse a TOML config file for the server.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("connectpoint-server").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
