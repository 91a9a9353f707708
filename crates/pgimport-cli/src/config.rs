//! Configuration management for pgimport
//!
//! Settings are layered: built-in defaults, then the TOML config file, then
//! `PGIMPORT_*` environment variables. Command-line flags are applied last by
//! the caller.

use crate::error::{CliError, Result};
use crate::resume::FileResumeStore;
use pgimport_common::types::Capabilities;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// CLI Configuration Constants
// ============================================================================

/// Server URL when nothing else is configured
pub const DEFAULT_SERVER_URL: &str = "http://localhost";

/// Import script path below the server URL
pub const DEFAULT_ENDPOINT: &str = "dbimport.php";

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the server hosting the import endpoint
    pub server_url: String,

    pub endpoint: String,

    /// Server/tenant the jobs belong to
    pub server_id: Option<String>,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Chunk size when the server does not assign one
    pub chunk_size: u64,

    /// Largest file the client agrees to upload
    pub max_upload_size: Option<u64>,

    /// Continue into entry selection and import after the upload
    pub auto_continue: bool,

    /// Where resume tokens are kept
    pub state_dir: PathBuf,

    pub poll_interval_ms: u64,

    pub backoff_initial_ms: u64,

    pub backoff_max_ms: u64,

    /// Compression formats the server can ingest
    pub capabilities: Capabilities,
}

impl Config {
    /// Create a new config with default values
    pub fn new() -> Result<Self> {
        let state_dir = dirs::data_local_dir()
            .ok_or_else(|| CliError::config("Could not determine local data directory"))?
            .join("pgimport");

        Ok(Self {
            state_dir,
            ..Self::base()
        })
    }

    fn base() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            server_id: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            chunk_size: crate::transfer::DEFAULT_CHUNK_SIZE,
            max_upload_size: None,
            auto_continue: true,
            state_dir: PathBuf::from(".pgimport"),
            poll_interval_ms: 700,
            backoff_initial_ms: 1000,
            backoff_max_ms: 60_000,
            capabilities: Capabilities::default(),
        }
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pgimport").join(CONFIG_FILE))
    }

    /// Defaults, overlaid with a TOML file
    ///
    /// An explicit `path` must exist. Without one, the default location is read
    /// if present.
    pub fn from_file(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (Some(path.to_path_buf()), true),
            None => (Self::default_path(), false),
        };

        let Some(path) = path else {
            return Self::new();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let mut config: Config = toml::from_str(&contents)?;
                if config.state_dir.as_os_str().is_empty() {
                    config.state_dir = Self::new()?.state_dir;
                }
                Ok(config)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Self::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CliError::config(format!(
                "config file {} does not exist",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Load config from environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new()?;
        config.apply_env()?;
        Ok(config)
    }

    /// File, then environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `PGIMPORT_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("PGIMPORT_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(endpoint) = var("PGIMPORT_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(id) = var("PGIMPORT_SERVER_ID") {
            self.server_id = Some(id).filter(|id| !id.is_empty());
        }
        if let Some(dir) = var("PGIMPORT_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var(&var, "PGIMPORT_API_TIMEOUT_SECS")? {
            self.timeout_secs = secs;
        }
        if let Some(size) = parse_var(&var, "PGIMPORT_CHUNK_SIZE")? {
            self.chunk_size = size;
        }
        if let Some(max) = parse_var(&var, "PGIMPORT_MAX_UPLOAD_SIZE")? {
            self.max_upload_size = Some(max);
        }
        if let Some(auto) = parse_var(&var, "PGIMPORT_AUTO_CONTINUE")? {
            self.auto_continue = auto;
        }
        self.validate()
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(CliError::config("chunk_size must be greater than zero"));
        }
        if self.server_url.trim().is_empty() {
            return Err(CliError::config("server_url is empty"));
        }
        Ok(())
    }

    /// Resume-token store inside `state_dir`
    pub fn resume_store(&self) -> FileResumeStore {
        FileResumeStore::new(&self.state_dir)
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CliError::config(e.to_string()))
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CliError::config(format!("{} has an invalid value '{}'", name, raw))),
    }
}

impl Default for Config {
    fn default() -> Self {
        // If we can't determine the data directory, fall back to a local directory
        Self::new().unwrap_or_else(|_| Self::base())
    }
}
