//! pgimport CLI Library
//!
//! Client for uploading PostgreSQL dumps to a web-based import endpoint and
//! driving the server-side import.
//!
//! # Overview
//!
//! - **Upload**: validate a dump, upload it in checksummed chunks that survive
//!   network drops and restarts, then finalize (`pgimport upload`)
//! - **Import**: select an archive entry and poll the server while it applies
//!   the dump (`pgimport start`)
//! - **Jobs**: list server jobs with the actions their status allows
//!   (`pgimport jobs`, `pause`, `resume`, `delete`)
//! - **Configuration**: show the effective settings (`pgimport config show`)

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod import;
pub mod observer;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod registry;
pub mod resume;
pub mod session;
pub mod source;
pub mod transfer;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{CliError, Result};
pub use session::Session;

use clap::{Args, Parser, Subcommand};
use pgimport_common::types::{EntrySelection, ErrorMode, ImportOptions, ImportScope};
use std::path::PathBuf;

/// pgimport - resumable PostgreSQL dump upload and import
#[derive(Parser, Debug)]
#[command(name = "pgimport")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Server URL
    #[arg(long, env = "PGIMPORT_SERVER_URL", global = true)]
    pub server_url: Option<String>,

    /// Server/tenant identifier sent with every request
    #[arg(long, env = "PGIMPORT_SERVER_ID", global = true)]
    pub server_id: Option<String>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Effective configuration: file, environment, then flags
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(url) = &self.server_url {
            config.server_url = url.clone();
        }
        if let Some(id) = &self.server_id {
            config.server_id = Some(id.clone()).filter(|id| !id.is_empty());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a dump and import it
    Upload(UploadArgs),

    /// List import jobs
    Jobs {
        /// Include finished and cancelled jobs
        #[arg(short, long)]
        all: bool,
    },

    /// Start or continue the import of an uploaded job
    Start {
        /// Job identifier
        job: String,

        /// Payload size, when the server does not report it
        #[arg(long)]
        size: Option<u64>,

        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Show a job's status and log
    Status {
        /// Job identifier
        job: String,
    },

    /// List the members of an uploaded archive
    Entries {
        /// Job identifier
        job: String,
    },

    /// Pause a running job
    Pause {
        /// Job identifier
        job: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Resume a paused, failed or cancelled job
    Resume {
        /// Job identifier
        job: String,
    },

    /// Delete a job and its uploaded data
    Delete {
        /// Job identifier
        job: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments of `pgimport upload`
#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Dump file (.sql, .gz, .bz2 or .zip)
    pub file: PathBuf,

    /// What the dump is applied to (server, database, schema)
    #[arg(long, default_value = "server")]
    pub scope: ImportScope,

    /// Database or schema name for database/schema scope
    #[arg(long, default_value = "")]
    pub ident: String,

    /// Recreate roles
    #[arg(long)]
    pub roles: bool,

    /// Recreate tablespaces
    #[arg(long)]
    pub tablespaces: bool,

    /// Create databases named in the dump
    #[arg(long)]
    pub databases: bool,

    /// Apply only the schema
    #[arg(long, conflicts_with = "data_only")]
    pub schema_only: bool,

    /// Apply only the data
    #[arg(long)]
    pub data_only: bool,

    /// Drop objects before recreating them
    #[arg(long)]
    pub drop_existing: bool,

    /// Reaction to failing statements (abort, ignore, log)
    #[arg(long = "on-error", default_value = "abort")]
    pub on_error: ErrorMode,

    /// Chunk size in bytes when the server does not assign one
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Stop after the upload instead of starting the import
    #[arg(long)]
    pub no_auto: bool,

    #[command(flatten)]
    pub entry: EntryArgs,
}

impl UploadArgs {
    pub fn options(&self) -> ImportOptions {
        ImportOptions {
            roles: self.roles,
            tablespaces: self.tablespaces,
            databases: self.databases,
            schema_only: self.schema_only,
            data_only: self.data_only,
            drop_existing: self.drop_existing,
            error_mode: self.on_error,
        }
    }
}

/// Archive entry choice
#[derive(Args, Debug, Clone, Default)]
pub struct EntryArgs {
    /// Archive member to import
    #[arg(long, conflicts_with = "all")]
    pub entry: Option<String>,

    /// Import every archive member
    #[arg(long)]
    pub all: bool,
}

impl EntryArgs {
    pub fn selection(&self) -> Option<EntrySelection> {
        match (&self.entry, self.all) {
            (Some(name), _) => Some(EntrySelection::Entry(name.clone())),
            (None, true) => Some(EntrySelection::All),
            (None, false) => None,
        }
    }
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
}
