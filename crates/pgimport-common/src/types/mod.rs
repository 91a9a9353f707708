//! Common types used across pgimport

use crate::error::CommonError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Job Types
// ============================================================================

/// Server-side lifecycle state of an import job.
///
/// A job starts in `Uploading` when `init_upload` creates it, becomes `Uploaded`
/// once finalized, and moves through `Running` while the server applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploading,
    Uploaded,
    Running,
    Paused,
    Error,
    Finished,
    Cancelled,
}

impl JobStatus {
    /// Every status, in lifecycle order
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Uploading,
        JobStatus::Uploaded,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Error,
        JobStatus::Finished,
        JobStatus::Cancelled,
    ];

    /// Whether the import polling loop stops on this status
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Uploading => "uploading",
            JobStatus::Uploaded => "uploaded",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Error => "error",
            JobStatus::Finished => "finished",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CommonError::UnknownStatus(s.to_string()))
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member of an uploaded container archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// Which archive member(s) the server should import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySelection {
    /// Import a single named member
    Entry(String),
    /// Import every member in archive order
    All,
}

// ============================================================================
// File Types
// ============================================================================

/// Payload type derived from the leading magic bytes of a dump file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Gzip,
    Bzip2,
    Zip,
    Plain,
    /// Empty file, nothing to classify
    Unknown,
}

impl FileKind {
    /// Whether the payload can hold more than one importable member
    pub fn is_container(self) -> bool {
        matches!(self, FileKind::Zip)
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Gzip => write!(f, "gzip"),
            FileKind::Bzip2 => write!(f, "bzip2"),
            FileKind::Zip => write!(f, "zip"),
            FileKind::Plain => write!(f, "plain"),
            FileKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Decompression support advertised by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub gzip: bool,
    #[serde(default)]
    pub zip: bool,
    #[serde(default)]
    pub bzip2: bool,
}

impl Capabilities {
    /// Whether the server can ingest a payload of the given kind
    pub fn supports(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Gzip => self.gzip,
            FileKind::Zip => self.zip,
            FileKind::Bzip2 => self.bzip2,
            FileKind::Plain | FileKind::Unknown => true,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            gzip: true,
            zip: true,
            bzip2: true,
        }
    }
}

// ============================================================================
// Import Options
// ============================================================================

/// How the server reacts to a failing statement while applying a dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Stop the job at the first failing statement
    #[default]
    Abort,
    /// Skip failing statements silently
    Ignore,
    /// Skip failing statements and record them in the job log
    Log,
}

impl std::str::FromStr for ErrorMode {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" | "stop" => Ok(ErrorMode::Abort),
            "ignore" => Ok(ErrorMode::Ignore),
            "log" => Ok(ErrorMode::Log),
            _ => Err(CommonError::InvalidErrorMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorMode::Abort => write!(f, "abort"),
            ErrorMode::Ignore => write!(f, "ignore"),
            ErrorMode::Log => write!(f, "log"),
        }
    }
}

/// Logical target an import is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportScope {
    /// Whole cluster (roles, tablespaces, databases)
    #[default]
    Server,
    Database,
    Schema,
}

impl std::str::FromStr for ImportScope {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "server" | "cluster" => Ok(ImportScope::Server),
            "database" | "db" => Ok(ImportScope::Database),
            "schema" => Ok(ImportScope::Schema),
            _ => Err(CommonError::InvalidScope(s.to_string())),
        }
    }
}

impl std::fmt::Display for ImportScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportScope::Server => write!(f, "server"),
            ImportScope::Database => write!(f, "database"),
            ImportScope::Schema => write!(f, "schema"),
        }
    }
}

/// Fixed set of import switches sent with `init_upload`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Recreate roles found in the dump
    #[serde(default)]
    pub roles: bool,
    /// Recreate tablespaces found in the dump
    #[serde(default)]
    pub tablespaces: bool,
    /// Create databases named in the dump
    #[serde(default)]
    pub databases: bool,
    /// Apply only DDL statements
    #[serde(default)]
    pub schema_only: bool,
    /// Apply only data statements
    #[serde(default)]
    pub data_only: bool,
    /// Drop objects before recreating them
    #[serde(default)]
    pub drop_existing: bool,
    #[serde(default)]
    pub error_mode: ErrorMode,
}

impl ImportOptions {
    /// Form fields in wire order: one `opt_*` flag per switch plus `error_mode`
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let flag = |on: bool| if on { "1" } else { "0" }.to_string();
        vec![
            ("opt_roles", flag(self.roles)),
            ("opt_tablespaces", flag(self.tablespaces)),
            ("opt_databases", flag(self.databases)),
            ("opt_schema_only", flag(self.schema_only)),
            ("opt_data_only", flag(self.data_only)),
            ("opt_drop_existing", flag(self.drop_existing)),
            ("error_mode", self.error_mode.to_string()),
        ]
    }
}
