//! Error types for pgimport CLI
//!
//! User-facing error types with clear, actionable messages. The upload and
//! import state machines also use the classification helpers at the bottom of
//! this file to decide whether an error is retried, surfaced, or treated as a
//! user cancellation.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Comprehensive error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// The server answered with an application-level error
    #[error("Server error: {0}. Check the job with 'pgimport status <job>' or the server logs.")]
    Api(String),

    /// The server answered with something the client cannot interpret
    #[error("Unexpected server reply: {0}")]
    Protocol(String),

    /// Required file is missing
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// Pre-flight check: the file exceeds the configured upload limit
    #[error("File '{file}' is {size} bytes, which exceeds the maximum upload size of {max} bytes.")]
    FileTooLarge { file: String, size: u64, max: u64 },

    /// Pre-flight check: the server cannot decompress this payload
    #[error("File '{file}' is {kind}-compressed but the server does not support {kind} imports. Decompress it first or enable {kind} support on the server.")]
    UnsupportedCompression { file: String, kind: String },

    /// Pre-flight check: nothing to upload
    #[error("File '{0}' is empty. There is nothing to import.")]
    EmptyFile(String),

    /// Single-flight guard refused to start a second job
    #[error("Another import is running (job {0}). Wait for it to finish, or pause it with 'pgimport pause {0}'.")]
    AnotherImportRunning(String),

    /// The user cancelled the running upload or import
    #[error("Operation cancelled")]
    Cancelled,

    /// Job is unknown to the server
    #[error("Job '{0}' not found. Run 'pgimport jobs --all' to see existing jobs.")]
    JobNotFound(String),

    /// A control action does not apply to the job's current status
    #[error("Cannot {action} job '{job_id}' while it is {status}. Run 'pgimport jobs' to see the available actions.")]
    ActionNotAllowed {
        action: String,
        job_id: String,
        status: String,
    },

    /// Local resume-token storage failed
    #[error("Resume state error: {0}. Delete the resume file to start uploads from scratch.")]
    ResumeStore(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("Network request failed: {0}. Check your connection and server URL.")]
    Http(#[from] reqwest::Error),

    /// No connection to the server could be established
    #[error("Cannot reach the import server: {0}. Waiting for the connection to come back.")]
    Unreachable(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or config file.")]
    Config(String),

    /// TOML parsing failed
    #[error("Failed to parse config file: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Shared-type parsing failed
    #[error(transparent)]
    Common(#[from] pgimport_common::CommonError),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create an API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resume store error
    pub fn resume_store(msg: impl Into<String>) -> Self {
        Self::ResumeStore(msg.into())
    }

    /// Errors the chunk loop retries with backoff
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Protocol(_) | Self::Api(_) | Self::Unreachable(_)
        )
    }

    /// The request never reached the server
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    /// Map a failed send, keeping connection failures apart from the rest
    pub fn from_send(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Pre-flight failures raised before any network call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::FileTooLarge { .. } | Self::UnsupportedCompression { .. } | Self::EmptyFile(_)
        )
    }
}
