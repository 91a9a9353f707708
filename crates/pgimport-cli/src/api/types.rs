//! Wire types for the import endpoint
//!
//! Every action answers with a flat JSON object. The server reuses the `offset`
//! field for two different quantities: bytes received during the transfer
//! phase, and bytes of source consumed once the job is applied. The Rust types
//! give the two meanings different names.

use pgimport_common::types::{ArchiveEntry, ImportOptions, ImportScope, JobStatus};
use serde::{Deserialize, Serialize};

/// Parameters for `init_upload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitUpload {
    pub filename: String,
    pub filesize: u64,
    pub scope: ImportScope,
    /// Database or schema name the scope refers to (empty for server scope)
    pub scope_ident: String,
    pub options: ImportOptions,
}

impl InitUpload {
    /// Form fields sent with the request
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("filename", self.filename.clone()),
            ("filesize", self.filesize.to_string()),
            ("scope", self.scope.to_string()),
            ("scope_ident", self.scope_ident.clone()),
        ];
        fields.extend(self.options.form_fields());
        fields
    }
}

/// Reply to `init_upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitUploadReply {
    pub job_id: String,
    /// Server-assigned chunk size, overrides the client default
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

/// Reply to `upload_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadStatusReply {
    /// Bytes the server has durably received
    #[serde(default)]
    pub uploaded_bytes: u64,
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

/// Raw reply to `upload_chunk`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkReply {
    pub status: String,
    #[serde(default)]
    pub uploaded_bytes: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Interpreted outcome of one chunk request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAck {
    /// Server stored the chunk; `uploaded_bytes` is the authoritative new offset
    Accepted { uploaded_bytes: u64 },
    /// Server recomputed a different checksum; resend from the same offset
    BadChecksum,
    /// Any other refusal
    Rejected { status: String, error: Option<String> },
}

impl ChunkReply {
    pub fn into_ack(self) -> ChunkAck {
        match self.status.as_str() {
            "OK" => match self.uploaded_bytes {
                Some(uploaded_bytes) => ChunkAck::Accepted { uploaded_bytes },
                None => ChunkAck::Rejected {
                    status: self.status,
                    error: Some("reply is missing uploaded_bytes".to_string()),
                },
            },
            "BAD_CHECKSUM" => ChunkAck::BadChecksum,
            _ => ChunkAck::Rejected {
                status: self.status,
                error: self.error,
            },
        }
    }
}

/// Reply to `finalize_upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeReply {
    /// Canonical total size of the uploaded payload
    pub size: u64,
}

/// Reply to `list_entries`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntriesReply {
    #[serde(default)]
    pub entries: Vec<ArchiveEntry>,
}

/// One line of a job log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawLogEntry")]
pub struct LogEntry {
    pub message: String,
    pub level: Option<String>,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|level| level.eq_ignore_ascii_case("error"))
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.level {
            Some(level) => write!(f, "[{}] {}", level, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// The server sends log lines either as bare strings or as objects
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLogEntry {
    Text(String),
    Structured {
        message: String,
        #[serde(default)]
        level: Option<String>,
    },
}

impl From<RawLogEntry> for LogEntry {
    fn from(raw: RawLogEntry) -> Self {
        match raw {
            RawLogEntry::Text(message) => Self {
                message,
                level: None,
            },
            RawLogEntry::Structured { message, level } => Self { message, level },
        }
    }
}

/// Reply to `status` and `process`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: JobStatus,
    /// Bytes of source consumed by the import (wire name `offset`)
    #[serde(rename = "offset", default)]
    pub consumed: u64,
    #[serde(default)]
    pub errors: u64,
    /// Log lines produced since the previous reply
    #[serde(default)]
    pub log: Vec<LogEntry>,
    #[serde(default)]
    pub current_db: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Reply to `resume_job`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeReply {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

/// Reply carrying only an optional error
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorReply {
    #[serde(default)]
    pub error: Option<String>,
}

/// One row of `list_jobs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Reply to `list_jobs`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsReply {
    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_reply_interpretation() {
        let ok: ChunkReply =
            serde_json::from_str(r#"{"status":"OK","uploaded_bytes":5242880}"#).unwrap();
        assert_eq!(
            ok.into_ack(),
            ChunkAck::Accepted {
                uploaded_bytes: 5_242_880
            }
        );

        let bad: ChunkReply = serde_json::from_str(r#"{"status":"BAD_CHECKSUM"}"#).unwrap();
        assert_eq!(bad.into_ack(), ChunkAck::BadChecksum);

        let refused: ChunkReply =
            serde_json::from_str(r#"{"status":"ERROR","error":"disk full"}"#).unwrap();
        assert_eq!(
            refused.into_ack(),
            ChunkAck::Rejected {
                status: "ERROR".into(),
                error: Some("disk full".into())
            }
        );
    }

    #[test]
    fn test_ok_without_offset_is_rejected() {
        let reply: ChunkReply = serde_json::from_str(r#"{"status":"OK"}"#).unwrap();
        assert!(matches!(reply.into_ack(), ChunkAck::Rejected { .. }));
    }

    #[test]
    fn test_job_progress_maps_offset_to_consumed() {
        let progress: JobProgress = serde_json::from_str(
            r#"{"status":"running","offset":1024,"errors":2,
                "log":["CREATE TABLE", {"message":"duplicate key","level":"error"}],
                "current_db":"sales"}"#,
        )
        .unwrap();
        assert_eq!(progress.status, JobStatus::Running);
        assert_eq!(progress.consumed, 1024);
        assert_eq!(progress.errors, 2);
        assert_eq!(progress.log.len(), 2);
        assert!(!progress.log[0].is_error());
        assert!(progress.log[1].is_error());
        assert_eq!(progress.current_db.as_deref(), Some("sales"));
    }

    #[test]
    fn test_init_upload_form_fields() {
        let request = InitUpload {
            filename: "dump.sql.gz".into(),
            filesize: 42,
            scope: ImportScope::Database,
            scope_ident: "sales".into(),
            options: ImportOptions::default(),
        };
        let fields = request.form_fields();
        assert_eq!(fields[0], ("filename", "dump.sql.gz".to_string()));
        assert!(fields.contains(&("scope", "database".to_string())));
        assert!(fields.contains(&("scope_ident", "sales".to_string())));
        assert!(fields.contains(&("error_mode", "abort".to_string())));
    }
}
