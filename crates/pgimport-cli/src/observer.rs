//! Progress events
//!
//! The transfer and import loops report through [`Observer`] instead of
//! touching the terminal, so they run the same under a progress bar, a JSON
//! log, or a test recorder.

use crate::api::types::{JobSummary, LogEntry};
use pgimport_common::types::{ArchiveEntry, FileKind, JobStatus};
use std::sync::Mutex;
use std::time::Duration;

/// Something that happened in the upload/import pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Pre-flight checks passed
    Validated { kind: FileKind, size: u64 },
    /// A job was created or adopted
    JobResolved {
        job_id: String,
        resumed: bool,
        offset: u64,
        chunk_size: u64,
    },
    /// A chunk request is about to go out
    ChunkSending { offset: u64, len: u64 },
    /// The server acknowledged up to `uploaded` bytes
    ChunkAcked { uploaded: u64, size: u64 },
    /// The server recomputed a different checksum
    ChecksumRejected { offset: u64 },
    /// A transport failure will be retried after `delay`
    RetryScheduled {
        offset: u64,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// Waiting for connectivity
    Offline,
    /// Connectivity is back
    Online,
    /// The loop parked at a chunk boundary
    Paused { offset: u64 },
    /// The loop left the paused state
    Resumed { offset: u64 },
    /// The user cancelled
    Cancelled { job_id: String },
    /// Transfer complete, server reported canonical size
    Finalized { size: u64 },
    /// The uploaded archive has members to choose from
    EntriesListed { entries: Vec<ArchiveEntry> },
    /// One `process` tick completed
    ImportTick {
        status: JobStatus,
        consumed: u64,
        size: u64,
        percent: u8,
        errors: u64,
        current_db: Option<String>,
    },
    /// New job log lines
    ImportLog { lines: Vec<LogEntry> },
    /// Free-form status text for the user
    Status { message: String },
}

/// Receiver of pipeline events
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Observer that keeps every event, for assertions
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Receiver of job list changes
pub trait RegistryObserver: Send + Sync {
    /// The job list was fetched again
    fn jobs_refreshed(&self, jobs: &[JobSummary]);

    /// A job was deleted on the server
    fn job_removed(&self, job_id: &str);
}

/// Registry observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistryObserver;

impl RegistryObserver for NoopRegistryObserver {
    fn jobs_refreshed(&self, _jobs: &[JobSummary]) {}

    fn job_removed(&self, _job_id: &str) {}
}
