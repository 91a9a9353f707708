//! The import endpoint contract
//!
//! One method per server action. [`crate::api::ApiClient`] speaks it over
//! HTTP; tests substitute scripted implementations.

use crate::api::types::*;
use crate::error::Result;
use async_trait::async_trait;
use pgimport_common::types::{ArchiveEntry, EntrySelection};

#[async_trait]
pub trait ImportApi: Send + Sync {
    /// Create a job for a new upload
    async fn init_upload(&self, request: &InitUpload) -> Result<InitUploadReply>;

    /// How many bytes of a job the server already holds
    async fn upload_status(&self, job_id: &str) -> Result<UploadStatusReply>;

    /// Send one chunk; the checksum travels in the `X-Checksum` header
    async fn upload_chunk(
        &self,
        job_id: &str,
        offset: u64,
        data: Vec<u8>,
        checksum: &str,
    ) -> Result<ChunkAck>;

    /// Close the transfer phase; the reply carries the canonical size
    async fn finalize_upload(&self, job_id: &str) -> Result<FinalizeReply>;

    /// Members of an uploaded archive
    async fn list_entries(&self, job_id: &str) -> Result<Vec<ArchiveEntry>>;

    /// Choose which archive member(s) the import applies
    async fn select_entry(&self, job_id: &str, selection: &EntrySelection) -> Result<()>;

    /// Read-only job state
    async fn status(&self, job_id: &str) -> Result<JobProgress>;

    /// Advance the import by one bounded step
    async fn process(&self, job_id: &str) -> Result<JobProgress>;

    async fn pause_job(&self, job_id: &str) -> Result<()>;

    async fn resume_job(&self, job_id: &str) -> Result<ResumeReply>;

    async fn delete_job(&self, job_id: &str) -> Result<()>;

    async fn list_jobs(&self, show_all: bool) -> Result<Vec<JobSummary>>;
}
