//! HTTP client for the import endpoint
//!
//! Implements [`ImportApi`] with `reqwest`. GET actions carry their parameters
//! in the query string, form actions post `application/x-www-form-urlencoded`
//! bodies, and `upload_chunk` posts the raw chunk bytes.

use crate::api::endpoints::{self, Route};
use crate::api::gateway::ImportApi;
use crate::api::types::*;
use crate::config::Config;
use crate::error::{CliError, Result};
use async_trait::async_trait;
use pgimport_common::types::{ArchiveEntry, EntrySelection};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// API Client Constants
// ============================================================================

/// Default timeout for API requests in seconds.
///
/// A single `process` tick or chunk upload may legitimately take a while on a
/// loaded server, so this is generous.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Header carrying the chunk checksum
pub const CHECKSUM_HEADER: &str = "X-Checksum";

/// API client for the import endpoint
pub struct ApiClient {
    client: Client,
    route: Route,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(route: Route, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, route })
    }

    /// Create from CLI configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let route = Route::new(config.server_url.clone(), config.endpoint.clone())
            .with_server_id(config.server_id.clone());

        Self::new(route, Duration::from_secs(config.timeout_secs))
    }

    /// Get the request route
    pub fn route(&self) -> &Route {
        &self.route
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, job_id: Option<&str>) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(CliError::from_send)?;
        read_json(response, job_id).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, String)],
        job_id: Option<&str>,
    ) -> Result<T> {
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(CliError::from_send)?;
        read_json(response, job_id).await
    }

    async fn post_job<T: DeserializeOwned>(&self, action: &str, job_id: &str) -> Result<T> {
        let url = endpoints::action_url(&self.route, action, &[]);
        self.post_form(&url, &[("job_id", job_id.to_string())], Some(job_id))
            .await
    }
}

/// Decode a JSON reply, mapping HTTP failures and `error` fields to errors
async fn read_json<T: DeserializeOwned>(response: Response, job_id: Option<&str>) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    let value: Option<serde_json::Value> = serde_json::from_str(&body).ok();

    let error_message = value
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.as_str())
        .filter(|e| !e.is_empty())
        .map(str::to_string);

    if !status.is_success() {
        if let (StatusCode::NOT_FOUND, Some(job_id)) = (status, job_id) {
            return Err(CliError::JobNotFound(job_id.to_string()));
        }
        return Err(CliError::api(
            error_message.unwrap_or_else(|| format!("HTTP {}", status)),
        ));
    }

    if let Some(message) = error_message {
        return Err(CliError::api(message));
    }

    let value = value.ok_or_else(|| {
        CliError::protocol(format!(
            "expected a JSON object, got {} bytes of something else",
            body.len()
        ))
    })?;

    serde_json::from_value(value).map_err(|e| CliError::protocol(e.to_string()))
}

#[async_trait]
impl ImportApi for ApiClient {
    async fn init_upload(&self, request: &InitUpload) -> Result<InitUploadReply> {
        let url = endpoints::action_url(&self.route, "init_upload", &[]);
        self.post_form(&url, &request.form_fields(), None).await
    }

    async fn upload_status(&self, job_id: &str) -> Result<UploadStatusReply> {
        let url = endpoints::job_url(&self.route, "upload_status", job_id);
        self.get_json(&url, Some(job_id)).await
    }

    async fn upload_chunk(
        &self,
        job_id: &str,
        offset: u64,
        data: Vec<u8>,
        checksum: &str,
    ) -> Result<ChunkAck> {
        let url = endpoints::chunk_url(&self.route, job_id, offset);
        let response = self
            .client
            .post(&url)
            .header(CHECKSUM_HEADER, checksum)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(CliError::from_send)?;

        // Checksum rejections may arrive with a 4xx status, so the body is
        // inspected before the status code.
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ChunkReply>(&body) {
            Ok(reply) => Ok(reply.into_ack()),
            Err(_) if status == StatusCode::NOT_FOUND => {
                Err(CliError::JobNotFound(job_id.to_string()))
            },
            Err(_) if !status.is_success() => Err(CliError::api(format!("HTTP {}", status))),
            Err(e) => Err(CliError::protocol(e.to_string())),
        }
    }

    async fn finalize_upload(&self, job_id: &str) -> Result<FinalizeReply> {
        self.post_job("finalize_upload", job_id).await
    }

    async fn list_entries(&self, job_id: &str) -> Result<Vec<ArchiveEntry>> {
        let url = endpoints::job_url(&self.route, "list_entries", job_id);
        let reply: EntriesReply = self.get_json(&url, Some(job_id)).await?;
        Ok(reply.entries)
    }

    async fn select_entry(&self, job_id: &str, selection: &EntrySelection) -> Result<()> {
        let url = endpoints::action_url(&self.route, "select_entry", &[]);
        let mut form = vec![("job_id", job_id.to_string())];
        match selection {
            EntrySelection::Entry(name) => form.push(("entry", name.clone())),
            EntrySelection::All => form.push(("import_all", "1".to_string())),
        }
        let _: ErrorReply = self.post_form(&url, &form, Some(job_id)).await?;
        Ok(())
    }

    async fn status(&self, job_id: &str) -> Result<JobProgress> {
        let url = endpoints::job_url(&self.route, "status", job_id);
        self.get_json(&url, Some(job_id)).await
    }

    async fn process(&self, job_id: &str) -> Result<JobProgress> {
        self.post_job("process", job_id).await
    }

    async fn pause_job(&self, job_id: &str) -> Result<()> {
        let _: ErrorReply = self.post_job("pause_job", job_id).await?;
        Ok(())
    }

    async fn resume_job(&self, job_id: &str) -> Result<ResumeReply> {
        self.post_job("resume_job", job_id).await
    }

    async fn delete_job(&self, job_id: &str) -> Result<()> {
        let _: ErrorReply = self.post_job("delete_job", job_id).await?;
        Ok(())
    }

    async fn list_jobs(&self, show_all: bool) -> Result<Vec<JobSummary>> {
        let url = endpoints::jobs_url(&self.route, show_all);
        let reply: JobsReply = self.get_json(&url, None).await?;
        Ok(reply.jobs)
    }
}
