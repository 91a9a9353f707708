//! Chunked transfer engine
//!
//! Drains a [`ChunkSource`] into a server job one chunk at a time:
//!
//! ```text
//! idle -> transferring <-> paused
//!              |  ^
//!              v  |
//!         failed chunk -> retrying          (any state) -> cancelled
//!              |
//!              v
//!          completed (offset == size)
//! ```
//!
//! Requests are strictly sequential. The offset only moves when the server
//! acknowledges a chunk, and then to the value the server reports. It never
//! moves backwards.

use crate::api::gateway::ImportApi;
use crate::api::types::ChunkAck;
use crate::error::{CliError, Result};
use crate::observer::{Observer, PipelineEvent};
use crate::session::{cancellable, cancellable_sleep, Session};
use crate::source::ChunkSource;
use pgimport_common::checksum::chunk_checksum;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Client-side chunk size when the server does not assign one (5 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// First retry delay after a transport failure
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(1000);

/// Ceiling for the doubling retry delay
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(60_000);

/// Exponential backoff for failed chunk requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX)
    }
}

/// Where a transfer starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub job_id: String,
    pub chunk_size: u64,
    /// Bytes the server already holds
    pub offset: u64,
}

/// How a transfer ended, short of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Every byte acknowledged
    Completed { size: u64 },
    /// The user cancelled; `offset` is the last acknowledged position
    Cancelled { offset: u64 },
}

pub struct TransferEngine<'a, A: ImportApi + ?Sized> {
    api: &'a A,
    session: &'a Session,
    backoff: BackoffPolicy,
}

impl<'a, A: ImportApi + ?Sized> TransferEngine<'a, A> {
    pub fn new(api: &'a A, session: &'a Session) -> Self {
        Self {
            api,
            session,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Upload everything from `plan.offset` to the end of `source`
    ///
    /// Returns `Cancelled` rather than an error when the user cancels. Deleting
    /// the job afterwards is the caller's business.
    #[instrument(skip_all, fields(job_id = %plan.job_id, size = source.len()))]
    pub async fn run(
        &self,
        plan: &TransferPlan,
        source: &mut dyn ChunkSource,
        observer: &dyn Observer,
    ) -> Result<TransferOutcome> {
        let cancel = self.session.cancel_token();
        let mut offset = plan.offset;

        match self
            .drive(plan, source, observer, &cancel, &mut offset)
            .await
        {
            Ok(size) => {
                info!(size, "Transfer complete");
                Ok(TransferOutcome::Completed { size })
            },
            Err(CliError::Cancelled) => {
                info!(offset, "Transfer cancelled");
                observer.on_event(&PipelineEvent::Cancelled {
                    job_id: plan.job_id.clone(),
                });
                Ok(TransferOutcome::Cancelled { offset })
            },
            Err(e) => Err(e),
        }
    }

    async fn drive(
        &self,
        plan: &TransferPlan,
        source: &mut dyn ChunkSource,
        observer: &dyn Observer,
        cancel: &CancellationToken,
        offset: &mut u64,
    ) -> Result<u64> {
        let size = source.len();
        let chunk_size = plan.chunk_size.max(1);

        if *offset > size {
            return Err(CliError::protocol(format!(
                "server holds {} bytes of a {} byte file",
                offset, size
            )));
        }

        let mut attempt: u32 = 0;

        while *offset < size {
            if cancel.is_cancelled() {
                return Err(CliError::Cancelled);
            }

            let chunk = source.read_chunk(*offset, chunk_size).await?;

            if self.session.is_paused() {
                info!(offset = *offset, "Transfer paused");
                observer.on_event(&PipelineEvent::Paused { offset: *offset });
                self.session.wait_resumed(cancel).await?;
                info!(offset = *offset, "Transfer resumed");
                observer.on_event(&PipelineEvent::Resumed { offset: *offset });
            }

            let len = chunk.len() as u64;
            let checksum = chunk_checksum(&chunk);
            debug!(offset = *offset, len, checksum = %checksum, "Sending chunk");
            observer.on_event(&PipelineEvent::ChunkSending {
                offset: *offset,
                len,
            });

            let reply = cancellable(
                cancel,
                self.api
                    .upload_chunk(&plan.job_id, *offset, chunk, &checksum),
            )
            .await;

            let failure = match reply {
                Ok(ChunkAck::Accepted { uploaded_bytes }) if uploaded_bytes > size => {
                    return Err(CliError::protocol(format!(
                        "server acknowledged {} bytes of a {} byte file",
                        uploaded_bytes, size
                    )));
                },
                Ok(ChunkAck::Accepted { uploaded_bytes }) if uploaded_bytes == *offset => {
                    CliError::protocol(format!("server accepted no bytes at offset {}", offset))
                },
                Ok(ChunkAck::Accepted { uploaded_bytes }) if uploaded_bytes < *offset => {
                    return Err(CliError::protocol(format!(
                        "server moved the offset back from {} to {}",
                        offset, uploaded_bytes
                    )));
                },
                Ok(ChunkAck::Accepted { uploaded_bytes }) => {
                    *offset = uploaded_bytes;
                    attempt = 0;
                    observer.on_event(&PipelineEvent::ChunkAcked {
                        uploaded: uploaded_bytes,
                        size,
                    });
                    continue;
                },
                Ok(ChunkAck::BadChecksum) => {
                    warn!(offset = *offset, "Checksum rejected, resending chunk");
                    observer.on_event(&PipelineEvent::ChecksumRejected { offset: *offset });
                    continue;
                },
                Ok(ChunkAck::Rejected { status, error }) => CliError::api(format!(
                    "chunk refused with status {}{}",
                    status,
                    error.map(|e| format!(": {}", e)).unwrap_or_default()
                )),
                Err(e) if e.is_transport() => e,
                Err(e) => return Err(e),
            };

            self.wait_before_retry(&plan.job_id, *offset, &mut attempt, failure, observer, cancel)
                .await?;
        }

        Ok(size)
    }

    /// Back off after a failed chunk, or park while offline
    ///
    /// A request that never reached the server flips the session offline and
    /// polls the server until it answers. Offline reports from elsewhere are
    /// waited out until someone reports the session online again.
    async fn wait_before_retry(
        &self,
        job_id: &str,
        offset: u64,
        attempt: &mut u32,
        failure: CliError,
        observer: &dyn Observer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if failure.is_unreachable() {
            warn!(offset, error = %failure, "Server unreachable");
            self.session.set_online(false);
            return self
                .wait_for_reconnect(Some(job_id), offset, attempt, observer, cancel)
                .await;
        }
        if !self.session.is_online() {
            return self
                .wait_for_reconnect(None, offset, attempt, observer, cancel)
                .await;
        }

        let delay = self.backoff.delay_for_attempt(*attempt);
        *attempt = attempt.saturating_add(1);

        warn!(
            offset,
            attempt = *attempt,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Chunk upload failed, backing off"
        );
        observer.on_event(&PipelineEvent::RetryScheduled {
            offset,
            attempt: *attempt,
            delay,
            error: failure.to_string(),
        });

        let mut online = self.session.subscribe_online();
        let went_offline = async { online.wait_for(|online| !*online).await.map(|_| ()) };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CliError::Cancelled),
            Ok(()) = went_offline => {
                self.wait_for_reconnect(None, offset, attempt, observer, cancel).await
            }
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn wait_for_reconnect(
        &self,
        check_job: Option<&str>,
        offset: u64,
        attempt: &mut u32,
        observer: &dyn Observer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(offset, "Offline, waiting for connectivity");
        observer.on_event(&PipelineEvent::Offline);
        match check_job {
            Some(job_id) => {
                tokio::select! {
                    biased;
                    online = self.session.wait_online(cancel) => online?,
                    reachable = self.poll_until_reachable(job_id, cancel) => reachable?,
                }
            },
            None => self.session.wait_online(cancel).await?,
        }
        info!(offset, "Back online, retrying");
        observer.on_event(&PipelineEvent::Online);
        *attempt = 0;
        Ok(())
    }

    /// Ask the server for the job's upload status on the backoff schedule
    /// until any answer comes back, then report the session online
    async fn poll_until_reachable(&self, job_id: &str, cancel: &CancellationToken) -> Result<()> {
        let mut check: u32 = 0;
        loop {
            let delay = self.backoff.delay_for_attempt(check);
            check = check.saturating_add(1);
            cancellable_sleep(cancel, delay).await?;

            match cancellable(cancel, self.api.upload_status(job_id)).await {
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if e.is_unreachable() => {
                    debug!(check, delay_ms = delay.as_millis() as u64, "Server still unreachable");
                },
                _ => {
                    self.session.set_online(true);
                    return Ok(());
                },
            }
        }
    }
}
