//! Import processing loop
//!
//! Once a job is uploaded the server applies it in slices: every `process`
//! request advances the job and reports how much of the source has been
//! consumed. The driver keeps ticking until the job reaches a terminal status
//! or the whole source is consumed.

use crate::api::gateway::ImportApi;
use crate::api::types::JobProgress;
use crate::error::{CliError, Result};
use crate::observer::{Observer, PipelineEvent};
use crate::session::{cancellable, cancellable_sleep, Session};
use pgimport_common::types::JobStatus;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Delay between two `process` requests
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(700);

/// How an import run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The server finished applying the dump
    Finished { consumed: u64, errors: u64 },
    /// The job stopped in the `error` status
    Failed { consumed: u64, errors: u64 },
    /// The user cancelled; the job stays on the server
    Cancelled { consumed: u64 },
}

/// Whole-percent progress, rounded down and capped at 100
pub fn progress_percent(consumed: u64, size: u64) -> u8 {
    if size == 0 {
        return 0;
    }
    let percent = (consumed as u128 * 100) / size as u128;
    percent.min(100) as u8
}

pub struct ImportDriver<'a, A: ImportApi + ?Sized> {
    api: &'a A,
    session: &'a Session,
    poll_interval: Duration,
}

impl<'a, A: ImportApi + ?Sized> ImportDriver<'a, A> {
    pub fn new(api: &'a A, session: &'a Session) -> Self {
        Self {
            api,
            session,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Tick `process` until the job is done
    ///
    /// `size` is the canonical payload size from `finalize_upload`. When the
    /// caller does not know it, the size the server reports is used; without
    /// either, only a terminal status ends the loop.
    #[instrument(skip(self, observer), fields(job_id = %job_id))]
    pub async fn run(
        &self,
        job_id: &str,
        size: Option<u64>,
        observer: &dyn Observer,
    ) -> Result<ImportOutcome> {
        let _claim = self.session.begin(job_id)?;
        let cancel = self.session.cancel_token();
        let mut consumed = 0;

        let result: Result<ImportOutcome> = async {
            let initial = cancellable(&cancel, self.api.status(job_id)).await?;
            consumed = initial.consumed;
            let mut size = size.or(initial.size).unwrap_or(0);

            if initial.status == JobStatus::Cancelled {
                info!("Job was cancelled, resuming it before processing");
                let reply = cancellable(&cancel, self.api.resume_job(job_id)).await?;
                if !reply.log.is_empty() {
                    observer.on_event(&PipelineEvent::ImportLog { lines: reply.log });
                }
            }

            loop {
                let progress = cancellable(&cancel, self.api.process(job_id)).await?;
                if size == 0 {
                    size = progress.size.unwrap_or(0);
                }
                consumed = progress.consumed;
                self.report(&progress, size, observer);

                match progress.status {
                    JobStatus::Finished => {
                        return Ok(ImportOutcome::Finished {
                            consumed,
                            errors: progress.errors,
                        })
                    },
                    JobStatus::Error => {
                        warn!(errors = progress.errors, "Import stopped with an error");
                        return Ok(ImportOutcome::Failed {
                            consumed,
                            errors: progress.errors,
                        });
                    },
                    _ if size > 0 && consumed >= size => {
                        return Ok(ImportOutcome::Finished {
                            consumed,
                            errors: progress.errors,
                        })
                    },
                    _ => {},
                }

                cancellable_sleep(&cancel, self.poll_interval).await?;
            }
        }
        .await;

        match result {
            Err(CliError::Cancelled) => {
                info!(consumed, "Import polling cancelled");
                observer.on_event(&PipelineEvent::Cancelled {
                    job_id: job_id.to_string(),
                });
                Ok(ImportOutcome::Cancelled { consumed })
            },
            Ok(outcome) => {
                info!(?outcome, "Import loop finished");
                Ok(outcome)
            },
            Err(e) => Err(e),
        }
    }

    fn report(&self, progress: &JobProgress, size: u64, observer: &dyn Observer) {
        let percent = progress_percent(progress.consumed, size);
        debug!(
            status = %progress.status,
            consumed = progress.consumed,
            size,
            percent,
            errors = progress.errors,
            "Import tick"
        );

        if !progress.log.is_empty() {
            observer.on_event(&PipelineEvent::ImportLog {
                lines: progress.log.clone(),
            });
        }
        observer.on_event(&PipelineEvent::ImportTick {
            status: progress.status,
            consumed: progress.consumed,
            size,
            percent,
            errors: progress.errors,
            current_db: progress.current_db.clone(),
        });
    }
}
