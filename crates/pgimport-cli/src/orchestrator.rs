//! Upload pipeline
//!
//! Ties validation, job initialization or resumption, the chunked transfer,
//! finalization, archive entry selection and the import loop together.
//! Everything the pipeline learns is persisted through a [`ResumeStore`] so a
//! later run of the same file continues the same server job.

use crate::api::gateway::ImportApi;
use crate::api::types::InitUpload;
use crate::config::Config;
use crate::error::Result;
use crate::import::{ImportDriver, ImportOutcome, DEFAULT_POLL_INTERVAL};
use crate::observer::{Observer, PipelineEvent};
use crate::resume::ResumeStore;
use crate::session::{cancellable, Session};
use crate::source::{ChunkSource, FileSource, UploadFile};
use crate::transfer::{
    BackoffPolicy, TransferEngine, TransferOutcome, TransferPlan, DEFAULT_CHUNK_SIZE,
};
use crate::validate::validate_file;
use pgimport_common::types::{
    ArchiveEntry, Capabilities, EntrySelection, FileKind, ImportOptions, ImportScope,
};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Pipeline knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub chunk_size: u64,
    pub max_upload_size: Option<u64>,
    pub capabilities: Capabilities,
    /// Go on to entry selection and import after finalizing
    pub auto_continue: bool,
    pub backoff: BackoffPolicy,
    pub poll_interval: Duration,
}

impl UploadSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_upload_size: config.max_upload_size,
            capabilities: config.capabilities,
            auto_continue: config.auto_continue,
            backoff: BackoffPolicy::new(
                Duration::from_millis(config.backoff_initial_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: None,
            capabilities: Capabilities::default(),
            auto_continue: true,
            backoff: BackoffPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What the server should do with the uploaded dump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportTarget {
    pub scope: ImportScope,
    pub scope_ident: String,
    pub options: ImportOptions,
}

/// A job ready to receive bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedJob {
    pub job_id: String,
    pub chunk_size: u64,
    /// Bytes the server already holds
    pub offset: u64,
    /// Adopted from a resume token rather than freshly created
    pub resumed: bool,
    pub resume_key: String,
}

impl PreparedJob {
    fn plan(&self) -> TransferPlan {
        TransferPlan {
            job_id: self.job_id.clone(),
            chunk_size: self.chunk_size,
            offset: self.offset,
        }
    }
}

/// Result of the transfer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Finalized; `size` is the server's canonical size
    Uploaded { size: u64 },
    /// Cancelled by the user; the job was deleted
    Cancelled,
}

/// Result of the whole pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Uploaded and finalized, import not started
    Uploaded { job_id: String, size: u64 },
    /// Uploaded and imported (or import stopped)
    Imported {
        job_id: String,
        size: u64,
        outcome: ImportOutcome,
    },
    /// The user cancelled before the upload finished; `job_id` is the
    /// deleted job, `None` when cancelled before one was created
    Cancelled { job_id: Option<String> },
}

/// Picks which archive member(s) to import
pub trait EntrySelector: Send + Sync {
    /// `None` leaves the job uploaded without starting the import
    fn select(&self, entries: &[ArchiveEntry]) -> Result<Option<EntrySelection>>;
}

/// Selector with a preset answer
#[derive(Debug, Clone)]
pub struct FixedSelector(pub Option<EntrySelection>);

impl EntrySelector for FixedSelector {
    fn select(&self, _entries: &[ArchiveEntry]) -> Result<Option<EntrySelection>> {
        Ok(self.0.clone())
    }
}

pub struct JobOrchestrator<'a, A: ImportApi + ?Sized> {
    api: &'a A,
    session: &'a Session,
    store: &'a dyn ResumeStore,
    settings: UploadSettings,
    observer: &'a dyn Observer,
}

impl<'a, A: ImportApi + ?Sized> JobOrchestrator<'a, A> {
    pub fn new(
        api: &'a A,
        session: &'a Session,
        store: &'a dyn ResumeStore,
        settings: UploadSettings,
        observer: &'a dyn Observer,
    ) -> Self {
        Self {
            api,
            session,
            store,
            settings,
            observer,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Pre-flight checks, no network
    pub async fn validate(&self, file: &UploadFile) -> Result<FileKind> {
        let kind = validate_file(
            &file.path,
            file.size,
            &self.settings.capabilities,
            self.settings.max_upload_size,
        )
        .await?;
        debug!(file = %file.name, %kind, size = file.size, "File validated");
        self.observer.on_event(&PipelineEvent::Validated {
            kind,
            size: file.size,
        });
        Ok(kind)
    }

    /// Resume the job recorded for `file`, or create a new one
    #[instrument(skip_all, fields(file = %file.name, size = file.size))]
    pub async fn prepare(&self, file: &UploadFile, target: &ImportTarget) -> Result<PreparedJob> {
        let key = file.resume_key();
        let cancel = self.session.cancel_token();

        if let Some(job_id) = self.store.get(&key)? {
            self.session.ensure_available(Some(&job_id))?;
            match cancellable(&cancel, self.api.upload_status(&job_id)).await {
                Ok(status) if status.uploaded_bytes < file.size => {
                    let prepared = PreparedJob {
                        chunk_size: status.chunk_size.unwrap_or(self.settings.chunk_size),
                        offset: status.uploaded_bytes,
                        resumed: true,
                        resume_key: key,
                        job_id,
                    };
                    info!(
                        job_id = %prepared.job_id,
                        offset = prepared.offset,
                        "Resuming interrupted upload"
                    );
                    self.announce(&prepared);
                    return Ok(prepared);
                },
                Ok(status) => {
                    info!(
                        job_id = %job_id,
                        uploaded = status.uploaded_bytes,
                        "Recorded job already holds the whole file, starting over"
                    );
                },
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Recorded job is gone, starting over");
                },
            }
            self.store.remove(&key)?;
        }

        self.session.ensure_available(None)?;

        let request = InitUpload {
            filename: file.name.clone(),
            filesize: file.size,
            scope: target.scope,
            scope_ident: target.scope_ident.clone(),
            options: target.options.clone(),
        };
        let reply = cancellable(&cancel, self.api.init_upload(&request)).await?;
        self.store.put(&key, &reply.job_id)?;

        let prepared = PreparedJob {
            job_id: reply.job_id,
            chunk_size: reply.chunk_size.unwrap_or(self.settings.chunk_size),
            offset: 0,
            resumed: false,
            resume_key: key,
        };
        info!(job_id = %prepared.job_id, chunk_size = prepared.chunk_size, "Created upload job");
        self.announce(&prepared);
        Ok(prepared)
    }

    fn announce(&self, prepared: &PreparedJob) {
        self.observer.on_event(&PipelineEvent::JobResolved {
            job_id: prepared.job_id.clone(),
            resumed: prepared.resumed,
            offset: prepared.offset,
            chunk_size: prepared.chunk_size,
        });
    }

    /// Transfer the remaining bytes and finalize
    ///
    /// A user cancellation deletes the server job and forgets the resume
    /// token before returning [`UploadOutcome::Cancelled`].
    pub async fn upload(
        &self,
        prepared: &PreparedJob,
        source: &mut dyn ChunkSource,
    ) -> Result<UploadOutcome> {
        let _claim = self.session.begin(&prepared.job_id)?;

        let outcome = TransferEngine::new(self.api, self.session)
            .with_backoff(self.settings.backoff)
            .run(&prepared.plan(), source, self.observer)
            .await?;

        match outcome {
            TransferOutcome::Completed { .. } => {
                let size = self
                    .finalize(&prepared.job_id, Some(&prepared.resume_key))
                    .await?;
                Ok(UploadOutcome::Uploaded { size })
            },
            TransferOutcome::Cancelled { .. } => {
                self.discard(&prepared.job_id).await;
                Ok(UploadOutcome::Cancelled)
            },
        }
    }

    /// Best-effort cleanup after a cancelled transfer
    async fn discard(&self, job_id: &str) {
        if let Err(e) = self.api.delete_job(job_id).await {
            warn!(job_id = %job_id, error = %e, "Could not delete cancelled job");
        }
        if let Err(e) = self.store.remove_job(job_id) {
            warn!(job_id = %job_id, error = %e, "Could not forget resume token");
        }
    }

    /// Close the upload; returns the server's canonical size
    pub async fn finalize(&self, job_id: &str, resume_key: Option<&str>) -> Result<u64> {
        let cancel = self.session.cancel_token();
        let reply = cancellable(&cancel, self.api.finalize_upload(job_id)).await?;
        match resume_key {
            Some(key) => self.store.remove(key)?,
            None => self.store.remove_job(job_id)?,
        }
        info!(job_id = %job_id, size = reply.size, "Upload finalized");
        self.observer
            .on_event(&PipelineEvent::Finalized { size: reply.size });
        Ok(reply.size)
    }

    /// Members of an uploaded archive
    pub async fn entries(&self, job_id: &str) -> Result<Vec<ArchiveEntry>> {
        let entries = self.api.list_entries(job_id).await?;
        debug!(job_id = %job_id, count = entries.len(), "Archive entries listed");
        self.observer.on_event(&PipelineEvent::EntriesListed {
            entries: entries.clone(),
        });
        Ok(entries)
    }

    pub async fn select_entry(&self, job_id: &str, selection: &EntrySelection) -> Result<()> {
        self.api.select_entry(job_id, selection).await?;
        info!(job_id = %job_id, ?selection, "Archive entry selected");
        Ok(())
    }

    /// Validate, upload, finalize and (when configured) import `file`
    #[instrument(skip_all, fields(file = %file.name))]
    pub async fn run(
        &self,
        file: &UploadFile,
        target: &ImportTarget,
        selector: &dyn EntrySelector,
    ) -> Result<PipelineOutcome> {
        let kind = self.validate(file).await?;
        let mut source = FileSource::open(file).await?;
        self.run_source(file, kind, &mut source, target, selector)
            .await
    }

    /// [`JobOrchestrator::run`] past validation, reading from `source`
    pub async fn run_source(
        &self,
        file: &UploadFile,
        kind: FileKind,
        source: &mut dyn ChunkSource,
        target: &ImportTarget,
        selector: &dyn EntrySelector,
    ) -> Result<PipelineOutcome> {
        let prepared = match self.prepare(file, target).await {
            Ok(prepared) => prepared,
            Err(e) if e.is_cancelled() => {
                info!("Cancelled before a job was created");
                return Ok(PipelineOutcome::Cancelled { job_id: None });
            },
            Err(e) => return Err(e),
        };
        let job_id = prepared.job_id.clone();
        let _claim = self.session.begin(&job_id)?;

        if self.session.cancel_token().is_cancelled() {
            info!(job_id = %job_id, "Cancelled before the transfer started");
            self.observer.on_event(&PipelineEvent::Cancelled {
                job_id: job_id.clone(),
            });
            self.discard(&job_id).await;
            return Ok(PipelineOutcome::Cancelled {
                job_id: Some(job_id),
            });
        }

        let size = match self.upload(&prepared, source).await? {
            UploadOutcome::Uploaded { size } => size,
            UploadOutcome::Cancelled => {
                return Ok(PipelineOutcome::Cancelled {
                    job_id: Some(job_id),
                })
            },
        };

        if !self.settings.auto_continue {
            return Ok(PipelineOutcome::Uploaded { job_id, size });
        }

        if kind.is_container() {
            let entries = self.entries(&job_id).await?;
            if !entries.is_empty() {
                match selector.select(&entries)? {
                    Some(selection) => self.select_entry(&job_id, &selection).await?,
                    None => {
                        self.observer.on_event(&PipelineEvent::Status {
                            message: format!(
                                "No entry selected; start the import later with 'pgimport start {}'",
                                job_id
                            ),
                        });
                        return Ok(PipelineOutcome::Uploaded { job_id, size });
                    },
                }
            }
        }

        let outcome = ImportDriver::new(self.api, self.session)
            .with_poll_interval(self.settings.poll_interval)
            .run(&job_id, Some(size), self.observer)
            .await?;

        Ok(PipelineOutcome::Imported {
            job_id,
            size,
            outcome,
        })
    }
}
