//! Scripted in-memory gateway for state machine tests

use crate::api::gateway::ImportApi;
use crate::api::types::*;
use crate::error::{CliError, Result};
use crate::session::Session;
use async_trait::async_trait;
use pgimport_common::checksum::chunk_checksum;
use pgimport_common::types::{ArchiveEntry, EntrySelection, JobStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    InitUpload { filename: String, filesize: u64 },
    UploadStatus { job_id: String },
    UploadChunk { job_id: String, offset: u64, len: u64, checksum: String },
    Finalize { job_id: String },
    ListEntries { job_id: String },
    SelectEntry { job_id: String, selection: EntrySelection },
    Status { job_id: String },
    Process { job_id: String },
    Pause { job_id: String },
    Resume { job_id: String },
    Delete { job_id: String },
    ListJobs { show_all: bool },
}

/// Scripted reaction to one chunk request
#[derive(Debug, Clone)]
pub enum ChunkBehavior {
    /// Store the bytes and acknowledge them
    Accept,
    /// Store only the first `n` bytes
    AcceptPartial(u64),
    BadChecksum,
    /// Fail like an HTTP 503
    Fail,
    /// Fail and flip the session offline
    FailOffline,
    /// Fail without reaching the server
    Unreachable,
    /// Acknowledge, then ask the session to pause
    AcceptThenPause,
    /// Cancel the session and never answer
    CancelAndHang,
}

#[derive(Default)]
struct State {
    calls: Vec<(Instant, Call)>,
    chunk_script: VecDeque<ChunkBehavior>,
    received: HashMap<String, Vec<u8>>,
    next_job: u32,
    init_chunk_size: Option<u64>,
    upload_status: HashMap<String, Result<UploadStatusReply>>,
    finalize_size: Option<u64>,
    entries: Vec<ArchiveEntry>,
    status: Option<JobProgress>,
    process_script: VecDeque<JobProgress>,
    resume_status: Option<JobStatus>,
    jobs: Vec<JobSummary>,
    delete_error: Option<String>,
    cancel_on_init: bool,
    unreachable_checks: u32,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<State>,
    session: Mutex<Option<Arc<Session>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Session the pause/cancel/offline behaviors act on
    pub fn attach_session(&self, session: Arc<Session>) {
        *self.session.lock().unwrap() = Some(session);
    }

    fn attached(&self) -> Arc<Session> {
        self.session.lock().unwrap().clone().expect("no session attached")
    }

    pub fn script_chunks(&self, behaviors: impl IntoIterator<Item = ChunkBehavior>) {
        self.state().chunk_script.extend(behaviors);
    }

    pub fn set_init_chunk_size(&self, chunk_size: Option<u64>) {
        self.state().init_chunk_size = chunk_size;
    }

    pub fn set_upload_status(&self, job_id: &str, reply: Result<UploadStatusReply>) {
        self.state().upload_status.insert(job_id.to_string(), reply);
    }

    /// Pretend the server already holds `bytes` for `job_id`
    pub fn preload(&self, job_id: &str, bytes: &[u8]) {
        self.state()
            .received
            .insert(job_id.to_string(), bytes.to_vec());
    }

    pub fn set_finalize_size(&self, size: u64) {
        self.state().finalize_size = Some(size);
    }

    pub fn set_entries(&self, entries: Vec<ArchiveEntry>) {
        self.state().entries = entries;
    }

    pub fn set_status(&self, progress: JobProgress) {
        self.state().status = Some(progress);
    }

    pub fn script_process(&self, replies: impl IntoIterator<Item = JobProgress>) {
        self.state().process_script.extend(replies);
    }

    pub fn set_resume_status(&self, status: JobStatus) {
        self.state().resume_status = Some(status);
    }

    pub fn set_jobs(&self, jobs: Vec<JobSummary>) {
        self.state().jobs = jobs;
    }

    /// Let the next `n` upload status requests fail as unreachable
    pub fn set_unreachable_checks(&self, n: u32) {
        self.state().unreachable_checks = n;
    }

    /// Create the job, then cancel the session before the reply is seen
    pub fn cancel_during_init(&self) {
        self.state().cancel_on_init = true;
    }

    pub fn set_delete_error(&self, error: &str) {
        self.state().delete_error = Some(error.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.state().calls.clone()
    }

    pub fn chunk_offsets(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UploadChunk { offset, .. } => Some(offset),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn received(&self, job_id: &str) -> Vec<u8> {
        self.state().received.get(job_id).cloned().unwrap_or_default()
    }

    fn record(&self, call: Call) {
        self.state().calls.push((Instant::now(), call));
    }
}

pub fn progress(status: JobStatus, consumed: u64) -> JobProgress {
    JobProgress {
        status,
        consumed,
        errors: 0,
        log: Vec::new(),
        current_db: None,
        size: None,
    }
}

#[async_trait]
impl ImportApi for FakeApi {
    async fn init_upload(&self, request: &InitUpload) -> Result<InitUploadReply> {
        self.record(Call::InitUpload {
            filename: request.filename.clone(),
            filesize: request.filesize,
        });
        let (reply, cancel) = {
            let mut state = self.state();
            state.next_job += 1;
            let job_id = format!("job-{}", state.next_job);
            state.received.insert(job_id.clone(), Vec::new());
            let reply = InitUploadReply {
                job_id,
                chunk_size: state.init_chunk_size,
            };
            (reply, state.cancel_on_init)
        };
        if cancel {
            self.attached().cancel();
        }
        Ok(reply)
    }

    async fn upload_status(&self, job_id: &str) -> Result<UploadStatusReply> {
        self.record(Call::UploadStatus {
            job_id: job_id.to_string(),
        });
        let mut state = self.state();
        if state.unreachable_checks > 0 {
            state.unreachable_checks -= 1;
            return Err(CliError::Unreachable("connection refused".into()));
        }
        match state.upload_status.remove(job_id) {
            Some(reply) => reply,
            None => Err(CliError::JobNotFound(job_id.to_string())),
        }
    }

    async fn upload_chunk(
        &self,
        job_id: &str,
        offset: u64,
        data: Vec<u8>,
        checksum: &str,
    ) -> Result<ChunkAck> {
        self.record(Call::UploadChunk {
            job_id: job_id.to_string(),
            offset,
            len: data.len() as u64,
            checksum: checksum.to_string(),
        });
        assert_eq!(checksum, chunk_checksum(&data), "client sent a wrong checksum");

        let behavior = self
            .state()
            .chunk_script
            .pop_front()
            .unwrap_or(ChunkBehavior::Accept);

        let accept = |take: u64| {
            let mut state = self.state();
            let stored = state.received.entry(job_id.to_string()).or_default();
            assert_eq!(stored.len() as u64, offset, "chunk sent at a non-contiguous offset");
            stored.extend_from_slice(&data[..take as usize]);
            ChunkAck::Accepted {
                uploaded_bytes: stored.len() as u64,
            }
        };

        match behavior {
            ChunkBehavior::Accept => Ok(accept(data.len() as u64)),
            ChunkBehavior::AcceptPartial(n) => Ok(accept(n.min(data.len() as u64))),
            ChunkBehavior::BadChecksum => Ok(ChunkAck::BadChecksum),
            ChunkBehavior::Fail => Err(CliError::api("HTTP 503 Service Unavailable")),
            ChunkBehavior::Unreachable => Err(CliError::Unreachable("connection refused".into())),
            ChunkBehavior::FailOffline => {
                self.attached().set_online(false);
                Err(CliError::api("connection reset"))
            },
            ChunkBehavior::AcceptThenPause => {
                let ack = accept(data.len() as u64);
                self.attached().pause();
                Ok(ack)
            },
            ChunkBehavior::CancelAndHang => {
                self.attached().cancel();
                std::future::pending::<()>().await;
                unreachable!()
            },
        }
    }

    async fn finalize_upload(&self, job_id: &str) -> Result<FinalizeReply> {
        self.record(Call::Finalize {
            job_id: job_id.to_string(),
        });
        let state = self.state();
        let size = state.finalize_size.unwrap_or_else(|| {
            state
                .received
                .get(job_id)
                .map(|b| b.len() as u64)
                .unwrap_or(0)
        });
        Ok(FinalizeReply { size })
    }

    async fn list_entries(&self, job_id: &str) -> Result<Vec<ArchiveEntry>> {
        self.record(Call::ListEntries {
            job_id: job_id.to_string(),
        });
        Ok(self.state().entries.clone())
    }

    async fn select_entry(&self, job_id: &str, selection: &EntrySelection) -> Result<()> {
        self.record(Call::SelectEntry {
            job_id: job_id.to_string(),
            selection: selection.clone(),
        });
        Ok(())
    }

    async fn status(&self, job_id: &str) -> Result<JobProgress> {
        self.record(Call::Status {
            job_id: job_id.to_string(),
        });
        Ok(self
            .state()
            .status
            .clone()
            .unwrap_or_else(|| progress(JobStatus::Uploaded, 0)))
    }

    async fn process(&self, job_id: &str) -> Result<JobProgress> {
        self.record(Call::Process {
            job_id: job_id.to_string(),
        });
        self.state()
            .process_script
            .pop_front()
            .ok_or_else(|| CliError::api("process called more often than scripted"))
    }

    async fn pause_job(&self, job_id: &str) -> Result<()> {
        self.record(Call::Pause {
            job_id: job_id.to_string(),
        });
        Ok(())
    }

    async fn resume_job(&self, job_id: &str) -> Result<ResumeReply> {
        self.record(Call::Resume {
            job_id: job_id.to_string(),
        });
        Ok(ResumeReply {
            status: self.state().resume_status.or(Some(JobStatus::Running)),
            log: vec![LogEntry {
                message: "Job resumed".to_string(),
                level: None,
            }],
        })
    }

    async fn delete_job(&self, job_id: &str) -> Result<()> {
        self.record(Call::Delete {
            job_id: job_id.to_string(),
        });
        match self.state().delete_error.clone() {
            Some(error) => Err(CliError::api(error)),
            None => Ok(()),
        }
    }

    async fn list_jobs(&self, show_all: bool) -> Result<Vec<JobSummary>> {
        self.record(Call::ListJobs { show_all });
        Ok(self.state().jobs.clone())
    }
}
