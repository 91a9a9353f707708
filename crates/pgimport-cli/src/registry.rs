//! Job registry
//!
//! Lists the server's jobs and runs the control actions a job's status allows.
//!
//! | status    | view          | start          | pause | resume         | delete |
//! |-----------|---------------|----------------|-------|----------------|--------|
//! | uploading | "View Upload" |                |       |                | yes    |
//! | uploaded  |               | "Start Import" |       |                |        |
//! | running   |               | "Continue"     | yes   |                |        |
//! | paused    |               |                |       | "Retry/Resume" | yes    |
//! | error     |               |                |       | "Retry/Resume" | yes    |
//! | cancelled |               |                |       | "Retry/Resume" | yes    |
//! | finished  | "View Log"    |                |       |                | yes    |

use crate::api::gateway::ImportApi;
use crate::api::types::{JobSummary, ResumeReply};
use crate::error::{CliError, Result};
use crate::observer::RegistryObserver;
use crate::resume::ResumeStore;
use crate::session::Session;
use pgimport_common::types::JobStatus;
use tracing::{info, instrument};

/// Control actions offered for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobAction {
    View,
    Start,
    Pause,
    Resume,
    Delete,
}

impl JobAction {
    pub fn verb(self) -> &'static str {
        match self {
            JobAction::View => "view",
            JobAction::Start => "start",
            JobAction::Pause => "pause",
            JobAction::Resume => "resume",
            JobAction::Delete => "delete",
        }
    }
}

/// Actions available for one status, with their display labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionSet {
    pub view: Option<&'static str>,
    pub start: Option<&'static str>,
    pub pause: bool,
    pub resume: Option<&'static str>,
    pub delete: bool,
}

impl ActionSet {
    pub fn allows(&self, action: JobAction) -> bool {
        match action {
            JobAction::View => self.view.is_some(),
            JobAction::Start => self.start.is_some(),
            JobAction::Pause => self.pause,
            JobAction::Resume => self.resume.is_some(),
            JobAction::Delete => self.delete,
        }
    }

    /// Labels in display order
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        labels.extend(self.view);
        labels.extend(self.start);
        if self.pause {
            labels.push("Pause");
        }
        labels.extend(self.resume);
        if self.delete {
            labels.push("Delete");
        }
        labels
    }
}

pub fn actions_for(status: JobStatus) -> ActionSet {
    match status {
        JobStatus::Uploading => ActionSet {
            view: Some("View Upload"),
            delete: true,
            ..ActionSet::default()
        },
        JobStatus::Uploaded => ActionSet {
            start: Some("Start Import"),
            ..ActionSet::default()
        },
        JobStatus::Running => ActionSet {
            start: Some("Continue"),
            pause: true,
            ..ActionSet::default()
        },
        JobStatus::Paused | JobStatus::Error | JobStatus::Cancelled => ActionSet {
            resume: Some("Retry/Resume"),
            delete: true,
            ..ActionSet::default()
        },
        JobStatus::Finished => ActionSet {
            view: Some("View Log"),
            delete: true,
            ..ActionSet::default()
        },
    }
}

/// Asks the user before a destructive action
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Confirms everything (`--yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

pub struct JobRegistry<'a, A: ImportApi + ?Sized> {
    api: &'a A,
    session: &'a Session,
    store: &'a dyn ResumeStore,
    confirm: &'a dyn Confirm,
    observer: &'a dyn RegistryObserver,
    show_all: bool,
}

impl<'a, A: ImportApi + ?Sized> JobRegistry<'a, A> {
    pub fn new(
        api: &'a A,
        session: &'a Session,
        store: &'a dyn ResumeStore,
        confirm: &'a dyn Confirm,
        observer: &'a dyn RegistryObserver,
    ) -> Self {
        Self {
            api,
            session,
            store,
            confirm,
            observer,
            show_all: false,
        }
    }

    /// Include finished and cancelled jobs in listings
    pub fn show_all(mut self, show_all: bool) -> Self {
        self.show_all = show_all;
        self
    }

    pub async fn refresh(&self) -> Result<Vec<JobSummary>> {
        let jobs = self.api.list_jobs(self.show_all).await?;
        self.observer.jobs_refreshed(&jobs);
        Ok(jobs)
    }

    async fn require(&self, job_id: &str, action: JobAction) -> Result<JobStatus> {
        let status = self.api.status(job_id).await?.status;
        if actions_for(status).allows(action) {
            Ok(status)
        } else {
            Err(CliError::ActionNotAllowed {
                action: action.verb().to_string(),
                job_id: job_id.to_string(),
                status: status.to_string(),
            })
        }
    }

    /// Pause a running job; `false` when the user declined
    #[instrument(skip(self))]
    pub async fn pause(&self, job_id: &str) -> Result<bool> {
        self.require(job_id, JobAction::Pause).await?;
        if !self
            .confirm
            .confirm(&format!("Pause import job {}?", job_id))?
        {
            return Ok(false);
        }

        self.api.pause_job(job_id).await?;
        if self.session.active_job().as_deref() == Some(job_id) {
            self.session.pause();
        }
        info!("Job paused");
        self.refresh().await?;
        Ok(true)
    }

    /// Resume a paused, failed or cancelled job
    #[instrument(skip(self))]
    pub async fn resume(&self, job_id: &str) -> Result<ResumeReply> {
        self.require(job_id, JobAction::Resume).await?;

        let reply = self.api.resume_job(job_id).await?;
        if self.session.active_job().as_deref() == Some(job_id) {
            self.session.resume();
        }
        info!(status = ?reply.status, "Job resumed");
        self.refresh().await?;
        Ok(reply)
    }

    /// Delete a job and forget its resume token; `false` when the user declined
    #[instrument(skip(self))]
    pub async fn delete(&self, job_id: &str) -> Result<bool> {
        self.require(job_id, JobAction::Delete).await?;
        if !self.confirm.confirm(&format!(
            "Delete import job {}? Uploaded data will be lost.",
            job_id
        ))? {
            return Ok(false);
        }

        self.api.delete_job(job_id).await?;
        self.store.remove_job(job_id)?;
        info!("Job deleted");
        self.observer.job_removed(job_id);
        self.refresh().await?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::resume::MemoryResumeStore;
    use crate::testing::{progress, Call, FakeApi};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        refreshed: Mutex<usize>,
        removed: Mutex<Vec<String>>,
    }

    impl RegistryObserver for Recorder {
        fn jobs_refreshed(&self, _jobs: &[JobSummary]) {
            *self.refreshed.lock().unwrap() += 1;
        }

        fn job_removed(&self, job_id: &str) {
            self.removed.lock().unwrap().push(job_id.to_string());
        }
    }

    struct Decline;

    impl Confirm for Decline {
        fn confirm(&self, _prompt: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_action_table_covers_every_status() {
        let expected: [(JobStatus, Vec<&str>); 7] = [
            (JobStatus::Uploading, vec!["View Upload", "Delete"]),
            (JobStatus::Uploaded, vec!["Start Import"]),
            (JobStatus::Running, vec!["Continue", "Pause"]),
            (JobStatus::Paused, vec!["Retry/Resume", "Delete"]),
            (JobStatus::Error, vec!["Retry/Resume", "Delete"]),
            (JobStatus::Finished, vec!["View Log", "Delete"]),
            (JobStatus::Cancelled, vec!["Retry/Resume", "Delete"]),
        ];
        for (status, labels) in expected {
            assert_eq!(actions_for(status).labels(), labels, "status {}", status);
        }
        assert_eq!(JobStatus::ALL.len(), 7);
    }

    #[test]
    fn test_running_job_cannot_be_deleted() {
        let running = actions_for(JobStatus::Running);
        assert!(!running.allows(JobAction::Delete));
        assert!(running.allows(JobAction::Pause));
        assert!(!actions_for(JobStatus::Uploaded).allows(JobAction::Delete));
        assert!(!actions_for(JobStatus::Paused).allows(JobAction::Pause));
    }

    #[tokio::test]
    async fn test_delete_notifies_and_refreshes() {
        let api = FakeApi::new();
        api.set_status(progress(JobStatus::Finished, 10));
        let session = Session::new();
        let store = MemoryResumeStore::new();
        store.put("key", "job-3").unwrap();
        let observer = Recorder::default();
        let registry = JobRegistry::new(&api, &session, &store, &AssumeYes, &observer);

        assert!(registry.delete("job-3").await.unwrap());

        assert_eq!(api.count(|c| matches!(c, Call::Delete { .. })), 1);
        assert_eq!(*observer.removed.lock().unwrap(), vec!["job-3".to_string()]);
        assert_eq!(*observer.refreshed.lock().unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_declined_confirmation_makes_no_call() {
        let api = FakeApi::new();
        api.set_status(progress(JobStatus::Running, 10));
        let session = Session::new();
        let store = MemoryResumeStore::new();
        let observer = Recorder::default();
        let registry = JobRegistry::new(&api, &session, &store, &Decline, &observer);

        assert!(!registry.pause("job-1").await.unwrap());
        assert_eq!(api.count(|c| matches!(c, Call::Pause { .. })), 0);
        assert_eq!(*observer.refreshed.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_running_job_is_refused() {
        let api = FakeApi::new();
        api.set_status(progress(JobStatus::Running, 10));
        let session = Session::new();
        let store = MemoryResumeStore::new();
        let registry = JobRegistry::new(
            &api,
            &session,
            &store,
            &AssumeYes,
            &crate::observer::NoopRegistryObserver,
        );

        let err = registry.delete("job-1").await.unwrap_err();
        assert!(matches!(err, CliError::ActionNotAllowed { .. }));
        assert_eq!(api.count(|c| matches!(c, Call::Delete { .. })), 0);
    }

    #[tokio::test]
    async fn test_pause_and_resume_drive_local_session() {
        let api = FakeApi::new();
        let session = Session::new();
        let store = MemoryResumeStore::new();
        let observer = Recorder::default();
        let _claim = session.begin("job-1").unwrap();
        let registry = JobRegistry::new(&api, &session, &store, &AssumeYes, &observer);

        api.set_status(progress(JobStatus::Running, 10));
        assert!(registry.pause("job-1").await.unwrap());
        assert!(session.is_paused());

        api.set_status(progress(JobStatus::Paused, 10));
        let reply = registry.resume("job-1").await.unwrap();
        assert_eq!(reply.status, Some(JobStatus::Running));
        assert!(!session.is_paused());
        assert_eq!(*observer.refreshed.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_token() {
        let api = FakeApi::new();
        api.set_status(progress(JobStatus::Error, 10));
        api.set_delete_error("permission denied");
        let session = Session::new();
        let store = MemoryResumeStore::new();
        store.put("key", "job-1").unwrap();
        let observer = Recorder::default();
        let registry = JobRegistry::new(&api, &session, &store, &AssumeYes, &observer);

        assert!(registry.delete("job-1").await.is_err());
        assert_eq!(store.len(), 1);
        assert!(observer.removed.lock().unwrap().is_empty());
    }
}
