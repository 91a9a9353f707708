//! Client session state
//!
//! A [`Session`] owns everything the upload and import loops share with the
//! outside world: which job is active, the pause switch, the connectivity
//! switch and the cancellation token. One session is one client context; at
//! most one job transfers or imports through it at a time.
//!
//! Controls (`pause`, `resume`, `cancel`, `set_online`) take `&self` and may be
//! called from any task holding a reference, e.g. a Ctrl-C handler.

use crate::error::{CliError, Result};
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Session {
    active: Mutex<Option<String>>,
    paused: watch::Sender<bool>,
    online: watch::Sender<bool>,
    cancel: Mutex<CancellationToken>,
}

impl Session {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (online, _) = watch::channel(true);
        Self {
            active: Mutex::new(None),
            paused,
            online,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    // ========================================================================
    // Single-flight guard
    // ========================================================================

    /// Job currently transferring or importing, if any
    pub fn active_job(&self) -> Option<String> {
        self.active.lock().ok().and_then(|active| active.clone())
    }

    pub fn is_busy(&self) -> bool {
        self.active_job().is_some()
    }

    /// Fail with [`CliError::AnotherImportRunning`] unless the session is idle
    /// or already working on `job_id`
    pub fn ensure_available(&self, job_id: Option<&str>) -> Result<()> {
        match (self.active_job(), job_id) {
            (None, _) => Ok(()),
            (Some(active), Some(job_id)) if active == job_id => Ok(()),
            (Some(active), _) => Err(CliError::AnotherImportRunning(active)),
        }
    }

    /// Mark `job_id` active for the lifetime of the returned guard
    ///
    /// Re-entering with the job that is already active succeeds and yields a
    /// guard that leaves the outer claim in place when dropped. A claim keeps
    /// whatever cancellation arrived before it; the token is re-armed only when
    /// the owning guard is released.
    pub fn begin(&self, job_id: &str) -> Result<ActiveJob<'_>> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| CliError::config("session lock poisoned"))?;

        match active.as_deref() {
            Some(current) if current == job_id => Ok(ActiveJob {
                session: self,
                job_id: job_id.to_string(),
                owns: false,
            }),
            Some(current) => Err(CliError::AnotherImportRunning(current.to_string())),
            None => {
                *active = Some(job_id.to_string());
                debug!(job_id = %job_id, "Session claimed");
                Ok(ActiveJob {
                    session: self,
                    job_id: job_id.to_string(),
                    owns: true,
                })
            },
        }
    }

    fn release(&self, job_id: &str) {
        if let Ok(mut active) = self.active.lock() {
            if active.as_deref() == Some(job_id) {
                *active = None;
                self.paused.send_replace(false);
                if let Ok(mut token) = self.cancel.lock() {
                    if token.is_cancelled() {
                        *token = CancellationToken::new();
                    }
                }
                debug!(job_id = %job_id, "Session released");
            }
        }
    }

    // ========================================================================
    // Pause / resume
    // ========================================================================

    /// Stop before the next chunk boundary
    pub fn pause(&self) {
        info!("Pause requested");
        self.paused.send_replace(true);
    }

    /// Release a paused loop
    pub fn resume(&self) {
        info!("Resume requested");
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Flip the pause switch; returns whether the session is now paused
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.is_paused();
        if paused {
            self.pause();
        } else {
            self.resume();
        }
        paused
    }

    /// Park until [`Session::resume`] is called or `cancel` fires
    ///
    /// Single-waiter: only the loop that owns the active job waits here. The
    /// wait ends on an explicit resume and on nothing else, however long that
    /// takes.
    pub async fn wait_resumed(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.paused.subscribe();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CliError::Cancelled),
            changed = rx.wait_for(|paused| !*paused) => {
                changed.map(|_| ()).map_err(|_| CliError::Cancelled)
            }
        }
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    /// Report a change in network reachability
    pub fn set_online(&self, online: bool) {
        info!(online, "Connectivity changed");
        self.online.send_replace(online);
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Watch connectivity changes
    pub fn subscribe_online(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Park until the session is online again or `cancel` fires
    pub async fn wait_online(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.online.subscribe();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CliError::Cancelled),
            changed = rx.wait_for(|online| *online) => {
                changed.map(|_| ()).map_err(|_| CliError::Cancelled)
            }
        }
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Abort the active job: the in-flight request is dropped and no retry
    /// follows
    pub fn cancel(&self) {
        info!(job_id = ?self.active_job(), "Cancel requested");
        if let Ok(token) = self.cancel.lock() {
            token.cancel();
        }
    }

    /// Token observed by the running loops
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .map(|token| token.clone())
            .unwrap_or_else(|_| {
                let token = CancellationToken::new();
                token.cancel();
                token
            })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Claim on the session's single-flight slot
pub struct ActiveJob<'a> {
    session: &'a Session,
    job_id: String,
    owns: bool,
}

impl ActiveJob<'_> {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        if self.owns {
            self.session.release(&self.job_id);
        }
    }
}

/// Race `fut` against `cancel`; the future is dropped as soon as the token fires
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CliError::Cancelled),
        result = fut => result,
    }
}

/// Sleep unless cancelled first
pub async fn cancellable_sleep(cancel: &CancellationToken, duration: std::time::Duration) -> Result<()> {
    cancellable(cancel, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_single_flight_guard() {
        let session = Session::new();
        let guard = session.begin("job-1").unwrap();
        assert_eq!(guard.job_id(), "job-1");
        assert_eq!(session.active_job().as_deref(), Some("job-1"));

        let err = session.begin("job-2").err().unwrap();
        assert!(matches!(err, CliError::AnotherImportRunning(ref id) if id == "job-1"));
        assert!(session.ensure_available(None).is_err());
        assert!(session.ensure_available(Some("job-1")).is_ok());

        drop(guard);
        assert!(!session.is_busy());
        assert!(session.begin("job-2").is_ok());
    }

    #[test]
    fn test_reentrant_claim_keeps_outer_claim() {
        let session = Session::new();
        let outer = session.begin("job-1").unwrap();
        {
            let _inner = session.begin("job-1").unwrap();
        }
        assert_eq!(session.active_job().as_deref(), Some("job-1"));
        drop(outer);
        assert_eq!(session.active_job(), None);
    }

    #[test]
    fn test_release_rearms_cancellation() {
        let session = Session::new();
        {
            let _guard = session.begin("job-1").unwrap();
            session.cancel();
            session.pause();
            assert!(session.cancel_token().is_cancelled());
        }
        assert!(!session.cancel_token().is_cancelled());
        assert!(!session.is_paused());

        let _guard = session.begin("job-2").unwrap();
        assert!(!session.cancel_token().is_cancelled());
    }

    #[test]
    fn test_cancel_before_claim_survives_claim() {
        let session = Session::new();
        session.cancel();

        let guard = session.begin("job-1").unwrap();
        assert!(session.cancel_token().is_cancelled());
        {
            let _inner = session.begin("job-1").unwrap();
        }
        assert!(session.cancel_token().is_cancelled());

        drop(guard);
        assert!(!session.cancel_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_resumed_blocks_until_resume() {
        let session = std::sync::Arc::new(Session::new());
        session.pause();
        let token = session.cancel_token();

        let waiter = {
            let session = session.clone();
            let token = token.clone();
            tokio::spawn(async move { session.wait_resumed(&token).await })
        };

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!waiter.is_finished());

        session.resume();
        waiter.await.unwrap().unwrap();
    }

    #[test]
    fn test_toggle_pause() {
        let session = Session::new();
        assert!(session.toggle_pause());
        assert!(session.is_paused());
        assert!(!session.toggle_pause());
        assert!(!session.is_paused());
    }

    #[tokio::test]
    async fn test_wait_online_cancelled() {
        let session = Session::new();
        session.set_online(false);
        let token = session.cancel_token();
        session.cancel();
        assert!(matches!(
            session.wait_online(&token).await,
            Err(CliError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_cancellable_drops_future() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<()> = cancellable(&token, std::future::pending()).await;
        assert!(matches!(result, Err(CliError::Cancelled)));
    }
}
