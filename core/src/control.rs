//! Cancellation tokens for running jobs.
//!
//! A batch owns one root token; every job gets a child token registered
//! before the batch starts. Canceling the root cancels every job, canceling
//! a child cancels only that job. Transfers poll their token once per chunk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::job::JobId;

const BACKOFF_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is canceled when either it or `self` is canceled.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .map(|parent| parent.load(Ordering::SeqCst))
                .unwrap_or(false)
    }

    /// Sleeps for `duration` unless canceled first. Returns `false` if canceled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_canceled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(BACKOFF_POLL.min(deadline - now));
        }
    }
}

/// Shared registry of job id -> cancel token for one batch.
#[derive(Debug, Default)]
pub struct JobControl {
    batch: CancelToken,
    jobs: RwLock<HashMap<JobId, CancelToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for `job_id`, creating it if needed.
    pub fn register(&self, job_id: JobId) -> CancelToken {
        let mut jobs = self.jobs.write().unwrap_or_else(|err| err.into_inner());
        jobs.entry(job_id)
            .or_insert_with(|| self.batch.child())
            .clone()
    }

    pub fn token(&self, job_id: &JobId) -> Option<CancelToken> {
        let jobs = self.jobs.read().unwrap_or_else(|err| err.into_inner());
        jobs.get(job_id).cloned()
    }

    /// Requests cancellation of one job. Returns `false` for an unknown id.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.token(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        self.batch.cancel();
    }

    pub fn is_batch_canceled(&self) -> bool {
        self.batch.is_canceled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn parent_cancels_children() {
        let root = CancelToken::new();
        let a = root.child();
        let b = root.child();
        a.cancel();
        assert!(a.is_canceled());
        assert!(!b.is_canceled());
        assert!(!root.is_canceled());
        root.cancel();
        assert!(b.is_canceled());
    }

    #[test]
    fn control_cancels_single_job() {
        let control = JobControl::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let first_token = control.register(first);
        let second_token = control.register(second);
        assert!(control.cancel(&first));
        assert!(first_token.is_canceled());
        assert!(!second_token.is_canceled());
        assert!(!control.cancel(&Uuid::new_v4()));
        control.cancel_all();
        assert!(second_token.is_canceled());
    }

    #[test]
    fn register_is_idempotent() {
        let control = JobControl::new();
        let id = Uuid::new_v4();
        let token = control.register(id);
        control.register(id).cancel();
        assert!(token.is_canceled());
    }

    #[test]
    fn sleep_stops_early_on_cancel() {
        let token = CancelToken::new();
        token.cancel();
        let started = Instant::now();
        assert!(!token.sleep(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(CancelToken::new().sleep(Duration::from_millis(1)));
    }
}
