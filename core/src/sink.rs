//! Observer interface the transfer path reports through.
//!
//! Callbacks run synchronously on whichever worker thread performs the job,
//! so with more than one concurrent job they may arrive concurrently.
//! Implementations guard their own shared state.

use crate::job::{JobId, JobResult, TransferProgress};

pub trait ProgressSink: Send + Sync {
    fn on_job_progress(&self, progress: &TransferProgress);
    fn on_job_status(&self, job_id: JobId, message: &str);
    fn on_batch_progress(&self, completed: usize, total: usize);
    fn on_job_result(&self, result: &JobResult);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_job_progress(&self, _progress: &TransferProgress) {}
    fn on_job_status(&self, _job_id: JobId, _message: &str) {}
    fn on_batch_progress(&self, _completed: usize, _total: usize) {}
    fn on_job_result(&self, _result: &JobResult) {}
}

/// Forwards every update to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_job_progress(&self, progress: &TransferProgress) {
        tracing::trace!(
            job = %progress.job_id,
            bytes = progress.bytes_transferred,
            expected = %progress.expected_size,
            state = %progress.state,
            "job progress"
        );
    }

    fn on_job_status(&self, job_id: JobId, message: &str) {
        tracing::info!(job = %job_id, "{}", message);
    }

    fn on_batch_progress(&self, completed: usize, total: usize) {
        tracing::info!("batch progress {}/{}", completed, total);
    }

    fn on_job_result(&self, result: &JobResult) {
        if result.is_success() {
            tracing::info!(job = %result.job_id, bytes = result.bytes_transferred, "{}", result.state);
        } else {
            tracing::warn!(job = %result.job_id, "{}", result.state);
        }
    }
}
