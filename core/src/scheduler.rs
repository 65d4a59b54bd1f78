use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::control::{CancelToken, JobControl};
use crate::error::{CoreError, CoreResult};
use crate::job::{DownloadJob, JobResult, JobState, TransferProgress, TransferState};
use crate::net::{HttpTransport, ReqwestTransport};
use crate::queue::JobQueue;
use crate::resolver::{MetadataProvider, Resolver};
use crate::sink::ProgressSink;
use crate::storage::{final_destination, DestinationLedger};
use crate::transfer::TransferEngine;

/// One batch invocation: the jobs, how many may run at once, and their results.
pub struct BatchRun {
    jobs: Vec<DownloadJob>,
    concurrency_limit: usize,
    control: Arc<JobControl>,
    results: Vec<Option<JobResult>>,
}

impl BatchRun {
    pub fn new(jobs: Vec<DownloadJob>, concurrency_limit: usize) -> CoreResult<Self> {
        if concurrency_limit == 0 {
            return Err(CoreError::InvalidJobList(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for job in &jobs {
            if !seen.insert(job.id) {
                return Err(CoreError::InvalidJobList(format!("duplicate job id {}", job.id)));
            }
        }

        let control = Arc::new(JobControl::new());
        for job in &jobs {
            control.register(job.id);
        }
        let results = vec![None; jobs.len()];
        Ok(Self {
            jobs,
            concurrency_limit,
            control,
            results,
        })
    }

    pub fn jobs(&self) -> &[DownloadJob] {
        &self.jobs
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Handle for canceling the whole batch or single jobs, usable from any thread.
    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.control)
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(Option::is_some)
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.jobs.len(),
            ..BatchSummary::default()
        };
        for result in self.results.iter().flatten() {
            match result.state {
                JobState::Succeeded => summary.succeeded += 1,
                JobState::Failed(_) => summary.failed += 1,
                JobState::Canceled => summary.canceled += 1,
            }
        }
        summary
    }

    /// Results in submission order. A job that never ran reports `Canceled`.
    pub fn into_results(self) -> Vec<JobResult> {
        self.jobs
            .iter()
            .zip(self.results)
            .map(|(job, result)| result.unwrap_or_else(|| JobResult::canceled(job.id, 0)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub canceled: usize,
}

pub struct Scheduler {
    config: EngineConfig,
    resolver: Resolver,
    transfer: TransferEngine,
}

impl Scheduler {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn HttpTransport>,
        provider: Arc<dyn MetadataProvider>,
    ) -> Self {
        let resolver = Resolver::new(
            Arc::clone(&transport),
            provider,
            config.structured_hosts.clone(),
        );
        let transfer = TransferEngine::new(transport, config.chunk_size_bytes);
        Self {
            config,
            resolver,
            transfer,
        }
    }

    pub fn with_reqwest(
        config: EngineConfig,
        provider: Arc<dyn MetadataProvider>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport), provider))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `jobs` and returns one result per job in input order. Fails only
    /// when the job list itself is invalid, before any job starts.
    pub fn run_batch(
        &self,
        jobs: Vec<DownloadJob>,
        concurrency_limit: usize,
        sink: &dyn ProgressSink,
    ) -> CoreResult<Vec<JobResult>> {
        let mut batch = BatchRun::new(jobs, concurrency_limit)?;
        self.run(&mut batch, sink);
        Ok(batch.into_results())
    }

    pub fn run(&self, batch: &mut BatchRun, sink: &dyn ProgressSink) {
        let total = batch.jobs.len();
        tracing::info!(
            "starting batch of {} jobs, concurrency {}",
            total,
            batch.concurrency_limit
        );
        if total == 0 {
            sink.on_batch_progress(0, 0);
            return;
        }

        let queue = JobQueue::new(total);
        let ledger = DestinationLedger::new();
        let completed = AtomicUsize::new(0);
        let slots = Mutex::new(vec![None; total]);
        let workers = batch.concurrency_limit.min(total);

        let jobs = &batch.jobs;
        let control = &batch.control;
        let (queue, ledger, completed, slots) = (&queue, &ledger, &completed, &slots);
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(move || {
                    while let Some(item) = queue.pop() {
                        let job = &jobs[item.index];
                        let cancel = control.register(job.id);
                        let result = self.execute(job, sink, &cancel, Some(ledger));
                        slots.lock().unwrap_or_else(|err| err.into_inner())[item.index] =
                            Some(result.clone());
                        report(job, &result, sink);
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        sink.on_batch_progress(done, total);
                    }
                });
            }
        });

        batch.results = std::mem::take(&mut *slots.lock().unwrap_or_else(|err| err.into_inner()));
        let summary = batch.summary();
        tracing::info!(
            "batch complete: {} succeeded, {} failed, {} canceled",
            summary.succeeded,
            summary.failed,
            summary.canceled
        );
    }

    /// Runs a single job outside any batch.
    pub fn run_job(
        &self,
        job: &DownloadJob,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> JobResult {
        let result = self.execute(job, sink, cancel, None);
        report(job, &result, sink);
        result
    }

    fn execute(
        &self,
        job: &DownloadJob,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
        ledger: Option<&DestinationLedger>,
    ) -> JobResult {
        let backoff = Duration::from_millis(self.config.retry_backoff_millis);
        let mut claimed: Option<PathBuf> = None;
        let mut attempt = 0u32;
        loop {
            let result = self.attempt(job, sink, cancel, ledger, &mut claimed);
            let retryable = result
                .failure()
                .map(|reason| reason.is_transient())
                .unwrap_or(false);
            if !retryable || attempt >= self.config.retry_count {
                return result;
            }
            attempt += 1;
            sink.on_job_status(
                job.id,
                &format!(
                    "Retrying ({}/{}) after: {}",
                    attempt, self.config.retry_count, result.state
                ),
            );
            if !cancel.sleep(backoff) {
                return JobResult::canceled(job.id, 0);
            }
        }
    }

    fn attempt(
        &self,
        job: &DownloadJob,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
        ledger: Option<&DestinationLedger>,
        claimed: &mut Option<PathBuf>,
    ) -> JobResult {
        if cancel.is_canceled() {
            return JobResult::canceled(job.id, 0);
        }

        let mut progress = TransferProgress::new(job.id);
        progress.state = TransferState::Resolving;
        sink.on_job_progress(&progress);
        sink.on_job_status(job.id, &format!("Resolving {}", job.source_url));

        let target = match self.resolver.resolve(job) {
            Ok(target) => target,
            Err(err) => {
                tracing::warn!("{}: {}", job.source_url, err);
                return JobResult::failed(job.id, err, 0);
            }
        };

        let destination = claimed
            .get_or_insert_with(|| {
                let path = final_destination(&job.destination, &target.suggested_filename);
                match ledger {
                    Some(ledger) => ledger.claim(&path),
                    None => path,
                }
            })
            .clone();

        progress.expected_size = target.expected_size;
        progress.state = TransferState::Transferring;
        sink.on_job_status(job.id, &format!("Downloading: {}", target.media_title));
        tracing::info!(
            "job {} -> {} ({} bytes expected)",
            job.id,
            destination.display(),
            target.expected_size
        );

        let result = self.transfer.transfer(
            job.id,
            &target,
            &destination,
            job.expected_sha256.as_deref(),
            cancel,
            |bytes| {
                progress.bytes_transferred = bytes;
                sink.on_job_progress(&progress);
            },
        );

        progress.state = TransferState::Finished;
        sink.on_job_progress(&progress);
        result
    }
}

fn report(job: &DownloadJob, result: &JobResult, sink: &dyn ProgressSink) {
    let message = match &result.state {
        JobState::Succeeded => "Download complete".to_string(),
        JobState::Failed(reason) => format!("Download failed: {}", reason),
        JobState::Canceled => "Download canceled".to_string(),
    };
    sink.on_job_status(job.id, &message);
    sink.on_job_result(result);
}
