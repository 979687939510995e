//! Job executor.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use vdetect_media::MediaResult;
use vdetect_models::{JobId, JobRecord};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::{ProcessingSummary, VideoProcessor};
use crate::table::JobTable;
use crate::workspace::{validate_filename, ScratchFile, Workspace};

/// An admitted job and the resources it owns until it finishes.
struct QueuedJob {
    job_id: JobId,
    filename: String,
    scratch: ScratchFile,
    cancel: CancellationToken,
}

/// Runs detection jobs in the background with bounded concurrency.
///
/// At most `max_concurrent_jobs` jobs process frames at once and at most
/// `queue_capacity` more wait for a slot; further submissions are refused
/// with [`WorkerError::QueueFull`].
pub struct JobExecutor {
    config: WorkerConfig,
    table: Arc<JobTable>,
    workspace: Arc<Workspace>,
    processor: Arc<dyn VideoProcessor>,
    /// Jobs in the system, running or waiting
    admission: Arc<Semaphore>,
    /// Jobs processing frames
    job_semaphore: Arc<Semaphore>,
    tokens: RwLock<HashMap<JobId, CancellationToken>>,
    /// Stops admission and fails waiting jobs
    closing: CancellationToken,
    /// Parent of every job token; fired when the shutdown timeout expires
    abort: CancellationToken,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        config: WorkerConfig,
        workspace: Arc<Workspace>,
        processor: Arc<dyn VideoProcessor>,
    ) -> Arc<Self> {
        info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            queue_capacity = config.queue_capacity,
            "Starting job executor"
        );

        Arc::new(Self {
            admission: Arc::new(Semaphore::new(config.admission_limit())),
            job_semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            table: Arc::new(JobTable::with_retention(config.job_retention)),
            config,
            workspace,
            processor,
            tokens: RwLock::new(HashMap::new()),
            closing: CancellationToken::new(),
            abort: CancellationToken::new(),
        })
    }

    pub fn table(&self) -> &Arc<JobTable> {
        &self.table
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Jobs currently admitted, running or waiting.
    pub fn active_jobs(&self) -> usize {
        self.config.admission_limit() - self.admission.available_permits()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Admit an uploaded file for processing.
    ///
    /// Returns the queued record immediately; the job runs in the background
    /// and owns `scratch` until it finishes.
    pub async fn submit(
        self: &Arc<Self>,
        filename: impl Into<String>,
        scratch: ScratchFile,
    ) -> WorkerResult<JobRecord> {
        let filename = filename.into();
        validate_filename(&filename)?;

        if self.closing.is_cancelled() {
            metrics::record_job_rejected("shutting_down");
            return Err(WorkerError::ShuttingDown);
        }

        let admission = match Arc::clone(&self.admission).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                metrics::record_job_rejected("queue_full");
                warn!(filename = %filename, "Job queue full, rejecting upload");
                return Err(WorkerError::QueueFull);
            }
        };

        let record = JobRecord::new(JobId::new(), filename.clone());
        let cancel = self.abort.child_token();
        self.tokens
            .write()
            .await
            .insert(record.job_id.clone(), cancel.clone());
        self.table.insert(record.clone()).await;
        metrics::record_job_enqueued();

        let job = QueuedJob {
            job_id: record.job_id.clone(),
            filename,
            scratch,
            cancel,
        };
        let logger = JobLogger::new(&job.job_id, &job.filename);
        let span = logger.span();
        let executor = Arc::clone(self);

        tokio::spawn(
            async move {
                let _admission = admission;
                executor.execute_job(job, logger).await;
            }
            .instrument(span),
        );

        Ok(record)
    }

    /// Request cancellation of a queued or running job.
    ///
    /// The job observes the request and records its own `Failed` state.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<JobRecord> {
        let record = self
            .table
            .get(job_id)
            .await
            .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()))?;

        if record.is_terminal() {
            return Err(WorkerError::JobAlreadyFinished(job_id.to_string()));
        }

        if let Some(token) = self.tokens.read().await.get(job_id) {
            info!(job_id = %job_id, "Cancelling job");
            token.cancel();
        }

        Ok(record)
    }

    /// Stop accepting jobs and wait for running ones.
    ///
    /// Jobs still running after the shutdown timeout are cancelled.
    pub async fn shutdown(&self) {
        info!("Shutting down job executor");
        self.closing.cancel();

        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                active_jobs = self.active_jobs(),
                "Shutdown timeout reached, cancelling remaining jobs"
            );
            self.abort.cancel();
            self.wait_for_jobs().await;
        }

        info!("Job executor stopped");
    }

    /// Wait for all admitted jobs to finish.
    async fn wait_for_jobs(&self) {
        loop {
            if self.admission.available_permits() == self.config.admission_limit() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn execute_job(&self, job: QueuedJob, logger: JobLogger) {
        let permit = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => None,
            _ = self.closing.cancelled() => None,
            permit = Arc::clone(&self.job_semaphore).acquire_owned() => permit.ok(),
        };

        // A slot may be granted in the same instant as cancellation.
        let permit = permit.filter(|_| !job.cancel.is_cancelled() && !self.closing.is_cancelled());
        let Some(_permit) = permit else {
            let reason = self.interruption_reason();
            self.fail_job(&job, &logger, reason).await;
            self.release(job).await;
            return;
        };

        if let Err(e) = self.table.mark_running(&job.job_id).await {
            logger.status_not_recorded("running", &e);
            self.release(job).await;
            return;
        }
        let _running = metrics::record_job_started();
        logger.started();

        let staging = self.workspace.staging_path(&job.job_id);
        let outcome = match self.process(&job, &staging).await {
            Ok(summary) => self
                .workspace
                .publish(&staging, &job.filename)
                .await
                .map(|_| summary),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(summary) => {
                if summary.truncated {
                    logger.truncated(summary.frames_written);
                }
                match self
                    .table
                    .mark_succeeded(&job.job_id, summary.frames_written)
                    .await
                {
                    Ok(_) => {
                        metrics::record_job_succeeded(
                            summary.frames_written,
                            logger.elapsed().as_secs_f64(),
                        );
                        logger.succeeded(summary.frames_written);
                    }
                    Err(e) => logger.status_not_recorded("succeeded", &e),
                }
            }
            Err(e) => {
                self.workspace.discard(&staging).await;
                self.fail_job(&job, &logger, e).await;
            }
        }

        self.release(job).await;
    }

    /// Run the processor on the blocking pool under the job timeout.
    async fn process(&self, job: &QueuedJob, staging: &Path) -> WorkerResult<ProcessingSummary> {
        let processor = Arc::clone(&self.processor);
        let input = job.scratch.path().to_path_buf();
        let output = staging.to_path_buf();
        let cancel = job.cancel.clone();

        let mut handle =
            tokio::task::spawn_blocking(move || processor.process(&input, &output, &cancel));

        match tokio::time::timeout(self.config.job_timeout, &mut handle).await {
            Ok(Ok(result)) => self.map_processing_result(result),
            Ok(Err(join_error)) => Err(WorkerError::job_failed(format!(
                "processing task failed: {}",
                join_error
            ))),
            Err(_) => {
                job.cancel.cancel();
                // Let the frame loop observe the token and release its files.
                let _ = handle.await;
                Err(WorkerError::Timeout(self.config.job_timeout))
            }
        }
    }

    fn map_processing_result(
        &self,
        result: MediaResult<ProcessingSummary>,
    ) -> WorkerResult<ProcessingSummary> {
        match result {
            Ok(summary) => Ok(summary),
            Err(e) if e.is_cancelled() => Err(self.interruption_reason()),
            Err(e) => Err(e.into()),
        }
    }

    fn interruption_reason(&self) -> WorkerError {
        if self.closing.is_cancelled() {
            WorkerError::ShuttingDown
        } else {
            WorkerError::Cancelled
        }
    }

    async fn fail_job(&self, job: &QueuedJob, logger: &JobLogger, reason: WorkerError) {
        logger.failed(&reason);
        metrics::record_job_failed(logger.elapsed().as_secs_f64());

        if let Err(e) = self.table.mark_failed(&job.job_id, reason.to_string()).await {
            logger.status_not_recorded("failed", &e);
        }
    }

    /// Drop the job's token and scratch file.
    async fn release(&self, job: QueuedJob) {
        self.tokens.write().await.remove(&job.job_id);
        drop(job.scratch);
    }
}
