//! Job lifecycle logging.
//!
//! Every event is emitted inside the job span, so `job_id` and `filename`
//! come from the span rather than being repeated per event.

use std::time::{Duration, Instant};

use tracing::{error, info, warn, Span};
use vdetect_models::JobId;

use crate::error::WorkerError;

/// Logs the lifecycle of one detection job and times it from admission.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    filename: String,
    admitted_at: Instant,
}

impl JobLogger {
    /// Start the clock for a job that was just admitted.
    pub fn new(job_id: &JobId, filename: &str) -> Self {
        Self {
            job_id: job_id.clone(),
            filename: filename.to_string(),
            admitted_at: Instant::now(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Time since the job was admitted.
    pub fn elapsed(&self) -> Duration {
        self.admitted_at.elapsed()
    }

    /// Span the job task is instrumented with.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, filename = %self.filename)
    }

    /// The job got a worker slot.
    pub fn started(&self) {
        info!(waited_ms = self.elapsed().as_millis() as u64, "Job started");
    }

    pub fn truncated(&self, frames_written: u64) {
        warn!(
            frames_written,
            "Input stopped decoding early, output is truncated"
        );
    }

    pub fn succeeded(&self, frames_written: u64) {
        info!(
            frames_written,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Job succeeded"
        );
    }

    /// Interruptions are expected and logged as warnings, anything else as
    /// an error.
    pub fn failed(&self, reason: &WorkerError) {
        let elapsed_ms = self.elapsed().as_millis() as u64;
        if is_interruption(reason) {
            warn!(elapsed_ms, reason = %reason, "Job stopped");
        } else {
            error!(elapsed_ms, error = %reason, "Job failed");
        }
    }

    /// The job table refused a status update.
    pub fn status_not_recorded(&self, status: &str, err: &WorkerError) {
        error!(status, error = %err, "Failed to record job status");
    }
}

fn is_interruption(reason: &WorkerError) -> bool {
    matches!(
        reason,
        WorkerError::Cancelled | WorkerError::ShuttingDown | WorkerError::Timeout(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_times_from_admission() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "clip.mp4");

        assert_eq!(logger.job_id(), &job_id);
        std::thread::sleep(Duration::from_millis(5));
        assert!(logger.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_interruptions_are_not_errors() {
        assert!(is_interruption(&WorkerError::Cancelled));
        assert!(is_interruption(&WorkerError::ShuttingDown));
        assert!(is_interruption(&WorkerError::Timeout(Duration::from_secs(1))));
        assert!(!is_interruption(&WorkerError::job_failed("decoder crashed")));
    }
}
