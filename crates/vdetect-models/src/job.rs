//! Detection job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{JobStatus, ModelError, ModelResult};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a single upload's processing job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier
    pub job_id: JobId,
    /// Original upload filename, also the output artifact name
    pub filename: String,
    /// Current status
    pub status: JobStatus,
    /// When the upload was accepted
    pub created_at: DateTime<Utc>,
    /// When a worker picked the job up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of annotated frames written (set on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_written: Option<u64>,
    /// Error message (set on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    /// Create a new queued job record.
    pub fn new(job_id: JobId, filename: impl Into<String>) -> Self {
        Self {
            job_id,
            filename: filename.into(),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            frames_written: None,
            error: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the job as running.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as succeeded with the number of frames written.
    pub fn succeed(&mut self, frames_written: u64) -> ModelResult<()> {
        self.transition(JobStatus::Succeeded)?;
        self.frames_written = Some(frames_written);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_eq!(JobId::from_string("abc").to_string(), "abc");
    }

    #[test]
    fn test_job_record_success_path() {
        let mut record = JobRecord::new(JobId::new(), "clip.mp4");
        assert_eq!(record.status, JobStatus::Queued);
        assert!(!record.is_terminal());

        record.start().unwrap();
        assert_eq!(record.status, JobStatus::Running);
        assert!(record.started_at.is_some());

        record.succeed(10).unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.frames_written, Some(10));
        assert!(record.finished_at.is_some());
        assert!(record.is_terminal());
    }

    #[test]
    fn test_job_record_fail_from_queued() {
        let mut record = JobRecord::new(JobId::new(), "clip.mp4");
        record.fail("Job cancelled").unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("Job cancelled"));
        assert!(record.started_at.is_none());
    }

    #[test]
    fn test_job_record_rejects_illegal_transition() {
        let mut record = JobRecord::new(JobId::new(), "clip.mp4");
        let err = record.succeed(3).unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Succeeded,
            }
        );
        assert_eq!(record.status, JobStatus::Queued);
        assert!(record.frames_written.is_none());

        record.start().unwrap();
        record.fail("boom").unwrap();
        assert!(record.start().is_err());
        assert!(record.fail("again").is_err());
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_job_record_serialization_skips_empty_fields() {
        let record = JobRecord::new(JobId::from_string("job-1"), "a b.mp4");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["filename"], "a b.mp4");
        assert_eq!(json["status"], "queued");
        assert!(json.get("error").is_none());
        assert!(json.get("frames_written").is_none());
    }
}
