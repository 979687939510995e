//! In-memory job table.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;
use tracing::debug;
use vdetect_models::{JobId, JobRecord};

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Default)]
struct TableInner {
    jobs: HashMap<JobId, JobRecord>,
    /// Most recently submitted job per upload filename
    latest: HashMap<String, JobId>,
    /// Finished jobs, oldest first
    finished: VecDeque<JobId>,
}

impl TableInner {
    /// Drop the oldest finished records beyond `retention`.
    fn evict_finished(&mut self, retention: usize) {
        while self.finished.len() > retention {
            let Some(id) = self.finished.pop_front() else {
                break;
            };
            if let Some(record) = self.jobs.remove(&id) {
                if self.latest.get(&record.filename) == Some(&id) {
                    self.latest.remove(&record.filename);
                }
                debug!(job_id = %id, filename = %record.filename, "Evicted finished job record");
            }
        }
    }
}

/// Status records for accepted jobs.
///
/// Queued and running jobs are always kept. Only the most recent
/// `retention` finished jobs are kept; older ones are evicted as new jobs
/// finish. Records are only moved forward by the owning job through the
/// `mark_*` methods; transitions are validated by [`JobRecord`].
#[derive(Debug)]
pub struct JobTable {
    inner: RwLock<TableInner>,
    retention: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    /// Finished records kept by [`JobTable::new`].
    pub const DEFAULT_RETENTION: usize = 1000;

    pub fn new() -> Self {
        Self::with_retention(Self::DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: RwLock::new(TableInner::default()),
            retention,
        }
    }

    /// Register a newly accepted job. It becomes the latest job for its
    /// filename.
    pub async fn insert(&self, record: JobRecord) {
        let mut inner = self.inner.write().await;
        inner
            .latest
            .insert(record.filename.clone(), record.job_id.clone());
        inner.jobs.insert(record.job_id.clone(), record);
    }

    pub async fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.inner.read().await.jobs.get(job_id).cloned()
    }

    /// Record of the most recently submitted job for `filename`.
    pub async fn latest_for_filename(&self, filename: &str) -> Option<JobRecord> {
        let inner = self.inner.read().await;
        inner
            .latest
            .get(filename)
            .and_then(|id| inner.jobs.get(id))
            .cloned()
    }

    /// All records, newest first.
    pub async fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> =
            self.inner.read().await.jobs.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn mark_running(&self, job_id: &JobId) -> WorkerResult<JobRecord> {
        self.update(job_id, |record| record.start()).await
    }

    pub async fn mark_succeeded(
        &self,
        job_id: &JobId,
        frames_written: u64,
    ) -> WorkerResult<JobRecord> {
        self.update(job_id, |record| record.succeed(frames_written))
            .await
    }

    pub async fn mark_failed(
        &self,
        job_id: &JobId,
        error: impl Into<String>,
    ) -> WorkerResult<JobRecord> {
        let error = error.into();
        self.update(job_id, move |record| record.fail(error)).await
    }

    async fn update<F>(&self, job_id: &JobId, apply: F) -> WorkerResult<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> vdetect_models::ModelResult<()>,
    {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()))?;
        apply(record)?;
        let updated = record.clone();

        if updated.status.is_terminal() {
            inner.finished.push_back(job_id.clone());
            inner.evict_finished(self.retention);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use vdetect_models::JobStatus;

    #[tokio::test]
    async fn test_insert_and_get() {
        let table = JobTable::new();
        let record = JobRecord::new(JobId::new(), "clip.mp4");
        let id = record.job_id.clone();

        table.insert(record).await;

        let fetched = table.get(&id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.filename, "clip.mp4");
        assert!(table.get(&JobId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let table = JobTable::new();
        let record = JobRecord::new(JobId::new(), "clip.mp4");
        let id = record.job_id.clone();
        table.insert(record).await;

        let running = assert_ok!(table.mark_running(&id).await);
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.started_at.is_some());

        let done = table.mark_succeeded(&id, 10).await.unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.frames_written, Some(10));

        // Terminal records cannot move again
        let err = assert_err!(table.mark_failed(&id, "late").await);
        assert!(matches!(err, WorkerError::Model(_)));
        assert_eq!(table.get(&id).await.unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_queued_job_can_fail_directly() {
        let table = JobTable::new();
        let record = JobRecord::new(JobId::new(), "clip.mp4");
        let id = record.job_id.clone();
        table.insert(record).await;

        let failed = table.mark_failed(&id, "Job cancelled").await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Job cancelled"));
        assert!(failed.started_at.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_update() {
        let table = JobTable::new();
        let err = table.mark_running(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_latest_for_filename_tracks_newest_submission() {
        let table = JobTable::new();
        let first = JobRecord::new(JobId::new(), "clip.mp4");
        let second = JobRecord::new(JobId::new(), "clip.mp4");
        let second_id = second.job_id.clone();

        table.insert(first).await;
        table.insert(second).await;

        let latest = table.latest_for_filename("clip.mp4").await.unwrap();
        assert_eq!(latest.job_id, second_id);
        assert!(table.latest_for_filename("other.mp4").await.is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let table = JobTable::new();
        let mut older = JobRecord::new(JobId::new(), "a.mp4");
        older.created_at -= chrono::Duration::seconds(5);
        let newer = JobRecord::new(JobId::new(), "b.mp4");

        table.insert(older).await;
        table.insert(newer).await;

        let names: Vec<String> = table.list().await.into_iter().map(|r| r.filename).collect();
        assert_eq!(names, vec!["b.mp4", "a.mp4"]);
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn test_finished_records_are_evicted_beyond_retention() {
        let table = JobTable::with_retention(2);
        let mut ids = Vec::new();
        for name in ["a.mp4", "b.mp4", "c.mp4"] {
            let record = JobRecord::new(JobId::new(), name);
            ids.push(record.job_id.clone());
            table.insert(record).await;
        }
        let pending = JobRecord::new(JobId::new(), "pending.mp4");
        let pending_id = pending.job_id.clone();
        table.insert(pending).await;

        for id in &ids {
            table.mark_running(id).await.unwrap();
            table.mark_succeeded(id, 1).await.unwrap();
        }

        // Oldest finished job is gone along with its filename entry
        assert!(table.get(&ids[0]).await.is_none());
        assert!(table.latest_for_filename("a.mp4").await.is_none());
        assert!(table.get(&ids[1]).await.is_some());
        assert!(table.get(&ids[2]).await.is_some());
        // Unfinished jobs are never evicted
        assert!(table.get(&pending_id).await.is_some());
        assert_eq!(table.len().await, 3);
    }

    #[tokio::test]
    async fn test_eviction_keeps_newer_job_for_same_filename() {
        let table = JobTable::with_retention(1);
        let first = JobRecord::new(JobId::new(), "clip.mp4");
        let first_id = first.job_id.clone();
        let second = JobRecord::new(JobId::new(), "clip.mp4");
        let second_id = second.job_id.clone();
        table.insert(first).await;
        table.insert(second).await;

        table.mark_failed(&first_id, "Job cancelled").await.unwrap();
        table.mark_running(&second_id).await.unwrap();
        table.mark_succeeded(&second_id, 4).await.unwrap();

        assert!(table.get(&first_id).await.is_none());
        let latest = table.latest_for_filename("clip.mp4").await.unwrap();
        assert_eq!(latest.job_id, second_id);
    }
}
