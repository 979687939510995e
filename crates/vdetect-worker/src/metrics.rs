//! Job metrics.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_ENQUEUED_TOTAL: &str = "vdetect_jobs_enqueued_total";
    pub const JOBS_REJECTED_TOTAL: &str = "vdetect_jobs_rejected_total";
    pub const JOBS_SUCCEEDED_TOTAL: &str = "vdetect_jobs_succeeded_total";
    pub const JOBS_FAILED_TOTAL: &str = "vdetect_jobs_failed_total";
    pub const JOBS_RUNNING: &str = "vdetect_jobs_running";
    pub const JOB_DURATION_SECONDS: &str = "vdetect_job_duration_seconds";
    pub const FRAMES_PROCESSED_TOTAL: &str = "vdetect_frames_processed_total";
}

pub fn record_job_enqueued() {
    counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
}

pub fn record_job_rejected(reason: &'static str) {
    counter!(names::JOBS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Counts a job in the running gauge until dropped.
#[must_use = "the job stops counting as running when the guard is dropped"]
#[derive(Debug)]
pub struct RunningJob(());

impl Drop for RunningJob {
    fn drop(&mut self) {
        gauge!(names::JOBS_RUNNING).decrement(1.0);
    }
}

pub fn record_job_started() -> RunningJob {
    gauge!(names::JOBS_RUNNING).increment(1.0);
    RunningJob(())
}

pub fn record_job_succeeded(frames: u64, duration_secs: f64) {
    counter!(names::JOBS_SUCCEEDED_TOTAL).increment(1);
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(frames);
    histogram!(names::JOB_DURATION_SECONDS, "status" => "succeeded").record(duration_secs);
}

pub fn record_job_failed(duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "status" => "failed").record(duration_secs);
}
