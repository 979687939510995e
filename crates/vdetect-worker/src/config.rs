//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vdetect_media::ObjectDetectorConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory where annotated videos are published
    pub output_dir: PathBuf,
    /// Directory for uploaded scratch files
    pub scratch_dir: PathBuf,
    /// Maximum jobs processing frames at the same time
    pub max_concurrent_jobs: usize,
    /// Maximum jobs waiting for a worker slot before uploads are rejected
    pub queue_capacity: usize,
    /// Finished job records kept for status lookups
    pub job_retention: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Path to the YOLOv8 ONNX model
    pub model_path: String,
    /// Minimum detection confidence
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let detector = ObjectDetectorConfig::default();
        Self {
            output_dir: PathBuf::from("processed_videos"),
            scratch_dir: std::env::temp_dir(),
            max_concurrent_jobs: 2,
            queue_capacity: 32,
            job_retention: 1000,
            job_timeout: Duration::from_secs(3600), // 1 hour
            shutdown_timeout: Duration::from_secs(30),
            model_path: detector.model_path,
            confidence_threshold: detector.confidence_threshold,
            nms_threshold: detector.nms_threshold,
        }
    }
}

/// Parse `key` from the environment, ignoring unset or malformed values.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

impl WorkerConfig {
    /// Create config from environment variables, falling back to
    /// [`WorkerConfig::default`] per field.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            output_dir: env_parse("OUTPUT_DIR").unwrap_or(d.output_dir),
            scratch_dir: env_parse("SCRATCH_DIR").unwrap_or(d.scratch_dir),
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(d.max_concurrent_jobs),
            queue_capacity: env_parse("WORKER_QUEUE_CAPACITY").unwrap_or(d.queue_capacity),
            job_retention: env_parse("WORKER_JOB_RETENTION").unwrap_or(d.job_retention),
            job_timeout: env_secs("WORKER_JOB_TIMEOUT").unwrap_or(d.job_timeout),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(d.shutdown_timeout),
            model_path: env_parse("MODEL_PATH").unwrap_or(d.model_path),
            confidence_threshold: env_parse("DETECTION_CONFIDENCE")
                .filter(|c: &f32| (0.0..=1.0).contains(c))
                .unwrap_or(d.confidence_threshold),
            nms_threshold: env_parse("DETECTION_NMS")
                .filter(|t: &f32| (0.0..=1.0).contains(t))
                .unwrap_or(d.nms_threshold),
        }
    }

    /// Detector settings derived from this config.
    pub fn detector_config(&self) -> ObjectDetectorConfig {
        ObjectDetectorConfig {
            model_path: self.model_path.clone(),
            confidence_threshold: self.confidence_threshold,
            nms_threshold: self.nms_threshold,
            ..ObjectDetectorConfig::default()
        }
    }

    /// Total jobs admitted at once: running plus waiting.
    pub fn admission_limit(&self) -> usize {
        self.max_concurrent_jobs + self.queue_capacity
    }
}
