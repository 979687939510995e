//! Shared data models for the vdetect service.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and the job status state machine
//! - Job records tracked by the worker
//! - HTTP request/response payloads

pub mod error;
pub mod job;
pub mod job_status;
pub mod response;

pub use error::{ModelError, ModelResult};
pub use job::{JobId, JobRecord};
pub use job_status::JobStatus;
pub use response::{download_url_for, DownloadNotFound, PredictResponse};
