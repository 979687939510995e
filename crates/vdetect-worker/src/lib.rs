//! Video detection worker.
//!
//! This crate provides:
//! - Job table with explicit per-job status
//! - Bounded executor with admission control, cancellation and timeouts
//! - Scratch/output workspace with scoped cleanup and atomic publish
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod table;
pub mod workspace;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::{DetectionProcessor, ProcessingSummary, VideoProcessor};
pub use table::JobTable;
pub use workspace::{validate_filename, ScratchFile, Workspace};
