//! Scratch and output file management.
//!
//! Uploads land in uniquely named scratch files that are removed when the
//! owning job drops them. Annotated output is written to a per-job staging
//! path and renamed into the output directory only after the encoder has
//! been finalized, so readers never observe a partially written video.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};
use vdetect_models::JobId;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Staging directory name inside the output directory.
pub const STAGING_DIR: &str = ".partial";

/// Uploaded input owned by a single job. Deleted on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Check that an upload filename can be used as a single output path
/// component.
///
/// Spaces and non-ASCII characters are kept verbatim.
pub fn validate_filename(name: &str) -> WorkerResult<()> {
    if name.is_empty() {
        return Err(WorkerError::invalid_filename("filename is empty"));
    }
    if name == "." || name == ".." || name == STAGING_DIR {
        return Err(WorkerError::invalid_filename(format!(
            "'{}' is a reserved name",
            name
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(WorkerError::invalid_filename(format!(
            "'{}' contains a path separator",
            name
        )));
    }
    if name.contains('\0') {
        return Err(WorkerError::invalid_filename("filename contains a NUL byte"));
    }
    Ok(())
}

/// Directory layout shared by the upload handler, the workers and the
/// download handler.
#[derive(Debug, Clone)]
pub struct Workspace {
    output_dir: PathBuf,
    staging_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl Workspace {
    /// Create the output, staging and scratch directories if missing.
    pub async fn prepare(config: &WorkerConfig) -> WorkerResult<Self> {
        let staging_dir = config.output_dir.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging_dir).await?;
        tokio::fs::create_dir_all(&config.scratch_dir).await?;

        Ok(Self {
            output_dir: config.output_dir.clone(),
            staging_dir,
            scratch_dir: config.scratch_dir.clone(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Reserve a fresh scratch file for an upload.
    pub fn new_scratch(&self) -> WorkerResult<ScratchFile> {
        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".mp4")
            .tempfile_in(&self.scratch_dir)?;

        Ok(ScratchFile {
            path: file.into_temp_path(),
        })
    }

    /// Where a job writes its output before it is published.
    pub fn staging_path(&self, job_id: &JobId) -> PathBuf {
        self.staging_dir.join(format!("{}.mp4", job_id))
    }

    /// Final location of the artifact for `filename`.
    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.output_dir.join(filename)
    }

    /// Atomically move a finished staging file to its final location,
    /// replacing any earlier artifact with the same name.
    pub async fn publish(&self, staging: &Path, filename: &str) -> WorkerResult<PathBuf> {
        validate_filename(filename)?;
        let target = self.output_path(filename);
        tokio::fs::rename(staging, &target).await?;
        debug!(target = %target.display(), "Published output");
        Ok(target)
    }

    /// Remove a staging file left behind by a failed job.
    pub async fn discard(&self, staging: &Path) {
        match tokio::fs::remove_file(staging).await {
            Ok(()) => debug!(path = %staging.display(), "Removed staging file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %staging.display(), "Failed to remove staging file: {}", e),
        }
    }

    /// Locate a published artifact by name.
    pub async fn find_output(&self, filename: &str) -> Option<PathBuf> {
        validate_filename(filename).ok()?;
        let path = self.output_path(filename);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}
