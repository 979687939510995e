//! Video processing backends.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use vdetect_media::{annotate_video, MediaResult, ObjectDetector, ObjectDetectorConfig};

/// Outcome of a successful processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingSummary {
    /// Annotated frames written to the output
    pub frames_written: u64,
    /// Input stopped decoding before its reported end
    pub truncated: bool,
}

/// Turns an input video into an annotated output video.
///
/// Implementations are blocking and run on the blocking thread pool. They
/// must poll `cancel` regularly and return `MediaError::Cancelled` once it
/// fires.
pub trait VideoProcessor: Send + Sync + 'static {
    fn process(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<ProcessingSummary>;
}

/// YOLOv8 detection with box overlays.
pub struct DetectionProcessor {
    detector: ObjectDetector,
}

impl DetectionProcessor {
    /// Load the detection model.
    pub fn new(config: ObjectDetectorConfig) -> MediaResult<Self> {
        Ok(Self {
            detector: ObjectDetector::new(config)?,
        })
    }
}

impl VideoProcessor for DetectionProcessor {
    fn process(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<ProcessingSummary> {
        let stats = annotate_video(input, output, &self.detector, cancel)?;
        Ok(ProcessingSummary {
            frames_written: stats.frames_written,
            truncated: stats.truncated,
        })
    }
}
