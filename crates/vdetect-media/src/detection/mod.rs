//! Object detection.
//!
//! `ObjectDetector` runs a YOLOv8 ONNX model on RGB frames and returns
//! boxes in frame pixel coordinates. `FrameDetector` is the seam the frame
//! loop uses, so any frame representation can be plugged in.

pub mod object_detector;
pub mod types;

pub use object_detector::{ObjectDetector, ObjectDetectorConfig};
pub use types::{label_text, ObjectDetection, PixelBox, COCO_CLASSES};

use crate::error::MediaResult;

/// Detector over a particular frame type.
pub trait FrameDetector<F>: Send + Sync {
    /// Detect objects in a single frame.
    fn detect_frame(&self, frame: &F) -> MediaResult<Vec<ObjectDetection>>;
}
