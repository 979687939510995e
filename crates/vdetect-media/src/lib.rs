//! Object detection and annotated video rendering.
//!
//! This crate provides:
//! - YOLOv8 ONNX object detection with class-wise NMS
//! - Label and box geometry rules for overlays
//! - A sequential frame loop over pluggable source/detector/annotator/sink
//! - OpenCV-backed video decode, encode and drawing (`opencv` feature)

pub mod detection;
pub mod error;
pub mod pipeline;
#[cfg(feature = "opencv")]
pub mod video;

pub use detection::{
    label_text, FrameDetector, ObjectDetection, ObjectDetector, ObjectDetectorConfig, PixelBox,
    COCO_CLASSES,
};
pub use error::{MediaError, MediaResult};
pub use pipeline::{
    annotate_video, run_frame_loop, FrameAnnotator, FrameLoopStats, FrameSink, FrameSource,
    VideoProperties,
};
