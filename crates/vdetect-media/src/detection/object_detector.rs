//! Object detection using YOLOv8 ONNX model.
//!
//! Provides object detection with GPU acceleration support:
//! - CUDA on Linux with NVIDIA GPU
//! - CoreML on macOS with Apple Silicon
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::Mutex;

use image::{DynamicImage, ImageBuffer, Rgb};
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use super::types::ObjectDetection;
use crate::error::{MediaError, MediaResult};

/// YOLOv8 detection head strides.
const YOLO_STRIDES: [u32; 3] = [8, 16, 32];

/// Configuration for object detection.
#[derive(Debug, Clone)]
pub struct ObjectDetectorConfig {
    /// Path to ONNX model file
    pub model_path: String,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
}

impl Default for ObjectDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/object_detection/yolov8n.onnx".to_string(),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// Object detector using YOLOv8 ONNX model.
///
/// The session is behind a mutex; concurrent jobs share one detector and
/// take turns on inference.
pub struct ObjectDetector {
    session: Mutex<Session>,
    config: ObjectDetectorConfig,
}

impl ObjectDetector {
    /// Create a new object detector from config.
    ///
    /// Returns error if model file doesn't exist or cannot be loaded.
    pub fn new(config: ObjectDetectorConfig) -> MediaResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(MediaError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            confidence_threshold = config.confidence_threshold,
            "Object detector initialized"
        );

        Ok(Self { session, config })
    }

    /// Detect objects in an RGB frame.
    ///
    /// # Arguments
    /// * `image_data` - Raw RGB image bytes (width * height * 3)
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    ///
    /// # Returns
    /// Detections with boxes in frame pixel coordinates.
    pub fn detect(
        &self,
        image_data: &[u8],
        width: u32,
        height: u32,
    ) -> MediaResult<Vec<ObjectDetection>> {
        let img = raw_to_image(image_data, width, height)?;
        let input = self.preprocess(&img)?;
        let outputs = self.run_inference(input)?;

        let candidates = decode_predictions(
            &outputs,
            self.config.input_size,
            width,
            height,
            self.config.confidence_threshold,
        )?;
        let detections = non_maximum_suppression(candidates, self.config.nms_threshold);

        debug!(count = detections.len(), "Object detection completed");

        Ok(detections)
    }

    /// Preprocess image for YOLOv8 inference.
    ///
    /// - Resize to model input size
    /// - Normalize pixel values to [0, 1]
    /// - Convert to NCHW format (batch, channels, height, width)
    fn preprocess(&self, img: &DynamicImage) -> MediaResult<Value> {
        let input_size = self.config.input_size;

        let resized = img.resize_exact(
            input_size,
            input_size,
            image::imageops::FilterType::Triangle,
        );

        let rgb = resized.to_rgb8();
        let (w, h) = (input_size as usize, input_size as usize);

        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = rgb.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
    }

    /// Run ONNX inference.
    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 4 + classes, candidates]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.iter().copied().collect())
    }
}

/// Convert raw RGB bytes to DynamicImage.
fn raw_to_image(image_data: &[u8], width: u32, height: u32) -> MediaResult<DynamicImage> {
    let expected_len = (width as usize) * (height as usize) * 3;
    if image_data.len() != expected_len {
        return Err(MediaError::detection_failed(format!(
            "Invalid image data length: expected {}, got {}",
            expected_len,
            image_data.len()
        )));
    }

    let img_buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(width, height, image_data.to_vec())
            .ok_or_else(|| MediaError::internal("Failed to create image buffer"))?;

    Ok(DynamicImage::ImageRgb8(img_buffer))
}

/// Number of candidate boxes a YOLOv8 head emits for a square input.
pub fn candidate_count(input_size: u32) -> usize {
    YOLO_STRIDES
        .iter()
        .map(|stride| {
            let cells = (input_size / stride) as usize;
            cells * cells
        })
        .sum()
}

/// Decode raw YOLOv8 output into candidate detections.
///
/// Output layout is `[4 + classes, candidates]`, rows `cx, cy, w, h` then
/// one score per class, in model input coordinates. Candidates below
/// `confidence_threshold` are dropped; survivors are scaled to the original
/// frame and clamped to its bounds.
pub fn decode_predictions(
    outputs: &[f32],
    input_size: u32,
    orig_width: u32,
    orig_height: u32,
    confidence_threshold: f32,
) -> MediaResult<Vec<ObjectDetection>> {
    let num_boxes = candidate_count(input_size);
    if num_boxes == 0 || outputs.len() % num_boxes != 0 || outputs.len() / num_boxes <= 4 {
        return Err(MediaError::detection_failed(format!(
            "Unexpected output size {} for {} candidates",
            outputs.len(),
            num_boxes
        )));
    }
    let num_features = outputs.len() / num_boxes;
    let num_classes = num_features - 4;

    let output_array = Array::from_shape_vec((num_features, num_boxes), outputs.to_vec())
        .map_err(|e| MediaError::internal(format!("Failed to reshape output: {}", e)))?;
    let transposed = output_array.t();

    let scale_w = orig_width as f32 / input_size as f32;
    let scale_h = orig_height as f32 / input_size as f32;
    let max_x = orig_width as f32;
    let max_y = orig_height as f32;

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for c in 0..num_classes {
            let score = transposed[[i, 4 + c]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score < confidence_threshold {
            continue;
        }

        let cx = transposed[[i, 0]];
        let cy = transposed[[i, 1]];
        let w = transposed[[i, 2]];
        let h = transposed[[i, 3]];

        candidates.push(ObjectDetection {
            x1: ((cx - w / 2.0) * scale_w).clamp(0.0, max_x),
            y1: ((cy - h / 2.0) * scale_h).clamp(0.0, max_y),
            x2: ((cx + w / 2.0) * scale_w).clamp(0.0, max_x),
            y2: ((cy + h / 2.0) * scale_h).clamp(0.0, max_y),
            class_id: best_class,
            confidence: best_score,
        });
    }

    Ok(candidates)
}

/// Apply class-wise Non-Maximum Suppression.
///
/// Returns detections sorted by descending confidence.
pub fn non_maximum_suppression(
    mut detections: Vec<ObjectDetection>,
    iou_threshold: f32,
) -> Vec<ObjectDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<ObjectDetection> = Vec::new();
    for candidate in detections {
        let overlaps = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.iou(&candidate) > iou_threshold
        });
        if !overlaps {
            keep.push(candidate);
        }
    }

    keep
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}
