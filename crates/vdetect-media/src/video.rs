//! OpenCV video decode, encode and overlay drawing.

use std::path::Path;

use opencv::core::{Mat, Point, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::{
    MatTraitConst, MatTraitConstManual, VideoCaptureTrait, VideoCaptureTraitConst,
    VideoWriterTrait, VideoWriterTraitConst,
};
use opencv::videoio::{
    VideoCapture, VideoWriter, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
    CAP_PROP_FRAME_WIDTH,
};
use tracing::{debug, warn};

use crate::detection::{label_text, FrameDetector, ObjectDetection, ObjectDetector};
use crate::error::{MediaError, MediaResult};
use crate::pipeline::{FrameAnnotator, FrameSink, FrameSource, VideoProperties};

/// Frame rate used when the container does not report one.
const FALLBACK_FPS: f64 = 30.0;

fn path_str(path: &Path) -> MediaResult<&str> {
    path.to_str()
        .ok_or_else(|| MediaError::internal(format!("Non UTF-8 path: {}", path.display())))
}

/// Sequential frame source backed by `VideoCapture`.
pub struct CaptureSource {
    cap: VideoCapture,
    properties: VideoProperties,
    frames_read: u64,
}

impl CaptureSource {
    /// Open a video file for sequential reading.
    pub fn open(path: &Path) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let cap = VideoCapture::from_file(path_str(path)?, CAP_ANY)
            .map_err(|e| MediaError::invalid_video(format!("{}: {}", path.display(), e)))?;

        if !cap.is_opened().unwrap_or(false) {
            return Err(MediaError::invalid_video(format!(
                "Failed to open video file: {}",
                path.display()
            )));
        }

        let width = cap.get(CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
        let height = cap.get(CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
        if width == 0 || height == 0 {
            return Err(MediaError::invalid_video(format!(
                "Video reports no frame size: {}",
                path.display()
            )));
        }

        let reported_fps = cap.get(CAP_PROP_FPS).unwrap_or(0.0);
        let fps = if reported_fps.is_finite() && reported_fps > 0.0 {
            reported_fps
        } else {
            warn!(
                path = %path.display(),
                reported_fps,
                "Video reports no frame rate, using {}",
                FALLBACK_FPS
            );
            FALLBACK_FPS
        };

        let frame_count = cap
            .get(CAP_PROP_FRAME_COUNT)
            .ok()
            .filter(|n| *n > 0.0)
            .map(|n| n as u64);

        debug!(width, height, fps, ?frame_count, "Video opened");

        Ok(Self {
            cap,
            properties: VideoProperties {
                width,
                height,
                fps,
                frame_count,
            },
            frames_read: 0,
        })
    }
}

impl FrameSource for CaptureSource {
    type Frame = Mat;

    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn read_frame(&mut self) -> MediaResult<Option<Mat>> {
        let mut frame = Mat::default();
        let ok = self
            .cap
            .read(&mut frame)
            .map_err(|e| MediaError::decode_failed(format!("frame {}: {}", self.frames_read, e)))?;

        if !ok || frame.empty() {
            // VideoCapture reports end of stream and decode failures the same
            // way; a stop before the advertised count is treated as a failure.
            return match self.properties.frame_count {
                Some(total) if self.frames_read < total => Err(MediaError::decode_failed(format!(
                    "no frame at {} of {}",
                    self.frames_read, total
                ))),
                _ => Ok(None),
            };
        }

        self.frames_read += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) -> MediaResult<()> {
        self.cap
            .release()
            .map_err(|e| MediaError::internal(format!("Failed to release capture: {}", e)))
    }
}

/// Frame sink backed by `VideoWriter` with the `mp4v` codec.
pub struct WriterSink {
    writer: VideoWriter,
}

impl WriterSink {
    /// Create a writer whose geometry and frame rate match `properties`.
    pub fn create(path: &Path, properties: &VideoProperties) -> MediaResult<Self> {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')
            .map_err(|e| MediaError::encode_failed(format!("fourcc: {}", e)))?;

        let writer = VideoWriter::new(
            path_str(path)?,
            fourcc,
            properties.fps,
            Size::new(properties.width as i32, properties.height as i32),
            true,
        )
        .map_err(|e| MediaError::encode_failed(format!("{}: {}", path.display(), e)))?;

        if !writer.is_opened().unwrap_or(false) {
            return Err(MediaError::encode_failed(format!(
                "Failed to open video writer: {}",
                path.display()
            )));
        }

        Ok(Self { writer })
    }
}

impl FrameSink<Mat> for WriterSink {
    fn write_frame(&mut self, frame: &Mat) -> MediaResult<()> {
        self.writer
            .write(frame)
            .map_err(|e| MediaError::encode_failed(e.to_string()))
    }

    fn release(&mut self) -> MediaResult<()> {
        self.writer
            .release()
            .map_err(|e| MediaError::encode_failed(format!("Failed to finalize output: {}", e)))
    }
}

/// Draws a rectangle and `"<class> <confidence>"` label per detection.
pub struct BoxAnnotator {
    color: Scalar,
    thickness: i32,
    font_scale: f64,
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self {
            // BGR green
            color: Scalar::new(0.0, 255.0, 0.0, 0.0),
            thickness: 2,
            font_scale: 0.5,
        }
    }
}

impl FrameAnnotator<Mat> for BoxAnnotator {
    fn annotate(&self, frame: &mut Mat, detections: &[ObjectDetection]) -> MediaResult<()> {
        for det in detections {
            let b = det.pixel_box();

            imgproc::rectangle_points(
                frame,
                Point::new(b.x1, b.y1),
                Point::new(b.x2, b.y2),
                self.color,
                self.thickness,
                imgproc::LINE_8,
                0,
            )
            .map_err(|e| MediaError::annotation_failed(format!("rectangle: {}", e)))?;

            let (tx, ty) = b.label_origin();
            imgproc::put_text(
                frame,
                &label_text(det),
                Point::new(tx, ty),
                imgproc::FONT_HERSHEY_SIMPLEX,
                self.font_scale,
                self.color,
                self.thickness,
                imgproc::LINE_AA,
                false,
            )
            .map_err(|e| MediaError::annotation_failed(format!("put_text: {}", e)))?;
        }
        Ok(())
    }
}

impl FrameDetector<Mat> for ObjectDetector {
    fn detect_frame(&self, frame: &Mat) -> MediaResult<Vec<ObjectDetection>> {
        let mut rgb = Mat::default();
        imgproc::cvt_color_def(frame, &mut rgb, imgproc::COLOR_BGR2RGB)
            .map_err(|e| MediaError::detection_failed(format!("BGR to RGB: {}", e)))?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let bytes = rgb
            .data_bytes()
            .map_err(|e| MediaError::detection_failed(format!("Frame bytes: {}", e)))?;

        self.detect(bytes, width, height)
    }
}
