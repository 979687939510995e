//! Sequential detect-and-annotate frame loop.
//!
//! The loop reads frames in order, runs the detector, draws the detections
//! and appends the frame to the sink. Frame order is preserved exactly and
//! no frame is skipped. A decode failure ends the loop early; the frames
//! written so far form the output. Source and sink are released on every
//! path once the loop has started.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::detection::{FrameDetector, ObjectDetection};
use crate::error::{MediaError, MediaResult};

/// Geometry and timing of a video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container-reported frame count, when known
    pub frame_count: Option<u64>,
}

/// Sequential frame source.
pub trait FrameSource {
    type Frame;

    fn properties(&self) -> VideoProperties;

    /// Read the next frame. `Ok(None)` means end of stream; `Err` means
    /// the frame could not be decoded.
    fn read_frame(&mut self) -> MediaResult<Option<Self::Frame>>;

    fn release(&mut self) -> MediaResult<()>;
}

/// Destination for annotated frames.
pub trait FrameSink<F> {
    fn write_frame(&mut self, frame: &F) -> MediaResult<()>;

    fn release(&mut self) -> MediaResult<()>;
}

/// Draws detections onto a frame in place.
pub trait FrameAnnotator<F> {
    fn annotate(&self, frame: &mut F, detections: &[ObjectDetection]) -> MediaResult<()>;
}

/// Outcome of a completed frame loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLoopStats {
    pub frames_written: u64,
    pub detections: u64,
    /// The source failed to decode a frame before end of stream
    pub truncated: bool,
    pub properties: VideoProperties,
}

/// Run the detect-and-annotate loop from `source` to `sink`.
///
/// The cancellation token is checked before every frame. Both handles are
/// released before returning, whatever the outcome.
pub fn run_frame_loop<S, K, D, A>(
    source: &mut S,
    sink: &mut K,
    detector: &D,
    annotator: &A,
    cancel: &CancellationToken,
) -> MediaResult<FrameLoopStats>
where
    S: FrameSource,
    K: FrameSink<S::Frame>,
    D: FrameDetector<S::Frame> + ?Sized,
    A: FrameAnnotator<S::Frame>,
{
    let result = process_frames(source, sink, detector, annotator, cancel);

    let source_released = source.release();
    let sink_released = sink.release();

    let stats = result?;
    source_released?;
    sink_released?;
    Ok(stats)
}

fn process_frames<S, K, D, A>(
    source: &mut S,
    sink: &mut K,
    detector: &D,
    annotator: &A,
    cancel: &CancellationToken,
) -> MediaResult<FrameLoopStats>
where
    S: FrameSource,
    K: FrameSink<S::Frame>,
    D: FrameDetector<S::Frame> + ?Sized,
    A: FrameAnnotator<S::Frame>,
{
    let mut stats = FrameLoopStats {
        frames_written: 0,
        detections: 0,
        truncated: false,
        properties: source.properties(),
    };

    loop {
        if cancel.is_cancelled() {
            info!(frames = stats.frames_written, "Frame loop cancelled");
            return Err(MediaError::Cancelled);
        }

        let mut frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(
                    frame = stats.frames_written,
                    error = %e,
                    "Frame decode failed, ending output early"
                );
                stats.truncated = true;
                break;
            }
        };

        let detections = detector.detect_frame(&frame)?;
        annotator.annotate(&mut frame, &detections)?;
        sink.write_frame(&frame)?;

        stats.frames_written += 1;
        stats.detections += detections.len() as u64;

        if stats.frames_written % 100 == 0 {
            debug!(frames = stats.frames_written, "Frame loop heartbeat");
        }
    }

    Ok(stats)
}

/// Detect objects in `input` and write the annotated video to `output`.
///
/// Output geometry and frame rate match the input. Fails without creating
/// any output when the input cannot be opened.
#[cfg(feature = "opencv")]
pub fn annotate_video<D>(
    input: &Path,
    output: &Path,
    detector: &D,
    cancel: &CancellationToken,
) -> MediaResult<FrameLoopStats>
where
    D: FrameDetector<opencv::core::Mat> + ?Sized,
{
    use crate::video::{BoxAnnotator, CaptureSource, WriterSink};

    let mut source = CaptureSource::open(input)?;
    let properties = source.properties();

    let mut sink = match WriterSink::create(output, &properties) {
        Ok(sink) => sink,
        Err(e) => {
            let _ = source.release();
            return Err(e);
        }
    };

    info!(
        input = %input.display(),
        width = properties.width,
        height = properties.height,
        fps = properties.fps,
        "Annotating video"
    );

    let annotator = BoxAnnotator::default();
    let stats = run_frame_loop(&mut source, &mut sink, detector, &annotator, cancel)?;

    info!(
        output = %output.display(),
        frames = stats.frames_written,
        detections = stats.detections,
        truncated = stats.truncated,
        "Annotated video written"
    );

    Ok(stats)
}

#[cfg(not(feature = "opencv"))]
pub fn annotate_video<D: ?Sized>(
    _input: &Path,
    _output: &Path,
    _detector: &D,
    _cancel: &CancellationToken,
) -> MediaResult<FrameLoopStats> {
    Err(MediaError::Unsupported(
        "video decoding requires the `opencv` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;

    /// In-memory frame: its source index plus every box drawn on it.
    #[derive(Debug, Clone, PartialEq)]
    struct TestFrame {
        index: usize,
        boxes: Vec<(i32, i32, i32, i32)>,
        labels: Vec<String>,
    }

    struct ScriptedSource {
        properties: VideoProperties,
        script: VecDeque<MediaResult<Option<TestFrame>>>,
        released: bool,
    }

    impl ScriptedSource {
        fn frames(count: usize, fps: f64) -> Self {
            let script = (0..count)
                .map(|index| Ok(Some(TestFrame { index, boxes: vec![], labels: vec![] })))
                .collect();
            Self {
                properties: VideoProperties {
                    width: 320,
                    height: 240,
                    fps,
                    frame_count: Some(count as u64),
                },
                script,
                released: false,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        type Frame = TestFrame;

        fn properties(&self) -> VideoProperties {
            self.properties
        }

        fn read_frame(&mut self) -> MediaResult<Option<TestFrame>> {
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn release(&mut self) -> MediaResult<()> {
            self.released = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<TestFrame>,
        released: bool,
        fail_at: Option<usize>,
    }

    impl FrameSink<TestFrame> for RecordingSink {
        fn write_frame(&mut self, frame: &TestFrame) -> MediaResult<()> {
            if self.fail_at == Some(self.frames.len()) {
                return Err(MediaError::encode_failed("disk full"));
            }
            self.frames.push(frame.clone());
            Ok(())
        }

        fn release(&mut self) -> MediaResult<()> {
            self.released = true;
            Ok(())
        }
    }

    /// Reports one object on every frame.
    struct OneObjectDetector {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl OneObjectDetector {
        fn new() -> Self {
            Self { calls: std::sync::atomic::AtomicUsize::new(0) }
        }
    }

    impl FrameDetector<TestFrame> for OneObjectDetector {
        fn detect_frame(&self, frame: &TestFrame) -> MediaResult<Vec<ObjectDetection>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let offset = frame.index as f32;
            Ok(vec![ObjectDetection {
                x1: 10.7 + offset,
                y1: 20.2,
                x2: 100.9,
                y2: 200.5,
                class_id: 0,
                confidence: 0.876,
            }])
        }
    }

    struct FailingDetector;

    impl FrameDetector<TestFrame> for FailingDetector {
        fn detect_frame(&self, _frame: &TestFrame) -> MediaResult<Vec<ObjectDetection>> {
            Err(MediaError::detection_failed("model exploded"))
        }
    }

    struct TestAnnotator;

    impl FrameAnnotator<TestFrame> for TestAnnotator {
        fn annotate(
            &self,
            frame: &mut TestFrame,
            detections: &[ObjectDetection],
        ) -> MediaResult<()> {
            for det in detections {
                let b = det.pixel_box();
                frame.boxes.push((b.x1, b.y1, b.x2, b.y2));
                frame.labels.push(crate::detection::label_text(det));
            }
            Ok(())
        }
    }

    /// Cancels the token after a number of frames have been annotated.
    struct CancellingAnnotator {
        token: CancellationToken,
        after: usize,
        seen: Cell<usize>,
    }

    impl FrameAnnotator<TestFrame> for CancellingAnnotator {
        fn annotate(
            &self,
            _frame: &mut TestFrame,
            _detections: &[ObjectDetection],
        ) -> MediaResult<()> {
            self.seen.set(self.seen.get() + 1);
            if self.seen.get() == self.after {
                self.token.cancel();
            }
            Ok(())
        }
    }

    #[test]
    fn test_ten_frames_one_object_each() {
        let mut source = ScriptedSource::frames(10, 10.0);
        let mut sink = RecordingSink::default();
        let detector = OneObjectDetector::new();

        let stats = run_frame_loop(
            &mut source,
            &mut sink,
            &detector,
            &TestAnnotator,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(stats.frames_written, 10);
        assert_eq!(stats.detections, 10);
        assert!(!stats.truncated);
        assert_eq!(sink.frames.len(), 10);
        for frame in &sink.frames {
            assert_eq!(frame.boxes.len(), 1);
            assert_eq!(frame.labels, vec!["person 0.88".to_string()]);
        }
        assert_eq!(sink.frames[0].boxes[0], (10, 20, 100, 200));
        assert!(source.released);
        assert!(sink.released);
    }

    #[test]
    fn test_frame_order_preserved() {
        let mut source = ScriptedSource::frames(25, 30.0);
        let mut sink = RecordingSink::default();

        run_frame_loop(
            &mut source,
            &mut sink,
            &OneObjectDetector::new(),
            &TestAnnotator,
            &CancellationToken::new(),
        )
        .unwrap();

        let order: Vec<usize> = sink.frames.iter().map(|f| f.index).collect();
        assert_eq!(order, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_properties_passed_through() {
        let mut source = ScriptedSource::frames(3, 23.976);
        let mut sink = RecordingSink::default();

        let stats = run_frame_loop(
            &mut source,
            &mut sink,
            &OneObjectDetector::new(),
            &TestAnnotator,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(stats.properties.width, 320);
        assert_eq!(stats.properties.height, 240);
        assert_eq!(stats.properties.fps, 23.976);
    }

    #[test]
    fn test_decode_failure_truncates_output() {
        let mut source = ScriptedSource::frames(10, 10.0);
        source.script[4] = Err(MediaError::decode_failed("corrupt packet"));
        let mut sink = RecordingSink::default();

        let stats = run_frame_loop(
            &mut source,
            &mut sink,
            &OneObjectDetector::new(),
            &TestAnnotator,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(stats.frames_written, 4);
        assert!(stats.truncated);
        assert_eq!(sink.frames.len(), 4);
        assert!(source.released);
        assert!(sink.released);
    }

    #[test]
    fn test_empty_source_writes_nothing() {
        let mut source = ScriptedSource::frames(0, 10.0);
        let mut sink = RecordingSink::default();

        let stats = run_frame_loop(
            &mut source,
            &mut sink,
            &OneObjectDetector::new(),
            &TestAnnotator,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(stats.frames_written, 0);
        assert!(sink.frames.is_empty());
        assert!(sink.released);
    }

    #[test]
    fn test_detector_error_releases_handles() {
        let mut source = ScriptedSource::frames(5, 10.0);
        let mut sink = RecordingSink::default();

        let err = run_frame_loop(
            &mut source,
            &mut sink,
            &FailingDetector,
            &TestAnnotator,
            &CancellationToken::new(),
        )
        .unwrap_err();

        assert!(matches!(err, MediaError::DetectionFailed(_)));
        assert!(sink.frames.is_empty());
        assert!(source.released);
        assert!(sink.released);
    }

    #[test]
    fn test_sink_error_propagates() {
        let mut source = ScriptedSource::frames(5, 10.0);
        let mut sink = RecordingSink { fail_at: Some(2), ..Default::default() };

        let err = run_frame_loop(
            &mut source,
            &mut sink,
            &OneObjectDetector::new(),
            &TestAnnotator,
            &CancellationToken::new(),
        )
        .unwrap_err();

        assert!(matches!(err, MediaError::EncodeFailed(_)));
        assert_eq!(sink.frames.len(), 2);
        assert!(sink.released);
    }

    #[test]
    fn test_cancellation_stops_loop() {
        let token = CancellationToken::new();
        let annotator = CancellingAnnotator {
            token: token.clone(),
            after: 3,
            seen: Cell::new(0),
        };
        let mut source = ScriptedSource::frames(10, 10.0);
        let mut sink = RecordingSink::default();
        let detector = OneObjectDetector::new();

        let err =
            run_frame_loop(&mut source, &mut sink, &detector, &annotator, &token).unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(sink.frames.len(), 3);
        assert_eq!(detector.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(source.released);
        assert!(sink.released);
    }
}
