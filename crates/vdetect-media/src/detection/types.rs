//! Detection results and overlay geometry.

/// Detected object with bounding box and classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDetection {
    /// Top-left corner in frame pixels
    pub x1: f32,
    pub y1: f32,
    /// Bottom-right corner in frame pixels
    pub x2: f32,
    pub y2: f32,
    /// COCO class ID (0 = person, 2 = car, etc.)
    pub class_id: usize,
    /// Detection confidence [0, 1]
    pub confidence: f32,
}

impl ObjectDetection {
    /// Class name for this detection.
    pub fn label(&self) -> String {
        COCO_CLASSES
            .get(self.class_id)
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("class_{}", self.class_id))
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over Union with another detection.
    pub fn iou(&self, other: &ObjectDetection) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Integer box used for drawing.
    pub fn pixel_box(&self) -> PixelBox {
        PixelBox::from(self)
    }
}

/// Box corners in integer pixels, truncated from detector output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelBox {
    /// Baseline origin for the label text, just above the box.
    pub fn label_origin(&self) -> (i32, i32) {
        (self.x1, (self.y1 - 10).max(0))
    }
}

impl From<&ObjectDetection> for PixelBox {
    fn from(det: &ObjectDetection) -> Self {
        // `as` truncates toward zero
        Self {
            x1: det.x1 as i32,
            y1: det.y1 as i32,
            x2: det.x2 as i32,
            y2: det.y2 as i32,
        }
    }
}

/// Overlay label: class name and confidence to two decimal places.
pub fn label_text(det: &ObjectDetection) -> String {
    format!("{} {:.2}", det.label(), det.confidence)
}

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn det(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        class_id: usize,
        confidence: f32,
    ) -> ObjectDetection {
        ObjectDetection {
            x1,
            y1,
            x2,
            y2,
            class_id,
            confidence,
        }
    }

    #[test]
    fn test_coco_classes() {
        assert_eq!(COCO_CLASSES[0], "person");
        assert_eq!(COCO_CLASSES[2], "car");
        assert_eq!(COCO_CLASSES.len(), 80);
    }

    #[test]
    fn test_label_text_two_decimals() {
        assert_eq!(label_text(&det(0.0, 0.0, 1.0, 1.0, 0, 0.8765)), "person 0.88");
        assert_eq!(label_text(&det(0.0, 0.0, 1.0, 1.0, 2, 0.5)), "car 0.50");
        assert_eq!(label_text(&det(0.0, 0.0, 1.0, 1.0, 16, 1.0)), "dog 1.00");
    }

    #[test]
    fn test_label_unknown_class() {
        assert_eq!(det(0.0, 0.0, 1.0, 1.0, 99, 0.3).label(), "class_99");
    }

    #[test]
    fn test_pixel_box_truncates() {
        let b = det(10.9, 20.1, 110.99, 220.5, 0, 0.9).pixel_box();
        assert_eq!(b, PixelBox { x1: 10, y1: 20, x2: 110, y2: 220 });
    }

    #[test]
    fn test_label_origin_clamped_to_frame() {
        let b = PixelBox { x1: 5, y1: 4, x2: 50, y2: 60 };
        assert_eq!(b.label_origin(), (5, 0));
        let b = PixelBox { x1: 5, y1: 40, x2: 50, y2: 60 };
        assert_eq!(b.label_origin(), (5, 30));
    }

    #[test]
    fn test_iou() {
        let a = det(0.0, 0.0, 10.0, 10.0, 0, 0.9);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);

        let b = det(5.0, 0.0, 15.0, 10.0, 0, 0.9);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);

        let c = det(20.0, 20.0, 30.0, 30.0, 0, 0.9);
        assert_eq!(a.iou(&c), 0.0);
    }
}
