use serde::Deserialize;

/// Axis-aligned box in integer pixel coordinates of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Clamp the box into a `width` x `height` frame.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1) as i32;
        let max_y = height.saturating_sub(1) as i32;
        Self {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        }
    }
}

/// One detected region in a single frame.
///
/// Confidence is kept as `f64` so the admission threshold comparison is exact
/// at the boundary (`0.3` vs `0.30000001`).
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_index: usize,
    pub confidence: f64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_index: usize, confidence: f64) -> Self {
        Self {
            bbox,
            class_index,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_box_into_frame() {
        let bbox = BoundingBox::new(-5, -1, 700, 300).clamped(640, 480);
        assert_eq!(bbox, BoundingBox::new(0, 0, 639, 300));
        assert_eq!(bbox.width(), 639);
        assert_eq!(bbox.height(), 300);
    }

    #[test]
    fn detection_deserializes_from_config_json() {
        let json = r#"{"bbox":{"x1":1,"y1":2,"x2":30,"y2":40},"class_index":3,"confidence":0.9}"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.bbox, BoundingBox::new(1, 2, 30, 40));
        assert_eq!(det.class_index, 3);
        assert_eq!(det.confidence, 0.9);
    }
}
