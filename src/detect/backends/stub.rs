use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Stub backend for testing. Replays a fixed detection list on every frame.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    detections: Vec<Detection>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        Ok(self
            .detections
            .iter()
            .map(|det| Detection {
                bbox: det.bbox.clamped(width, height),
                ..det.clone()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn stub_backend_replays_detections() -> Result<()> {
        let backend = StubBackend::with_detections(vec![Detection::new(
            BoundingBox::new(10, 10, 500, 40),
            2,
            0.75,
        )]);
        let frame = RgbImage::new(100, 50);

        let first = backend.detect(&frame)?;
        let second = backend.detect(&frame)?;
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].bbox, BoundingBox::new(10, 10, 99, 40));
        assert_eq!(first[0].class_index, 2);

        assert!(StubBackend::new().detect(&frame)?.is_empty());
        Ok(())
    }
}
