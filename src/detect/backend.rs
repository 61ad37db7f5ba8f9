use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// A backend wraps a pretrained model loaded once at startup. `detect` takes
/// `&self`: weights are read-only after load, so a single instance is shared
/// by every request through an `Arc<dyn DetectorBackend>`.
///
/// Output order is unspecified; callers must not rely on it beyond using it
/// as the draw order.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one decoded RGB frame.
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once after load.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
