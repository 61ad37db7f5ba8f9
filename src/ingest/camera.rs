//! Camera frame source.
//!
//! `CameraSource` opens a local capture device for the live feed. Device paths
//! go through V4L2 (feature: camera-v4l2); `stub://` paths yield a synthetic
//! moving pattern, optionally stopping after a fixed number of frames so a
//! camera going away can be simulated.

use anyhow::{anyhow, Result};
use image::RgbImage;

use super::{rgb_frame, synthetic_pixels, FrameSource};
use crate::config::CameraSettings;
#[cfg(feature = "camera-v4l2")]
use super::v4l2::DeviceV4l2Source;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://name`.
    pub device: String,
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Synthetic sources stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

impl From<&CameraSettings> for CameraConfig {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            device: settings.device.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
            max_frames: settings.max_frames,
        }
    }
}

/// Camera frame source. Owned per live-feed request; dropping it releases the
/// device.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCameraSource),
    #[cfg(feature = "camera-v4l2")]
    Device(DeviceV4l2Source),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCameraSource::new(config)),
            });
        }
        #[cfg(feature = "camera-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(DeviceV4l2Source::new(config)),
            })
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            Err(anyhow!(
                "camera capture from {} requires the camera-v4l2 feature",
                config.device
            ))
        }
    }

    pub fn device(&self) -> &str {
        match &self.backend {
            CameraBackend::Synthetic(source) => &source.config.device,
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.device(),
        }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.next_frame().map(Some),
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.frames_captured(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticCameraSource {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
}

impl SyntheticCameraSource {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    /// Synthetic cameras are always available.
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("CameraSource: connected to {} (synthetic)", self.config.device);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if !self.connected {
            return Err(anyhow!("camera {} not connected", self.config.device));
        }
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = synthetic_pixels(self.config.width, self.config.height, self.frame_count);
        rgb_frame(pixels, self.config.width, self.config.height).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(max_frames: Option<u64>) -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            target_fps: 10,
            width: 32,
            height: 24,
            max_frames,
        }
    }

    #[test]
    fn camera_source_produces_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config(None))?;
        source.connect()?;

        let frame = source.next_frame()?.expect("synthetic frame");
        assert_eq!(frame.dimensions(), (32, 24));
        let next = source.next_frame()?.expect("synthetic frame");
        assert_ne!(frame, next, "consecutive synthetic frames should differ");
        Ok(())
    }

    #[test]
    fn bounded_camera_ends_stream() -> Result<()> {
        let mut source = CameraSource::new(stub_config(Some(2)))?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn reading_before_connect_fails() -> Result<()> {
        let mut source = CameraSource::new(stub_config(None))?;
        assert!(source.next_frame().is_err());
        assert_eq!(source.device(), "stub://test");
        Ok(())
    }
}
