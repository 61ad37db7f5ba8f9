//! Frame ingestion sources.
//!
//! This module provides the readers that feed the media processor:
//! - Local video files (FFmpeg decode, feature: video-ffmpeg)
//! - Camera devices (V4L2, feature: camera-v4l2)
//! - Synthetic `stub://` sources for tests and demos
//!
//! Every source yields decoded RGB frames one at a time. `Ok(None)` marks a
//! clean end of stream; an `Err` is a failed read. The processor treats both
//! as the end of the loop.

pub mod camera;
pub mod file;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod normalize;
#[cfg(feature = "camera-v4l2")]
pub(crate) mod v4l2;

use anyhow::Result;
use image::RgbImage;

pub use camera::{CameraConfig, CameraSource};
pub use file::FileSource;
pub(crate) use normalize::rgb_frame;
pub use normalize::{normalize_to_rgb, PixelFormat};

/// Pull-driven reader of decoded frames.
pub trait FrameSource {
    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Read the next frame. `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Frames produced so far.
    fn frames_captured(&self) -> u64;
}

/// Deterministic test pattern shared by the synthetic sources.
///
/// The pattern drifts with `frame_count` so consecutive frames differ.
pub(crate) fn synthetic_pixels(width: u32, height: u32, frame_count: u64) -> Vec<u8> {
    let pixel_count = (width as usize) * (height as usize) * 3;
    let mut pixels = vec![0u8; pixel_count];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = ((i as u64 + frame_count) % 256) as u8;
    }
    pixels
}
