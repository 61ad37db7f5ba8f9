//! Output encoders: annotated stills, MP4 video and JPEG frames for the live
//! feed.
//!
//! Video goes through FFmpeg (feature: video-ffmpeg). Stills and JPEG use the
//! `image` codecs.

#[cfg(feature = "video-ffmpeg")]
mod video_ffmpeg;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::path::Path;

/// Quality used for live-feed JPEG frames.
pub const LIVE_JPEG_QUALITY: u8 = 95;

/// Consumer of annotated frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush buffered output. No frames may be written afterwards.
    fn finish(&mut self) -> Result<()>;
}

/// MP4 writer with a fixed frame size and rate.
pub struct VideoWriter {
    #[cfg(feature = "video-ffmpeg")]
    inner: video_ffmpeg::FfmpegVideoWriter,
}

impl VideoWriter {
    /// Create `path` for `width`x`height` frames at `fps`.
    pub fn create(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(anyhow!(
                "invalid video geometry {}x{} at {} fps",
                width,
                height,
                fps
            ));
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            let inner = video_ffmpeg::FfmpegVideoWriter::create(path, width, height, fps)?;
            Ok(Self { inner })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(anyhow!(
                "writing video {} requires the video-ffmpeg feature",
                path.display()
            ))
        }
    }
}

impl FrameSink for VideoWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        #[cfg(feature = "video-ffmpeg")]
        self.inner.write_frame(frame)?;
        #[cfg(not(feature = "video-ffmpeg"))]
        let _ = frame;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        #[cfg(feature = "video-ffmpeg")]
        self.inner.finish()?;
        Ok(())
    }
}

/// Encode a frame as baseline JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(frame)
        .context("encode jpeg")?;
    Ok(out)
}

/// Save a still in the format implied by the path's extension.
pub fn save_image(frame: &RgbImage, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("no image format for {}", path.display()))?;
    frame
        .save_with_format(path, format)
        .with_context(|| format!("write image {}", path.display()))
}
