//! Local video file frame source.
//!
//! `FileSource` reads frames from a local video file. Real files go through
//! FFmpeg (feature: video-ffmpeg); `stub://` paths produce a short synthetic
//! clip for tests.
//!
//! The file source only accepts local paths: URL schemes other than `stub://`
//! are rejected.

use anyhow::{anyhow, Result};
use image::RgbImage;

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{rgb_frame, synthetic_pixels, FrameSource};

const SYNTHETIC_WIDTH: u32 = 64;
const SYNTHETIC_HEIGHT: u32 = 48;
const SYNTHETIC_FRAMES: u64 = 30;

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "video input only supports local paths (no URL schemes)"
            ));
        }
        if path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(
                    path,
                    SYNTHETIC_WIDTH,
                    SYNTHETIC_HEIGHT,
                    SYNTHETIC_FRAMES,
                )),
            })
        } else {
            #[cfg(feature = "video-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(path)?),
                })
            }
            #[cfg(not(feature = "video-ffmpeg"))]
            {
                Err(anyhow!("video decoding requires the video-ffmpeg feature"))
            }
        }
    }

    /// Synthetic clip with explicit geometry and length.
    pub fn synthetic(width: u32, height: u32, frames: u64) -> Self {
        Self {
            backend: FileBackend::Synthetic(SyntheticFileSource::new(
                "stub://clip",
                width,
                height,
                frames,
            )),
        }
    }

    /// Frame width and height of the video stream.
    pub fn dimensions(&self) -> (u32, u32) {
        match &self.backend {
            FileBackend::Synthetic(source) => (source.width, source.height),
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.dimensions(),
        }
    }

    pub fn path(&self) -> &str {
        match &self.backend {
            FileBackend::Synthetic(source) => &source.path,
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.path(),
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("FileSource: opened {}", self.path());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_captured(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    path: String,
    width: u32,
    height: u32,
    total_frames: u64,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(path: &str, width: u32, height: u32, total_frames: u64) -> Self {
        Self {
            path: path.to_string(),
            width,
            height,
            total_frames,
            frame_count: 0,
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.frame_count >= self.total_frames {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = synthetic_pixels(self.width, self.height, self.frame_count);
        rgb_frame(pixels, self.width, self.height).map(Some)
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
