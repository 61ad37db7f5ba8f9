//! V4L2 capture for the live feed.
//!
//! Connects to a local device node, asks for packed RGB and accepts whatever
//! the driver settles on among RGB3, YUYV and MJPG. Every captured buffer is
//! normalized to an RGB frame before it leaves this module.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ouroboros::self_referencing;

use super::camera::CameraConfig;
use super::normalize::{normalize_to_rgb, PixelFormat};

pub(crate) struct DeviceV4l2Source {
    config: CameraConfig,
    state: Option<DeviceV4l2State>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
    pixel_format: PixelFormat,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceV4l2Source {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frame_count: 0,
            pixel_format: PixelFormat::Rgb24,
        }
    }

    pub(crate) fn device(&self) -> &str {
        &self.config.device
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.pixel_format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"YUYV" => PixelFormat::Yuyv,
            b"NV12" => PixelFormat::Nv12,
            b"MJPG" => PixelFormat::Mjpeg,
            other => {
                return Err(anyhow!(
                    "v4l2 device {} negotiated unsupported format {}",
                    self.config.device,
                    String::from_utf8_lossy(other)
                ))
            }
        };

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.pixel_format
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<RgbImage> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let buf = state
            .with_mut(|fields| {
                fields.stream.next().map(|(buf, meta)| {
                    // MJPG buffers carry trailing slack past bytesused.
                    let used = (meta.bytesused as usize).min(buf.len());
                    if used == 0 {
                        buf.to_vec()
                    } else {
                        buf[..used].to_vec()
                    }
                })
            })
            .context("capture v4l2 frame")?;

        self.frame_count += 1;
        normalize_to_rgb(&buf, self.active_width, self.active_height, self.pixel_format)
    }
}
