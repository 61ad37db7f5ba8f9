//! MP4 writer using FFmpeg: RGB24 frames are scaled to YUV420P and encoded
//! with MPEG-4 part 2 at a constant frame rate.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::util::rational::Rational;
use ffmpeg::{codec, encoder, format, frame, software::scaling};
use image::RgbImage;
use std::path::Path;

const ENCODE_FORMAT: format::Pixel = format::Pixel::YUV420P;

pub(super) struct FfmpegVideoWriter {
    octx: format::context::Output,
    encoder: encoder::Video,
    to_yuv: scaling::Context,
    rgb_frame: frame::Video,
    yuv_frame: frame::Video,
    stream_index: usize,
    time_base: Rational,
    width: u32,
    height: u32,
    next_pts: i64,
    finished: bool,
}

impl FfmpegVideoWriter {
    pub(super) fn create(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut octx = format::output(&path)
            .with_context(|| format!("create video output {}", path.display()))?;
        let global_header = octx
            .format()
            .flags()
            .contains(format::flag::Flags::GLOBAL_HEADER);

        let codec = encoder::find(codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("MPEG-4 encoder not available in this ffmpeg build"))?;
        let time_base = Rational::new(1, fps as i32);

        let mut stream = octx.add_stream(codec).context("add video stream")?;
        let mut builder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        builder.set_width(width);
        builder.set_height(height);
        builder.set_format(ENCODE_FORMAT);
        builder.set_time_base(time_base);
        builder.set_frame_rate(Some(Rational::new(fps as i32, 1)));
        if global_header {
            builder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = builder.open_as(codec).context("open MPEG-4 encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
        let stream_index = stream.index();

        let to_yuv = scaling::Context::get(
            format::Pixel::RGB24,
            width,
            height,
            ENCODE_FORMAT,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .context("create to-YUV scaler")?;

        octx.write_header().context("write video header")?;

        Ok(Self {
            octx,
            encoder,
            to_yuv,
            rgb_frame: frame::Video::new(format::Pixel::RGB24, width, height),
            yuv_frame: frame::Video::empty(),
            stream_index,
            time_base,
            width,
            height,
            next_pts: 0,
            finished: false,
        })
    }

    pub(super) fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        if self.finished {
            return Err(anyhow!("video writer already finished"));
        }
        if image.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame is {}x{}, writer expects {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            ));
        }

        let row_bytes = self.width as usize * 3;
        let stride = self.rgb_frame.stride(0);
        let plane = self.rgb_frame.data_mut(0);
        for (row, src) in image.as_raw().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            plane
                .get_mut(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?
                .copy_from_slice(src);
        }

        self.to_yuv
            .run(&self.rgb_frame, &mut self.yuv_frame)
            .context("to-YUV scaling failed")?;
        self.yuv_frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&self.yuv_frame)
            .context("encoder send_frame")?;
        self.drain_packets()
    }

    pub(super) fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush video encoder")?;
        self.drain_packets()?;
        self.octx
            .write_trailer()
            .context("write video trailer")
    }

    fn drain_packets(&mut self) -> Result<()> {
        let out_time_base = self
            .octx
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .context("video output stream missing")?;
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.time_base, out_time_base);
            packet
                .write_interleaved(&mut self.octx)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}
