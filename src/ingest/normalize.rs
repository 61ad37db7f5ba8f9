use anyhow::{anyhow, Context, Result};
use image::RgbImage;

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
    Mjpeg,
}

/// Convert a captured buffer to an RGB frame.
pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbImage> {
    match format {
        PixelFormat::Rgb24 => rgb_frame(pixels.to_vec(), width, height),
        PixelFormat::Nv12 => rgb_frame(nv12_to_rgb(pixels, width, height)?, width, height),
        PixelFormat::Yuyv => rgb_frame(yuyv_to_rgb(pixels, width, height)?, width, height),
        PixelFormat::Mjpeg => decode_jpeg(pixels),
    }
}

/// Wrap packed RGB24 bytes as a frame, checking the length.
pub(crate) fn rgb_frame(pixels: Vec<u8>, width: u32, height: u32) -> Result<RgbImage> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))
}

fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    Ok(image.into_rgb8())
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;
            write_rgb(&mut rgb[(j * w + i) * 3..], y, u, v);
        }
    }

    Ok(rgb)
}

/// Packed 4:2:2, two pixels per `Y0 U Y1 V` quad.
fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixel_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frame width must be even, got {}", width));
    }
    if pixels.len() != pixel_count * 2 {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            pixel_count * 2,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; pixel_count * 3];
    for (n, quad) in pixels.chunks_exact(4).enumerate() {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        let out = n * 6;
        write_rgb(&mut rgb[out..], quad[0] as f32, u, v);
        write_rgb(&mut rgb[out + 3..], quad[2] as f32, u, v);
    }
    Ok(rgb)
}

fn write_rgb(dst: &mut [u8], y: f32, u: f32, v: f32) {
    dst[0] = clamp_to_u8(y + 1.402_f32 * v);
    dst[1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
    dst[2] = clamp_to_u8(y + 1.772_f32 * u);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
