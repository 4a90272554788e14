use std::io::Cursor;

use anyhow::Context;
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};

/// Uploads wider than this are downscaled; narrower ones keep their size.
pub const MAX_WIDTH: u32 = 800;
const JPEG_QUALITY: u8 = 80;

/// Normalize an uploaded image: decode, bound the width, re-encode as JPEG.
///
/// Decoding and encoding are CPU-bound, so the work runs on a blocking
/// thread rather than on the request task.
pub async fn process(raw: Bytes) -> anyhow::Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || normalize(&raw))
        .await
        .context("image task panicked")?
}

fn normalize(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let img = image::load_from_memory(raw).context("decode uploaded image")?;

    let img = if img.width() > MAX_WIDTH {
        let height = scaled_height(img.width(), img.height());
        img.resize(MAX_WIDTH, height, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel; flatten whatever the decoder produced.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .context("encode normalized jpeg")?;
    Ok(out.into_inner())
}

fn scaled_height(width: u32, height: u32) -> u32 {
    ((height as u64 * MAX_WIDTH as u64) / width as u64).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb, Rgba};

    fn png_bytes(width: u32, height: u32) -> Bytes {
        let buf = ImageBuffer::from_pixel(width, height, Rgb([120u8, 30, 200]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(buf)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    #[tokio::test]
    async fn wide_image_is_bounded_to_max_width() {
        let jpeg = process(png_bytes(1600, 400)).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), MAX_WIDTH);
        assert_eq!(decoded.height(), 200);
    }

    #[tokio::test]
    async fn narrow_image_keeps_its_dimensions() {
        let jpeg = process(png_bytes(100, 80)).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 80);
    }

    #[tokio::test]
    async fn output_is_jpeg() {
        let jpeg = process(png_bytes(50, 50)).await.unwrap();
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[tokio::test]
    async fn alpha_input_is_flattened() {
        let buf = ImageBuffer::from_pixel(40, 40, Rgba([10u8, 20, 30, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(buf)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        let jpeg = process(Bytes::from(out.into_inner())).await.unwrap();
        assert!(image::load_from_memory(&jpeg).is_ok());
    }

    #[tokio::test]
    async fn garbage_input_is_rejected() {
        let err = process(Bytes::from_static(b"not an image")).await.unwrap_err();
        assert!(err.to_string().contains("decode"));
    }
}
