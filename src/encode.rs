//! Raster encoding into the delivery formats.
//!
//! The encoder is the last stage of the render pipeline: it takes a
//! finished [`Pixmap`], applies the edge cap if the caller rendered
//! larger than requested, and serializes to WebP, JPEG, or PNG at the
//! requested quality. Quality steers the lossy encoders directly and
//! picks the compression effort for PNG. RGBA buffers keep their alpha
//! through PNG and WebP; JPEG flattens onto white.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};

use crate::error::{Error, Result};
use crate::options::{ImageFormat, Quality};
use crate::raster::pixmap::{PixelFormat, Pixmap};

/// One encoded raster, with the dimensions actually written.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Encode `pixmap`, downscaling first when its longer edge exceeds
/// `max_edge` (0 disables the cap). The render path sizes pixmaps to
/// the cap already, so the resize only triggers for direct callers.
pub fn encode(
    pixmap: &Pixmap,
    format: ImageFormat,
    quality: Quality,
    max_edge: u32,
) -> Result<EncodedImage> {
    // JPEG has no alpha channel, so an RGBA buffer flattens onto white
    // there; PNG and WebP carry the channel through.
    if pixmap.format() == PixelFormat::Rgba8 && format != ImageFormat::Jpeg {
        let mut rgba: RgbaImage = pixmap.to_rgba_image();
        if let Some((w, h)) = capped_size(rgba.width(), rgba.height(), max_edge) {
            rgba = image::imageops::resize(&rgba, w, h, FilterType::Triangle);
        }
        let (width, height) = rgba.dimensions();
        let data = if format == ImageFormat::Png {
            encode_png(rgba.as_raw(), width, height, ExtendedColorType::Rgba8, quality)?
        } else {
            webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                .encode(quality.value() as f32)
                .to_vec()
        };
        return Ok(EncodedImage {
            width,
            height,
            data,
        });
    }

    let mut rgb = pixmap.to_rgb_image();
    if let Some((w, h)) = capped_size(rgb.width(), rgb.height(), max_edge) {
        rgb = image::imageops::resize(&rgb, w, h, FilterType::Triangle);
    }
    let (width, height) = rgb.dimensions();
    let data = match format {
        ImageFormat::Jpeg => encode_jpeg(&rgb, quality)?,
        ImageFormat::Png => encode_png(rgb.as_raw(), width, height, ExtendedColorType::Rgb8, quality)?,
        ImageFormat::Webp => {
            webp::Encoder::from_rgb(rgb.as_raw(), width, height)
                .encode(quality.value() as f32)
                .to_vec()
        }
    };
    Ok(EncodedImage {
        width,
        height,
        data,
    })
}

/// Target dimensions under the edge cap, or `None` when no resize is
/// needed (cap disabled or already within it).
fn capped_size(width: u32, height: u32, max_edge: u32) -> Option<(u32, u32)> {
    if max_edge == 0 {
        return None;
    }
    let longer = width.max(height);
    if longer <= max_edge {
        return None;
    }
    let scale = max_edge as f32 / longer as f32;
    let w = ((width as f32 * scale).round() as u32).max(1);
    let h = ((height as f32 * scale).round() as u32).max(1);
    Some((w, h))
}

fn encode_jpeg(rgb: &RgbImage, quality: Quality) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    // The JPEG scale starts at 1.
    let q = quality.value().max(1);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, q);
    encoder
        .encode_image(rgb)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(out)
}

fn encode_png(
    samples: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
    quality: Quality,
) -> Result<Vec<u8>> {
    // PNG is lossless; quality picks how hard deflate tries.
    let compression = match quality.value() {
        0..=29 => CompressionType::Fast,
        30..=79 => CompressionType::Default,
        _ => CompressionType::Best,
    };
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, compression, PngFilter::Adaptive);
    encoder
        .write_image(samples, width, height, color)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::pixmap::PixelFormat;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Pixmap {
        let mut pm = Pixmap::new(width, height, PixelFormat::Rgb8);
        pm.fill(rgb);
        pm
    }

    fn gradient(width: u32, height: u32) -> Pixmap {
        let mut pm = Pixmap::new(width, height, PixelFormat::Rgb8);
        for y in 0..height {
            for x in 0..width {
                let v = ((x * 255) / width.max(1)) as u8;
                pm.set_pixel(x, y, [v, 255 - v, (y * 7 % 256) as u8]);
            }
        }
        pm
    }

    #[test]
    fn test_png_round_trip_is_exact() {
        let pm = solid(16, 9, [10, 200, 30]);
        let encoded = encode(&pm, ImageFormat::Png, Quality::default(), 0).unwrap();
        assert_eq!((encoded.width, encoded.height), (16, 9));

        let decoded = image::load_from_memory(&encoded.data).unwrap().into_rgb8();
        assert_eq!(decoded.dimensions(), (16, 9));
        assert_eq!(decoded.get_pixel(8, 4).0, [10, 200, 30]);
    }

    #[test]
    fn test_jpeg_round_trip_close() {
        let pm = solid(20, 20, [180, 60, 60]);
        let encoded = encode(&pm, ImageFormat::Jpeg, Quality::new(90), 0).unwrap();
        assert!(encoded.data.starts_with(&[0xff, 0xd8]));

        let decoded = image::load_from_memory(&encoded.data).unwrap().into_rgb8();
        let px = decoded.get_pixel(10, 10).0;
        assert!((px[0] as i32 - 180).abs() < 16, "got {px:?}");
    }

    #[test]
    fn test_webp_container_magic() {
        let pm = solid(8, 8, [0, 0, 255]);
        let encoded = encode(&pm, ImageFormat::Webp, Quality::new(75), 0).unwrap();
        assert_eq!(&encoded.data[0..4], b"RIFF");
        assert_eq!(&encoded.data[8..12], b"WEBP");
    }

    #[test]
    fn test_edge_cap_downscales() {
        let pm = solid(100, 50, [1, 2, 3]);
        let encoded = encode(&pm, ImageFormat::Png, Quality::default(), 10).unwrap();
        assert_eq!((encoded.width, encoded.height), (10, 5));
    }

    #[test]
    fn test_edge_cap_zero_keeps_native() {
        let pm = solid(100, 50, [1, 2, 3]);
        let encoded = encode(&pm, ImageFormat::Png, Quality::default(), 0).unwrap();
        assert_eq!((encoded.width, encoded.height), (100, 50));
    }

    #[test]
    fn test_jpeg_quality_monotonic_on_gradient() {
        let pm = gradient(64, 64);
        let low = encode(&pm, ImageFormat::Jpeg, Quality::new(10), 0).unwrap();
        let high = encode(&pm, ImageFormat::Jpeg, Quality::new(95), 0).unwrap();
        assert!(
            low.data.len() <= high.data.len(),
            "q10 {} > q95 {}",
            low.data.len(),
            high.data.len()
        );
    }

    fn translucent(width: u32, height: u32) -> Pixmap {
        let mut pm = Pixmap::new(width, height, PixelFormat::Rgba8);
        for y in 0..height {
            for x in 0..width {
                pm.set_pixel_rgba(x, y, [200, 40, 40, 128]);
            }
        }
        pm
    }

    #[test]
    fn test_png_keeps_rgba_alpha() {
        let encoded = encode(&translucent(8, 8), ImageFormat::Png, Quality::default(), 0).unwrap();

        let decoded = image::load_from_memory(&encoded.data).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgba8);
        assert_eq!(decoded.into_rgba8().get_pixel(4, 4).0, [200, 40, 40, 128]);
    }

    #[test]
    fn test_webp_keeps_rgba_alpha() {
        let encoded = encode(&translucent(8, 8), ImageFormat::Webp, Quality::new(75), 0).unwrap();
        // Lossy WebP with an alpha plane uses the extended container.
        assert_eq!(&encoded.data[12..16], b"VP8X");
    }

    #[test]
    fn test_jpeg_flattens_rgba_onto_white() {
        let mut pm = Pixmap::new(8, 8, PixelFormat::Rgba8);
        for y in 0..8 {
            for x in 0..8 {
                pm.set_pixel_rgba(x, y, [0, 0, 0, 0]);
            }
        }
        let encoded = encode(&pm, ImageFormat::Jpeg, Quality::new(90), 0).unwrap();
        let decoded = image::load_from_memory(&encoded.data).unwrap().into_rgb8();
        // Fully transparent black composites to white, not black.
        assert!(decoded.get_pixel(4, 4).0[0] > 240);
    }

    #[test]
    fn test_edge_cap_applies_to_rgba() {
        let encoded = encode(&translucent(100, 50), ImageFormat::Png, Quality::default(), 10)
            .unwrap();
        assert_eq!((encoded.width, encoded.height), (10, 5));
        let decoded = image::load_from_memory(&encoded.data).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgba8);
    }

    #[test]
    fn test_quality_zero_encodes() {
        let pm = solid(4, 4, [128, 128, 128]);
        for format in [ImageFormat::Webp, ImageFormat::Jpeg, ImageFormat::Png] {
            let encoded = encode(&pm, format, Quality::new(0), 0).unwrap();
            assert!(!encoded.data.is_empty());
        }
    }
}
