//! Embedded image decoding.
//!
//! Turns image XObjects and inline images into 8-bit RGB samples (plus
//! optional alpha) regardless of the source bit depth, color space, or
//! filter chain. JPEG payloads go through a real codec; raw sample
//! grids are expanded component by component. JPX, CCITT, and JBIG2
//! payloads are reported as unsupported so callers can skip them.

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::DynamicImage;

use crate::error::{Error, Result};
use crate::model::Document;
use crate::object::{Dict, Object, Stream};
use crate::parser::filters;
use crate::raster::state::ColorSpace;

/// Sanity bound on declared pixel count before any allocation.
const MAX_PIXELS: u64 = 1 << 26;

/// A decoded image, ready for placement.
#[derive(Debug, Clone)]
pub enum DecodedImage {
    /// Expanded color samples, row-major, three bytes per pixel, with
    /// an optional one-byte-per-pixel alpha plane from /SMask.
    Pixels {
        width: u32,
        height: u32,
        rgb: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
    /// A 1-bit stencil mask; `true` marks pixels the fill color paints.
    Stencil {
        width: u32,
        height: u32,
        coverage: Vec<bool>,
    },
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        match self {
            DecodedImage::Pixels { width, .. } | DecodedImage::Stencil { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            DecodedImage::Pixels { height, .. } | DecodedImage::Stencil { height, .. } => *height,
        }
    }
}

/// Decode an image stream, XObject or inline.
///
/// `resources` is consulted when an inline image's /CS names a color
/// space resource instead of a device family.
pub fn decode_image(
    doc: &Document,
    stream: &Stream,
    resources: Option<&Dict>,
) -> Result<DecodedImage> {
    let dict = normalized_dict(doc, &stream.dict)?;
    let mut decoded = decode_base(doc, &dict, &stream.data, resources)?;
    if let DecodedImage::Pixels {
        width,
        height,
        alpha,
        ..
    } = &mut decoded
    {
        if alpha.is_none() {
            *alpha = soft_mask_alpha(doc, &dict, *width, *height)?;
        }
    }
    Ok(decoded)
}

/// Decode without attaching /SMask, which is how soft masks themselves
/// are decoded.
fn decode_base(
    doc: &Document,
    dict: &Dict,
    raw: &[u8],
    resources: Option<&Dict>,
) -> Result<DecodedImage> {
    let width = dict.get_int("Width").unwrap_or(0);
    let height = dict.get_int("Height").unwrap_or(0);
    if width <= 0 || height <= 0 {
        return Err(Error::malformed("image with zero extent"));
    }
    if width as u64 * height as u64 > MAX_PIXELS {
        return Err(Error::malformed(format!(
            "image extent {width}x{height} exceeds sanity bound"
        )));
    }
    let width = width as u32;
    let height = height as u32;

    let (payload, codec) = decode_payload(dict, raw)?;
    if let Some(codec) = codec {
        return match codec.as_str() {
            "DCTDecode" | "DCT" => decode_jpeg(&payload),
            other => Err(Error::unsupported(format!("image codec {other}"))),
        };
    }

    if matches!(dict.get("ImageMask"), Some(Object::Boolean(true))) {
        return Ok(decode_stencil(width, height, dict, &payload));
    }
    decode_samples(doc, dict, resources, width, height, &payload)
}

/// Run the filter chain up to (not including) a terminal image codec.
fn decode_payload(dict: &Dict, data: &[u8]) -> Result<(Vec<u8>, Option<String>)> {
    let mut current = data.to_vec();
    for (name, parms) in filters::filter_chain(dict) {
        if filters::is_image_codec(&name) {
            return Ok((current, Some(name)));
        }
        current = filters::apply_filter(&name, parms.as_ref(), &current)?;
    }
    Ok((current, None))
}

/// Resolve references and expand the inline-image key abbreviations so
/// the rest of the decoder sees one dictionary shape.
fn normalized_dict(doc: &Document, dict: &Dict) -> Result<Dict> {
    let mut out = Dict::new();
    for (key, value) in dict.iter() {
        let full = match key.as_str() {
            "W" => "Width",
            "H" => "Height",
            "BPC" => "BitsPerComponent",
            "CS" => "ColorSpace",
            "D" => "Decode",
            "IM" => "ImageMask",
            "F" => "Filter",
            "DP" => "DecodeParms",
            "I" => "Interpolate",
            other => other,
        };
        // A full-name key wins over its abbreviation.
        if full != key && out.contains(full) {
            continue;
        }
        let value = if matches!(value, Object::Reference(_)) {
            doc.resolve(value)?
        } else {
            value.clone()
        };
        out.set(full, value);
    }
    Ok(out)
}

fn decode_jpeg(payload: &[u8]) -> Result<DecodedImage> {
    let decoder = JpegDecoder::new(Cursor::new(payload))
        .map_err(|e| Error::malformed(format!("JPEG image: {e}")))?;
    let dynamic = DynamicImage::from_decoder(decoder)
        .map_err(|e| Error::malformed(format!("JPEG image: {e}")))?;
    let rgb = dynamic.into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(DecodedImage::Pixels {
        width,
        height,
        rgb: rgb.into_raw(),
        alpha: None,
    })
}

fn decode_stencil(width: u32, height: u32, dict: &Dict, data: &[u8]) -> DecodedImage {
    // Default /Decode [0 1]: sample 0 paints. [1 0] flips that.
    let flipped = dict
        .get_array("Decode")
        .and_then(|d| d.first())
        .and_then(Object::as_number)
        .map(|v| v >= 0.5)
        .unwrap_or(false);
    let row_len = (width as usize).div_ceil(8);
    let mut coverage = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height as usize {
        let row = data.get(y * row_len..(y + 1) * row_len);
        for x in 0..width as usize {
            let bit = match row {
                Some(r) => (r[x / 8] >> (7 - (x % 8))) & 1,
                // Truncated rows stay unpainted.
                None => u8::from(!flipped),
            };
            coverage.push((bit == 0) != flipped);
        }
    }
    DecodedImage::Stencil {
        width,
        height,
        coverage,
    }
}

fn decode_samples(
    doc: &Document,
    dict: &Dict,
    resources: Option<&Dict>,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<DecodedImage> {
    let bpc = match dict.get_int("BitsPerComponent").unwrap_or(8) {
        b @ (1 | 2 | 4 | 8 | 16) => b as u32,
        _ => 8,
    };
    let space = image_color_space(doc, dict, resources)?;
    let ncomp = space.components().clamp(1, 4);
    let max = ((1u64 << bpc) - 1) as f32;
    let indexed = matches!(space, ColorSpace::Indexed { .. });

    // Default decode maps to [0,1] per component, except Indexed where
    // the raw sample is the palette index.
    let ranges = decode_ranges(dict, ncomp).unwrap_or_else(|| {
        if indexed {
            vec![(0.0, max)]
        } else {
            vec![(0.0, 1.0); ncomp]
        }
    });

    let row_len = (width as usize * ncomp * bpc as usize).div_ceil(8);
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    let mut comps = [0.0f32; 4];
    for y in 0..height as usize {
        let start = (y * row_len).min(data.len());
        let end = (start + row_len).min(data.len());
        let mut bits = BitReader::new(&data[start..end]);
        for _ in 0..width {
            for (c, comp) in comps.iter_mut().take(ncomp).enumerate() {
                let raw = bits.read(bpc) as f32;
                let (d0, d1) = ranges.get(c).copied().unwrap_or((0.0, 1.0));
                *comp = d0 + raw * (d1 - d0) / max;
            }
            let [r, g, b] = space.color_from(&comps[..ncomp]).to_rgb8();
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    Ok(DecodedImage::Pixels {
        width,
        height,
        rgb,
        alpha: None,
    })
}

fn decode_ranges(dict: &Dict, ncomp: usize) -> Option<Vec<(f32, f32)>> {
    let arr = dict.get_array("Decode")?;
    if arr.len() < ncomp * 2 {
        return None;
    }
    Some(
        (0..ncomp)
            .map(|i| {
                (
                    arr[2 * i].as_number().unwrap_or(0.0),
                    arr[2 * i + 1].as_number().unwrap_or(1.0),
                )
            })
            .collect(),
    )
}

fn image_color_space(
    doc: &Document,
    dict: &Dict,
    resources: Option<&Dict>,
) -> Result<ColorSpace> {
    let Some(cs_obj) = dict.get("ColorSpace") else {
        return Ok(ColorSpace::DeviceGray);
    };
    match ColorSpace::from_object(doc, cs_obj) {
        Ok(space) => Ok(space),
        Err(err) => {
            // Inline images may name an entry in the page's /ColorSpace
            // resources instead of a device family.
            if let (Object::Name(name), Some(res)) = (cs_obj, resources) {
                if let Ok(Some(Object::Dict(spaces))) = doc.resolve_entry(res, "ColorSpace") {
                    if let Ok(Some(target)) = doc.resolve_entry(&spaces, name) {
                        return ColorSpace::from_object(doc, &target);
                    }
                }
            }
            Err(err)
        }
    }
}

/// Decode /SMask into an alpha plane matching the base image's extent.
fn soft_mask_alpha(
    doc: &Document,
    dict: &Dict,
    width: u32,
    height: u32,
) -> Result<Option<Vec<u8>>> {
    let Some(obj) = dict.get("SMask") else {
        return Ok(None);
    };
    let resolved = doc.resolve(obj)?;
    let Some(stream) = resolved.as_stream() else {
        return Ok(None);
    };
    let mask_dict = normalized_dict(doc, &stream.dict)?;
    match decode_base(doc, &mask_dict, &stream.data, None) {
        Ok(DecodedImage::Pixels {
            width: mw,
            height: mh,
            rgb,
            ..
        }) => {
            let gray: Vec<u8> = rgb.chunks(3).map(|p| p[0]).collect();
            Ok(Some(resample_nearest(&gray, mw, mh, width, height)))
        }
        Ok(DecodedImage::Stencil { .. }) => Ok(None),
        Err(err) => {
            log::warn!("ignoring undecodable soft mask: {err}");
            Ok(None)
        }
    }
}

fn resample_nearest(src: &[u8], sw: u32, sh: u32, dw: u32, dh: u32) -> Vec<u8> {
    if sw == dw && sh == dh {
        return src.to_vec();
    }
    let mut out = Vec::with_capacity(dw as usize * dh as usize);
    for y in 0..dh as u64 {
        let sy = (y * sh as u64 / dh as u64).min(sh as u64 - 1) as usize;
        for x in 0..dw as u64 {
            let sx = (x * sw as u64 / dw as u64).min(sw as u64 - 1) as usize;
            out.push(src.get(sy * sw as usize + sx).copied().unwrap_or(255));
        }
    }
    out
}

/// MSB-first bit cursor; reads past the end yield zero.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    fn read(&mut self, bits: u32) -> u32 {
        let mut value = 0u32;
        for _ in 0..bits {
            let byte = self.pos / 8;
            let bit = self.data.get(byte).map_or(0, |&b| (b >> (7 - self.pos % 8)) & 1);
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::PdfVersion;
    use crate::parser::XrefTable;

    fn doc() -> Document {
        Document::new(Vec::new(), PdfVersion::default(), XrefTable::default())
    }

    fn gray_image(width: i64, height: i64, samples: &[u8]) -> Stream {
        let mut dict = Dict::new();
        dict.set("Type", Object::Name("XObject".into()));
        dict.set("Subtype", Object::Name("Image".into()));
        dict.set("Width", Object::Integer(width));
        dict.set("Height", Object::Integer(height));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("ColorSpace", Object::Name("DeviceGray".into()));
        Stream::new(dict, samples.to_vec())
    }

    #[test]
    fn test_gray_samples_expand_to_rgb() {
        let stream = gray_image(2, 2, &[0x00, 0x40, 0x80, 0xff]);
        let decoded = decode_image(&doc(), &stream, None).unwrap();
        match decoded {
            DecodedImage::Pixels {
                width,
                height,
                rgb,
                alpha,
            } => {
                assert_eq!((width, height), (2, 2));
                assert_eq!(&rgb[0..3], &[0, 0, 0]);
                assert_eq!(&rgb[9..12], &[255, 255, 255]);
                assert!(alpha.is_none());
            }
            other => panic!("expected pixels, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_array_inverts_gray() {
        let mut stream = gray_image(1, 1, &[0x00]);
        stream.dict.set(
            "Decode",
            Object::Array(vec![Object::Real(1.0), Object::Real(0.0)]),
        );
        let decoded = decode_image(&doc(), &stream, None).unwrap();
        match decoded {
            DecodedImage::Pixels { rgb, .. } => assert_eq!(&rgb[..], &[255, 255, 255]),
            other => panic!("expected pixels, got {other:?}"),
        }
    }

    #[test]
    fn test_stencil_mask_with_decode_flip() {
        let mut dict = Dict::new();
        dict.set("Width", Object::Integer(4));
        dict.set("Height", Object::Integer(1));
        dict.set("ImageMask", Object::Boolean(true));
        dict.set(
            "Decode",
            Object::Array(vec![Object::Integer(1), Object::Integer(0)]),
        );
        // Bits 1010: with [1 0], ones paint.
        let stream = Stream::new(dict, vec![0b1010_0000]);
        match decode_image(&doc(), &stream, None).unwrap() {
            DecodedImage::Stencil { coverage, .. } => {
                assert_eq!(coverage, vec![true, false, true, false]);
            }
            other => panic!("expected stencil, got {other:?}"),
        }
    }

    #[test]
    fn test_indexed_palette() {
        let palette = vec![255u8, 0, 0, 0, 255, 0];
        let mut dict = Dict::new();
        dict.set("Width", Object::Integer(2));
        dict.set("Height", Object::Integer(1));
        dict.set("BitsPerComponent", Object::Integer(1));
        dict.set(
            "ColorSpace",
            Object::Array(vec![
                Object::Name("Indexed".into()),
                Object::Name("DeviceRGB".into()),
                Object::Integer(1),
                Object::String(palette),
            ]),
        );
        let stream = Stream::new(dict, vec![0b0100_0000]);
        match decode_image(&doc(), &stream, None).unwrap() {
            DecodedImage::Pixels { rgb, .. } => {
                assert_eq!(&rgb[0..3], &[255, 0, 0]);
                assert_eq!(&rgb[3..6], &[0, 255, 0]);
            }
            other => panic!("expected pixels, got {other:?}"),
        }
    }

    #[test]
    fn test_inline_abbreviations() {
        let mut dict = Dict::new();
        dict.set("W", Object::Integer(1));
        dict.set("H", Object::Integer(1));
        dict.set("BPC", Object::Integer(8));
        dict.set("CS", Object::Name("G".into()));
        let stream = Stream::new(dict, vec![0x80]);
        match decode_image(&doc(), &stream, None).unwrap() {
            DecodedImage::Pixels { rgb, .. } => assert_eq!(rgb.len(), 3),
            other => panic!("expected pixels, got {other:?}"),
        }
    }

    #[test]
    fn test_soft_mask_attaches_alpha() {
        let mask = gray_image(2, 2, &[0, 85, 170, 255]);
        let mut stream = gray_image(2, 2, &[10, 20, 30, 40]);
        stream.dict.set("SMask", Object::Stream(mask));
        match decode_image(&doc(), &stream, None).unwrap() {
            DecodedImage::Pixels { alpha, .. } => {
                assert_eq!(alpha, Some(vec![0, 85, 170, 255]));
            }
            other => panic!("expected pixels, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_samples_decode_black() {
        let stream = gray_image(2, 2, &[0xff]);
        match decode_image(&doc(), &stream, None).unwrap() {
            DecodedImage::Pixels { rgb, .. } => {
                assert_eq!(rgb.len(), 12);
                assert_eq!(&rgb[0..3], &[255, 255, 255]);
                // Missing bytes read as zero samples.
                assert_eq!(&rgb[9..12], &[0, 0, 0]);
            }
            other => panic!("expected pixels, got {other:?}"),
        }
    }

    #[test]
    fn test_jpeg_payload_round_trip() {
        let mut jpeg = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 90);
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 40, 40]));
        encoder.encode_image(&img).unwrap();

        let mut dict = Dict::new();
        dict.set("Width", Object::Integer(8));
        dict.set("Height", Object::Integer(8));
        dict.set("ColorSpace", Object::Name("DeviceRGB".into()));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("Filter", Object::Name("DCTDecode".into()));
        let stream = Stream::new(dict, jpeg);

        match decode_image(&doc(), &stream, None).unwrap() {
            DecodedImage::Pixels { width, height, rgb, .. } => {
                assert_eq!((width, height), (8, 8));
                let r = rgb[0] as i32;
                assert!((r - 200).abs() < 24, "red channel {r}");
            }
            other => panic!("expected pixels, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_codec_reported() {
        let mut dict = Dict::new();
        dict.set("Width", Object::Integer(1));
        dict.set("Height", Object::Integer(1));
        dict.set("Filter", Object::Name("JPXDecode".into()));
        let stream = Stream::new(dict, vec![0u8; 4]);
        assert!(matches!(
            decode_image(&doc(), &stream, None),
            Err(Error::UnsupportedDocument(_))
        ));
    }

    #[test]
    fn test_zero_extent_rejected() {
        let stream = gray_image(0, 5, &[]);
        assert!(decode_image(&doc(), &stream, None).is_err());
    }
}
