//! Document recompression.
//!
//! [`recompress`] walks every raster image reachable from the page tree,
//! re-encodes each one at the requested quality within its original
//! format family (lossy stays lossy, lossless stays lossless), keeps
//! whichever payload is smaller, and serializes a fresh single-revision
//! file. Non-image objects pass through byte-for-byte; pixel dimensions
//! are never changed.

pub mod writer;

use std::collections::HashSet;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde::Serialize;

use crate::error::Result;
use crate::images::{self, DecodedImage};
use crate::model::Document;
use crate::object::{Dict, Object, ObjectId, Stream};
use crate::options::Quality;
use crate::parser::filters;
use crate::raster::state::ColorSpace;

/// Form XObject resource chains deeper than this stop the scan.
const MAX_SCAN_DEPTH: usize = 16;

/// What one recompression run did, for logging and the CLI summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressStats {
    /// Raster images reachable from the page tree.
    pub images_seen: usize,
    /// Images whose payload was replaced with a smaller re-encode.
    pub images_recompressed: usize,
    /// Images kept as-is (already smaller, or a codec we pass through).
    pub images_kept: usize,
    /// Input file size in bytes.
    pub bytes_in: u64,
    /// Output file size in bytes.
    pub bytes_out: u64,
}

/// One embedded image as seen by the reachability scan.
#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    /// Object and generation number in the source file.
    pub object: (u32, u16),
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    pub bits_per_component: u8,
    /// Terminal stream filter, e.g. `DCTDecode`; `None` for raw samples.
    pub filter: Option<String>,
    /// Encoded payload size in bytes.
    pub encoded_len: usize,
}

/// Re-encode the document's embedded raster images at `quality` and
/// serialize a new file. Output never exceeds the size a pass-through of
/// every image would produce: a re-encoded candidate only replaces the
/// original when it is strictly smaller.
pub fn recompress(doc: &Document, quality: Quality) -> Result<(Vec<u8>, CompressStats)> {
    let ids = reachable_images(doc)?;
    let mut objects = doc.load_all_objects();

    // Cross-reference streams and object-stream containers describe the
    // source file's layout; the serializer writes a classic table over
    // plain objects, so the containers must not survive.
    objects.retain(|_, object| {
        !matches!(
            object.as_dict().and_then(Dict::type_name),
            Some("XRef") | Some("ObjStm")
        )
    });

    let mut stats = CompressStats {
        images_seen: ids.len(),
        bytes_in: doc.data.len() as u64,
        ..CompressStats::default()
    };

    for id in &ids {
        let Some(Object::Stream(stream)) = objects.get(id) else {
            continue;
        };
        match transcode(doc, stream, quality) {
            Some(candidate) if candidate.data.len() < stream.data.len() => {
                log::debug!(
                    "object {}: {} -> {} bytes",
                    id.0,
                    stream.data.len(),
                    candidate.data.len()
                );
                objects.insert(*id, Object::Stream(candidate));
                stats.images_recompressed += 1;
            }
            _ => stats.images_kept += 1,
        }
    }

    let mut trailer = Dict::new();
    if let Some(root) = doc.trailer().get("Root") {
        trailer.set("Root", root.clone());
    }
    if let Some(info) = doc.trailer().get("Info") {
        trailer.set("Info", info.clone());
    }

    let bytes = writer::serialize(doc.version(), &objects, &trailer);
    stats.bytes_out = bytes.len() as u64;
    log::info!(
        "recompressed {} of {} images ({} kept): {} -> {} bytes",
        stats.images_recompressed,
        stats.images_seen,
        stats.images_kept,
        stats.bytes_in,
        stats.bytes_out
    );
    Ok((bytes, stats))
}

/// Describe every reachable embedded image without touching its payload.
pub fn scan_images(doc: &Document) -> Result<Vec<ImageSummary>> {
    let mut summaries = Vec::new();
    for id in reachable_images(doc)? {
        if let Ok(Object::Stream(stream)) = doc.object(id) {
            let dict = doc.resolved_stream_dict(&stream.dict)?;
            summaries.push(ImageSummary {
                object: id,
                width: dict.get_int("Width").unwrap_or(0).max(0) as u32,
                height: dict.get_int("Height").unwrap_or(0).max(0) as u32,
                color_space: describe_color_space(&dict),
                bits_per_component: dict.get_int("BitsPerComponent").unwrap_or(8).clamp(0, 16)
                    as u8,
                filter: terminal_filter(&dict),
                encoded_len: stream.data.len(),
            });
        }
    }
    Ok(summaries)
}

/// Image XObjects reachable from any page, plus the /SMask streams
/// hanging off them, in first-seen order.
fn reachable_images(doc: &Document) -> Result<Vec<ObjectId>> {
    let mut found = Vec::new();
    let mut visited = HashSet::new();
    for page in doc.pages() {
        scan_resources(doc, page.resources(), &mut visited, &mut found, 0)?;
    }
    Ok(found)
}

fn scan_resources(
    doc: &Document,
    resources: &Dict,
    visited: &mut HashSet<ObjectId>,
    found: &mut Vec<ObjectId>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_SCAN_DEPTH {
        return Ok(());
    }
    let xobjects = match doc.resolve_entry(resources, "XObject")? {
        Some(Object::Dict(d)) => d,
        _ => return Ok(()),
    };
    for (_, value) in xobjects.iter() {
        // Only indirect streams can be swapped in the arena; a direct
        // stream inside a resource dictionary has no object number.
        let Some(id) = value.as_reference() else {
            continue;
        };
        if !visited.insert(id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.object(id) else {
            continue;
        };
        match stream.dict.get_name("Subtype") {
            Some("Image") => {
                found.push(id);
                if let Some(mask_id) = stream.dict.get_reference("SMask") {
                    if visited.insert(mask_id) {
                        found.push(mask_id);
                    }
                }
            }
            Some("Form") => {
                if let Some(Object::Dict(inner)) =
                    doc.resolve_entry(&stream.dict, "Resources")?
                {
                    scan_resources(doc, &inner, visited, found, depth + 1)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Build a same-family re-encode of `stream`, or `None` when the image
/// must pass through (unsupported codec, stencil, color-key mask, or an
/// undecodable payload).
fn transcode(doc: &Document, stream: &Stream, quality: Quality) -> Option<Stream> {
    let dict = doc.resolved_stream_dict(&stream.dict).ok()?;

    // A color-key /Mask keys on exact sample values; re-encoding would
    // break the transparency.
    if dict.contains("Mask") {
        return None;
    }
    if matches!(dict.get("ImageMask"), Some(Object::Boolean(true))) {
        return None;
    }

    match terminal_filter(&dict).as_deref() {
        Some("DCTDecode") => transcode_lossy(doc, stream, quality),
        Some(codec) if filters::is_image_codec(codec) => None,
        _ => transcode_lossless(doc, stream, &dict),
    }
}

/// Lossy family: decode the JPEG and re-encode at the requested quality.
/// Single-component images stay grayscale so /SMask streams remain valid
/// alpha sources.
fn transcode_lossy(doc: &Document, stream: &Stream, quality: Quality) -> Option<Stream> {
    let gray = stream
        .dict
        .get("ColorSpace")
        .and_then(|cs| ColorSpace::from_object(doc, cs).ok())
        .map(|space| space.components() == 1)
        .unwrap_or(false);

    let decoded = match images::decode_image(doc, stream, None) {
        Ok(DecodedImage::Pixels {
            width,
            height,
            rgb,
            ..
        }) => (width, height, rgb),
        Ok(DecodedImage::Stencil { .. }) => return None,
        Err(err) => {
            log::debug!("keeping undecodable image: {err}");
            return None;
        }
    };
    let (width, height, rgb) = decoded;

    let mut payload = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut payload, quality.value().max(1));
    let result = if gray {
        let luma: Vec<u8> = rgb.chunks(3).map(|px| px[0]).collect();
        encoder.write_image(&luma, width, height, ExtendedColorType::L8)
    } else {
        encoder.write_image(&rgb, width, height, ExtendedColorType::Rgb8)
    };
    if let Err(err) = result {
        log::debug!("keeping image after failed re-encode: {err}");
        return None;
    }

    let mut new_dict = stream.dict.clone();
    new_dict.set(
        "ColorSpace",
        Object::Name(if gray { "DeviceGray" } else { "DeviceRGB" }.into()),
    );
    new_dict.set("BitsPerComponent", Object::Integer(8));
    new_dict.set("Filter", Object::Name("DCTDecode".into()));
    // The re-encoded samples are plain 8-bit device components; the old
    // decode array and filter parameters no longer apply.
    for stale in ["Decode", "DecodeParms", "DP", "F"] {
        new_dict.remove(stale);
    }
    Some(Stream::new(new_dict, payload))
}

/// Lossless family: inflate the original sample grid and re-deflate at
/// best effort. Samples are untouched, so everything that describes them
/// (/ColorSpace, /BitsPerComponent, /Decode) stays.
fn transcode_lossless(doc: &Document, stream: &Stream, dict: &Dict) -> Option<Stream> {
    let raw = match filters::decode_stream(dict, &stream.data) {
        Ok(raw) => raw,
        Err(err) => {
            log::debug!("keeping image with unreadable payload: {err}");
            return None;
        }
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&raw).ok()?;
    let payload = encoder.finish().ok()?;

    let mut new_dict = stream.dict.clone();
    new_dict.set("Filter", Object::Name("FlateDecode".into()));
    // Predictor parameters described the old encoding.
    for stale in ["DecodeParms", "DP", "F"] {
        new_dict.remove(stale);
    }
    Some(Stream::new(new_dict, payload))
}

fn terminal_filter(dict: &Dict) -> Option<String> {
    filters::filter_chain(dict).into_iter().last().map(|(name, _)| name)
}

fn describe_color_space(dict: &Dict) -> String {
    match dict.get("ColorSpace") {
        Some(Object::Name(name)) => name.clone(),
        Some(Object::Array(items)) => items
            .first()
            .and_then(Object::as_name)
            .unwrap_or("?")
            .to_string(),
        _ => "DeviceGray".to_string(),
    }
}
