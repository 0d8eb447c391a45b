//! Stream filter decoding.
//!
//! Handles the data filters a structural parser needs (Flate, ASCIIHex,
//! ASCII85, RunLength, with PNG/TIFF predictors). Image codec filters
//! (DCTDecode and friends) are classified here but decoded by the image
//! layer, which hands them to a real codec.

use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// Filters whose payload is a self-contained compressed image.
pub fn is_image_codec(name: &str) -> bool {
    matches!(
        name,
        "DCTDecode" | "DCT" | "JPXDecode" | "CCITTFaxDecode" | "CCF" | "JBIG2Decode"
    )
}

/// The stream's filter chain with per-filter decode parameters.
///
/// `/Filter` may be a single name or an array; `/DecodeParms` mirrors that
/// shape. Indirect references must already be resolved by the caller.
pub fn filter_chain(dict: &Dict) -> Vec<(String, Option<Dict>)> {
    let filters: Vec<String> = match dict.get("Filter").or_else(|| dict.get("F")) {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    let parms: Vec<Option<Dict>> = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(Object::Dict(d)) => vec![Some(d.clone())],
        Some(Object::Array(items)) => items.iter().map(|o| o.as_dict().cloned()).collect(),
        _ => Vec::new(),
    };
    filters
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, parms.get(i).cloned().flatten()))
        .collect()
}

/// Fully decode a non-image stream (content, xref, object stream).
///
/// Fails with `UnsupportedDocument` when the chain contains an image
/// codec or an unimplemented filter.
pub fn decode_stream(dict: &Dict, data: &[u8]) -> Result<Vec<u8>> {
    let mut current = data.to_vec();
    for (name, parms) in filter_chain(dict) {
        current = apply_filter(&name, parms.as_ref(), &current)?;
    }
    Ok(current)
}

/// Apply one named filter to `data`.
pub fn apply_filter(name: &str, parms: Option<&Dict>, data: &[u8]) -> Result<Vec<u8>> {
    match name {
        "FlateDecode" | "Fl" => {
            let inflated = inflate(data)?;
            apply_predictor(parms, inflated)
        }
        "ASCIIHexDecode" | "AHx" => decode_ascii_hex(data),
        "ASCII85Decode" | "A85" => decode_ascii85(data),
        "RunLengthDecode" | "RL" => decode_run_length(data),
        other if is_image_codec(other) => Err(Error::unsupported(format!(
            "image codec filter {other} in data stream"
        ))),
        other => Err(Error::unsupported(format!("stream filter {other}"))),
    }
}

/// Inflate zlib data, falling back to a raw deflate stream when the zlib
/// header is missing or corrupt.
fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(_) => {
            out.clear();
            DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| Error::malformed(format!("flate decode failed: {e}")))?;
            Ok(out)
        }
    }
}

/// Undo a TIFF (2) or PNG (10..15) predictor declared in `/DecodeParms`.
fn apply_predictor(parms: Option<&Dict>, data: Vec<u8>) -> Result<Vec<u8>> {
    let parms = match parms {
        Some(p) => p,
        None => return Ok(data),
    };
    let predictor = parms.get_int("Predictor").unwrap_or(1);
    if predictor <= 1 {
        return Ok(data);
    }
    let colors = parms.get_int("Colors").unwrap_or(1).max(1) as usize;
    let bpc = parms.get_int("BitsPerComponent").unwrap_or(8).max(1) as usize;
    let columns = parms.get_int("Columns").unwrap_or(1).max(1) as usize;
    let bpp = (colors * bpc).div_ceil(8).max(1);
    let row_len = (colors * bpc * columns).div_ceil(8);

    if predictor == 2 {
        return Ok(tiff_predictor(data, bpp, row_len, bpc));
    }

    // PNG predictors: each row is prefixed with its filter type byte.
    let stride = row_len + 1;
    let mut out = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_len];
    for chunk in data.chunks(stride) {
        if chunk.len() < 2 {
            break;
        }
        let filter = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);
        match filter {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let up = prev_row[i];
                    let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => {
                return Err(Error::malformed(format!(
                    "unknown PNG predictor row filter {other}"
                )))
            }
        }
        out.extend_from_slice(&row);
        prev_row = row;
    }
    Ok(out)
}

fn tiff_predictor(mut data: Vec<u8>, bpp: usize, row_len: usize, bpc: usize) -> Vec<u8> {
    // Only the byte-aligned case is differenced per component; sub-byte
    // samples pass through, which matches how writers actually use it.
    if bpc != 8 {
        return data;
    }
    for row in data.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    data
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn decode_ascii_hex(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;
    for &b in data {
        if b == b'>' {
            break;
        }
        if super::lexer::is_whitespace(b) {
            continue;
        }
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => {
                return Err(Error::malformed(format!(
                    "invalid ASCIIHex digit {:?}",
                    b as char
                )))
            }
        };
        match pending.take() {
            Some(hi) => out.push(hi * 16 + digit),
            None => pending = Some(digit),
        }
    }
    if let Some(hi) = pending {
        out.push(hi * 16);
    }
    Ok(out)
}

fn decode_ascii85(data: &[u8]) -> Result<Vec<u8>> {
    let mut input = data;
    if input.starts_with(b"<~") {
        input = &input[2..];
    }
    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0usize;
    let mut i = 0usize;
    while i < input.len() {
        let b = input[i];
        i += 1;
        if super::lexer::is_whitespace(b) {
            continue;
        }
        if b == b'~' {
            break;
        }
        if b == b'z' && count == 0 {
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        if !(b'!'..=b'u').contains(&b) {
            return Err(Error::malformed(format!(
                "invalid ASCII85 byte {:?}",
                b as char
            )));
        }
        group[count] = b - b'!';
        count += 1;
        if count == 5 {
            let value = group.iter().fold(0u32, |acc, &d| {
                acc.wrapping_mul(85).wrapping_add(d as u32)
            });
            out.extend_from_slice(&value.to_be_bytes());
            count = 0;
        }
    }
    if count > 0 {
        // Partial group: pad with 'u', emit count-1 bytes.
        if count == 1 {
            return Err(Error::malformed("truncated ASCII85 group"));
        }
        for slot in group.iter_mut().skip(count) {
            *slot = 84;
        }
        let value = group.iter().fold(0u32, |acc, &d| {
            acc.wrapping_mul(85).wrapping_add(d as u32)
        });
        out.extend_from_slice(&value.to_be_bytes()[..count - 1]);
    }
    Ok(out)
}

fn decode_run_length(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let n = length as usize + 1;
                if i + n > data.len() {
                    return Err(Error::malformed("truncated RunLength literal"));
                }
                out.extend_from_slice(&data[i..i + n]);
                i += n;
            }
            129..=255 => {
                if i >= data.len() {
                    return Err(Error::malformed("truncated RunLength repeat"));
                }
                let n = 257 - length as usize;
                out.extend(std::iter::repeat(data[i]).take(n));
                i += 1;
            }
        }
    }
    Ok(out)
}
