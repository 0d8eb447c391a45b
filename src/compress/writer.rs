//! PDF serialization.
//!
//! Writes a complete, single-revision file: header, every object in
//! ascending number order, a classic cross-reference table, and a
//! trailer. Output is deterministic for a given object map, which makes
//! repeated recompression runs comparable byte for byte.

use std::collections::BTreeMap;

use crate::detect::PdfVersion;
use crate::object::{Dict, Object, ObjectId, Stream};
use crate::parser::lexer;

/// Marks the file as binary for transfer tools, per convention.
const BINARY_COMMENT: &[u8] = b"%\xe2\xe3\xcf\xd3\n";

/// Serialize `objects` into a complete PDF file. `trailer` should carry
/// /Root and optionally /Info; /Size and the xref are produced here.
pub fn serialize(
    version: PdfVersion,
    objects: &BTreeMap<ObjectId, Object>,
    trailer: &Dict,
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("%PDF-{version}\n").as_bytes());
    out.extend_from_slice(BINARY_COMMENT);

    let mut offsets: BTreeMap<u32, (u64, u16)> = BTreeMap::new();
    for ((num, gen), object) in objects {
        offsets.insert(*num, (out.len() as u64, *gen));
        out.extend_from_slice(format!("{num} {gen} obj\n").as_bytes());
        write_object(&mut out, object);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let max_num = offsets.keys().next_back().copied().unwrap_or(0);
    write_xref(&mut out, &offsets);

    let mut full_trailer = trailer.clone();
    full_trailer.set("Size", Object::Integer(max_num as i64 + 1));
    out.extend_from_slice(b"trailer\n");
    write_object(&mut out, &Object::Dict(full_trailer));
    out.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());
    out
}

/// Classic table with one subsection per contiguous run of object
/// numbers; the free-list head always opens the first run.
fn write_xref(out: &mut Vec<u8>, offsets: &BTreeMap<u32, (u64, u16)>) {
    out.extend_from_slice(b"xref\n");

    let mut entries: Vec<(u32, [u8; 20])> = Vec::with_capacity(offsets.len() + 1);
    let mut head = [0u8; 20];
    head.copy_from_slice(b"0000000000 65535 f \n");
    entries.push((0, head));
    for (&num, &(offset, gen)) in offsets {
        let mut entry = [0u8; 20];
        entry.copy_from_slice(format!("{offset:010} {gen:05} n \n").as_bytes());
        entries.push((num, entry));
    }

    let mut i = 0;
    while i < entries.len() {
        let start = entries[i].0;
        let mut end = i;
        while end + 1 < entries.len() && entries[end + 1].0 == entries[end].0 + 1 {
            end += 1;
        }
        out.extend_from_slice(format!("{start} {}\n", end - i + 1).as_bytes());
        for (_, entry) in &entries[i..=end] {
            out.extend_from_slice(entry);
        }
        i = end + 1;
    }
}

pub(crate) fn write_object(out: &mut Vec<u8>, object: &Object) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(true) => out.extend_from_slice(b"true"),
        Object::Boolean(false) => out.extend_from_slice(b"false"),
        Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Object::Real(r) => write_real(out, *r),
        Object::Name(name) => write_name(out, name),
        Object::String(bytes) => write_string(out, bytes),
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        Object::Dict(dict) => write_dict(out, dict),
        Object::Stream(stream) => write_stream(out, stream),
        Object::Reference((num, gen)) => {
            out.extend_from_slice(format!("{num} {gen} R").as_bytes())
        }
    }
}

fn write_real(out: &mut Vec<u8>, value: f32) {
    // f32 Display never produces an exponent, which PDF forbids.
    if value.is_finite() {
        out.extend_from_slice(value.to_string().as_bytes());
    } else {
        out.push(b'0');
    }
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for &b in name.as_bytes() {
        if b > 0x20 && b < 0x7f && b != b'#' && !lexer::is_delimiter(b) {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    let printable = bytes
        .iter()
        .all(|&b| (0x20..0x7f).contains(&b) && !matches!(b, b'(' | b')' | b'\\'));
    if printable {
        out.push(b'(');
        out.extend_from_slice(bytes);
        out.push(b')');
    } else {
        out.push(b'<');
        for b in bytes {
            out.extend_from_slice(format!("{b:02x}").as_bytes());
        }
        out.push(b'>');
    }
}

fn write_dict(out: &mut Vec<u8>, dict: &Dict) {
    out.extend_from_slice(b"<< ");
    for (key, value) in dict.iter() {
        write_name(out, key);
        out.push(b' ');
        write_object(out, value);
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
}

fn write_stream(out: &mut Vec<u8>, stream: &Stream) {
    let mut dict = stream.dict.clone();
    dict.set("Length", Object::Integer(stream.data.len() as i64));
    write_dict(out, &dict);
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(&stream.data);
    out.extend_from_slice(b"\nendstream");
}
