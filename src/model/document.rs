//! Document-level types: the loaded document and its metadata.

use crate::detect::PdfVersion;
use crate::error::{Error, Result};
use crate::model::Page;
use crate::object::{Dict, Object, ObjectId, Stream};
use crate::parser::filters;
use crate::parser::lexer::Lexer;
use crate::parser::xref::{XrefEntry, XrefTable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Reference chains longer than this are treated as cycles.
const MAX_RESOLVE_DEPTH: usize = 32;

/// A loaded PDF document.
///
/// Owns the source bytes and the cross-reference index; indirect objects
/// are parsed on demand from the byte buffer, never cached, so a shared
/// `&Document` is safe to read from multiple threads at once.
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) data: Vec<u8>,
    pub(crate) version: PdfVersion,
    pub(crate) xref: XrefTable,
    pub(crate) pages: Vec<Page>,
    pub(crate) info: DocumentInfo,
}

impl Document {
    pub(crate) fn new(data: Vec<u8>, version: PdfVersion, xref: XrefTable) -> Self {
        Document {
            data,
            version,
            xref,
            pages: Vec::new(),
            info: DocumentInfo::default(),
        }
    }

    /// Header version, e.g. 1.7.
    pub fn version(&self) -> PdfVersion {
        self.version
    }

    /// Document metadata from the trailer's /Info dictionary.
    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Get a page by zero-based index.
    pub fn page(&self, index: usize) -> Result<&Page> {
        self.pages
            .get(index)
            .ok_or(Error::PageOutOfRange(index, self.pages.len()))
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub(crate) fn trailer(&self) -> &Dict {
        &self.xref.trailer
    }

    /// Parse the indirect object `id` from the source bytes.
    ///
    /// Dangling references (absent or freed entries, offsets pointing at
    /// something else) are a structural error.
    pub fn object(&self, id: ObjectId) -> Result<Object> {
        match self.xref.get(id.0) {
            Some(&XrefEntry::InUse { offset, .. }) => {
                if offset as usize >= self.data.len() {
                    return Err(Error::malformed(format!(
                        "object {} offset {offset} beyond end of file",
                        id.0
                    )));
                }
                let mut lexer = Lexer::at(&self.data, offset as usize);
                let ((num, _), object) = lexer.parse_indirect_object()?;
                if num != id.0 {
                    return Err(Error::malformed(format!(
                        "offset for object {} holds object {num}",
                        id.0
                    )));
                }
                Ok(object)
            }
            Some(&XrefEntry::InStream { stream, index }) => {
                self.object_from_stream(id.0, stream, index)
            }
            Some(&XrefEntry::Free) | None => Err(Error::malformed(format!(
                "dangling reference to object {} {}",
                id.0, id.1
            ))),
        }
    }

    /// Pull a compressed object out of its `/Type /ObjStm` container.
    fn object_from_stream(&self, num: u32, container: u32, index: u32) -> Result<Object> {
        let container_obj = self.object((container, 0))?;
        let stream = container_obj
            .as_stream()
            .ok_or_else(|| Error::malformed(format!("object stream {container} is not a stream")))?;
        let decoded = self.stream_data(stream)?;
        let count = stream
            .dict
            .get_int("N")
            .ok_or_else(|| Error::malformed("object stream missing /N"))?;
        let first = stream
            .dict
            .get_int("First")
            .ok_or_else(|| Error::malformed("object stream missing /First"))?
            as usize;

        // Header: N pairs of "objnum offset" before the object area.
        // Matching by object number is authoritative; the table index from
        // the cross-reference entry is the fallback for sloppy writers.
        let mut header = Lexer::new(&decoded);
        let mut found = None;
        let mut by_index = None;
        for i in 0..count {
            let obj_num = match header.parse_number()? {
                Object::Integer(n) if n >= 0 => n as u32,
                _ => return Err(Error::malformed("bad object stream header")),
            };
            let obj_off = match header.parse_number()? {
                Object::Integer(n) if n >= 0 => n as usize,
                _ => return Err(Error::malformed("bad object stream header")),
            };
            if obj_num == num {
                found = Some(obj_off);
                break;
            }
            if i == index as i64 {
                by_index = Some(obj_off);
            }
        }
        let offset = found.or(by_index).ok_or_else(|| {
            Error::malformed(format!("object {num} not found in object stream {container}"))
        })?;
        let start = first + offset;
        if start >= decoded.len() {
            return Err(Error::malformed("object stream offset out of range"));
        }
        Lexer::at(&decoded, start).parse_object()
    }

    /// Follow reference chains until a direct object is reached.
    pub fn resolve(&self, object: &Object) -> Result<Object> {
        let mut current = object.clone();
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Object::Reference(id) => current = self.object(id)?,
                direct => return Ok(direct),
            }
        }
        Err(Error::malformed("reference chain too deep"))
    }

    /// Resolve `dict[key]`, following references.
    pub fn resolve_entry(&self, dict: &Dict, key: &str) -> Result<Option<Object>> {
        match dict.get(key) {
            Some(value) => Ok(Some(self.resolve(value)?)),
            None => Ok(None),
        }
    }

    /// Decode a stream's payload through its filter chain.
    ///
    /// `/Filter` and `/DecodeParms` given as references are resolved first.
    pub fn stream_data(&self, stream: &Stream) -> Result<Vec<u8>> {
        let dict = self.resolved_stream_dict(&stream.dict)?;
        filters::decode_stream(&dict, &stream.data)
    }

    pub(crate) fn resolved_stream_dict(&self, dict: &Dict) -> Result<Dict> {
        let mut out = dict.clone();
        for key in ["Filter", "DecodeParms", "F", "DP", "Length"] {
            if let Some(value) = dict.get(key) {
                if matches!(value, Object::Reference(_)) {
                    out.set(key, self.resolve(value)?);
                }
            }
        }
        Ok(out)
    }

    /// Materialize the full object arena, e.g. before rewriting the file.
    ///
    /// Entries that fail to parse are skipped with a warning; they were
    /// unreadable in the source as well.
    pub(crate) fn load_all_objects(&self) -> BTreeMap<ObjectId, Object> {
        let mut objects = BTreeMap::new();
        for num in 1..=self.xref.max_object_number() {
            match self.xref.get(num) {
                Some(XrefEntry::InUse { gen, .. }) => {
                    let id = (num, *gen);
                    match self.object(id) {
                        Ok(object) => {
                            objects.insert(id, object);
                        }
                        Err(err) => log::warn!("skipping unreadable object {num}: {err}"),
                    }
                }
                Some(XrefEntry::InStream { .. }) => match self.object((num, 0)) {
                    Ok(object) => {
                        objects.insert((num, 0), object);
                    }
                    Err(err) => log::warn!("skipping unreadable object {num}: {err}"),
                },
                _ => {}
            }
        }
        objects
    }
}

/// Document metadata, assembled from the trailer's /Info dictionary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentInfo {
    /// Document title
    pub title: Option<String>,

    /// Document author
    pub author: Option<String>,

    /// Document subject
    pub subject: Option<String>,

    /// Keywords
    pub keywords: Option<String>,

    /// Creator application
    pub creator: Option<String>,

    /// PDF producer
    pub producer: Option<String>,

    /// Creation date
    pub created: Option<DateTime<Utc>>,

    /// Last modification date
    pub modified: Option<DateTime<Utc>>,

    /// PDF version (e.g., "1.7")
    pub pdf_version: String,

    /// Total number of pages
    pub page_count: usize,

    /// Whether the trailer declares an encryption handler (only the
    /// null handler passes loading)
    pub encrypted: bool,
}

impl DocumentInfo {
    pub(crate) fn from_info_dict(dict: &Dict) -> Self {
        DocumentInfo {
            title: get_text(dict, "Title"),
            author: get_text(dict, "Author"),
            subject: get_text(dict, "Subject"),
            keywords: get_text(dict, "Keywords"),
            creator: get_text(dict, "Creator"),
            producer: get_text(dict, "Producer"),
            created: get_text(dict, "CreationDate").and_then(|s| parse_pdf_date(&s)),
            modified: get_text(dict, "ModDate").and_then(|s| parse_pdf_date(&s)),
            ..DocumentInfo::default()
        }
    }
}

/// Decode a text entry: UTF-16BE when BOM-prefixed, else UTF-8/Latin-1.
fn get_text(dict: &Dict, key: &str) -> Option<String> {
    match dict.get(key)? {
        Object::String(bytes) => {
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let utf16: Vec<u16> = bytes[2..]
                    .chunks(2)
                    .filter_map(|c| {
                        if c.len() == 2 {
                            Some(u16::from_be_bytes([c[0], c[1]]))
                        } else {
                            None
                        }
                    })
                    .collect();
                String::from_utf16(&utf16).ok()
            } else {
                String::from_utf8(bytes.clone())
                    .ok()
                    .or_else(|| Some(bytes.iter().map(|&b| b as char).collect()))
            }
        }
        Object::Name(name) => Some(name.clone()),
        _ => None,
    }
}

/// Parse a PDF date string (D:YYYYMMDDHHmmSSOHH'mm').
pub(crate) fn parse_pdf_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.strip_prefix("D:")?;

    // At minimum we need YYYY
    if s.len() < 4 {
        return None;
    }

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(4..6).and_then(|m| m.parse().ok()).unwrap_or(1);
    let day: u32 = s.get(6..8).and_then(|d| d.parse().ok()).unwrap_or(1);
    let hour: u32 = s.get(8..10).and_then(|h| h.parse().ok()).unwrap_or(0);
    let minute: u32 = s.get(10..12).and_then(|m| m.parse().ok()).unwrap_or(0);
    let second: u32 = s.get(12..14).and_then(|s| s.parse().ok()).unwrap_or(0);

    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_pdf_date() {
        let date = parse_pdf_date("D:20240115103045").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert_eq!(date.day(), 15);
    }

    #[test]
    fn test_parse_pdf_date_minimal() {
        let date = parse_pdf_date("D:2024").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert_eq!(date.day(), 1);
    }

    #[test]
    fn test_get_text_utf16() {
        let mut dict = Dict::new();
        dict.set(
            "Title",
            Object::String(vec![0xFE, 0xFF, 0x00, b'H', 0x00, b'i']),
        );
        assert_eq!(get_text(&dict, "Title"), Some("Hi".to_string()));
    }

    #[test]
    fn test_get_text_latin1() {
        let mut dict = Dict::new();
        dict.set("Author", Object::String(vec![b'M', 0xFC, b'l', b'l']));
        assert_eq!(get_text(&dict, "Author"), Some("Müll".to_string()));
    }
}
