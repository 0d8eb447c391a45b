//! Cross-reference parsing: classic `xref` tables, cross-reference
//! streams, and the `/Prev` chain that links incremental updates.

use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser::filters;
use crate::parser::lexer::Lexer;
use std::collections::{HashMap, HashSet};

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// On the free list.
    Free,
    /// At a byte offset in the file.
    InUse { offset: u64, gen: u16 },
    /// Compressed inside an object stream, at the given index.
    InStream { stream: u32, index: u32 },
}

/// The merged cross-reference index for a document.
///
/// Sections are parsed newest-first; the first entry seen for an object
/// number wins, which is exactly the incremental-update shadowing rule.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    entries: HashMap<u32, XrefEntry>,
    pub trailer: Dict,
}

/// How far from the end of the file `startxref` may sit.
const STARTXREF_WINDOW: usize = 2048;

impl XrefTable {
    pub fn get(&self, num: u32) -> Option<&XrefEntry> {
        self.entries.get(&num)
    }

    pub fn insert(&mut self, num: u32, entry: XrefEntry) {
        self.entries.entry(num).or_insert(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// Object numbers of every in-stream container, for eager validation.
    pub fn container_streams(&self) -> HashSet<u32> {
        self.entries
            .values()
            .filter_map(|e| match e {
                XrefEntry::InStream { stream, .. } => Some(*stream),
                _ => None,
            })
            .collect()
    }

    /// Parse the whole cross-reference chain of `data`.
    pub fn parse(data: &[u8]) -> Result<XrefTable> {
        let start = find_startxref(data)?;
        let mut table = XrefTable::default();
        let mut visited = HashSet::new();
        let mut next = Some(start);
        while let Some(offset) = next {
            if !visited.insert(offset) {
                return Err(Error::malformed("circular cross-reference chain"));
            }
            next = table.parse_section(data, offset)?;
        }
        if table.trailer.is_empty() {
            return Err(Error::malformed("no trailer dictionary found"));
        }
        Ok(table)
    }

    /// Parse one section at `offset`; returns the `/Prev` offset, if any.
    fn parse_section(&mut self, data: &[u8], offset: u64) -> Result<Option<u64>> {
        if offset as usize >= data.len() {
            return Err(Error::malformed(format!(
                "cross-reference offset {offset} beyond end of file"
            )));
        }
        let mut lexer = Lexer::at(data, offset as usize);
        lexer.skip_whitespace();
        if lexer.try_keyword(b"xref") {
            self.parse_classic_section(data, lexer)
        } else {
            let trailer = self.parse_stream_section(data, offset)?;
            let prev = trailer.get_int("Prev").map(|p| p as u64);
            self.merge_trailer(trailer);
            Ok(prev)
        }
    }

    /// A classic table: subsections of `start count` plus 20-byte entries,
    /// then `trailer << ... >>`. Entries are read as tokens rather than
    /// fixed-width records so single-byte EOL variants still parse.
    fn parse_classic_section(&mut self, data: &[u8], mut lexer: Lexer) -> Result<Option<u64>> {
        loop {
            if lexer.try_keyword(b"trailer") {
                break;
            }
            let start = match lexer.parse_number()? {
                Object::Integer(n) if n >= 0 => n as u32,
                other => {
                    return Err(Error::malformed(format!(
                        "invalid xref subsection start: {other:?}"
                    )))
                }
            };
            let count = match lexer.parse_number()? {
                Object::Integer(n) if n >= 0 => n as u32,
                other => {
                    return Err(Error::malformed(format!(
                        "invalid xref subsection count: {other:?}"
                    )))
                }
            };
            for i in 0..count {
                let offset = match lexer.parse_number()? {
                    Object::Integer(n) if n >= 0 => n as u64,
                    _ => return Err(Error::malformed("invalid xref entry offset")),
                };
                let gen = match lexer.parse_number()? {
                    Object::Integer(n) if (0..=65535).contains(&n) => n as u16,
                    _ => return Err(Error::malformed("invalid xref entry generation")),
                };
                lexer.skip_whitespace();
                let kind = lexer.read_keyword();
                let entry = match kind {
                    b"n" => XrefEntry::InUse { offset, gen },
                    b"f" => XrefEntry::Free,
                    _ => return Err(Error::malformed("invalid xref entry type")),
                };
                self.insert(start + i, entry);
            }
        }
        let trailer = lexer.parse_dict()?;
        let prev = trailer.get_int("Prev").map(|p| p as u64);
        // Hybrid files bridge to a cross-reference stream as well.
        if let Some(xrefstm) = trailer.get_int("XRefStm") {
            let bridged = self.parse_stream_section(data, xrefstm as u64)?;
            self.merge_trailer(bridged);
        }
        self.merge_trailer(trailer);
        Ok(prev)
    }

    /// A cross-reference stream: `/W` field widths over `/Index` ranges.
    fn parse_stream_section(&mut self, data: &[u8], offset: u64) -> Result<Dict> {
        let mut lexer = Lexer::at(data, offset as usize);
        let (_, object) = lexer.parse_indirect_object()?;
        let stream = object
            .as_stream()
            .ok_or_else(|| Error::malformed("cross-reference offset does not point at a table or stream"))?;
        let dict = &stream.dict;
        let decoded = filters::decode_stream(dict, &stream.data)?;

        let widths = dict
            .get_array("W")
            .ok_or_else(|| Error::malformed("cross-reference stream missing /W"))?;
        if widths.len() < 3 {
            return Err(Error::malformed("cross-reference stream /W too short"));
        }
        let w: Vec<usize> = widths
            .iter()
            .map(|o| o.as_int().unwrap_or(0).max(0) as usize)
            .collect();
        let entry_len: usize = w.iter().sum();
        if entry_len == 0 {
            return Err(Error::malformed("cross-reference stream /W is all zero"));
        }

        let size = dict
            .get_int("Size")
            .ok_or_else(|| Error::malformed("cross-reference stream missing /Size"))?;
        let index: Vec<i64> = match dict.get_array("Index") {
            Some(items) => items.iter().filter_map(Object::as_int).collect(),
            None => vec![0, size],
        };
        if index.len() % 2 != 0 {
            return Err(Error::malformed("cross-reference stream /Index odd length"));
        }

        let mut pos = 0usize;
        for range in index.chunks(2) {
            let (start, count) = (range[0], range[1]);
            if start < 0 || count < 0 {
                return Err(Error::malformed("negative /Index range"));
            }
            for i in 0..count {
                if pos + entry_len > decoded.len() {
                    return Err(Error::malformed("cross-reference stream data truncated"));
                }
                let kind = if w[0] == 0 {
                    1
                } else {
                    read_be(&decoded[pos..pos + w[0]])
                };
                let f2 = read_be(&decoded[pos + w[0]..pos + w[0] + w[1]]);
                let f3 = read_be(&decoded[pos + w[0] + w[1]..pos + entry_len]);
                pos += entry_len;

                let num = (start + i) as u32;
                let entry = match kind {
                    0 => XrefEntry::Free,
                    1 => XrefEntry::InUse {
                        offset: f2,
                        gen: f3 as u16,
                    },
                    2 => XrefEntry::InStream {
                        stream: f2 as u32,
                        index: f3 as u32,
                    },
                    // Unknown types are reserved; treat as absent.
                    _ => continue,
                };
                self.insert(num, entry);
            }
        }
        Ok(dict.clone())
    }

    /// Newest section wins; older sections only fill in missing keys.
    fn merge_trailer(&mut self, older: Dict) {
        if self.trailer.is_empty() {
            self.trailer = older;
            return;
        }
        for (key, value) in older.iter() {
            if !self.trailer.contains(key) {
                self.trailer.set(key.clone(), value.clone());
            }
        }
    }
}

/// Big-endian integer of up to 8 bytes; a zero-width field reads as 0.
fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Locate the `startxref` offset near the end of the file.
pub fn find_startxref(data: &[u8]) -> Result<u64> {
    let window_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let tail = &data[window_start..];
    let needle = b"startxref";
    let found = tail
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or_else(|| Error::malformed("startxref not found"))?;
    let mut lexer = Lexer::at(data, window_start + found + needle.len());
    match lexer.parse_number()? {
        Object::Integer(n) if n >= 0 && (n as usize) < data.len() => Ok(n as u64),
        Object::Integer(n) => Err(Error::malformed(format!(
            "startxref offset {n} out of range"
        ))),
        _ => Err(Error::malformed("invalid startxref offset")),
    }
}
