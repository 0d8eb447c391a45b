//! Document loading: header check, cross-reference parse, encryption
//! gate, and the page-tree walk that flattens the document into an
//! ordered page list.

use crate::detect;
use crate::error::{Error, Result};
use crate::model::{Document, DocumentInfo, Page, DEFAULT_MEDIA_BOX};
use crate::object::{Dict, Object, ObjectId};
use crate::options::LoadOptions;
use crate::parser::lexer::{self, Lexer};
use crate::parser::xref::{XrefEntry, XrefTable};
use std::collections::HashSet;

/// Page trees nested deeper than this are treated as malformed.
const MAX_TREE_DEPTH: usize = 64;

/// Load a document from raw PDF bytes.
pub fn load_document(data: &[u8], options: &LoadOptions) -> Result<Document> {
    let version = detect::detect_version_from_bytes(data)?;

    let xref = match XrefTable::parse(data) {
        Ok(table) => table,
        Err(err) if options.recover => {
            log::warn!("cross-reference parse failed ({err}); rebuilding by scan");
            rebuild_by_scan(data)?
        }
        Err(err) => return Err(err),
    };

    let mut doc = Document::new(data.to_vec(), version, xref);
    check_encryption(&doc)?;

    doc.pages = collect_pages(&doc)?;
    doc.info = build_info(&doc);
    log::debug!(
        "loaded PDF {} with {} pages, {} xref entries",
        version,
        doc.pages.len(),
        doc.xref.len()
    );
    Ok(doc)
}

/// Reject encrypted documents. A null /Encrypt entry counts as the
/// declared empty handler and passes.
fn check_encryption(doc: &Document) -> Result<()> {
    match doc.trailer().get("Encrypt") {
        None => Ok(()),
        Some(entry) => match doc.resolve(entry) {
            Ok(Object::Null) => Ok(()),
            _ => Err(Error::unsupported("encrypted document")),
        },
    }
}

fn build_info(doc: &Document) -> DocumentInfo {
    let mut info = match doc.resolve_entry(doc.trailer(), "Info") {
        Ok(Some(Object::Dict(dict))) => DocumentInfo::from_info_dict(&dict),
        _ => DocumentInfo::default(),
    };
    info.pdf_version = doc.version().to_string();
    info.page_count = doc.page_count();
    info.encrypted = doc.trailer().contains("Encrypt");
    info
}

/// Attributes a /Pages node passes down to its kids.
#[derive(Default, Clone)]
struct Inherited {
    media_box: Option<[f32; 4]>,
    resources: Option<Dict>,
    rotate: Option<i64>,
}

impl Inherited {
    fn overridden_by(&self, doc: &Document, node: &Dict) -> Result<Inherited> {
        let mut out = self.clone();
        if let Some(mb) = read_rect(doc, node, "MediaBox")? {
            out.media_box = Some(mb);
        }
        if let Some(Object::Dict(res)) = doc.resolve_entry(node, "Resources")? {
            out.resources = Some(res);
        }
        if let Some(obj) = doc.resolve_entry(node, "Rotate")? {
            if let Some(r) = obj.as_int() {
                out.rotate = Some(r);
            }
        }
        Ok(out)
    }
}

/// Flatten the page tree into reading order.
fn collect_pages(doc: &Document) -> Result<Vec<Page>> {
    let root = doc
        .resolve_entry(doc.trailer(), "Root")?
        .ok_or_else(|| Error::malformed("trailer has no /Root"))?;
    let catalog = root
        .as_dict()
        .ok_or_else(|| Error::malformed("/Root is not a dictionary"))?
        .clone();
    let pages_ref = catalog
        .get("Pages")
        .ok_or_else(|| Error::malformed("catalog has no /Pages"))?
        .clone();

    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    walk_tree(
        doc,
        &pages_ref,
        &Inherited::default(),
        &mut visited,
        &mut pages,
        0,
    )?;
    if pages.is_empty() {
        return Err(Error::malformed("document has no pages"));
    }
    Ok(pages)
}

fn walk_tree(
    doc: &Document,
    node_ref: &Object,
    inherited: &Inherited,
    visited: &mut HashSet<ObjectId>,
    pages: &mut Vec<Page>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_TREE_DEPTH {
        return Err(Error::malformed("page tree too deep"));
    }
    let id = match node_ref {
        Object::Reference(id) => {
            if !visited.insert(*id) {
                return Err(Error::malformed(format!(
                    "page tree cycle at object {}",
                    id.0
                )));
            }
            *id
        }
        // Direct page-tree nodes are illegal but occur; give them a
        // synthetic id outside the arena range.
        _ => (0, 0),
    };

    let node = doc.resolve(node_ref)?;
    let dict = node
        .as_dict()
        .ok_or_else(|| Error::malformed("page tree node is not a dictionary"))?;
    let inherited = inherited.overridden_by(doc, dict)?;

    let is_pages_node = dict.type_name() == Some("Pages") || dict.contains("Kids");
    if is_pages_node {
        let kids = match doc.resolve_entry(dict, "Kids")? {
            Some(Object::Array(kids)) => kids,
            _ => return Err(Error::malformed("/Pages node without /Kids array")),
        };
        for kid in &kids {
            walk_tree(doc, kid, &inherited, visited, pages, depth + 1)?;
        }
        return Ok(());
    }

    pages.push(build_page(doc, id, dict, &inherited)?);
    Ok(())
}

fn build_page(doc: &Document, id: ObjectId, dict: &Dict, inherited: &Inherited) -> Result<Page> {
    let media_box = read_rect(doc, dict, "MediaBox")?
        .or(inherited.media_box)
        .map(|[x0, y0, x1, y1]| crate::geom::Rect::new(x0, y0, x1, y1).normalized())
        .unwrap_or(DEFAULT_MEDIA_BOX);

    let resources = match doc.resolve_entry(dict, "Resources")? {
        Some(Object::Dict(res)) => res,
        _ => inherited.resources.clone().unwrap_or_default(),
    };

    let rotate_raw = match doc.resolve_entry(dict, "Rotate")? {
        Some(obj) => obj.as_int().or(inherited.rotate).unwrap_or(0),
        None => inherited.rotate.unwrap_or(0),
    };

    let contents = match dict.get("Contents") {
        None => Vec::new(),
        Some(Object::Reference(id)) => {
            // A reference to either one stream or an array of streams.
            match doc.object(*id)? {
                Object::Array(items) => reference_list(&items),
                _ => vec![*id],
            }
        }
        Some(Object::Array(items)) => reference_list(items),
        Some(_) => Vec::new(),
    };

    Ok(Page {
        id,
        media_box,
        rotate: Page::normalize_rotation(rotate_raw),
        contents,
        resources,
    })
}

fn reference_list(items: &[Object]) -> Vec<ObjectId> {
    items.iter().filter_map(Object::as_reference).collect()
}

/// Read a 4-number rectangle entry, resolving references at both levels.
fn read_rect(doc: &Document, dict: &Dict, key: &str) -> Result<Option<[f32; 4]>> {
    let array = match doc.resolve_entry(dict, key)? {
        Some(Object::Array(items)) => items,
        _ => return Ok(None),
    };
    if array.len() != 4 {
        return Ok(None);
    }
    let mut out = [0.0f32; 4];
    for (slot, item) in out.iter_mut().zip(&array) {
        match doc.resolve(item)?.as_number() {
            Some(n) => *slot = n,
            None => return Ok(None),
        }
    }
    Ok(Some(out))
}

/// Rebuild the cross-reference index by scanning for `N G obj` headers.
///
/// The last occurrence of each object number wins, matching incremental
/// update order. The trailer comes from the last `trailer` keyword, or is
/// synthesized around the catalog when no trailer survives.
fn rebuild_by_scan(data: &[u8]) -> Result<XrefTable> {
    let mut table = XrefTable::default();
    let mut offsets: Vec<(u32, u16, u64)> = Vec::new();

    let mut i = 0usize;
    while i + 3 <= data.len() {
        if &data[i..i + 3] == b"obj"
            && (i + 3 == data.len() || !lexer::is_regular(data[i + 3]))
            && i > 0
            && lexer::is_whitespace(data[i - 1])
        {
            if let Some((num, gen, start)) = backtrack_object_header(data, i) {
                offsets.push((num, gen, start));
            }
        }
        i += 1;
    }
    if offsets.is_empty() {
        return Err(Error::malformed("no objects found while scanning"));
    }
    // Later definitions shadow earlier ones; XrefTable::insert keeps the
    // first it sees, so feed it in reverse.
    for (num, gen, offset) in offsets.iter().rev() {
        table.insert(*num, XrefEntry::InUse { offset: *offset, gen: *gen });
    }

    if let Some(pos) = find_last(data, b"trailer") {
        let mut lexer = Lexer::at(data, pos + b"trailer".len());
        if let Ok(dict) = lexer.parse_dict() {
            table.trailer = dict;
        }
    }
    if !table.trailer.contains("Root") {
        table.trailer = synthesize_trailer(data, &offsets)
            .ok_or_else(|| Error::malformed("no catalog found while scanning"))?;
    }
    Ok(table)
}

/// Walk backwards from the `obj` keyword over "N G" to the header start.
fn backtrack_object_header(data: &[u8], obj_pos: usize) -> Option<(u32, u16, u64)> {
    let mut i = obj_pos;
    let gen_end = skip_ws_back(data, i)?;
    i = digits_start(data, gen_end)?;
    let gen: u16 = std::str::from_utf8(&data[i..gen_end]).ok()?.parse().ok()?;
    let num_end = skip_ws_back(data, i)?;
    let num_start = digits_start(data, num_end)?;
    let num: u32 = std::str::from_utf8(&data[num_start..num_end])
        .ok()?
        .parse()
        .ok()?;
    Some((num, gen, num_start as u64))
}

fn skip_ws_back(data: &[u8], mut i: usize) -> Option<usize> {
    let before = i;
    while i > 0 && lexer::is_whitespace(data[i - 1]) {
        i -= 1;
    }
    if i == before {
        None
    } else {
        Some(i)
    }
}

fn digits_start(data: &[u8], end: usize) -> Option<usize> {
    let mut i = end;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == end {
        None
    } else {
        Some(i)
    }
}

fn find_last(data: &[u8], needle: &[u8]) -> Option<usize> {
    data.windows(needle.len()).rposition(|w| w == needle)
}

fn synthesize_trailer(data: &[u8], offsets: &[(u32, u16, u64)]) -> Option<Dict> {
    for (num, gen, offset) in offsets.iter().rev() {
        let mut lexer = Lexer::at(data, *offset as usize);
        if let Ok((_, object)) = lexer.parse_indirect_object() {
            if object.as_dict().map(|d| d.type_name()) == Some(Some("Catalog")) {
                let mut trailer = Dict::new();
                let max = offsets.iter().map(|(n, _, _)| *n).max().unwrap_or(*num);
                trailer.set("Size", Object::Integer(max as i64 + 1));
                trailer.set("Root", Object::Reference((*num, *gen)));
                return Some(trailer);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // A minimal well-formed single-page file built by hand below; the
    // integration suite exercises the builder-generated ones.
    fn minimal_pdf() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"%PDF-1.4\n");
        let o1 = body.len();
        body.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let o2 = body.len();
        body.extend_from_slice(
            b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>\nendobj\n",
        );
        let o3 = body.len();
        body.extend_from_slice(b"3 0 obj\n<< /Type /Page /Parent 2 0 R >>\nendobj\n");
        let xref = body.len();
        body.extend_from_slice(b"xref\n0 4\n");
        body.extend_from_slice(b"0000000000 65535 f \n");
        for offset in [o1, o2, o3] {
            body.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        body.extend_from_slice(b"trailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n");
        body.extend_from_slice(format!("{xref}\n").as_bytes());
        body.extend_from_slice(b"%%EOF");
        body
    }

    #[test]
    fn test_load_minimal_document() {
        let data = minimal_pdf();
        let doc = load_document(&data, &LoadOptions::default()).unwrap();
        assert_eq!(doc.page_count(), 1);
        let page = doc.page(0).unwrap();
        assert_eq!(page.media_box().width(), 612.0);
        assert_eq!(page.media_box().height(), 792.0);
    }

    #[test]
    fn test_not_a_pdf() {
        let result = load_document(b"hello world", &LoadOptions::default());
        assert!(matches!(result, Err(Error::UnknownFormat)));
    }

    #[test]
    fn test_broken_xref_strict_vs_lenient() {
        let mut data = minimal_pdf();
        // Corrupt the startxref offset digits.
        let pos = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        for b in data[pos + 10..].iter_mut().take(2) {
            if b.is_ascii_digit() {
                *b = b'9';
            }
        }

        let strict = load_document(&data, &LoadOptions::default());
        assert!(matches!(strict, Err(Error::MalformedDocument(_))));

        let doc = load_document(&data, &LoadOptions::new().lenient()).unwrap();
        assert_eq!(doc.page_count(), 1);
    }

    #[test]
    fn test_encrypted_document_rejected() {
        let data = minimal_pdf();
        let text = String::from_utf8(data).unwrap();
        let patched = text.replace(
            "<< /Size 4 /Root 1 0 R >>",
            "<< /Size 4 /Root 1 0 R /Encrypt << /Filter /Standard >> >>",
        );
        let result = load_document(patched.as_bytes(), &LoadOptions::default());
        assert!(matches!(result, Err(Error::UnsupportedDocument(_))));
    }

    #[test]
    fn test_null_encryption_tolerated() {
        let data = minimal_pdf();
        let text = String::from_utf8(data).unwrap();
        let patched = text.replace(
            "<< /Size 4 /Root 1 0 R >>",
            "<< /Size 4 /Root 1 0 R /Encrypt null >>",
        );
        let doc = load_document(patched.as_bytes(), &LoadOptions::default()).unwrap();
        assert_eq!(doc.page_count(), 1);
    }

    #[test]
    fn test_page_tree_cycle_detected() {
        let mut body = Vec::new();
        body.extend_from_slice(b"%PDF-1.4\n");
        let o1 = body.len();
        body.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let o2 = body.len();
        // Pages node listing itself as a kid.
        body.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [2 0 R] /Count 1 >>\nendobj\n");
        let xref = body.len();
        body.extend_from_slice(b"xref\n0 3\n0000000000 65535 f \n");
        for offset in [o1, o2] {
            body.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        body.extend_from_slice(b"trailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n");
        body.extend_from_slice(format!("{xref}\n").as_bytes());
        body.extend_from_slice(b"%%EOF");

        let result = load_document(&body, &LoadOptions::default());
        assert!(matches!(result, Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn test_dangling_page_reference() {
        let data = minimal_pdf();
        let text = String::from_utf8(data).unwrap();
        // Point the kids array at an object that does not exist.
        let patched = text.replace("/Kids [3 0 R]", "/Kids [9 0 R]");
        let result = load_document(patched.as_bytes(), &LoadOptions::default());
        assert!(matches!(result, Err(Error::MalformedDocument(_))));
    }
}
