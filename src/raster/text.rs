//! Greeked text rendering.
//!
//! Glyph outlines are not rasterized. Each visible glyph paints a
//! filled box spanning its advance width at the baseline, which keeps
//! the visual weight and position of text intact at raster
//! resolutions while staying independent of font programs. Advance
//! widths come from the real font metrics (/Widths, /W, /MissingWidth)
//! so line lengths and justified layouts survive.

use std::collections::HashMap;

use crate::geom::Matrix;
use crate::model::Document;
use crate::object::{Dict, Object};
use crate::raster::path::{FillRule, Path};
use crate::raster::pixmap::Pixmap;
use crate::raster::state::GraphicsState;

/// Fallback advance for fonts that carry no width information at all,
/// in thousandths of an em. Roughly the average of the standard 14.
const FALLBACK_WIDTH: f32 = 500.0;

/// Fraction of the font size a greeked glyph box rises above the
/// baseline when the font descriptor has no usable /Ascent.
const FALLBACK_ASCENT: f32 = 0.66;

/// Advance widths and code layout for one font resource.
#[derive(Debug, Clone)]
pub struct FontMetrics {
    /// Composite (Type0) fonts consume two bytes per code.
    two_byte: bool,
    widths: HashMap<u32, f32>,
    default_width: f32,
    /// Box height above the baseline, as a fraction of the font size.
    ascent: f32,
}

impl Default for FontMetrics {
    fn default() -> Self {
        FontMetrics {
            two_byte: false,
            widths: HashMap::new(),
            default_width: FALLBACK_WIDTH,
            ascent: FALLBACK_ASCENT,
        }
    }
}

impl FontMetrics {
    /// Resolve metrics from a /Font resource dictionary.
    ///
    /// Unresolvable pieces degrade to defaults rather than failing the
    /// page; a wrong advance is strictly better than no page.
    pub fn from_font_dict(doc: &Document, font: &Dict) -> FontMetrics {
        let mut metrics = FontMetrics::default();

        let subtype = font.get_name("Subtype").unwrap_or_default();
        if subtype == "Type0" {
            metrics.two_byte = true;
            if let Some(descendant) = composite_descendant(doc, font) {
                metrics.read_composite_widths(doc, &descendant);
                metrics.read_descriptor(doc, &descendant);
            }
        } else {
            metrics.read_simple_widths(doc, font);
            metrics.read_descriptor(doc, font);
        }
        metrics
    }

    /// /FirstChar + /Widths for simple fonts.
    fn read_simple_widths(&mut self, doc: &Document, font: &Dict) {
        let first = match doc.resolve_entry(font, "FirstChar") {
            Ok(Some(obj)) => obj.as_int().unwrap_or(0),
            _ => 0,
        };
        if let Ok(Some(Object::Array(widths))) = doc.resolve_entry(font, "Widths") {
            for (i, entry) in widths.iter().enumerate() {
                if let Some(w) = resolve_number(doc, entry) {
                    self.widths.insert((first + i as i64).max(0) as u32, w);
                }
            }
        }
    }

    /// /W and /DW on the descendant CIDFont.
    fn read_composite_widths(&mut self, doc: &Document, descendant: &Dict) {
        if let Ok(Some(obj)) = doc.resolve_entry(descendant, "DW") {
            if let Some(dw) = obj.as_number() {
                self.default_width = dw;
            } else {
                self.default_width = 1000.0;
            }
        } else {
            self.default_width = 1000.0;
        }

        let ranges = match doc.resolve_entry(descendant, "W") {
            Ok(Some(Object::Array(a))) => a,
            _ => return,
        };
        // /W mixes two forms: `c [w1 w2 ...]` and `cFirst cLast w`.
        let mut i = 0;
        while i + 1 < ranges.len() {
            let Some(start) = resolve_number(doc, &ranges[i]) else {
                break;
            };
            let start = start.max(0.0) as u32;
            let Ok(next) = doc.resolve(&ranges[i + 1]) else {
                break;
            };
            match next {
                Object::Array(list) => {
                    for (k, entry) in list.iter().enumerate() {
                        if let Some(w) = resolve_number(doc, entry) {
                            self.widths.insert(start + k as u32, w);
                        }
                    }
                    i += 2;
                }
                other => {
                    let Some(end) = other.as_number() else { break };
                    let Some(w) = ranges.get(i + 2).and_then(|o| resolve_number(doc, o)) else {
                        break;
                    };
                    let end = end.max(start as f32) as u32;
                    // Guard pathological ranges.
                    for code in start..=end.min(start + 65_535) {
                        self.widths.insert(code, w);
                    }
                    i += 3;
                }
            }
        }
    }

    /// /MissingWidth and /Ascent from the font descriptor.
    fn read_descriptor(&mut self, doc: &Document, font: &Dict) {
        let Ok(Some(Object::Dict(desc))) = doc.resolve_entry(font, "FontDescriptor") else {
            return;
        };
        if let Ok(Some(obj)) = doc.resolve_entry(&desc, "MissingWidth") {
            if let Some(mw) = obj.as_number() {
                self.default_width = mw;
            }
        }
        if let Ok(Some(obj)) = doc.resolve_entry(&desc, "Ascent") {
            if let Some(a) = obj.as_number() {
                let a = a / 1000.0;
                if (0.2..=1.5).contains(&a) {
                    self.ascent = a;
                }
            }
        }
    }

    /// Advance width for a code, in thousandths of an em.
    pub fn width(&self, code: u32) -> f32 {
        self.widths.get(&code).copied().unwrap_or(self.default_width)
    }

    /// Split a show-string into character codes.
    pub fn decode_codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| {
                    if c.len() == 2 {
                        u32::from(c[0]) << 8 | u32::from(c[1])
                    } else {
                        u32::from(c[0])
                    }
                })
                .collect()
        } else {
            bytes.iter().map(|&b| u32::from(b)).collect()
        }
    }

    pub fn is_two_byte(&self) -> bool {
        self.two_byte
    }
}

fn composite_descendant(doc: &Document, font: &Dict) -> Option<Dict> {
    let descendants = match doc.resolve_entry(font, "DescendantFonts") {
        Ok(Some(Object::Array(a))) => a,
        _ => return None,
    };
    let first = descendants.first()?;
    match doc.resolve(first) {
        Ok(Object::Dict(d)) => Some(d),
        _ => None,
    }
}

fn resolve_number(doc: &Document, obj: &Object) -> Option<f32> {
    match doc.resolve(obj) {
        Ok(resolved) => resolved.as_number(),
        Err(_) => None,
    }
}

/// Paint one show-string and advance the text matrix.
///
/// `tm` is the current text matrix; it is updated in place so TJ
/// adjustments and subsequent strings continue from the right spot.
pub fn show_text(
    pixmap: &mut Pixmap,
    gs: &GraphicsState,
    metrics: &FontMetrics,
    tm: &mut Matrix,
    bytes: &[u8],
) {
    let ts = &gs.text;
    let size = ts.size;
    // Tr 3 and 7 show nothing; the advance still happens.
    let invisible = ts.render_mode == 3 || ts.render_mode == 7;

    for code in metrics.decode_codes(bytes) {
        let w0 = metrics.width(code) / 1000.0;

        if !invisible && w0 > 0.0 && size != 0.0 {
            let param = Matrix::new(
                size * ts.h_scale,
                0.0,
                0.0,
                size,
                0.0,
                ts.rise,
            );
            let trm = param.concat(tm).concat(&gs.ctm);
            let mut glyph = Path::new();
            glyph.rect(&trm, 0.0, 0.0, w0, metrics.ascent);
            glyph.fill(
                pixmap,
                gs.fill_color,
                gs.fill_alpha,
                FillRule::NonZero,
                gs.clip,
            );
        }

        let is_space = !metrics.two_byte && code == 32;
        let mut tx = w0 * size + ts.char_spacing;
        if is_space {
            tx += ts.word_spacing;
        }
        tx *= ts.h_scale;
        *tm = Matrix::translate(tx, 0.0).concat(tm);
    }
}

/// Apply a TJ number adjustment (thousandths of an em, rightward
/// motion negative) to the text matrix.
pub fn tj_adjust(tm: &mut Matrix, amount: f32, gs: &GraphicsState) {
    let ts = &gs.text;
    let tx = -amount / 1000.0 * ts.size * ts.h_scale;
    *tm = Matrix::translate(tx, 0.0).concat(tm);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::PdfVersion;
    use crate::model::Document;
    use crate::parser::XrefTable;
    use crate::raster::pixmap::PixelFormat;

    // The fixture dicts hold direct objects only, so an empty document
    // satisfies every resolve call.
    fn empty_doc() -> Document {
        Document::new(Vec::new(), PdfVersion::default(), XrefTable::default())
    }

    fn simple_font(first: i64, widths: &[f32]) -> Dict {
        let mut font = Dict::new();
        font.set("Type", Object::Name("Font".into()));
        font.set("Subtype", Object::Name("TrueType".into()));
        font.set("FirstChar", Object::Integer(first));
        font.set(
            "Widths",
            Object::Array(widths.iter().map(|&w| Object::Real(w)).collect()),
        );
        font
    }

    #[test]
    fn test_simple_widths_lookup() {
        let doc = empty_doc();
        let font = simple_font(65, &[600.0, 700.0]);
        let m = FontMetrics::from_font_dict(&doc, &font);
        assert_eq!(m.width(65), 600.0);
        assert_eq!(m.width(66), 700.0);
        assert_eq!(m.width(90), FALLBACK_WIDTH);
        assert!(!m.is_two_byte());
    }

    #[test]
    fn test_composite_w_ranges() {
        let doc = empty_doc();
        let mut cid = Dict::new();
        cid.set("Subtype", Object::Name("CIDFontType2".into()));
        cid.set("DW", Object::Integer(750));
        cid.set(
            "W",
            Object::Array(vec![
                Object::Integer(1),
                Object::Array(vec![Object::Integer(500), Object::Integer(520)]),
                Object::Integer(10),
                Object::Integer(12),
                Object::Integer(900),
            ]),
        );
        let mut font = Dict::new();
        font.set("Subtype", Object::Name("Type0".into()));
        font.set("DescendantFonts", Object::Array(vec![Object::Dict(cid)]));

        let m = FontMetrics::from_font_dict(&doc, &font);
        assert!(m.is_two_byte());
        assert_eq!(m.width(1), 500.0);
        assert_eq!(m.width(2), 520.0);
        assert_eq!(m.width(10), 900.0);
        assert_eq!(m.width(11), 900.0);
        assert_eq!(m.width(12), 900.0);
        assert_eq!(m.width(3), 750.0);
    }

    #[test]
    fn test_two_byte_code_split() {
        let m = FontMetrics {
            two_byte: true,
            ..FontMetrics::default()
        };
        assert_eq!(m.decode_codes(&[0x00, 0x41, 0x01, 0x02]), vec![0x41, 0x0102]);
        // Dangling odd byte still decodes.
        assert_eq!(m.decode_codes(&[0x00, 0x41, 0x07]), vec![0x41, 0x07]);
    }

    #[test]
    fn test_show_text_paints_and_advances() {
        let mut pm = Pixmap::new(100, 40, PixelFormat::Rgb8);
        let mut gs = GraphicsState::new(Matrix::identity());
        gs.text.size = 20.0;
        let metrics = FontMetrics::default();
        let mut tm = Matrix::translate(10.0, 30.0);

        show_text(&mut pm, &gs, &metrics, &mut tm, b"AB");

        // Two 500/1000 em glyphs at 20pt advance 10pt each.
        let moved = tm.transform_point(0.0, 0.0);
        assert!((moved.0 - 30.0).abs() < 0.01, "tm.e = {}", moved.0);
        // The first glyph box spans x 10..20, y 30..43 under this tm.
        assert_eq!(pm.get_pixel(12, 35), [0, 0, 0]);
    }

    #[test]
    fn test_invisible_render_mode_advances_without_painting() {
        let mut pm = Pixmap::new(50, 20, PixelFormat::Rgb8);
        let mut gs = GraphicsState::new(Matrix::identity());
        gs.text.size = 10.0;
        gs.text.render_mode = 3;
        let metrics = FontMetrics::default();
        let mut tm = Matrix::identity();

        show_text(&mut pm, &gs, &metrics, &mut tm, b"hidden");

        let origin = tm.transform_point(0.0, 0.0);
        assert!(origin.0 > 0.0);
        for y in 0..20 {
            for x in 0..50 {
                assert_eq!(pm.get_pixel(x, y), [255, 255, 255]);
            }
        }
    }

    #[test]
    fn test_tj_adjustment_moves_left_for_positive() {
        let mut gs = GraphicsState::new(Matrix::identity());
        gs.text.size = 10.0;
        let mut tm = Matrix::identity();
        tj_adjust(&mut tm, 100.0, &gs);
        let p = tm.transform_point(0.0, 0.0);
        assert!((p.0 + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_word_spacing_only_on_single_byte_space() {
        let mut gs = GraphicsState::new(Matrix::identity());
        gs.text.size = 10.0;
        gs.text.word_spacing = 5.0;
        let metrics = FontMetrics::default();
        let mut pm = Pixmap::new(10, 10, PixelFormat::Rgb8);

        let mut tm = Matrix::identity();
        show_text(&mut pm, &gs, &metrics, &mut tm, b" ");
        let with_ws = tm.transform_point(0.0, 0.0).0;

        gs.text.word_spacing = 0.0;
        let mut tm2 = Matrix::identity();
        show_text(&mut pm, &gs, &metrics, &mut tm2, b" ");
        let without_ws = tm2.transform_point(0.0, 0.0).0;

        assert!((with_ws - without_ws - 5.0).abs() < 1e-4);
    }
}
