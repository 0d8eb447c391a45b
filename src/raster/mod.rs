//! Page rasterization.
//!
//! [`rasterize`] is a pure function from a loaded document, a page, and
//! target pixel dimensions to a [`Pixmap`]: it walks the page's content
//! stream and paints fills, strokes, greeked text, and images onto a
//! white background. Operators outside that set are skipped with a
//! warning; only structural damage (undecodable content, broken operand
//! syntax) fails the page.

pub mod image;
pub mod path;
pub mod pixmap;
pub mod state;
pub mod text;

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::geom::{Matrix, Rect};
use crate::images;
use crate::model::{Document, Page};
use crate::object::{Dict, Object, Stream};
use crate::parser::content::{ContentOp, ContentParser};
use crate::raster::path::{FillRule, Path};
use crate::raster::pixmap::{PixelFormat, Pixmap};
use crate::raster::state::{Color, ColorSpace, GraphicsState};
use crate::raster::text::FontMetrics;

/// Form XObjects nested beyond this are dropped; self-referential forms
/// exist in the wild.
const MAX_FORM_DEPTH: usize = 16;

/// A rendered page: the pixels plus the degradations recorded while
/// painting them (skipped operators, undecodable images).
#[derive(Debug)]
pub struct PageRaster {
    pub pixmap: Pixmap,
    pub warnings: Vec<String>,
}

/// Render one page into an RGB pixmap of exactly `width` x `height`.
pub fn rasterize(doc: &Document, page: &Page, width: u32, height: u32) -> Result<PageRaster> {
    let content = page_content(doc, page)?;
    let ops = ContentParser::new(&content).parse_all()?;

    let mut pixmap = Pixmap::new(width, height, PixelFormat::Rgb8);
    let base = base_matrix(page, width, height);
    let mut interpreter = Interpreter {
        doc,
        pixmap: &mut pixmap,
        gs: GraphicsState::new(base),
        stack: Vec::new(),
        path: Path::new(),
        pending_clip: false,
        text_matrix: Matrix::identity(),
        line_matrix: Matrix::identity(),
        warned: HashSet::new(),
        warnings: Vec::new(),
    };
    interpreter.run_ops(&ops, page.resources(), 0)?;
    let warnings = interpreter.warnings;
    Ok(PageRaster { pixmap, warnings })
}

/// Map page space onto the device: flip y, scale points to pixels, and
/// fold in the page's display rotation.
fn base_matrix(page: &Page, width: u32, height: u32) -> Matrix {
    let mb = page.media_box();
    let (w_pt, h_pt) = page.size_points();
    let sx = width as f32 / w_pt;
    let sy = height as f32 / h_pt;
    match page.rotation() {
        90 => Matrix::new(0.0, sy, sx, 0.0, -mb.y0 * sx, -mb.x0 * sy),
        180 => Matrix::new(-sx, 0.0, 0.0, sy, mb.x1 * sx, -mb.y0 * sy),
        270 => Matrix::new(0.0, -sy, -sx, 0.0, mb.y1 * sx, mb.x1 * sy),
        _ => Matrix::new(sx, 0.0, 0.0, -sy, -mb.x0 * sx, mb.y1 * sy),
    }
}

/// Concatenate the page's content streams in paint order.
fn page_content(doc: &Document, page: &Page) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for &id in page.contents() {
        let object = doc.object(id)?;
        let stream = object
            .as_stream()
            .ok_or_else(|| Error::malformed("page content is not a stream"))?;
        data.extend_from_slice(&doc.stream_data(stream)?);
        // Streams may end mid-token; the separator keeps them apart.
        data.push(b'\n');
    }
    Ok(data)
}

/// Per-content-stream resource scope with a font metrics cache. Form
/// XObjects get their own scope so resource names cannot leak across.
struct Scope<'r> {
    resources: &'r Dict,
    fonts: HashMap<String, FontMetrics>,
}

struct Interpreter<'a> {
    doc: &'a Document,
    pixmap: &'a mut Pixmap,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    path: Path,
    pending_clip: bool,
    text_matrix: Matrix,
    line_matrix: Matrix,
    warned: HashSet<String>,
    warnings: Vec<String>,
}

impl<'a> Interpreter<'a> {
    fn run_ops(&mut self, ops: &[ContentOp], resources: &Dict, depth: usize) -> Result<()> {
        let mut scope = Scope {
            resources,
            fonts: HashMap::new(),
        };
        for op in ops {
            self.execute(op, &mut scope, depth)?;
        }
        Ok(())
    }

    fn execute(&mut self, op: &ContentOp, scope: &mut Scope<'_>, depth: usize) -> Result<()> {
        match op.operator.as_str() {
            // Graphics state
            "q" => self.stack.push(self.gs.clone()),
            "Q" => match self.stack.pop() {
                Some(saved) => self.gs = saved,
                None => self.warn_once("Q", "unbalanced graphics state restore"),
            },
            "cm" => {
                if let Some([a, b, c, d, e, f]) = op_nums(op) {
                    self.gs.ctm = Matrix::new(a, b, c, d, e, f).concat(&self.gs.ctm);
                }
            }
            "w" => {
                if let Some([lw]) = op_nums(op) {
                    self.gs.line_width = lw;
                }
            }
            // Caps, joins, dash patterns, intents, and flatness do not
            // change filled output at raster scale.
            "J" | "j" | "M" | "d" | "ri" | "i" => {}
            "gs" => self.apply_ext_gstate(op, scope),

            // Path construction
            "m" => {
                if let Some([x, y]) = op_nums(op) {
                    self.path.move_to(&self.gs.ctm, x, y);
                }
            }
            "l" => {
                if let Some([x, y]) = op_nums(op) {
                    self.path.line_to(&self.gs.ctm, x, y);
                }
            }
            "c" => {
                if let Some([x1, y1, x2, y2, x3, y3]) = op_nums(op) {
                    self.path
                        .curve_to(&self.gs.ctm, (x1, y1), (x2, y2), (x3, y3));
                }
            }
            "v" => {
                if let Some([x2, y2, x3, y3]) = op_nums(op) {
                    self.path.curve_to_v(&self.gs.ctm, (x2, y2), (x3, y3));
                }
            }
            "y" => {
                if let Some([x1, y1, x3, y3]) = op_nums(op) {
                    self.path.curve_to_y(&self.gs.ctm, (x1, y1), (x3, y3));
                }
            }
            "h" => self.path.close(),
            "re" => {
                if let Some([x, y, w, h]) = op_nums(op) {
                    self.path.rect(&self.gs.ctm, x, y, w, h);
                }
            }

            // Path painting
            "S" => {
                self.stroke_current();
                self.end_path();
            }
            "s" => {
                self.path.close();
                self.stroke_current();
                self.end_path();
            }
            "f" | "F" => {
                self.fill_current(FillRule::NonZero);
                self.end_path();
            }
            "f*" => {
                self.fill_current(FillRule::EvenOdd);
                self.end_path();
            }
            "B" => {
                self.fill_current(FillRule::NonZero);
                self.stroke_current();
                self.end_path();
            }
            "B*" => {
                self.fill_current(FillRule::EvenOdd);
                self.stroke_current();
                self.end_path();
            }
            "b" => {
                self.path.close();
                self.fill_current(FillRule::NonZero);
                self.stroke_current();
                self.end_path();
            }
            "b*" => {
                self.path.close();
                self.fill_current(FillRule::EvenOdd);
                self.stroke_current();
                self.end_path();
            }
            "n" => self.end_path(),
            "W" | "W*" => self.pending_clip = true,

            // Color
            "CS" => self.set_color_space(op, scope, true),
            "cs" => self.set_color_space(op, scope, false),
            "SC" | "SCN" => self.set_color_components(op, true),
            "sc" | "scn" => self.set_color_components(op, false),
            "G" => {
                if let Some([v]) = op_nums(op) {
                    self.gs.stroke_space = ColorSpace::DeviceGray;
                    self.gs.stroke_color = Color::gray(v);
                }
            }
            "g" => {
                if let Some([v]) = op_nums(op) {
                    self.gs.fill_space = ColorSpace::DeviceGray;
                    self.gs.fill_color = Color::gray(v);
                }
            }
            "RG" => {
                if let Some([r, g, b]) = op_nums(op) {
                    self.gs.stroke_space = ColorSpace::DeviceRgb;
                    self.gs.stroke_color = Color::rgb(r, g, b);
                }
            }
            "rg" => {
                if let Some([r, g, b]) = op_nums(op) {
                    self.gs.fill_space = ColorSpace::DeviceRgb;
                    self.gs.fill_color = Color::rgb(r, g, b);
                }
            }
            "K" => {
                if let Some([c, m, y, k]) = op_nums(op) {
                    self.gs.stroke_space = ColorSpace::DeviceCmyk;
                    self.gs.stroke_color = Color::cmyk(c, m, y, k);
                }
            }
            "k" => {
                if let Some([c, m, y, k]) = op_nums(op) {
                    self.gs.fill_space = ColorSpace::DeviceCmyk;
                    self.gs.fill_color = Color::cmyk(c, m, y, k);
                }
            }

            // Text
            "BT" => {
                self.text_matrix = Matrix::identity();
                self.line_matrix = Matrix::identity();
            }
            "ET" => {}
            "Tc" => {
                if let Some([v]) = op_nums(op) {
                    self.gs.text.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some([v]) = op_nums(op) {
                    self.gs.text.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some([v]) = op_nums(op) {
                    self.gs.text.h_scale = v / 100.0;
                }
            }
            "TL" => {
                if let Some([v]) = op_nums(op) {
                    self.gs.text.leading = v;
                }
            }
            "Ts" => {
                if let Some([v]) = op_nums(op) {
                    self.gs.text.rise = v;
                }
            }
            "Tr" => {
                if let Some(mode) = op.operands.last().and_then(Object::as_int) {
                    self.gs.text.render_mode = mode;
                }
            }
            "Tf" => {
                let n = op.operands.len();
                if n >= 2 {
                    if let Some(name) = op.operands[n - 2].as_name() {
                        self.gs.text.font = Some(name.to_string());
                    }
                    if let Some(size) = op.operands[n - 1].as_number() {
                        self.gs.text.size = size;
                    }
                }
            }
            "Td" => {
                if let Some([tx, ty]) = op_nums(op) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = op_nums(op) {
                    self.gs.text.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some([a, b, c, d, e, f]) = op_nums(op) {
                    self.line_matrix = Matrix::new(a, b, c, d, e, f);
                    self.text_matrix = self.line_matrix;
                }
            }
            "T*" => self.next_line(0.0, -self.gs.text.leading),
            "Tj" => {
                if let Some(Object::String(bytes)) = op.operands.last() {
                    self.show_string(bytes, scope);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.last() {
                    for item in items {
                        match item {
                            Object::String(bytes) => self.show_string(bytes, scope),
                            other => {
                                if let Some(n) = other.as_number() {
                                    text::tj_adjust(&mut self.text_matrix, n, &self.gs);
                                }
                            }
                        }
                    }
                }
            }
            "'" => {
                self.next_line(0.0, -self.gs.text.leading);
                if let Some(Object::String(bytes)) = op.operands.last() {
                    self.show_string(bytes, scope);
                }
            }
            "\"" => {
                let n = op.operands.len();
                if n >= 3 {
                    if let (Some(aw), Some(ac)) = (op.number(n - 3), op.number(n - 2)) {
                        self.gs.text.word_spacing = aw;
                        self.gs.text.char_spacing = ac;
                    }
                    self.next_line(0.0, -self.gs.text.leading);
                    if let Some(Object::String(bytes)) = op.operands.last() {
                        self.show_string(bytes, scope);
                    }
                }
            }

            // XObjects and inline images
            "Do" => {
                if let Some(Object::Name(name)) = op.operands.last() {
                    self.draw_xobject(name, scope, depth)?;
                }
            }
            "BI" => {
                if let Some(Object::Stream(inline)) = op.operands.first() {
                    self.draw_image_stream(inline, scope.resources);
                }
            }

            "sh" => self.warn_once("sh", "shading fills are not rendered"),

            // Marked content, compatibility sections, Type3 metrics.
            "BMC" | "BDC" | "EMC" | "MP" | "DP" | "BX" | "EX" | "d0" | "d1" => {}

            other => {
                let message = format!("skipping unsupported content operator {other:?}");
                self.warn_once(other, message);
            }
        }
        Ok(())
    }

    fn fill_current(&mut self, rule: FillRule) {
        self.path.fill(
            self.pixmap,
            self.gs.fill_color,
            self.gs.fill_alpha,
            rule,
            self.gs.clip,
        );
    }

    fn stroke_current(&mut self) {
        let device_width = self.gs.line_width * self.gs.ctm.mean_scale();
        self.path.stroke(
            self.pixmap,
            self.gs.stroke_color,
            self.gs.stroke_alpha,
            device_width,
            self.gs.clip,
        );
    }

    /// Finish the path, folding a pending `W`/`W*` into the clip. The
    /// clip is tracked as the path's bounding box, which covers the
    /// rectangular crops that dominate real content.
    fn end_path(&mut self) {
        if self.pending_clip {
            self.pending_clip = false;
            let clip = self
                .path
                .bounds()
                .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
            self.gs.clip_to(clip);
        }
        self.path.clear();
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).concat(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn show_string(&mut self, bytes: &[u8], scope: &mut Scope<'_>) {
        let name = self.gs.text.font.clone().unwrap_or_default();
        let doc = self.doc;
        let resources = scope.resources;
        let metrics = scope
            .fonts
            .entry(name)
            .or_insert_with_key(|key| resolve_font(doc, resources, key));
        text::show_text(self.pixmap, &self.gs, metrics, &mut self.text_matrix, bytes);
    }

    fn set_color_space(&mut self, op: &ContentOp, scope: &Scope<'_>, stroking: bool) {
        let Some(Object::Name(name)) = op.operands.last() else {
            return;
        };
        let space = match self.lookup_color_space(name, scope) {
            Ok(space) => space,
            Err(err) => {
                self.warn_once(name, format!("color space {name:?} not usable: {err}"));
                return;
            }
        };
        let color = initial_color(&space);
        if stroking {
            self.gs.stroke_space = space;
            self.gs.stroke_color = color;
        } else {
            self.gs.fill_space = space;
            self.gs.fill_color = color;
        }
    }

    fn lookup_color_space(&self, name: &str, scope: &Scope<'_>) -> Result<ColorSpace> {
        match ColorSpace::from_family_name(name) {
            Ok(space) => Ok(space),
            Err(family_err) => {
                let spaces = match self.doc.resolve_entry(scope.resources, "ColorSpace")? {
                    Some(Object::Dict(d)) => d,
                    _ => return Err(family_err),
                };
                match self.doc.resolve_entry(&spaces, name)? {
                    Some(target) => ColorSpace::from_object(self.doc, &target),
                    None => Err(family_err),
                }
            }
        }
    }

    fn set_color_components(&mut self, op: &ContentOp, stroking: bool) {
        let comps: Vec<f32> = op
            .operands
            .iter()
            .filter_map(Object::as_number)
            .collect();
        let space = if stroking {
            &self.gs.stroke_space
        } else {
            &self.gs.fill_space
        };
        let color = space.color_from(&comps);
        if stroking {
            self.gs.stroke_color = color;
        } else {
            self.gs.fill_color = color;
        }
    }

    fn apply_ext_gstate(&mut self, op: &ContentOp, scope: &Scope<'_>) {
        let Some(Object::Name(name)) = op.operands.last() else {
            return;
        };
        let states = match self.doc.resolve_entry(scope.resources, "ExtGState") {
            Ok(Some(Object::Dict(d))) => d,
            _ => return,
        };
        let Ok(Some(Object::Dict(state))) = self.doc.resolve_entry(&states, name) else {
            return;
        };
        if let Some(alpha) = state.get_number("ca") {
            self.gs.fill_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(alpha) = state.get_number("CA") {
            self.gs.stroke_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(lw) = state.get_number("LW") {
            self.gs.line_width = lw;
        }
    }

    fn draw_xobject(&mut self, name: &str, scope: &mut Scope<'_>, depth: usize) -> Result<()> {
        let xobjects = match self.doc.resolve_entry(scope.resources, "XObject") {
            Ok(Some(Object::Dict(d))) => d,
            _ => {
                self.warn_once(name, format!("XObject {name:?} has no resource dictionary"));
                return Ok(());
            }
        };
        let stream = match self.doc.resolve_entry(&xobjects, name) {
            Ok(Some(Object::Stream(s))) => s,
            _ => {
                self.warn_once(name, format!("XObject {name:?} not found"));
                return Ok(());
            }
        };
        match stream.dict.get_name("Subtype") {
            Some("Image") => self.draw_image_stream(&stream, scope.resources),
            Some("Form") => self.run_form(&stream, scope, depth)?,
            other => {
                self.warn_once(name, format!("XObject subtype {other:?} not rendered"));
            }
        }
        Ok(())
    }

    fn draw_image_stream(&mut self, stream: &Stream, resources: &Dict) {
        match images::decode_image(self.doc, stream, Some(resources)) {
            Ok(decoded) => image::draw_image(self.pixmap, &self.gs, &decoded),
            Err(err) => {
                let key = format!("img:{err}");
                self.warn_once(&key, format!("skipping image: {err}"));
            }
        }
    }

    fn run_form(&mut self, form: &Stream, scope: &Scope<'_>, depth: usize) -> Result<()> {
        if depth >= MAX_FORM_DEPTH {
            self.warn_once("form-depth", "form XObjects nested too deeply");
            return Ok(());
        }
        let data = match self.doc.stream_data(form) {
            Ok(data) => data,
            Err(err) => {
                self.warn_once("form-data", format!("form content unreadable: {err}"));
                return Ok(());
            }
        };
        let ops = match ContentParser::new(&data).parse_all() {
            Ok(ops) => ops,
            Err(err) => {
                self.warn_once("form-parse", format!("form content broken: {err}"));
                return Ok(());
            }
        };

        let saved_gs = self.gs.clone();
        let saved_depth = self.stack.len();

        if let Ok(Some(Object::Array(m))) = self.doc.resolve_entry(&form.dict, "Matrix") {
            let nums: Vec<f32> = m.iter().filter_map(Object::as_number).collect();
            if nums.len() == 6 {
                let fm = Matrix::new(nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]);
                self.gs.ctm = fm.concat(&self.gs.ctm);
            }
        }
        if let Ok(Some(Object::Array(b))) = self.doc.resolve_entry(&form.dict, "BBox") {
            let nums: Vec<f32> = b.iter().filter_map(Object::as_number).collect();
            if nums.len() == 4 {
                let bbox = Rect::new(nums[0], nums[1], nums[2], nums[3])
                    .normalized()
                    .transformed(&self.gs.ctm);
                self.gs.clip_to(bbox);
            }
        }

        let form_resources = match self.doc.resolve_entry(&form.dict, "Resources") {
            Ok(Some(Object::Dict(d))) => d,
            _ => scope.resources.clone(),
        };
        let result = self.run_ops(&ops, &form_resources, depth + 1);

        // A form must not leak state, balanced q/Q or not.
        self.stack.truncate(saved_depth);
        self.gs = saved_gs;
        result
    }

    fn warn_once(&mut self, key: &str, message: impl Into<String>) {
        if self.warned.insert(key.to_string()) {
            let message = message.into();
            log::debug!("{message}");
            self.warnings.push(message);
        }
    }
}

/// Last `N` numeric operands, matching how viewers tolerate stray
/// operands left over from sloppy producers.
fn op_nums<const N: usize>(op: &ContentOp) -> Option<[f32; N]> {
    if op.operands.len() < N {
        return None;
    }
    let base = op.operands.len() - N;
    let mut out = [0.0f32; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = op.operands[base + i].as_number()?;
    }
    Some(out)
}

fn resolve_font(doc: &Document, resources: &Dict, name: &str) -> FontMetrics {
    let fonts = match doc.resolve_entry(resources, "Font") {
        Ok(Some(Object::Dict(d))) => d,
        _ => return FontMetrics::default(),
    };
    match doc.resolve_entry(&fonts, name) {
        Ok(Some(Object::Dict(font))) => FontMetrics::from_font_dict(doc, &font),
        _ => FontMetrics::default(),
    }
}

/// The color a space starts with when selected via `cs`/`CS`.
fn initial_color(space: &ColorSpace) -> Color {
    match space {
        ColorSpace::DeviceCmyk => Color::cmyk(0.0, 0.0, 0.0, 1.0),
        ColorSpace::Approximate(n) => space.color_from(&vec![1.0; *n]),
        _ => space.color_from(&[0.0, 0.0, 0.0, 0.0]),
    }
}
