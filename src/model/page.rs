//! Page-level types.

use crate::geom::Rect;
use crate::object::{Dict, ObjectId};
use crate::options::DEFAULT_RENDER_DPI;

/// US Letter, the fallback when a page tree carries no /MediaBox at all.
pub(crate) const DEFAULT_MEDIA_BOX: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// One page of a loaded document.
#[derive(Debug, Clone)]
pub struct Page {
    /// The page object's id in the document arena.
    pub(crate) id: ObjectId,

    /// Page extent in points (1 point = 1/72 inch), normalized.
    pub(crate) media_box: Rect,

    /// Display rotation, normalized to 0, 90, 180 or 270 degrees.
    pub(crate) rotate: u16,

    /// Content stream objects, in paint order.
    pub(crate) contents: Vec<ObjectId>,

    /// The page's resource dictionary (own or inherited).
    pub(crate) resources: Dict,
}

impl Page {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn media_box(&self) -> Rect {
        self.media_box
    }

    pub fn rotation(&self) -> u16 {
        self.rotate
    }

    pub(crate) fn contents(&self) -> &[ObjectId] {
        &self.contents
    }

    pub(crate) fn resources(&self) -> &Dict {
        &self.resources
    }

    /// Page size in points as displayed, i.e. with 90/270 rotation the
    /// media box extents swap.
    pub fn size_points(&self) -> (f32, f32) {
        let w = self.media_box.width().max(1.0);
        let h = self.media_box.height().max(1.0);
        if self.rotate == 90 || self.rotate == 270 {
            (h, w)
        } else {
            (w, h)
        }
    }

    /// Pixel dimensions for rendering this page.
    ///
    /// With `max_edge == 0` the page renders at its native size at
    /// [`DEFAULT_RENDER_DPI`]. Otherwise the longer displayed edge maps to
    /// `max_edge` exactly and the shorter edge scales proportionally,
    /// rounded to the nearest pixel. Both dimensions are at least 1.
    pub fn target_size(&self, max_edge: u32) -> (u32, u32) {
        let (w_pt, h_pt) = self.size_points();
        let (w, h) = if max_edge == 0 {
            let scale = DEFAULT_RENDER_DPI / 72.0;
            (w_pt * scale, h_pt * scale)
        } else {
            let edge = max_edge as f32;
            if w_pt >= h_pt {
                (edge, h_pt * edge / w_pt)
            } else {
                (w_pt * edge / h_pt, edge)
            }
        };
        ((w.round() as u32).max(1), (h.round() as u32).max(1))
    }

    /// Normalize a raw /Rotate value to one of the four legal angles.
    pub(crate) fn normalize_rotation(raw: i64) -> u16 {
        let r = raw.rem_euclid(360);
        match r {
            90 | 180 | 270 => r as u16,
            _ => 0,
        }
    }
}
