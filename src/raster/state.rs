//! Graphics state: the q/Q stack contents, color spaces, and text state.

use crate::error::{Error, Result};
use crate::geom::{Matrix, Rect};
use crate::model::Document;
use crate::object::Object;

/// An RGB color with components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

pub const BLACK: Color = Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
};

impl Color {
    pub fn gray(v: f32) -> Color {
        Color { r: v, g: v, b: v }
    }

    pub fn rgb(r: f32, g: f32, b: f32) -> Color {
        Color { r, g, b }
    }

    /// Naive CMYK conversion; good enough for screen rendering.
    pub fn cmyk(c: f32, m: f32, y: f32, k: f32) -> Color {
        Color {
            r: (1.0 - c) * (1.0 - k),
            g: (1.0 - m) * (1.0 - k),
            b: (1.0 - y) * (1.0 - k),
        }
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.b.clamp(0.0, 1.0) * 255.0).round() as u8,
        ]
    }
}

/// A resolved color space family.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    /// Palette lookup into a base space.
    Indexed {
        base: Box<ColorSpace>,
        hival: u32,
        lookup: Vec<u8>,
    },
    /// Separation / DeviceN / Lab: rendered as a gray approximation of
    /// the given component count.
    Approximate(usize),
    /// Pattern fills are not painted.
    Pattern,
}

impl ColorSpace {
    pub fn components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::DeviceRgb => 3,
            ColorSpace::DeviceCmyk => 4,
            ColorSpace::Approximate(n) => *n,
            ColorSpace::Pattern => 1,
        }
    }

    /// Interpret `comps` (each in [0, 1], except the Indexed index) as a
    /// color in this space.
    pub fn color_from(&self, comps: &[f32]) -> Color {
        match self {
            ColorSpace::DeviceGray => Color::gray(comp(comps, 0)),
            ColorSpace::DeviceRgb => {
                Color::rgb(comp(comps, 0), comp(comps, 1), comp(comps, 2))
            }
            ColorSpace::DeviceCmyk => Color::cmyk(
                comp(comps, 0),
                comp(comps, 1),
                comp(comps, 2),
                comp(comps, 3),
            ),
            ColorSpace::Indexed {
                base,
                hival,
                lookup,
            } => {
                let index = comps.first().copied().unwrap_or(0.0).round().max(0.0) as u32;
                let index = index.min(*hival);
                let n = base.components().min(4);
                let start = index as usize * n;
                let mut base_comps = [0.0f32; 4];
                for (i, slot) in base_comps.iter_mut().take(n).enumerate() {
                    *slot = lookup.get(start + i).map_or(0.0, |&b| b as f32 / 255.0);
                }
                base.color_from(&base_comps[..n])
            }
            ColorSpace::Approximate(_) => {
                // Full tint means full colorant coverage, i.e. dark.
                let tint = comps.iter().copied().fold(0.0f32, f32::max);
                Color::gray(1.0 - tint.clamp(0.0, 1.0))
            }
            ColorSpace::Pattern => BLACK,
        }
    }

    /// Resolve a color space object: a device name or a family array.
    pub fn from_object(doc: &Document, object: &Object) -> Result<ColorSpace> {
        let object = doc.resolve(object)?;
        match &object {
            Object::Name(name) => ColorSpace::from_family_name(name),
            Object::Array(items) if !items.is_empty() => {
                let family = doc.resolve(&items[0])?;
                let family = family
                    .as_name()
                    .ok_or_else(|| Error::malformed("color space family is not a name"))?
                    .to_string();
                match family.as_str() {
                    "ICCBased" => {
                        let stream = items
                            .get(1)
                            .map(|o| doc.resolve(o))
                            .transpose()?
                            .ok_or_else(|| Error::malformed("ICCBased without stream"))?;
                        let n = stream
                            .as_dict()
                            .and_then(|d| d.get_int("N"))
                            .unwrap_or(3);
                        Ok(match n {
                            1 => ColorSpace::DeviceGray,
                            4 => ColorSpace::DeviceCmyk,
                            _ => ColorSpace::DeviceRgb,
                        })
                    }
                    "Indexed" | "I" => {
                        let base = items
                            .get(1)
                            .map(|o| ColorSpace::from_object(doc, o))
                            .transpose()?
                            .ok_or_else(|| Error::malformed("Indexed without base"))?;
                        let hival = items
                            .get(2)
                            .map(|o| doc.resolve(o))
                            .transpose()?
                            .and_then(|o| o.as_int())
                            .unwrap_or(0)
                            .max(0) as u32;
                        let lookup = match items.get(3).map(|o| doc.resolve(o)).transpose()? {
                            Some(Object::String(bytes)) => bytes,
                            Some(Object::Stream(ref stream)) => doc.stream_data(stream)?,
                            _ => return Err(Error::malformed("Indexed without lookup table")),
                        };
                        Ok(ColorSpace::Indexed {
                            base: Box::new(base),
                            hival,
                            lookup,
                        })
                    }
                    "Separation" => Ok(ColorSpace::Approximate(1)),
                    "DeviceN" => {
                        let n = items
                            .get(1)
                            .map(|o| doc.resolve(o))
                            .transpose()?
                            .and_then(|o| o.as_array().map(|a| a.len()))
                            .unwrap_or(1);
                        Ok(ColorSpace::Approximate(n))
                    }
                    "CalRGB" | "Lab" => Ok(ColorSpace::DeviceRgb),
                    "CalGray" => Ok(ColorSpace::DeviceGray),
                    "Pattern" => Ok(ColorSpace::Pattern),
                    other => Err(Error::unsupported(format!("color space {other}"))),
                }
            }
            _ => Err(Error::malformed("invalid color space object")),
        }
    }

    pub fn from_family_name(name: &str) -> Result<ColorSpace> {
        match name {
            "DeviceGray" | "G" | "CalGray" => Ok(ColorSpace::DeviceGray),
            "DeviceRGB" | "RGB" | "CalRGB" => Ok(ColorSpace::DeviceRgb),
            "DeviceCMYK" | "CMYK" => Ok(ColorSpace::DeviceCmyk),
            "Pattern" => Ok(ColorSpace::Pattern),
            "Indexed" | "I" => Err(Error::malformed("Indexed requires array form")),
            other => Err(Error::unsupported(format!("color space {other}"))),
        }
    }
}

fn comp(comps: &[f32], i: usize) -> f32 {
    comps.get(i).copied().unwrap_or(0.0)
}

/// Text-positioning and text-showing parameters.
#[derive(Debug, Clone)]
pub struct TextState {
    /// Font resource key selected by Tf
    pub font: Option<String>,
    /// Font size in text-space units
    pub size: f32,
    /// Tc: extra advance per glyph
    pub char_spacing: f32,
    /// Tw: extra advance per ASCII space
    pub word_spacing: f32,
    /// Tz / 100
    pub h_scale: f32,
    /// TL: line step for T* and '
    pub leading: f32,
    /// Ts: baseline shift
    pub rise: f32,
    /// Tr: 3 = invisible (OCR text layers)
    pub render_mode: i64,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

/// The state saved and restored by q/Q.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    pub ctm: Matrix,
    pub fill_space: ColorSpace,
    pub stroke_space: ColorSpace,
    pub fill_color: Color,
    pub stroke_color: Color,
    pub fill_alpha: f32,
    pub stroke_alpha: f32,
    pub line_width: f32,
    /// Device-space clip; `None` means the full page.
    pub clip: Option<Rect>,
    pub text: TextState,
}

impl GraphicsState {
    pub fn new(ctm: Matrix) -> Self {
        GraphicsState {
            ctm,
            fill_space: ColorSpace::DeviceGray,
            stroke_space: ColorSpace::DeviceGray,
            fill_color: BLACK,
            stroke_color: BLACK,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            line_width: 1.0,
            clip: None,
            text: TextState::default(),
        }
    }

    /// Intersect the device clip with a new rectangle.
    pub fn clip_to(&mut self, rect: Rect) {
        self.clip = Some(match self.clip {
            Some(existing) => existing.intersect(&rect),
            None => rect,
        });
    }
}
