//! Validated configuration for loading, rendering, and recompression.
//!
//! Format and quality live in typed values constructed once at the API
//! boundary; nothing inside the engine re-validates them.

use crate::error::{Error, Result};
use std::str::FromStr;

/// Reference resolution for native-size rendering (`max_edge_size == 0`):
/// a 612x792pt page renders at 1275x1650 pixels.
pub const DEFAULT_RENDER_DPI: f32 = 150.0;

/// Output raster format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Lossy WebP.
    Webp,
    /// Lossy JPEG.
    Jpeg,
    /// Lossless PNG; quality selects compression effort only.
    Png,
}

impl ImageFormat {
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Webp | ImageFormat::Jpeg)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Webp => "image/webp",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "webp" => Ok(ImageFormat::Webp),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// A 0-100 quality setting. Out-of-range inputs clamp; they are a
/// tunable, not a correctness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: i64) -> Self {
        Quality(value.clamp(0, 100) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality(80)
    }
}

/// Options for loading a document.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Rebuild the cross-reference index by scanning the file when the
    /// declared one cannot be parsed.
    pub recover: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable scan-based recovery of broken cross-reference data.
    pub fn lenient(mut self) -> Self {
        self.recover = true;
        self
    }
}

/// Options for rendering pages to images.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Output image format
    pub format: ImageFormat,

    /// Encoding quality, 0-100
    pub quality: Quality,

    /// Longest output edge in pixels (0 = native size at
    /// [`DEFAULT_RENDER_DPI`])
    pub max_edge_size: u32,

    /// Whether pages render on the rayon pool
    pub parallel: bool,
}

impl RenderOptions {
    /// Create render options with defaults (WebP, quality 80, native size).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a format tag, e.g. from a CLI argument.
    pub fn with_format_str(mut self, format: &str) -> Result<Self> {
        self.format = format.parse()?;
        Ok(self)
    }

    /// Set the output format.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the encoding quality (clamped to 0-100).
    pub fn with_quality(mut self, quality: i64) -> Self {
        self.quality = Quality::new(quality);
        self
    }

    /// Set the maximum output edge in pixels.
    pub fn with_max_edge_size(mut self, max_edge_size: u32) -> Self {
        self.max_edge_size = max_edge_size;
        self
    }

    /// Disable parallel page rendering.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Webp,
            quality: Quality::default(),
            max_edge_size: 0,
            parallel: true,
        }
    }
}

/// Options for recompressing a document.
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    /// Re-encoding quality for embedded raster images, 0-100
    pub quality: Quality,
}

impl CompressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the re-encoding quality (clamped to 0-100).
    pub fn with_quality(mut self, quality: i64) -> Self {
        self.quality = Quality::new(quality);
        self
    }
}
