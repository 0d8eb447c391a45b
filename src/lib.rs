//! # repdf
//!
//! PDF page rasterization and document recompression for Rust.
//!
//! This library loads PDF documents, renders their pages to raster
//! images (WebP, JPEG, PNG), and recompresses their embedded images to
//! shrink files at a chosen quality.
//!
//! ## Quick Start
//!
//! ```no_run
//! use repdf::{load_file, render_document, RenderOptions};
//!
//! fn main() -> repdf::Result<()> {
//!     let doc = load_file("document.pdf")?;
//!
//!     let options = RenderOptions::new().with_quality(80).with_max_edge_size(1024);
//!     let output = render_document(&doc, &options);
//!     for page in &output.pages {
//!         std::fs::write(format!("page-{}.webp", page.index + 1), &page.data)?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Pure-Rust loading**: classic and stream cross-reference tables,
//!   object streams, lazy object resolution
//! - **Best-effort rendering**: unsupported content is skipped with a
//!   warning instead of failing the page
//! - **Size guarantee**: recompression never replaces an image with a
//!   larger payload
//! - **Parallel processing**: pages render on the Rayon pool
//!
//! When `max_edge_size` is 0, pages render at their native size at a
//! fixed reference resolution of 150 DPI ([`DEFAULT_RENDER_DPI`]).

pub mod compress;
pub mod detect;
pub mod encode;
pub mod error;
pub mod geom;
pub mod images;
pub mod model;
pub mod object;
pub mod options;
pub mod parser;
pub mod raster;

// Re-export commonly used types
pub use compress::{CompressStats, ImageSummary};
pub use detect::{
    detect_version_from_bytes, detect_version_from_path, is_pdf, is_pdf_bytes, PdfVersion,
};
pub use encode::EncodedImage;
pub use error::{Error, Result};
pub use model::{Document, DocumentInfo, Page};
pub use options::{
    CompressOptions, ImageFormat, LoadOptions, Quality, RenderOptions, DEFAULT_RENDER_DPI,
};
pub use raster::pixmap::{PixelFormat, Pixmap};

use rayon::prelude::*;
use std::path::Path;

/// Load a PDF document from raw bytes.
///
/// # Example
///
/// ```no_run
/// use repdf::load_bytes;
///
/// let data = std::fs::read("document.pdf").unwrap();
/// let doc = load_bytes(&data).unwrap();
/// println!("Pages: {}", doc.page_count());
/// ```
pub fn load_bytes(data: &[u8]) -> Result<Document> {
    parser::load_document(data, &LoadOptions::default())
}

/// Load a PDF document from raw bytes with custom options.
///
/// # Example
///
/// ```no_run
/// use repdf::{load_bytes_with_options, LoadOptions};
///
/// let data = std::fs::read("damaged.pdf").unwrap();
/// let doc = load_bytes_with_options(&data, LoadOptions::new().lenient()).unwrap();
/// ```
pub fn load_bytes_with_options(data: &[u8], options: LoadOptions) -> Result<Document> {
    parser::load_document(data, &options)
}

/// Load a PDF document from a file.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Document> {
    let data = std::fs::read(path)?;
    load_bytes(&data)
}

/// Load a PDF document from a file with custom options.
pub fn load_file_with_options<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Document> {
    let data = std::fs::read(path)?;
    load_bytes_with_options(&data, options)
}

/// Render every page of a PDF byte stream to encoded images.
///
/// One entry per page, in page order; see [`render_document`].
pub fn render_bytes(data: &[u8], options: &RenderOptions) -> Result<RenderOutput> {
    let doc = load_bytes(data)?;
    Ok(render_document(&doc, options))
}

/// Render every page of a loaded document to encoded images.
///
/// Pages render independently (in parallel unless
/// [`RenderOptions::sequential`] was set). A page whose content stream
/// is structurally broken contributes a [`PageFailure`] while the
/// remaining pages still render.
pub fn render_document(doc: &Document, options: &RenderOptions) -> RenderOutput {
    let indices: Vec<usize> = (0..doc.page_count()).collect();
    let results: Vec<Result<PageImage>> = if options.parallel {
        indices
            .par_iter()
            .map(|&index| render_page(doc, index, options))
            .collect()
    } else {
        indices
            .iter()
            .map(|&index| render_page(doc, index, options))
            .collect()
    };

    let mut output = RenderOutput::default();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(page) => output.pages.push(page),
            Err(error) => output.failures.push(PageFailure { index, error }),
        }
    }
    output
}

/// Render a single page to an encoded image.
///
/// The page's longer displayed edge maps to
/// [`RenderOptions::max_edge_size`] exactly (native 150 DPI size when
/// it is 0); the shorter edge scales proportionally.
pub fn render_page(doc: &Document, index: usize, options: &RenderOptions) -> Result<PageImage> {
    let page = doc.page(index)?;
    let (width, height) = page.target_size(options.max_edge_size);
    let raster = raster::rasterize(doc, page, width, height).map_err(|err| match err {
        Error::RenderFailure { .. } => err,
        other => Error::RenderFailure {
            page: index,
            reason: other.to_string(),
        },
    })?;
    // The pixmap is already sized to the cap, so no second downscale.
    let encoded = encode::encode(&raster.pixmap, options.format, options.quality, 0)?;
    Ok(PageImage {
        index,
        width: encoded.width,
        height: encoded.height,
        format: options.format,
        data: encoded.data,
        warnings: raster.warnings,
    })
}

/// Recompress a PDF byte stream; see [`compress_document`].
pub fn compress_bytes(data: &[u8], options: &CompressOptions) -> Result<Vec<u8>> {
    let doc = load_bytes(data)?;
    compress_document(&doc, options)
}

/// Re-encode the document's embedded raster images at the requested
/// quality and serialize a new PDF.
///
/// Images whose re-encoded payload would not be smaller keep their
/// original bytes; non-image content passes through unchanged.
pub fn compress_document(doc: &Document, options: &CompressOptions) -> Result<Vec<u8>> {
    let (bytes, _) = compress::recompress(doc, options.quality)?;
    Ok(bytes)
}

/// Like [`compress_document`], additionally reporting what the run did.
pub fn compress_document_with_stats(
    doc: &Document,
    options: &CompressOptions,
) -> Result<(Vec<u8>, CompressStats)> {
    compress::recompress(doc, options.quality)
}

/// A completed multi-page render.
#[derive(Debug, Default)]
pub struct RenderOutput {
    /// Successfully rendered pages, in page order.
    pub pages: Vec<PageImage>,
    /// Pages whose content stream was structurally unparseable.
    pub failures: Vec<PageFailure>,
}

impl RenderOutput {
    /// True when every page rendered.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One rendered page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Zero-based page index
    pub index: usize,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Format the data is encoded in
    pub format: ImageFormat,
    /// Encoded image bytes
    pub data: Vec<u8>,
    /// Degradations recorded while painting (skipped operators,
    /// undecodable images)
    pub warnings: Vec<String>,
}

/// A page that failed to render while its siblings succeeded.
#[derive(Debug)]
pub struct PageFailure {
    pub index: usize,
    pub error: Error,
}

/// Builder for one-expression render and compress calls.
///
/// # Example
///
/// ```no_run
/// use repdf::{ImageFormat, Repdf};
///
/// let output = Repdf::new()
///     .with_format(ImageFormat::Jpeg)
///     .with_quality(75)
///     .with_max_edge_size(1024)
///     .lenient()
///     .render("document.pdf")?;
/// # Ok::<(), repdf::Error>(())
/// ```
pub struct Repdf {
    load_options: LoadOptions,
    render_options: RenderOptions,
    compress_options: CompressOptions,
}

impl Repdf {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self {
            load_options: LoadOptions::default(),
            render_options: RenderOptions::default(),
            compress_options: CompressOptions::default(),
        }
    }

    /// Enable scan-based recovery of broken cross-reference data.
    pub fn lenient(mut self) -> Self {
        self.load_options = self.load_options.lenient();
        self
    }

    /// Disable parallel page rendering.
    pub fn sequential(mut self) -> Self {
        self.render_options = self.render_options.sequential();
        self
    }

    /// Set the render output format.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.render_options = self.render_options.with_format(format);
        self
    }

    /// Parse and validate a format tag, e.g. from a CLI argument.
    pub fn with_format_str(mut self, format: &str) -> Result<Self> {
        self.render_options = self.render_options.with_format_str(format)?;
        Ok(self)
    }

    /// Set the quality for both rendering and recompression (clamped to
    /// 0-100).
    pub fn with_quality(mut self, quality: i64) -> Self {
        self.render_options = self.render_options.with_quality(quality);
        self.compress_options = self.compress_options.with_quality(quality);
        self
    }

    /// Set the maximum output edge in pixels (0 = native size).
    pub fn with_max_edge_size(mut self, max_edge_size: u32) -> Self {
        self.render_options = self.render_options.with_max_edge_size(max_edge_size);
        self
    }

    /// Load a file and render every page.
    pub fn render<P: AsRef<Path>>(&self, path: P) -> Result<RenderOutput> {
        let doc = load_file_with_options(path, self.load_options.clone())?;
        Ok(render_document(&doc, &self.render_options))
    }

    /// Render every page of a PDF byte stream.
    pub fn render_bytes(&self, data: &[u8]) -> Result<RenderOutput> {
        let doc = load_bytes_with_options(data, self.load_options.clone())?;
        Ok(render_document(&doc, &self.render_options))
    }

    /// Load a file and recompress it.
    pub fn compress<P: AsRef<Path>>(&self, path: P) -> Result<Vec<u8>> {
        let doc = load_file_with_options(path, self.load_options.clone())?;
        compress_document(&doc, &self.compress_options)
    }

    /// Recompress a PDF byte stream.
    pub fn compress_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let doc = load_bytes_with_options(data, self.load_options.clone())?;
        compress_document(&doc, &self.compress_options)
    }
}

impl Default for Repdf {
    fn default() -> Self {
        Self::new()
    }
}
