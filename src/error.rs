//! Error types for the repdf library.

use std::io;
use thiserror::Error;

/// Result type alias for repdf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while loading, rendering, or recompressing
/// a document.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not recognized as PDF at all.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The document structure is unparseable: missing or inconsistent
    /// cross-reference data, offsets out of range, cyclic references,
    /// or an object that cannot be read where one is required.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The document uses a recognized feature this library does not
    /// handle, such as encryption or an exotic stream codec.
    #[error("Unsupported document: {0}")]
    UnsupportedDocument(String),

    /// Page index is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(usize, usize),

    /// The requested output format tag is not recognized.
    #[error("Unsupported image format: {0:?}")]
    UnsupportedFormat(String),

    /// A page's content stream is structurally unparseable. Fatal for
    /// that page only; other pages of the same call still render.
    #[error("Failed to render page {page}: {reason}")]
    RenderFailure { page: usize, reason: String },

    /// An output image codec failed while encoding rendered pixels.
    #[error("Image encoding error: {0}")]
    Encode(String),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedDocument(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedDocument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageOutOfRange(10, 5);
        assert_eq!(
            err.to_string(),
            "Page 10 is out of range (document has 5 pages)"
        );

        let err = Error::UnsupportedFormat("tiff".to_string());
        assert_eq!(err.to_string(), "Unsupported image format: \"tiff\"");

        let err = Error::RenderFailure {
            page: 2,
            reason: "content stream truncated".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to render page 2: content stream truncated"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
