//! Document model types.
//!
//! The model is the read-only structural view a load produces: the page
//! list with media boxes and resource dictionaries, document metadata,
//! and lazy access into the object arena. Rendering and recompression
//! both consume it without mutating it.

mod document;
mod page;

pub use document::{Document, DocumentInfo};
pub use page::Page;

pub(crate) use page::DEFAULT_MEDIA_BOX;
