//! Low-level PDF parsing: tokenizer, stream filters, cross-reference
//! tables, document loading, and content-stream operators.

pub mod content;
pub mod filters;
pub mod lexer;
pub mod loader;
pub mod xref;

pub use content::{ContentOp, ContentParser};
pub use lexer::Lexer;
pub use loader::load_document;
pub use xref::{XrefEntry, XrefTable};
