//! Storage layer: durable JSON snapshot documents.
//!
//! Each store (cache, preference memory, category registry) is one document that is
//! read once at startup and rewritten wholesale on mutation. Unreadable documents load
//! as the default state, and a failed write switches the document to in-memory-only
//! mode for the rest of the process.

mod document;
mod error;

pub use document::Document;
pub use error::{Result, StoreError};
