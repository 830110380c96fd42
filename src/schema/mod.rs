//! Schema module - Metadata and pixel format types for stack files.

mod format;
mod metadata;

pub use format::*;
pub use metadata::*;
