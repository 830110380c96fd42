//! mistack - Random-access I/O for raw multi-image stack files.
//!
//! A multi-image stack is a large sequence of fixed-size raster frames
//! stored back to back in one headerless (or fixed-header) binary file,
//! described by a small JSON metadata file. This crate maps logical
//! `(frame, row, column)` coordinates onto byte offsets and provides
//! partial reads (cropped regions, strided frame ranges, per-pixel time
//! traces), memory-bounded chunked writes, and merging of several stacks
//! into one.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: metadata descriptors, pixel format tags, header records
//! - `stack`: the store itself (offset math, read/write paths, selection
//!   validation, merging)
//!
//! # Example
//!
//! ```rust,no_run
//! use mistack::{FrameRange, MetadataSource, MultiImageStore, Roi};
//! use std::path::PathBuf;
//!
//! // Open a stack described by a metadata file.
//! let mut store = MultiImageStore::new(
//!     Some(PathBuf::from("movie.raw")),
//!     MetadataSource::Path(PathBuf::from("movie_metadata.json")),
//! )?;
//!
//! // Every other frame of a 64x64 window.
//! let window = store.read(
//!     Some(&FrameRange::with_step(0, None, 2)),
//!     Some(&Roi::new(16, 16, 64, 64)),
//!     true,
//! )?;
//! println!("read {} frames", window.frames());
//! # Ok::<(), mistack::StackError>(())
//! ```

pub mod schema;
pub mod stack;

// Re-export commonly used types
pub use schema::{
    HeaderRecord, MetadataError, MetadataFile, MetadataSource, PixelFormat, StackMetadata,
    StoreSettings,
};
pub use stack::{
    Frame, FrameRange, FrameStack, MergeInput, MultiImageStore, PixelData, Roi, SelectionError,
    StackError, merge_stacks,
};
