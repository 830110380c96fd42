//! Reading, writing, and merging raw multi-image stack files.
//!
//! A stack file is a flat binary image sequence with no magic number and
//! no trailer; everything needed to interpret it lives in a metadata file
//! (see [`crate::schema`]).
//!
//! # File Format
//!
//! ```text
//! Header (hdr_len bytes, may be 0):
//!   Opaque. Writers may emit packed fixed-width records here.
//!
//! Pixel data (frames * rows * cols * byte_depth bytes):
//!   Frames in acquisition order, each frame row-major,
//!   each pixel one fixed-width native-endian value.
//! ```
//!
//! The byte offset of pixel `(frame, row, col)` is
//! `hdr_len + (frame * rows * cols + row * cols + col) * byte_depth`.

mod merge;
mod pixels;
mod select;
mod store;

pub use merge::{MergeInput, merge_stacks};
pub use pixels::{Frame, FrameStack, PixelData};
pub use select::{
    FrameRange, ResolvedRange, ResolvedRoi, Roi, SelectionError, validate_frame_range,
    validate_roi,
};
pub use store::{MultiImageStore, StackError};
