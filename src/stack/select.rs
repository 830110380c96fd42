//! Region-of-interest and frame-range selections, and their validation
//! against a store's declared shape.

use serde::{Deserialize, Serialize};

/// A rectangular sub-window of a frame. `None` width or height means "to
/// the edge of the frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Roi {
    pub left: usize,
    pub top: usize,
    pub width: Option<usize>,
    pub height: Option<usize>,
}

impl Roi {
    pub fn new(left: usize, top: usize, width: usize, height: usize) -> Self {
        Self {
            left,
            top,
            width: Some(width),
            height: Some(height),
        }
    }

    /// A window spanning from `(left, top)` to the bottom-right frame edge.
    pub fn to_edge(left: usize, top: usize) -> Self {
        Self {
            left,
            top,
            width: None,
            height: None,
        }
    }
}

/// A `(start, end, step)` selection over the frame axis. `None` end means
/// "to the last frame"; `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: Option<usize>,
    pub step: usize,
}

impl Default for FrameRange {
    fn default() -> Self {
        Self {
            start: 0,
            end: None,
            step: 1,
        }
    }
}

impl FrameRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
            step: 1,
        }
    }

    pub fn with_step(start: usize, end: Option<usize>, step: usize) -> Self {
        Self { start, end, step }
    }

    /// Every frame from `start` to the end of the stack.
    pub fn starting_at(start: usize) -> Self {
        Self {
            start,
            end: None,
            step: 1,
        }
    }
}

/// A [`Roi`] resolved against a concrete frame shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRoi {
    pub left: usize,
    pub top: usize,
    pub width: usize,
    pub height: usize,
}

impl ResolvedRoi {
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// A [`FrameRange`] resolved against a concrete frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl ResolvedRange {
    /// Number of frames the range selects.
    pub fn len(&self) -> usize {
        if self.end <= self.start {
            0
        } else {
            (self.end - self.start).div_ceil(self.step)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selected frame indices, in order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + use<> {
        (self.start..self.end).step_by(self.step)
    }
}

/// Selection validation errors. All are raised before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("left edge {left} must be in the range [0, {cols})")]
    LeftOutOfBounds { left: usize, cols: usize },
    #[error("top edge {top} must be in the range [0, {rows})")]
    TopOutOfBounds { top: usize, rows: usize },
    #[error(
        "region {left}+{width} x {top}+{height} incompatible with frame shape {rows} x {cols}"
    )]
    RegionTooLarge {
        left: usize,
        top: usize,
        width: usize,
        height: usize,
        rows: usize,
        cols: usize,
    },
    #[error("frame range step must be non-zero")]
    ZeroStep,
}

/// Validate a region of interest against a frame shape `(rows, cols)`.
///
/// An absent ROI resolves to the full frame when `replace_absent` is set,
/// and stays absent (meaning "no crop") otherwise. A present ROI has its
/// open width/height resolved to the frame edge, and must lie entirely
/// within the frame.
pub fn validate_roi(
    roi: Option<&Roi>,
    frame_shape: (usize, usize),
    replace_absent: bool,
) -> Result<Option<ResolvedRoi>, SelectionError> {
    let (rows, cols) = frame_shape;
    let Some(roi) = roi else {
        if replace_absent {
            return Ok(Some(ResolvedRoi {
                left: 0,
                top: 0,
                width: cols,
                height: rows,
            }));
        }
        return Ok(None);
    };

    if roi.left >= cols {
        return Err(SelectionError::LeftOutOfBounds {
            left: roi.left,
            cols,
        });
    }
    if roi.top >= rows {
        return Err(SelectionError::TopOutOfBounds { top: roi.top, rows });
    }

    let width = roi.width.unwrap_or(cols - roi.left);
    let height = roi.height.unwrap_or(rows - roi.top);

    if roi.left + width > cols || roi.top + height > rows {
        return Err(SelectionError::RegionTooLarge {
            left: roi.left,
            top: roi.top,
            width,
            height,
            rows,
            cols,
        });
    }

    Ok(Some(ResolvedRoi {
        left: roi.left,
        top: roi.top,
        width,
        height,
    }))
}

/// Validate a frame range against a stack's frame count.
///
/// An absent range resolves to the whole stack when `replace_absent` is
/// set. An absent end resolves to `frame_count`. Start and end are *not*
/// bounds-checked here: a range running past the file surfaces as an
/// end-of-file error at read time.
pub fn validate_frame_range(
    range: Option<&FrameRange>,
    frame_count: usize,
    replace_absent: bool,
) -> Result<Option<ResolvedRange>, SelectionError> {
    let Some(range) = range else {
        if replace_absent {
            return Ok(Some(ResolvedRange {
                start: 0,
                end: frame_count,
                step: 1,
            }));
        }
        return Ok(None);
    };

    if range.step == 0 {
        return Err(SelectionError::ZeroStep);
    }

    Ok(Some(ResolvedRange {
        start: range.start,
        end: range.end.unwrap_or(frame_count),
        step: range.step,
    }))
}
