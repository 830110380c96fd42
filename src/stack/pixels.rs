//! Typed pixel containers and the byte codec.
//!
//! Pixel runs decoded from disk are held in a [`PixelData`] enum, one
//! variant per supported format, so values round-trip exactly. Byte
//! conversion is native-endian: the on-disk order is whatever the writing
//! machine used.

use crate::schema::PixelFormat;

/// A flat run of decoded pixels, typed by format.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    Bool(Vec<bool>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Dispatch over every variant, binding the inner vector.
macro_rules! each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            PixelData::I8($v) => $body,
            PixelData::U8($v) => $body,
            PixelData::Bool($v) => $body,
            PixelData::I16($v) => $body,
            PixelData::U16($v) => $body,
            PixelData::I32($v) => $body,
            PixelData::U32($v) => $body,
            PixelData::F32($v) => $body,
            PixelData::F64($v) => $body,
        }
    };
}

/// Dispatch over a same-format pair, binding both inner vectors.
macro_rules! each_variant_pair {
    ($a:expr, $b:expr, $x:ident, $y:ident => $body:expr) => {
        match ($a, $b) {
            (PixelData::I8($x), PixelData::I8($y)) => $body,
            (PixelData::U8($x), PixelData::U8($y)) => $body,
            (PixelData::Bool($x), PixelData::Bool($y)) => $body,
            (PixelData::I16($x), PixelData::I16($y)) => $body,
            (PixelData::U16($x), PixelData::U16($y)) => $body,
            (PixelData::I32($x), PixelData::I32($y)) => $body,
            (PixelData::U32($x), PixelData::U32($y)) => $body,
            (PixelData::F32($x), PixelData::F32($y)) => $body,
            (PixelData::F64($x), PixelData::F64($y)) => $body,
            _ => unreachable!("mismatched pixel formats"),
        }
    };
}

impl PixelData {
    /// Empty run of the given format.
    pub fn empty(format: PixelFormat) -> Self {
        Self::with_capacity(format, 0)
    }

    /// Empty run with room for `capacity` elements.
    pub fn with_capacity(format: PixelFormat, capacity: usize) -> Self {
        match format {
            PixelFormat::I8 => PixelData::I8(Vec::with_capacity(capacity)),
            PixelFormat::U8 => PixelData::U8(Vec::with_capacity(capacity)),
            PixelFormat::Bool => PixelData::Bool(Vec::with_capacity(capacity)),
            PixelFormat::I16 => PixelData::I16(Vec::with_capacity(capacity)),
            PixelFormat::U16 => PixelData::U16(Vec::with_capacity(capacity)),
            PixelFormat::I32 => PixelData::I32(Vec::with_capacity(capacity)),
            PixelFormat::U32 => PixelData::U32(Vec::with_capacity(capacity)),
            PixelFormat::F32 => PixelData::F32(Vec::with_capacity(capacity)),
            PixelFormat::F64 => PixelData::F64(Vec::with_capacity(capacity)),
        }
    }

    /// Decode a native-endian byte run. `bytes.len()` must be a multiple of
    /// the format's byte depth.
    pub fn from_bytes(bytes: &[u8], format: PixelFormat) -> Self {
        debug_assert_eq!(bytes.len() % format.byte_depth(), 0);
        match format {
            PixelFormat::I8 => PixelData::I8(bytemuck::pod_collect_to_vec(bytes)),
            PixelFormat::U8 => PixelData::U8(bytes.to_vec()),
            PixelFormat::Bool => PixelData::Bool(bytes.iter().map(|&b| b != 0).collect()),
            PixelFormat::I16 => PixelData::I16(bytemuck::pod_collect_to_vec(bytes)),
            PixelFormat::U16 => PixelData::U16(bytemuck::pod_collect_to_vec(bytes)),
            PixelFormat::I32 => PixelData::I32(bytemuck::pod_collect_to_vec(bytes)),
            PixelFormat::U32 => PixelData::U32(bytemuck::pod_collect_to_vec(bytes)),
            PixelFormat::F32 => PixelData::F32(bytemuck::pod_collect_to_vec(bytes)),
            PixelFormat::F64 => PixelData::F64(bytemuck::pod_collect_to_vec(bytes)),
        }
    }

    pub fn format(&self) -> PixelFormat {
        match self {
            PixelData::I8(_) => PixelFormat::I8,
            PixelData::U8(_) => PixelFormat::U8,
            PixelData::Bool(_) => PixelFormat::Bool,
            PixelData::I16(_) => PixelFormat::I16,
            PixelData::U16(_) => PixelFormat::U16,
            PixelData::I32(_) => PixelFormat::I32,
            PixelData::U32(_) => PixelFormat::U32,
            PixelData::F32(_) => PixelFormat::F32,
            PixelData::F64(_) => PixelFormat::F64,
        }
    }

    /// Element count.
    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.format().byte_depth()
    }

    /// Encode the element range `[start, end)` to native-endian bytes.
    pub fn range_bytes(&self, start: usize, end: usize) -> Vec<u8> {
        match self {
            PixelData::I8(v) => bytemuck::cast_slice(&v[start..end]).to_vec(),
            PixelData::U8(v) => v[start..end].to_vec(),
            PixelData::Bool(v) => v[start..end].iter().map(|&b| u8::from(b)).collect(),
            PixelData::I16(v) => bytemuck::cast_slice(&v[start..end]).to_vec(),
            PixelData::U16(v) => bytemuck::cast_slice(&v[start..end]).to_vec(),
            PixelData::I32(v) => bytemuck::cast_slice(&v[start..end]).to_vec(),
            PixelData::U32(v) => bytemuck::cast_slice(&v[start..end]).to_vec(),
            PixelData::F32(v) => bytemuck::cast_slice(&v[start..end]).to_vec(),
            PixelData::F64(v) => bytemuck::cast_slice(&v[start..end]).to_vec(),
        }
    }

    /// Encode the whole run to native-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.range_bytes(0, self.len())
    }

    /// Append all elements of `other`. Formats must match.
    pub fn append(&mut self, other: &PixelData) {
        let len = other.len();
        self.extend_from_range(other, 0, len);
    }

    /// Append the element range `[start, end)` of `src`. Formats must match.
    pub fn extend_from_range(&mut self, src: &PixelData, start: usize, end: usize) {
        each_variant_pair!(self, src, dst, s => dst.extend_from_slice(&s[start..end]));
    }

    /// Value at `idx` widened to f64 (`true` maps to 1.0).
    pub fn get_f64(&self, idx: usize) -> f64 {
        match self {
            PixelData::I8(v) => f64::from(v[idx]),
            PixelData::U8(v) => f64::from(v[idx]),
            PixelData::Bool(v) => f64::from(u8::from(v[idx])),
            PixelData::I16(v) => f64::from(v[idx]),
            PixelData::U16(v) => f64::from(v[idx]),
            PixelData::I32(v) => f64::from(v[idx]),
            PixelData::U32(v) => f64::from(v[idx]),
            PixelData::F32(v) => f64::from(v[idx]),
            PixelData::F64(v) => v[idx],
        }
    }

    /// All values widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.get_f64(i)).collect()
    }

    /// Convert to another format through f64 (exact for every integer
    /// format narrower than 53 bits; floats truncate toward zero when cast
    /// to integers, saturating at the target bounds).
    pub fn convert(&self, format: PixelFormat) -> PixelData {
        if self.format() == format {
            return self.clone();
        }
        let values = self.to_f64_vec();
        match format {
            PixelFormat::I8 => PixelData::I8(values.iter().map(|&v| v as i8).collect()),
            PixelFormat::U8 => PixelData::U8(values.iter().map(|&v| v as u8).collect()),
            PixelFormat::Bool => PixelData::Bool(values.iter().map(|&v| v != 0.0).collect()),
            PixelFormat::I16 => PixelData::I16(values.iter().map(|&v| v as i16).collect()),
            PixelFormat::U16 => PixelData::U16(values.iter().map(|&v| v as u16).collect()),
            PixelFormat::I32 => PixelData::I32(values.iter().map(|&v| v as i32).collect()),
            PixelFormat::U32 => PixelData::U32(values.iter().map(|&v| v as u32).collect()),
            PixelFormat::F32 => PixelData::F32(values.iter().map(|&v| v as f32).collect()),
            PixelFormat::F64 => PixelData::F64(values),
        }
    }
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for PixelData {
                fn from(v: Vec<$ty>) -> Self {
                    PixelData::$variant(v)
                }
            }
        )*
    };
}

impl_from_vec!(
    i8 => I8, u8 => U8, bool => Bool, i16 => I16, u16 => U16,
    i32 => I32, u32 => U32, f32 => F32, f64 => F64,
);

/// A 3D run of frames: shape `[frames, rows, columns]` over flat row-major
/// pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStack {
    pub shape: [usize; 3],
    pub data: PixelData,
}

impl FrameStack {
    pub fn new(shape: [usize; 3], data: PixelData) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn frames(&self) -> usize {
        self.shape[0]
    }

    pub fn rows(&self) -> usize {
        self.shape[1]
    }

    pub fn cols(&self) -> usize {
        self.shape[2]
    }

    pub fn format(&self) -> PixelFormat {
        self.data.format()
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len()
    }

    /// Encoded size of the whole stack in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.byte_len()
    }

    /// Pixels in one frame.
    pub fn frame_pixels(&self) -> usize {
        self.shape[1] * self.shape[2]
    }
}

/// A single 2D frame, possibly cropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub rows: usize,
    pub cols: usize,
    pub data: PixelData,
}

impl Frame {
    pub fn new(rows: usize, cols: usize, data: PixelData) -> Self {
        debug_assert_eq!(rows * cols, data.len());
        Self { rows, cols, data }
    }

    pub fn format(&self) -> PixelFormat {
        self.data.format()
    }
}

/// Concatenate stacks along one axis. All parts must share a format and
/// agree on every other axis extent; callers validate before calling.
pub(crate) fn concat_frame_stacks(parts: &[FrameStack], axis: usize) -> FrameStack {
    debug_assert!(!parts.is_empty());
    debug_assert!(axis < 3);

    let format = parts[0].format();
    let mut shape = parts[0].shape;
    shape[axis] = parts.iter().map(|p| p.shape[axis]).sum();

    let total: usize = shape.iter().product();
    let mut data = PixelData::with_capacity(format, total);

    match axis {
        0 => {
            for part in parts {
                data.append(&part.data);
            }
        }
        1 => {
            // Interleave whole frames: output frame f is the stacked rows of
            // every part's frame f.
            for f in 0..shape[0] {
                for part in parts {
                    let frame_px = part.frame_pixels();
                    data.extend_from_range(&part.data, f * frame_px, (f + 1) * frame_px);
                }
            }
        }
        _ => {
            // Interleave rows: output row r of frame f is every part's row r
            // of frame f, side by side.
            for f in 0..shape[0] {
                for r in 0..shape[1] {
                    for part in parts {
                        let cols = part.shape[2];
                        let base = (f * part.shape[1] + r) * cols;
                        data.extend_from_range(&part.data, base, base + cols);
                    }
                }
            }
        }
    }

    FrameStack::new(shape, data)
}
