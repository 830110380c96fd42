//! Pixel format tags and fixed-width header record packing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed-width pixel element format of a stack file.
///
/// Each variant maps to a single-character tag used in metadata files
/// (`b B ? h H i I f d`). On disk, pixels are stored native-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PixelFormat {
    /// Signed 8-bit integer (`b`).
    I8,
    /// Unsigned 8-bit integer (`B`). The default format.
    U8,
    /// Boolean, one byte per pixel (`?`).
    Bool,
    /// Signed 16-bit integer (`h`).
    I16,
    /// Unsigned 16-bit integer (`H`).
    U16,
    /// Signed 32-bit integer (`i`).
    I32,
    /// Unsigned 32-bit integer (`I`).
    U32,
    /// 32-bit float (`f`).
    F32,
    /// 64-bit float (`d`).
    F64,
}

/// All supported formats, in tag order.
pub const ALL_FORMATS: [PixelFormat; 9] = [
    PixelFormat::I8,
    PixelFormat::U8,
    PixelFormat::Bool,
    PixelFormat::I16,
    PixelFormat::U16,
    PixelFormat::I32,
    PixelFormat::U32,
    PixelFormat::F32,
    PixelFormat::F64,
];

impl PixelFormat {
    /// Single-character tag for this format.
    pub fn tag(self) -> char {
        match self {
            PixelFormat::I8 => 'b',
            PixelFormat::U8 => 'B',
            PixelFormat::Bool => '?',
            PixelFormat::I16 => 'h',
            PixelFormat::U16 => 'H',
            PixelFormat::I32 => 'i',
            PixelFormat::U32 => 'I',
            PixelFormat::F32 => 'f',
            PixelFormat::F64 => 'd',
        }
    }

    /// Parse a single-character tag.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'b' => Some(PixelFormat::I8),
            'B' => Some(PixelFormat::U8),
            '?' => Some(PixelFormat::Bool),
            'h' => Some(PixelFormat::I16),
            'H' => Some(PixelFormat::U16),
            'i' => Some(PixelFormat::I32),
            'I' => Some(PixelFormat::U32),
            'f' => Some(PixelFormat::F32),
            'd' => Some(PixelFormat::F64),
            _ => None,
        }
    }

    /// Bytes per pixel element.
    pub fn byte_depth(self) -> usize {
        match self {
            PixelFormat::I8 | PixelFormat::U8 | PixelFormat::Bool => 1,
            PixelFormat::I16 | PixelFormat::U16 => 2,
            PixelFormat::I32 | PixelFormat::U32 | PixelFormat::F32 => 4,
            PixelFormat::F64 => 8,
        }
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::U8
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Raised when a metadata file carries a pixel format tag outside the
/// supported set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown pixel format tag {0:?} (expected one of b B ? h H i I f d)")]
pub struct UnknownFormat(pub String);

impl TryFrom<String> for PixelFormat {
    type Error = UnknownFormat;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(tag), None) => PixelFormat::from_tag(tag).ok_or(UnknownFormat(value)),
            _ => Err(UnknownFormat(value)),
        }
    }
}

impl From<PixelFormat> for String {
    fn from(format: PixelFormat) -> String {
        format.tag().to_string()
    }
}

/// One fixed-width value of an optional file header, packed native-endian.
///
/// Stack files normally start directly with pixel data; writers that need a
/// legacy fixed-length header pass an ordered record list to
/// [`MultiImageStore::open_for_writing`](crate::stack::MultiImageStore::open_for_writing).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeaderRecord {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl HeaderRecord {
    /// Packed size of this record in bytes.
    pub fn byte_len(self) -> usize {
        match self {
            HeaderRecord::I8(_) | HeaderRecord::U8(_) => 1,
            HeaderRecord::I16(_) | HeaderRecord::U16(_) => 2,
            HeaderRecord::I32(_) | HeaderRecord::U32(_) | HeaderRecord::F32(_) => 4,
            HeaderRecord::I64(_) | HeaderRecord::U64(_) | HeaderRecord::F64(_) => 8,
        }
    }

    fn pack_into(self, buf: &mut Vec<u8>) {
        match self {
            HeaderRecord::I8(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::U8(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::I16(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::U16(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::I32(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::U32(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::I64(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::U64(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::F32(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            HeaderRecord::F64(v) => buf.extend_from_slice(&v.to_ne_bytes()),
        }
    }
}

/// Pack an ordered record sequence into one contiguous buffer.
pub fn pack_records(records: &[HeaderRecord]) -> Vec<u8> {
    let total = records.iter().map(|r| r.byte_len()).sum();
    let mut buf = Vec::with_capacity(total);
    for record in records {
        record.pack_into(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_bijection() {
        for format in ALL_FORMATS {
            assert_eq!(PixelFormat::from_tag(format.tag()), Some(format));
        }
        assert_eq!(PixelFormat::from_tag('x'), None);
    }

    #[test]
    fn test_byte_depths() {
        assert_eq!(PixelFormat::U8.byte_depth(), 1);
        assert_eq!(PixelFormat::Bool.byte_depth(), 1);
        assert_eq!(PixelFormat::I16.byte_depth(), 2);
        assert_eq!(PixelFormat::U32.byte_depth(), 4);
        assert_eq!(PixelFormat::F32.byte_depth(), 4);
        assert_eq!(PixelFormat::F64.byte_depth(), 8);
    }

    #[test]
    fn test_serde_tag_roundtrip() {
        let json = serde_json::to_string(&PixelFormat::U16).unwrap();
        assert_eq!(json, "\"H\"");
        let back: PixelFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PixelFormat::U16);
    }

    #[test]
    fn test_serde_rejects_unknown_tag() {
        let err = serde_json::from_str::<PixelFormat>("\"z\"");
        assert!(err.is_err());
        let err = serde_json::from_str::<PixelFormat>("\"BB\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_pack_records() {
        let records = [
            HeaderRecord::U32(0xAABBCCDD),
            HeaderRecord::U8(7),
            HeaderRecord::F64(1.5),
        ];
        let buf = pack_records(&records);
        assert_eq!(buf.len(), 13);
        assert_eq!(&buf[0..4], &0xAABBCCDDu32.to_ne_bytes());
        assert_eq!(buf[4], 7);
        assert_eq!(&buf[5..13], &1.5f64.to_ne_bytes());
    }
}
