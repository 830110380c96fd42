//! Metadata descriptors for stack files.
//!
//! A metadata file is JSON with two sections: `stack` describes one stack
//! file (shape, pixel format, header length), `settings` carries I/O limits.
//! Absent keys fall back to fixed defaults, so `{}` is a valid metadata
//! file describing an empty 8-bit stack.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::format::PixelFormat;

fn default_fps() -> f64 {
    1.0
}

fn default_px_size() -> f64 {
    1.0
}

/// Default in-memory budget for a single write call, in bytes.
fn default_max_buffer_size() -> usize {
    100_000_000
}

/// Per-stack metadata section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackMetadata {
    /// Path of the stack file. Optional; a path given at store construction
    /// takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<PathBuf>,
    /// Length in bytes of an opaque fixed header preceding pixel data.
    #[serde(default)]
    pub hdr_len: u64,
    /// Stack shape as `[frames, rows, columns]`.
    #[serde(default)]
    pub shape: [usize; 3],
    /// Pixel element format tag.
    #[serde(default)]
    pub px_format: PixelFormat,
    /// Acquisition frame rate.
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Physical size of one pixel.
    #[serde(default = "default_px_size")]
    pub px_size: f64,
}

impl Default for StackMetadata {
    fn default() -> Self {
        Self {
            filename: None,
            hdr_len: 0,
            shape: [0, 0, 0],
            px_format: PixelFormat::default(),
            fps: default_fps(),
            px_size: default_px_size(),
        }
    }
}

/// I/O settings section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Largest number of bytes a single write call may hold in memory;
    /// larger arrays are written in frame-aligned chunks.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_buffer_size: default_max_buffer_size(),
        }
    }
}

/// A complete metadata file: `stack` and `settings` sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFile {
    #[serde(default)]
    pub stack: StackMetadata,
    #[serde(default)]
    pub settings: StoreSettings,
}

impl MetadataFile {
    /// Load and parse a metadata file from disk.
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let text = fs::read_to_string(path).map_err(|source| MetadataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| MetadataError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist this metadata to disk as pretty-printed JSON.
    pub fn export(&self, path: &Path) -> Result<(), MetadataError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| MetadataError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Where a store's metadata comes from: an in-memory descriptor or a
/// metadata file path. Resolved exactly once, at store construction.
#[derive(Debug, Clone)]
pub enum MetadataSource {
    Inline(MetadataFile),
    Path(PathBuf),
}

impl MetadataSource {
    /// Resolve to a concrete [`MetadataFile`], reading from disk if needed.
    pub fn resolve(self) -> Result<MetadataFile, MetadataError> {
        match self {
            MetadataSource::Inline(meta) => Ok(meta),
            MetadataSource::Path(path) => MetadataFile::load(&path),
        }
    }
}

impl From<MetadataFile> for MetadataSource {
    fn from(meta: MetadataFile) -> Self {
        MetadataSource::Inline(meta)
    }
}

impl From<StackMetadata> for MetadataSource {
    fn from(stack: StackMetadata) -> Self {
        MetadataSource::Inline(MetadataFile {
            stack,
            settings: StoreSettings::default(),
        })
    }
}

impl From<PathBuf> for MetadataSource {
    fn from(path: PathBuf) -> Self {
        MetadataSource::Path(path)
    }
}

impl From<&Path> for MetadataSource {
    fn from(path: &Path) -> Self {
        MetadataSource::Path(path.to_path_buf())
    }
}

/// Metadata loading and persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("cannot read metadata file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse metadata file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write metadata file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_fill_absent_keys() {
        let meta: MetadataFile = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.stack.hdr_len, 0);
        assert_eq!(meta.stack.shape, [0, 0, 0]);
        assert_eq!(meta.stack.px_format, PixelFormat::U8);
        assert_eq!(meta.stack.fps, 1.0);
        assert_eq!(meta.stack.px_size, 1.0);
        assert_eq!(meta.settings.max_buffer_size, 100_000_000);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let meta: MetadataFile =
            serde_json::from_str(r#"{"stack": {"shape": [5, 4, 3], "px_format": "h"}}"#).unwrap();
        assert_eq!(meta.stack.shape, [5, 4, 3]);
        assert_eq!(meta.stack.px_format, PixelFormat::I16);
        assert_eq!(meta.stack.fps, 1.0);
        assert_eq!(meta.settings.max_buffer_size, 100_000_000);
    }

    #[test]
    fn test_export_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");

        let meta = MetadataFile {
            stack: StackMetadata {
                filename: Some(PathBuf::from("stack.raw")),
                hdr_len: 16,
                shape: [10, 32, 64],
                px_format: PixelFormat::F32,
                fps: 25.0,
                px_size: 0.5,
            },
            settings: StoreSettings {
                max_buffer_size: 4096,
            },
        };

        meta.export(&path).unwrap();
        let back = MetadataFile::load(&path).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_source_resolution() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        let meta = MetadataFile::default();
        meta.export(&path).unwrap();

        let from_path = MetadataSource::from(path.as_path()).resolve().unwrap();
        assert_eq!(from_path, meta);

        let inline = MetadataSource::from(meta.clone()).resolve().unwrap();
        assert_eq!(inline, meta);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = MetadataFile::load(Path::new("/nonexistent/meta.json"));
        assert!(matches!(err, Err(MetadataError::Read { .. })));
    }
}
