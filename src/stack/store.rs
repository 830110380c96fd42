//! The multi-image store: random-access reads and chunked sequential
//! writes over one raw stack file.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::schema::{
    HeaderRecord, MetadataError, MetadataFile, MetadataSource, PixelFormat, StackMetadata,
    StoreSettings, pack_records,
};

use super::pixels::{Frame, FrameStack, PixelData};
use super::select::{
    FrameRange, ResolvedRange, ResolvedRoi, Roi, SelectionError, validate_frame_range,
    validate_roi,
};

/// Immutable description of a stack file, resolved once at construction.
#[derive(Debug, Clone)]
struct StackDescriptor {
    path: Option<PathBuf>,
    header_len: u64,
    shape: [usize; 3],
    format: PixelFormat,
    fps: f64,
    px_size: f64,
    max_buffer_size: usize,
    px_per_frame: usize,
}

/// Reader/writer for a raw multi-frame image stack file.
///
/// The file is `header_len` opaque bytes followed by `frames` frames in
/// row-major order, each pixel one fixed-width value of the declared
/// format. A store owns at most one read handle and one write handle;
/// opening either is idempotent, and both are released on [`close`]
/// (or on drop).
///
/// Usage:
/// ```no_run
/// use mistack::{MetadataSource, MultiImageStore};
/// use std::path::PathBuf;
///
/// let mut store = MultiImageStore::new(
///     Some(PathBuf::from("stack.raw")),
///     MetadataSource::Path(PathBuf::from("stack_metadata.json")),
/// )?;
/// let frame = store.read_frame(10, None)?;
/// println!("{} x {} pixels", frame.rows, frame.cols);
/// # Ok::<(), mistack::StackError>(())
/// ```
///
/// [`close`]: MultiImageStore::close
pub struct MultiImageStore {
    desc: StackDescriptor,
    reader: Option<BufReader<File>>,
    /// Path the read handle was opened on, for error reporting.
    read_path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

/// Store I/O errors.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("no file path: none supplied at construction and none in metadata")]
    MissingPath,
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(
        "end of file in {}: requested {requested} bytes ({pixels} pixels) \
         from offset {offset}, got {actual} bytes",
        .path.display()
    )]
    Eof {
        requested: usize,
        actual: usize,
        pixels: usize,
        offset: u64,
        path: PathBuf,
    },
    #[error("a single frame ({frame_bytes} bytes) exceeds the {budget}-byte write buffer budget")]
    OversizedFrame { frame_bytes: usize, budget: usize },
    #[error("cannot merge stacks of shapes {first:?} and {other:?} along axis {axis}")]
    ShapeMismatch {
        first: [usize; 3],
        other: [usize; 3],
        axis: usize,
    },
    #[error("merge inputs disagree on pixel format: {first} vs {other}")]
    FormatMismatch {
        first: PixelFormat,
        other: PixelFormat,
    },
    #[error(
        "reshaping {from:?} into {into:?} does not conserve pixel count ({from_px} != {into_px})"
    )]
    PixelCountMismatch {
        from: [usize; 3],
        into: [usize; 3],
        from_px: usize,
        into_px: usize,
    },
    #[error("merge axis {0} outside the valid range [-3, 3)")]
    InvalidMergeAxis(isize),
    #[error("merge needs at least one input stack")]
    EmptyMerge,
}

impl MultiImageStore {
    /// Build a store from an optional file path and a metadata source.
    ///
    /// When `path` is absent the metadata's `filename` key supplies it; a
    /// store may also stay pathless until an explicit path is passed to
    /// [`open_for_reading`](Self::open_for_reading) or
    /// [`open_for_writing`](Self::open_for_writing).
    pub fn new(
        path: Option<PathBuf>,
        metadata: impl Into<MetadataSource>,
    ) -> Result<Self, StackError> {
        let meta = metadata.into().resolve()?;
        let path = path.or_else(|| meta.stack.filename.clone());
        let shape = meta.stack.shape;
        Ok(Self {
            desc: StackDescriptor {
                path,
                header_len: meta.stack.hdr_len,
                shape,
                format: meta.stack.px_format,
                fps: meta.stack.fps,
                px_size: meta.stack.px_size,
                max_buffer_size: meta.settings.max_buffer_size,
                px_per_frame: shape[1] * shape[2],
            },
            reader: None,
            read_path: None,
            writer: None,
        })
    }

    /// Build a store entirely from a metadata file (path from its
    /// `filename` key).
    pub fn from_metadata_path(metadata_path: &Path) -> Result<Self, StackError> {
        Self::new(None, MetadataSource::Path(metadata_path.to_path_buf()))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn path(&self) -> Option<&Path> {
        self.desc.path.as_deref()
    }

    /// Stack shape as `[frames, rows, columns]`.
    pub fn shape(&self) -> [usize; 3] {
        self.desc.shape
    }

    pub fn frame_count(&self) -> usize {
        self.desc.shape[0]
    }

    /// Frame shape as `(rows, columns)`.
    pub fn frame_shape(&self) -> (usize, usize) {
        (self.desc.shape[1], self.desc.shape[2])
    }

    pub fn frame_rows(&self) -> usize {
        self.desc.shape[1]
    }

    pub fn frame_cols(&self) -> usize {
        self.desc.shape[2]
    }

    /// Header length in bytes.
    pub fn header_size(&self) -> u64 {
        self.desc.header_len
    }

    pub fn fps(&self) -> f64 {
        self.desc.fps
    }

    pub fn pixel_size(&self) -> f64 {
        self.desc.px_size
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn max_buffer_size(&self) -> usize {
        self.desc.max_buffer_size
    }

    /// Rebuild the metadata section describing this store.
    pub fn metadata(&self) -> StackMetadata {
        StackMetadata {
            filename: self.desc.path.clone(),
            hdr_len: self.desc.header_len,
            shape: self.desc.shape,
            px_format: self.desc.format,
            fps: self.desc.fps,
            px_size: self.desc.px_size,
        }
    }

    /// Validate a ROI against this store's frame shape. An absent ROI stays
    /// absent (no crop).
    pub fn validate_roi(&self, roi: Option<&Roi>) -> Result<Option<ResolvedRoi>, SelectionError> {
        validate_roi(roi, self.frame_shape(), false)
    }

    /// Validate a frame range against this store's frame count. An absent
    /// range resolves to the whole stack.
    pub fn validate_frame_range(
        &self,
        range: Option<&FrameRange>,
    ) -> Result<ResolvedRange, SelectionError> {
        // replace_absent guarantees a resolved range.
        match validate_frame_range(range, self.frame_count(), true)? {
            Some(resolved) => Ok(resolved),
            None => Ok(ResolvedRange {
                start: 0,
                end: self.frame_count(),
                step: 1,
            }),
        }
    }

    /// Byte offset of a pixel at logical coordinates `(frame, row, col)`.
    ///
    /// Offsets grow monotonically in frame, then row, then column, with no
    /// overlap between distinct coordinates.
    pub fn byte_offset(&self, frame: usize, row: usize, col: usize) -> u64 {
        let px = frame * self.desc.px_per_frame + row * self.desc.shape[2] + col;
        self.desc.header_len + px as u64 * self.desc.format.byte_depth() as u64
    }

    // ------------------------------------------------------------------
    // Handle management
    // ------------------------------------------------------------------

    /// Open the read handle. A no-op when one is already open; the stored
    /// path is used when `path` is absent.
    pub fn open_for_reading(&mut self, path: Option<&Path>) -> Result<(), StackError> {
        if self.reader.is_some() {
            return Ok(());
        }
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => self.desc.path.clone().ok_or(StackError::MissingPath)?,
        };
        debug!("opening {} for reading", path.display());
        let file = File::open(&path).map_err(|source| StackError::Open {
            path: path.clone(),
            source,
        })?;
        self.reader = Some(BufReader::new(file));
        self.read_path = Some(path);
        Ok(())
    }

    /// Open the write handle, truncating the target file. A no-op when one
    /// is already open. When `header` is given, the packed records are
    /// written before any pixel data (legacy fixed-header files).
    pub fn open_for_writing(
        &mut self,
        path: Option<&Path>,
        header: Option<&[HeaderRecord]>,
    ) -> Result<(), StackError> {
        if self.writer.is_none() {
            let path = match path {
                Some(p) => p.to_path_buf(),
                None => self.desc.path.clone().ok_or(StackError::MissingPath)?,
            };
            debug!("opening {} for writing", path.display());
            let file = File::create(&path).map_err(|source| StackError::Open {
                path: path.clone(),
                source,
            })?;
            self.writer = Some(BufWriter::new(file));
        }
        if let (Some(records), Some(writer)) = (header, self.writer.as_mut()) {
            writer.write_all(&pack_records(records))?;
        }
        Ok(())
    }

    /// Release the read handle. Safe when already closed.
    pub fn close_read(&mut self) {
        self.reader = None;
        self.read_path = None;
    }

    /// Release the write handle, flushing buffered data. Safe when already
    /// closed.
    pub fn close_write(&mut self) -> Result<(), StackError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Release both handles.
    pub fn close(&mut self) -> Result<(), StackError> {
        self.close_read();
        self.close_write()
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Read `count` whole contiguous frames starting at `start`. This is
    /// the fast path: one seek, one bulk read. An absent count means "to
    /// the end of the declared stack".
    pub fn read_stack(
        &mut self,
        start: usize,
        count: Option<usize>,
    ) -> Result<FrameStack, StackError> {
        let count = count.unwrap_or_else(|| self.frame_count().saturating_sub(start));
        let offset = self.byte_offset(start, 0, 0);
        let data = self.read_pixels(count * self.desc.px_per_frame, offset)?;
        Ok(FrameStack::new(
            [count, self.desc.shape[1], self.desc.shape[2]],
            data,
        ))
    }

    /// Read one frame, optionally cropped.
    ///
    /// A full-width crop keeps rows contiguous on disk and reads them in
    /// one run; any narrower crop falls back to one read per selected row.
    pub fn read_frame(&mut self, index: usize, roi: Option<&Roi>) -> Result<Frame, StackError> {
        let (rows, cols) = self.frame_shape();
        match validate_roi(roi, (rows, cols), false)? {
            None => {
                let stack = self.read_stack(index, Some(1))?;
                Ok(Frame::new(rows, cols, stack.data))
            }
            Some(r) if r.left == 0 && r.width == cols => {
                let offset = self.byte_offset(index, r.top, r.left);
                let data = self.read_pixels(r.pixel_count(), offset)?;
                Ok(Frame::new(r.height, r.width, data))
            }
            Some(r) => {
                let mut data = PixelData::with_capacity(self.desc.format, r.pixel_count());
                for row in r.top..r.top + r.height {
                    let offset = self.byte_offset(index, row, r.left);
                    let row_px = self.read_pixels(r.width, offset)?;
                    data.append(&row_px);
                }
                Ok(Frame::new(r.height, r.width, data))
            }
        }
    }

    /// Read a selection of frames.
    ///
    /// A unit-step range with no crop delegates to the bulk
    /// [`read_stack`](Self::read_stack) path; anything else assembles the
    /// result frame by frame. The read handle is released afterwards when
    /// `close_after` is set.
    pub fn read(
        &mut self,
        range: Option<&FrameRange>,
        roi: Option<&Roi>,
        close_after: bool,
    ) -> Result<FrameStack, StackError> {
        let resolved = self.validate_frame_range(range)?;
        let result = if resolved.step == 1 && roi.is_none() {
            self.read_stack(resolved.start, Some(resolved.len()))?
        } else {
            let (rows, cols) = self.frame_shape();
            let (out_rows, out_cols) = match validate_roi(roi, (rows, cols), false)? {
                Some(r) => (r.height, r.width),
                None => (rows, cols),
            };
            let mut stack = FrameStack::new(
                [0, out_rows, out_cols],
                PixelData::with_capacity(self.desc.format, resolved.len() * out_rows * out_cols),
            );
            for index in resolved.indices() {
                let frame = self.read_frame(index, roi)?;
                stack.data.append(&frame.data);
                stack.shape[0] += 1;
            }
            stack
        };
        if close_after {
            self.close_read();
        }
        Ok(result)
    }

    /// Time trace of a single pixel across a frame range: one value per
    /// selected frame, widened to f64.
    pub fn read_pixel_trace(
        &mut self,
        loc: (usize, usize),
        range: Option<&FrameRange>,
    ) -> Result<Vec<f64>, StackError> {
        let mut traces = self.read_pixel_traces(&[loc], range)?;
        Ok(traces.pop().unwrap_or_default())
    }

    /// Time traces of several pixels: `result[location][frame]`.
    ///
    /// Deliberately the slow, fully general path: one seek and one
    /// single-pixel read per sample, no batching.
    pub fn read_pixel_traces(
        &mut self,
        locs: &[(usize, usize)],
        range: Option<&FrameRange>,
    ) -> Result<Vec<Vec<f64>>, StackError> {
        let resolved = self.validate_frame_range(range)?;
        let mut traces = vec![Vec::with_capacity(resolved.len()); locs.len()];
        for index in resolved.indices() {
            for (trace, &(row, col)) in traces.iter_mut().zip(locs) {
                let px = self.read_pixels(1, self.byte_offset(index, row, col))?;
                trace.push(px.get_f64(0));
            }
        }
        Ok(traces)
    }

    /// Export a selection to a new stack file plus metadata file.
    ///
    /// The exported metadata takes the shape of what was read, drops the
    /// header, and rescales the frame rate by the range step. Both handles
    /// are closed when done.
    pub fn export(
        &mut self,
        target: &Path,
        metadata_path: &Path,
        range: Option<&FrameRange>,
        roi: Option<&Roi>,
    ) -> Result<(), StackError> {
        self.open_for_writing(Some(target), None)?;
        let chunk = self.read(range, roi, false)?;
        let resolved = self.validate_frame_range(range)?;

        let mut stack_meta = self.metadata();
        stack_meta.filename = Some(target.to_path_buf());
        stack_meta.hdr_len = 0;
        stack_meta.shape = chunk.shape;
        stack_meta.fps = self.desc.fps / resolved.step as f64;
        let meta = MetadataFile {
            stack: stack_meta,
            settings: StoreSettings {
                max_buffer_size: self.desc.max_buffer_size,
            },
        };
        meta.export(metadata_path)?;

        self.write_stack(&chunk, true)
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Write a stack through the write handle, opening it if needed.
    ///
    /// Data is serialized to the store's pixel format, native-endian,
    /// row-major. An array larger than the buffer budget is written in
    /// frame-aligned chunks; a single frame over budget is an error, since
    /// chunking below frame granularity is unsupported. The handle is
    /// flushed when kept open, and both handles are closed when
    /// `close_after` is set.
    pub fn write_stack(&mut self, data: &FrameStack, close_after: bool) -> Result<(), StackError> {
        self.open_for_writing(None, None)?;

        let pixels: Cow<'_, PixelData> = if data.format() == self.desc.format {
            Cow::Borrowed(&data.data)
        } else {
            Cow::Owned(data.data.convert(self.desc.format))
        };

        let depth = self.desc.format.byte_depth();
        let frame_px = data.frame_pixels();
        let frame_bytes = frame_px * depth;
        let total_bytes = pixels.len() * depth;
        let budget = self.desc.max_buffer_size;

        {
            let writer = self.writer.as_mut().ok_or(StackError::MissingPath)?;
            if total_bytes > budget {
                if frame_bytes > budget {
                    return Err(StackError::OversizedFrame {
                        frame_bytes,
                        budget,
                    });
                }
                let frames_per_chunk = (budget / frame_bytes).max(1);
                debug!(
                    "chunked write: {} frames, {} per chunk",
                    data.frames(),
                    frames_per_chunk
                );
                let mut frame = 0;
                while frame < data.frames() {
                    let upper = (frame + frames_per_chunk).min(data.frames());
                    writer.write_all(&pixels.range_bytes(frame * frame_px, upper * frame_px))?;
                    frame = upper;
                }
            } else {
                writer.write_all(&pixels.to_bytes())?;
            }
            if !close_after {
                writer.flush()?;
            }
        }
        if close_after {
            self.close()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read primitive
    // ------------------------------------------------------------------

    /// Seek to `offset` and read `count` pixels, failing with an
    /// end-of-file error naming requested vs. actual byte counts when the
    /// file runs short.
    fn read_pixels(&mut self, count: usize, offset: u64) -> Result<PixelData, StackError> {
        self.open_for_reading(None)?;
        let byte_count = count * self.desc.format.byte_depth();
        let mut buf = vec![0u8; byte_count];
        let got = {
            let reader = self.reader.as_mut().ok_or(StackError::MissingPath)?;
            reader.seek(SeekFrom::Start(offset))?;
            read_full(reader, &mut buf)?
        };
        if got < byte_count {
            return Err(StackError::Eof {
                requested: byte_count,
                actual: got,
                pixels: count,
                offset,
                path: self.read_path.clone().unwrap_or_default(),
            });
        }
        Ok(PixelData::from_bytes(&buf, self.desc.format))
    }
}

/// Read until `buf` is full or the source is exhausted, returning the
/// number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl fmt::Display for MultiImageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .desc
            .path
            .as_deref()
            .map_or_else(|| "<unset>".into(), |p| p.display().to_string());
        writeln!(f, "multi-image stack: {path}")?;
        writeln!(f, "  header : {} bytes", self.desc.header_len)?;
        writeln!(
            f,
            "  shape  : {} frames x {} rows x {} cols",
            self.desc.shape[0], self.desc.shape[1], self.desc.shape[2]
        )?;
        write!(
            f,
            "  format : {} ({} bytes/px, {} fps, {} px size)",
            self.desc.format,
            self.desc.format.byte_depth(),
            self.desc.fps,
            self.desc.px_size
        )
    }
}

impl fmt::Debug for MultiImageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MultiImageStore({}+{}x{}x{}x{} bytes)",
            self.desc.header_len,
            self.desc.shape[0],
            self.desc.shape[1],
            self.desc.shape[2],
            self.desc.format.byte_depth()
        )
    }
}

impl Drop for MultiImageStore {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                log::warn!("flush on drop failed: {e}");
            }
        }
    }
}
