//! Concatenating several stack files into one.

use std::path::{Path, PathBuf};

use log::debug;

use crate::schema::{MetadataFile, MetadataSource, StackMetadata, StoreSettings};

use super::pixels::concat_frame_stacks;
use super::store::{MultiImageStore, StackError};

/// One merge input: an already-constructed store, or a `(path, metadata)`
/// pair to build one on the spot.
pub enum MergeInput {
    Store(MultiImageStore),
    File {
        path: PathBuf,
        metadata: MetadataSource,
    },
}

impl MergeInput {
    fn into_store(self) -> Result<MultiImageStore, StackError> {
        match self {
            MergeInput::Store(store) => Ok(store),
            MergeInput::File { path, metadata } => MultiImageStore::new(Some(path), metadata),
        }
    }
}

impl From<MultiImageStore> for MergeInput {
    fn from(store: MultiImageStore) -> Self {
        MergeInput::Store(store)
    }
}

/// Merge several stacks into one output file by concatenating along
/// `merge_axis` (0 = frame axis; negative axes count from the end).
///
/// Every input must agree on the non-merge axis extents and on the pixel
/// format. When `final_shape` is given, the merge-axis extent is
/// recomputed from the total pixel count divided by the product of the two
/// axes preceding the merge axis (wrapping), and the reshape must conserve
/// the pixel count exactly. Output metadata is written when
/// `output_metadata_path` is given.
///
/// Merging along the frame axis streams one input at a time; merging along
/// any other axis loads every input into memory at once.
pub fn merge_stacks(
    output_path: &Path,
    inputs: Vec<MergeInput>,
    output_metadata_path: Option<&Path>,
    merge_axis: isize,
    final_shape: Option<[usize; 3]>,
) -> Result<MultiImageStore, StackError> {
    let axis = if merge_axis < 0 {
        merge_axis + 3
    } else {
        merge_axis
    };
    let axis: usize = axis
        .try_into()
        .ok()
        .filter(|&a| a < 3)
        .ok_or(StackError::InvalidMergeAxis(merge_axis))?;

    let mut stores = Vec::with_capacity(inputs.len());
    for input in inputs {
        stores.push(input.into_store()?);
    }
    if stores.is_empty() {
        return Err(StackError::EmptyMerge);
    }

    // Accumulate the output shape; the first input pins the non-merge
    // extents, the format, and the timing metadata.
    let mut out_shape = [0usize; 3];
    let mut fixed: Option<StackMetadata> = None;
    for store in &stores {
        let shape = store.shape();
        out_shape[axis] += shape[axis];
        match &fixed {
            None => {
                for ax in 0..3 {
                    if ax != axis {
                        out_shape[ax] = shape[ax];
                    }
                }
                fixed = Some(store.metadata());
            }
            Some(first) => {
                for ax in 0..3 {
                    if ax != axis && out_shape[ax] != shape[ax] {
                        return Err(StackError::ShapeMismatch {
                            first: out_shape,
                            other: shape,
                            axis,
                        });
                    }
                }
                if first.px_format != store.pixel_format() {
                    return Err(StackError::FormatMismatch {
                        first: first.px_format,
                        other: store.pixel_format(),
                    });
                }
            }
        }
    }
    let first = match fixed {
        Some(first) => first,
        None => return Err(StackError::EmptyMerge),
    };

    if let Some(requested) = final_shape {
        let total: usize = out_shape.iter().product();
        let mut reshaped = requested;
        // The merge-axis extent is derived, not taken from the request; the
        // two preceding axes (wrapping) determine it.
        let divisor = reshaped[(axis + 2) % 3] * reshaped[(axis + 1) % 3];
        reshaped[axis] = if divisor == 0 { 0 } else { total / divisor };
        let reshaped_total: usize = reshaped.iter().product();
        if reshaped_total != total {
            return Err(StackError::PixelCountMismatch {
                from: out_shape,
                into: reshaped,
                from_px: total,
                into_px: reshaped_total,
            });
        }
        out_shape = reshaped;
    }

    let out_meta = MetadataFile {
        stack: StackMetadata {
            filename: Some(output_path.to_path_buf()),
            hdr_len: 0,
            shape: out_shape,
            px_format: first.px_format,
            fps: first.fps,
            px_size: first.px_size,
        },
        settings: StoreSettings::default(),
    };
    if let Some(meta_path) = output_metadata_path {
        out_meta.export(meta_path)?;
    }

    debug!(
        "merging {} stacks along axis {} into {} (shape {:?})",
        stores.len(),
        axis,
        output_path.display(),
        out_shape
    );

    let mut output = MultiImageStore::new(Some(output_path.to_path_buf()), out_meta)?;
    if axis == 0 {
        // Stream along the frame axis: one input's data in memory at a time.
        for store in &mut stores {
            let data = store.read(None, None, true)?;
            output.write_stack(&data, false)?;
        }
        output.close()?;
    } else {
        let mut parts = Vec::with_capacity(stores.len());
        for store in &mut stores {
            parts.push(store.read(None, None, true)?);
        }
        let merged = concat_frame_stacks(&parts, axis);
        output.write_stack(&merged, true)?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PixelFormat, StackMetadata, StoreSettings};
    use crate::stack::pixels::{FrameStack, PixelData};
    use tempfile::tempdir;

    fn meta(shape: [usize; 3], format: PixelFormat) -> MetadataFile {
        MetadataFile {
            stack: StackMetadata {
                filename: None,
                hdr_len: 0,
                shape,
                px_format: format,
                fps: 1.0,
                px_size: 1.0,
            },
            settings: StoreSettings::default(),
        }
    }

    fn write_store(
        path: &Path,
        shape: [usize; 3],
        format: PixelFormat,
        data: PixelData,
    ) -> MultiImageStore {
        let mut store =
            MultiImageStore::new(Some(path.to_path_buf()), meta(shape, format)).unwrap();
        store
            .write_stack(&FrameStack::new(shape, data), true)
            .unwrap();
        store
    }

    #[test]
    fn test_merge_along_frame_axis() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.raw");
        let b_path = dir.path().join("b.raw");
        let a_data: Vec<u8> = (0..12).collect();
        let b_data: Vec<u8> = (100..116).collect();
        let a = write_store(&a_path, [3, 2, 2], PixelFormat::U8, PixelData::from(a_data.clone()));
        let b = write_store(&b_path, [4, 2, 2], PixelFormat::U8, PixelData::from(b_data.clone()));

        let out_path = dir.path().join("merged.raw");
        let mut merged = merge_stacks(&out_path, vec![a.into(), b.into()], None, 0, None).unwrap();
        assert_eq!(merged.shape(), [7, 2, 2]);

        // Frames [0..3) come from the first input, [3..7) from the second,
        // byte-identical to the source content.
        let back = merged.read_stack(0, None).unwrap();
        let mut expected = a_data;
        expected.extend_from_slice(&b_data);
        assert_eq!(back.data, PixelData::from(expected.clone()));
        assert_eq!(std::fs::read(&out_path).unwrap(), expected);
    }

    #[test]
    fn test_merge_accepts_path_metadata_pairs() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.raw");
        write_store(&a_path, [2, 1, 2], PixelFormat::U8, PixelData::from(vec![1u8, 2, 3, 4]));

        let out_path = dir.path().join("merged.raw");
        let out_meta_path = dir.path().join("merged_metadata.json");
        let inputs = vec![MergeInput::File {
            path: a_path,
            metadata: MetadataSource::Inline(meta([2, 1, 2], PixelFormat::U8)),
        }];
        let merged = merge_stacks(&out_path, inputs, Some(&out_meta_path), 0, None).unwrap();
        assert_eq!(merged.shape(), [2, 1, 2]);

        let written = MetadataFile::load(&out_meta_path).unwrap();
        assert_eq!(written.stack.shape, [2, 1, 2]);
        assert_eq!(written.stack.px_format, PixelFormat::U8);
        assert_eq!(written.stack.filename, Some(out_path));
    }

    #[test]
    fn test_merge_rejects_shape_mismatch() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.raw");
        let b_path = dir.path().join("b.raw");
        let a = write_store(&a_path, [3, 2, 2], PixelFormat::U8, PixelData::from(vec![0u8; 12]));
        let b = write_store(&b_path, [3, 2, 3], PixelFormat::U8, PixelData::from(vec![0u8; 18]));

        let err = merge_stacks(
            &dir.path().join("merged.raw"),
            vec![a.into(), b.into()],
            None,
            0,
            None,
        )
        .unwrap_err();
        match err {
            StackError::ShapeMismatch { other, axis, .. } => {
                assert_eq!(other, [3, 2, 3]);
                assert_eq!(axis, 0);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_rejects_format_mismatch() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.raw");
        let b_path = dir.path().join("b.raw");
        let a = write_store(&a_path, [1, 2, 2], PixelFormat::U8, PixelData::from(vec![0u8; 4]));
        let b = write_store(&b_path, [1, 2, 2], PixelFormat::U16, PixelData::from(vec![0u16; 4]));

        let err = merge_stacks(
            &dir.path().join("merged.raw"),
            vec![a.into(), b.into()],
            None,
            0,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StackError::FormatMismatch { .. }));
    }

    #[test]
    fn test_merge_along_column_axis_reads_each_input() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.raw");
        let b_path = dir.path().join("b.raw");
        // Distinct per-input content, so reading the wrong input is caught.
        let a = write_store(&a_path, [2, 2, 1], PixelFormat::U8, PixelData::from(vec![1u8, 3, 5, 7]));
        let b = write_store(&b_path, [2, 2, 1], PixelFormat::U8, PixelData::from(vec![2u8, 4, 6, 8]));

        let out_path = dir.path().join("merged.raw");
        let mut merged =
            merge_stacks(&out_path, vec![a.into(), b.into()], None, 2, None).unwrap();
        assert_eq!(merged.shape(), [2, 2, 2]);

        // Row r of each output frame is [a_value, b_value].
        let back = merged.read_stack(0, None).unwrap();
        assert_eq!(back.data, PixelData::from(vec![1u8, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn test_merge_negative_axis_counts_from_end() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.raw");
        let b_path = dir.path().join("b.raw");
        let a = write_store(&a_path, [1, 1, 2], PixelFormat::U8, PixelData::from(vec![1u8, 2]));
        let b = write_store(&b_path, [1, 2, 2], PixelFormat::U8, PixelData::from(vec![3u8, 4, 5, 6]));

        // Axis -2 resolves to the row axis.
        let merged = merge_stacks(
            &dir.path().join("merged.raw"),
            vec![a.into(), b.into()],
            None,
            -2,
            None,
        )
        .unwrap();
        assert_eq!(merged.shape(), [1, 3, 2]);
    }

    #[test]
    fn test_merge_final_shape_reshapes_output() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.raw");
        let b_path = dir.path().join("b.raw");
        let a = write_store(&a_path, [2, 2, 2], PixelFormat::U8, PixelData::from(vec![0u8; 8]));
        let b = write_store(&b_path, [2, 2, 2], PixelFormat::U8, PixelData::from(vec![0u8; 8]));

        // 16 pixels total; rows x cols = 4 x 2 forces a frame extent of 2.
        let merged = merge_stacks(
            &dir.path().join("merged.raw"),
            vec![a.into(), b.into()],
            None,
            0,
            Some([99, 4, 2]),
        )
        .unwrap();
        assert_eq!(merged.shape(), [2, 4, 2]);
    }

    #[test]
    fn test_merge_final_shape_must_conserve_pixels() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.raw");
        let b_path = dir.path().join("b.raw");
        let a = write_store(&a_path, [2, 2, 2], PixelFormat::U8, PixelData::from(vec![0u8; 8]));
        let b = write_store(&b_path, [2, 2, 2], PixelFormat::U8, PixelData::from(vec![0u8; 8]));

        // 16 pixels cannot reshape onto 3x2 cross-sections.
        let err = merge_stacks(
            &dir.path().join("merged.raw"),
            vec![a.into(), b.into()],
            None,
            0,
            Some([99, 3, 2]),
        )
        .unwrap_err();
        match err {
            StackError::PixelCountMismatch { from_px, into_px, .. } => {
                assert_eq!(from_px, 16);
                assert_eq!(into_px, 12);
            }
            other => panic!("expected PixelCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_rejects_invalid_axis() {
        let err = merge_stacks(Path::new("out.raw"), Vec::new(), None, 3, None).unwrap_err();
        assert!(matches!(err, StackError::InvalidMergeAxis(3)));

        let err = merge_stacks(Path::new("out.raw"), Vec::new(), None, 0, None).unwrap_err();
        assert!(matches!(err, StackError::EmptyMerge));
    }
}
