//! Benchmarks for stack read/write throughput.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tempfile::tempdir;

use mistack::{
    FrameStack, MetadataFile, MultiImageStore, PixelData, PixelFormat, Roi, StackMetadata,
    StoreSettings,
};

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

fn bench_stack_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_read");

    for size in [64usize, 128, 256] {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.raw");
        let shape = [16, size, size];
        let pixels: Vec<u16> = (0..16 * size * size).map(|i| (i % 65536) as u16).collect();

        let mut store =
            MultiImageStore::new(Some(path), meta(shape, PixelFormat::U16)).unwrap();
        store
            .write_stack(&FrameStack::new(shape, PixelData::from(pixels)), true)
            .unwrap();

        group.bench_with_input(
            BenchmarkId::new("full_stack", format!("16x{size}x{size}")),
            &size,
            |b, _| {
                b.iter(|| {
                    let stack = store.read_stack(black_box(0), None).unwrap();
                    black_box(stack.pixel_count())
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("cropped_frame", format!("16x{size}x{size}")),
            &size,
            |b, _| {
                let roi = Roi::new(size / 4, size / 4, size / 2, size / 2);
                b.iter(|| {
                    let frame = store.read_frame(black_box(8), Some(&roi)).unwrap();
                    black_box(frame.data.len())
                });
            },
        );
    }

    group.finish();
}

fn bench_stack_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_write");

    for size in [64usize, 128, 256] {
        let shape = [16, size, size];
        let pixels: Vec<u16> = (0..16 * size * size).map(|i| (i % 65536) as u16).collect();
        let stack = FrameStack::new(shape, PixelData::from(pixels));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("16x{size}x{size}")),
            &size,
            |b, _| {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.raw");
                let mut store =
                    MultiImageStore::new(Some(path), meta(shape, PixelFormat::U16)).unwrap();
                // Closing each pass makes the next write reopen and truncate.
                b.iter(|| {
                    store.write_stack(black_box(&stack), true).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_stack_read, bench_stack_write);
criterion_main!(benches);
