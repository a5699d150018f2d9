//! Grid engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pixboard_bench::scattered_coords;
use pixboard_core::Grid;

/// Benchmark scattered single-pixel writes.
fn bench_set_pixel(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_set_pixel");

    for side in [100u32, 1000, 4000].iter() {
        let coords = scattered_coords(10_000, *side, *side);
        group.throughput(Throughput::Elements(coords.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(side), side, |b, &side| {
            let mut grid = Grid::new(side, side).unwrap();
            let mut color = 0u8;
            b.iter(|| {
                color = color.wrapping_add(1);
                for &(x, y) in &coords {
                    black_box(grid.set_pixel(x, y, color).unwrap());
                }
            });
        });
    }

    group.finish();
}

/// Benchmark full snapshots.
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_snapshot");

    for side in [100u32, 1000, 4000].iter() {
        group.throughput(Throughput::Bytes(u64::from(*side) * u64::from(*side)));
        group.bench_with_input(BenchmarkId::from_parameter(side), side, |b, &side| {
            let grid = Grid::new(side, side).unwrap();
            b.iter(|| black_box(grid.snapshot()));
        });
    }

    group.finish();
}

/// Benchmark dirty tracking after a burst of writes.
fn bench_drain_dirty(c: &mut Criterion) {
    let coords = scattered_coords(5_000, 2000, 2000);
    c.bench_function("grid_drain_dirty_2000", |b| {
        let mut grid = Grid::new(2000, 2000).unwrap();
        let mut color = 0u8;
        b.iter(|| {
            color = color.wrapping_add(1);
            for &(x, y) in &coords {
                grid.set_pixel(x, y, color).unwrap();
            }
            black_box(grid.drain_dirty_chunks());
        });
    });
}

criterion_group!(benches, bench_set_pixel, bench_snapshot, bench_drain_dirty);
criterion_main!(benches);
