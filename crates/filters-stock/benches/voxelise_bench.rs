use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use core_filter::{AbortFlag, Filter, ProgressData};
use core_geom::Point3D;
use core_stream::{Cached, FilterId, FilterStream, IonHit, IonsStream};
use filters_stock::VoxeliseFilter;

fn ion_cloud(n: usize) -> FilterStream {
    let mut state = 0x2545F4914F6CDD1Du64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 11) as f32 / (1u64 << 53) as f32
    };
    let hits: Vec<IonHit> = (0..n)
        .map(|_| IonHit::new(Point3D::new(next() * 100.0, next() * 100.0, next() * 100.0), next() * 50.0))
        .collect();
    FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) }
}

fn bench_point_cloud(c: &mut Criterion) {
    let mut group = c.benchmark_group("voxelise_point_cloud");
    for &n in &[10_000usize, 100_000, 500_000] {
        let input = vec![ion_cloud(n)];
        group.bench_with_input(BenchmarkId::from_parameter(n), &input, |b, input| {
            b.iter(|| {
                let mut f = VoxeliseFilter::new();
                f.set_property(1, "64 64 64");
                let mut progress = ProgressData::new(1);
                f.refresh(input, &mut progress, &AbortFlag::new()).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_isosurface(c: &mut Criterion) {
    let mut group = c.benchmark_group("voxelise_isosurface");
    for &n in &[10_000usize, 100_000] {
        let input = vec![ion_cloud(n)];
        group.bench_with_input(BenchmarkId::from_parameter(n), &input, |b, input| {
            b.iter(|| {
                let mut f = VoxeliseFilter::new();
                f.set_property(4, "isosurface");
                f.set_property(3, "1.0");
                let mut progress = ProgressData::new(1);
                f.refresh(input, &mut progress, &AbortFlag::new()).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_point_cloud, bench_isosurface);
criterion_main!(benches);
