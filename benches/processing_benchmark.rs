use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use firesmoke_archive::archive::{canonical_file_name, ArtifactProvider, InMemoryProvider};
use firesmoke_archive::models::{DispersionDataset, GridGeometry, PackedTimestamp};
use firesmoke_archive::processors::{CollisionPolicy, Reconciler};
use firesmoke_archive::query::{block_mean, to_web_mercator, QueryIndex};
use ndarray::{Array2, Array3};

// Hourly keys starting at 2021-01-01 00:00
fn hourly_keys(count: usize) -> Vec<PackedTimestamp> {
    let start = NaiveDate::from_ymd_opt(2021, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..count)
        .map(|h| PackedTimestamp::from_datetime(&(start + Duration::hours(h as i64))).unwrap())
        .collect()
}

// `count` hourly artifacts, each payload a few bytes derived from its key
fn provider(label: &str, keys: &[PackedTimestamp]) -> InMemoryProvider {
    keys.iter().fold(InMemoryProvider::new(label), |p, key| {
        p.with_artifact(canonical_file_name(key), *key, key.to_string().into_bytes())
    })
}

fn test_dataset(hours: usize, nrows: usize, ncols: usize) -> DispersionDataset {
    let geometry = GridGeometry {
        xorig: -160.0,
        yorig: 32.0,
        xcell: 0.1,
        ycell: 0.1,
        ncols,
        nrows,
    };
    let pm25 = Array3::from_shape_fn((hours, nrows, ncols), |(t, r, c)| {
        ((t + r * 3 + c * 7) % 50) as f32 * 0.5
    });
    DispersionDataset::new(geometry, hourly_keys(hours), pm25).unwrap()
}

fn benchmark_timestamp_codec(c: &mut Criterion) {
    let keys = hourly_keys(24 * 365);

    c.bench_function("timestamp_decode_year", |b| {
        b.iter(|| {
            let decoded = keys.iter().filter(|k| k.decode().is_ok()).count();
            black_box(decoded)
        })
    });

    c.bench_function("timestamp_encode", |b| {
        b.iter(|| black_box(PackedTimestamp::encode(2024, 2, 29, 23, 59, 59)))
    });
}

fn benchmark_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_by_size");

    for &hours in &[240usize, 2400] {
        let keys = hourly_keys(hours);
        // two campaigns overlapping by half
        let a = provider("a", &keys[..hours * 3 / 4]);
        let b = provider("b", &keys[hours / 4..]);

        group.bench_with_input(BenchmarkId::new("hours", hours), &hours, |bench, _| {
            bench.iter(|| {
                let providers: [&dyn ArtifactProvider; 2] = [&a, &b];
                let outcome = Reconciler::new(CollisionPolicy::Flag)
                    .reconcile(&providers)
                    .unwrap();
                black_box(outcome.entries.len())
            })
        });
    }

    group.finish();
}

fn benchmark_query_index(c: &mut Criterion) {
    let index = QueryIndex::build(vec![test_dataset(48, 381, 1081)]).unwrap();
    let date = NaiveDate::from_ymd_opt(2021, 1, 2).unwrap();

    c.bench_function("query_native", |b| {
        b.iter(|| black_box(index.query(date, 12, 0).map(|v| v.len()).unwrap_or(0)))
    });

    c.bench_function("query_level_3", |b| {
        b.iter(|| black_box(index.query(date, 12, 3).map(|v| v.len()).unwrap_or(0)))
    });

    c.bench_function("build_index_24h", |b| {
        b.iter_with_setup(
            || vec![test_dataset(24, 381, 1081)],
            |datasets| black_box(QueryIndex::build(datasets).map(|i| i.max_resolution())),
        )
    });
}

fn benchmark_block_mean(c: &mut Criterion) {
    let grid = Array2::from_shape_fn((381, 1081), |(r, c)| if (r + c) % 11 == 0 { f32::NAN } else { r as f32 });

    c.bench_function("block_mean_factor_4", |b| {
        b.iter(|| black_box(block_mean(grid.view(), 4).len()))
    });
}

fn benchmark_projection(c: &mut Criterion) {
    let coords: Vec<(f64, f64)> = (0..1081)
        .map(|i| (32.0 + i as f64 * 0.03, -160.0 + i as f64 * 0.1))
        .collect();

    c.bench_function("web_mercator_1081", |b| {
        b.iter(|| {
            let sum: f64 = coords
                .iter()
                .map(|(lat, lon)| {
                    let (x, y) = to_web_mercator(*lat, *lon);
                    x + y
                })
                .sum();
            black_box(sum)
        })
    });
}

criterion_group!(
    benches,
    benchmark_timestamp_codec,
    benchmark_reconcile,
    benchmark_query_index,
    benchmark_block_mean,
    benchmark_projection
);
criterion_main!(benches);
