//! Benchmarks for Almanac storage and CSV codec
//!
//! Run with: cargo bench

use almanac::storage::*;
use almanac::CsvCodec;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::tempdir;

fn hourly(start_year: i32, years: u32) -> SeriesMetadata {
    SeriesMetadata::new(
        vec![Dimension::Year, Dimension::Month, Dimension::Day, Dimension::Hour],
        start_year,
        years,
    )
    .unwrap()
}

fn bench_odometer(c: &mut Criterion) {
    let mut group = c.benchmark_group("odometer");

    for years in [1u32, 10] {
        let metadata = hourly(2020, years);
        group.throughput(Throughput::Elements(metadata.total_slots()));

        group.bench_function(format!("walk_hourly_{}y", years), |b| {
            b.iter(|| Odometer::new(black_box(&metadata)).count())
        });
    }

    let weekly = SeriesMetadata::new(
        vec![Dimension::Year, Dimension::Week, Dimension::Day, Dimension::Hour],
        2000,
        10,
    )
    .unwrap();
    group.throughput(Throughput::Elements(weekly.total_slots()));
    group.bench_function("walk_weekly_10y", |b| {
        b.iter(|| Odometer::new(black_box(&weekly)).count())
    });

    group.finish();
}

fn bench_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("position");

    let metadata = hourly(1900, 300);
    let late = DimensionAddress::new()
        .with(Dimension::Year, 2199)
        .with(Dimension::Month, 12)
        .with(Dimension::Day, 31)
        .with(Dimension::Hour, 23);

    group.bench_function("last_slot_300y", |b| {
        b.iter(|| position(black_box(&late), black_box(&metadata)).unwrap())
    });

    let sample: Vec<DimensionAddress> = Odometer::new(&hourly(2024, 1)).step_by(97).collect();
    let leap = hourly(2024, 1);
    group.throughput(Throughput::Elements(sample.len() as u64));
    group.bench_function("sampled_addresses", |b| {
        b.iter(|| {
            for address in &sample {
                black_box(position(address, &leap).unwrap());
            }
        })
    });

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    let dir = tempdir().unwrap();
    let metadata = hourly(2023, 2);
    let values: Vec<f64> = (0..metadata.total_slots()).map(|i| i as f64 * 0.5).collect();
    let start = first(&metadata);

    let mut store = BinaryStore::open(dir.path().join("bench.alm"), OpenMode::Create, Some(&metadata))
        .unwrap()
        .sync_on_close(false);

    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("write_full_run", |b| {
        b.iter(|| store.write(black_box(&start), black_box(&values)).unwrap())
    });

    group.bench_function("read_full_run", |b| {
        b.iter(|| store.read_run(black_box(&start), values.len()).unwrap())
    });

    group.bench_function("scan_slots", |b| {
        b.iter(|| store.slots().unwrap().count())
    });

    group.finish();
}

fn bench_csv(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv");

    let dir = tempdir().unwrap();
    let metadata = hourly(2024, 1);
    let values: Vec<f64> = (0..metadata.total_slots()).map(|i| (i % 24) as f64).collect();

    let mut store = BinaryStore::open(dir.path().join("bench.alm"), OpenMode::Create, Some(&metadata))
        .unwrap()
        .sync_on_close(false);
    store.write(&first(&metadata), &values).unwrap();

    let codec = CsvCodec::new();
    group.throughput(Throughput::Elements(values.len() as u64));

    group.bench_function("export_full", |b| {
        let out = dir.path().join("full.csv");
        b.iter(|| codec.bin_to_csv(&mut store, &out, false).unwrap())
    });

    group.bench_function("export_daily", |b| {
        let out = dir.path().join("daily.csv");
        b.iter(|| codec.bin_to_csv(&mut store, &out, true).unwrap())
    });

    let mut text = Vec::new();
    codec.write_csv(&mut store, &mut text, false).unwrap();
    group.bench_function("import_full", |b| {
        b.iter(|| codec.read_csv(black_box(text.as_slice()), &mut store).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_odometer, bench_position, bench_store, bench_csv);
criterion_main!(benches);
