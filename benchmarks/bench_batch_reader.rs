use std::hint::black_box;
use std::io::Cursor;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cabload::timestamp::parse_eastern_timestamp;
use cabload::{BatchReader, DuplicateFilter};

const HEADER: &str = "VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,RatecodeID,store_and_fwd_flag,PULocationID,DOLocationID,payment_type,fare_amount,extra,tip_amount,total_amount";

fn sample_csv(rows: usize) -> String {
    let mut csv = String::with_capacity(rows * 128);
    csv.push_str(HEADER);
    csv.push('\n');
    for i in 0..rows {
        let minute = i % 60;
        let hour = 1 + (i / 60) % 12;
        csv.push_str(&format!(
            "2,03/{:02}/2023 {:02}:{:02}:00 PM,03/{:02}/2023 {:02}:{:02}:30 PM,{},2.10,1,N,161,236,1,12.50,0.5,2.00,15.00\n",
            1 + i % 28,
            hour,
            minute,
            1 + i % 28,
            hour,
            minute,
            i % 4
        ));
    }
    csv
}

fn bench_parse_timestamp(c: &mut Criterion) {
    c.bench_function("parse_eastern_timestamp", |b| {
        b.iter(|| {
            black_box(parse_eastern_timestamp(
                "tpep_pickup_datetime",
                black_box("07/04/2023 12:00:00 PM"),
            ))
        });
    });
}

fn bench_batch_reader(c: &mut Criterion) {
    let rows = 10_000;
    let csv = sample_csv(rows);
    let mut group = c.benchmark_group("batch_reader");
    group.throughput(Throughput::Elements(rows as u64));

    for batch_size in [1usize, 100, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    let reader =
                        BatchReader::from_reader(Cursor::new(csv.as_bytes()), batch_size).unwrap();
                    black_box(reader.filter_map(Result::ok).count())
                });
            },
        );
    }
    group.finish();
}

fn bench_read_and_dedup(c: &mut Criterion) {
    let csv = sample_csv(10_000);
    c.bench_function("read_and_dedup", |b| {
        b.iter(|| {
            let reader = BatchReader::from_reader(Cursor::new(csv.as_bytes()), 10_000).unwrap();
            black_box(DuplicateFilter::new(reader).filter_map(Result::ok).count())
        });
    });
}

criterion_group!(
    benches,
    bench_parse_timestamp,
    bench_batch_reader,
    bench_read_and_dedup
);
criterion_main!(benches);
