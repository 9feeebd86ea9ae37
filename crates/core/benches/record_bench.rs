//! 레코드 생성/직렬화 벤치마크
//!
//! LogRecord 생성, 필드 추가, JSON 직렬화 성능을 측정합니다.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use logharbor_core::types::{LogLevel, LogRecord};

fn create_record() -> LogRecord {
    LogRecord::new(
        "/var/log/app.log",
        "2024-01-15 12:00:00 [ERROR] connection to db-01 failed",
        LogLevel::Error,
        "connection to db-01 failed",
    )
    .with_field("host", "web-server-01")
    .with_field("request_id", "550e8400-e29b-41d4-a716-446655440000")
    .with_field("duration_ms", "125")
}

fn bench_record_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_creation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("new_with_fields", |b| {
        b.iter(|| black_box(create_record()));
    });

    group.bench_function("level_from_str_loose", |b| {
        b.iter(|| black_box(LogLevel::from_str_loose(black_box("warning"))));
    });

    group.finish();
}

fn bench_record_serialization(c: &mut Criterion) {
    let record = create_record();
    let json = serde_json::to_string(&record).expect("serialize");

    let mut group = c.benchmark_group("record_serialization");
    group.throughput(Throughput::Bytes(json.len() as u64));

    group.bench_function("to_json", |b| {
        b.iter(|| black_box(serde_json::to_string(black_box(&record))));
    });

    group.bench_function("from_json", |b| {
        b.iter(|| black_box(serde_json::from_str::<LogRecord>(black_box(&json))));
    });

    group.finish();
}

criterion_group!(benches, bench_record_creation, bench_record_serialization);
criterion_main!(benches);
