//! Criterion benchmarks for the analytics and normalization hot paths.
//!
//! Benchmarks:
//! 1. Rolling SMA / EMA / volatility over a decade of daily closes
//! 2. Alignment and correlation across several instruments
//! 3. Normalizing a raw provider table

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use stockwise_core::analytics;
use stockwise_core::data::{ColumnNormalizer, RawTable};
use stockwise_core::PriceSeries;

// ── Helpers ──────────────────────────────────────────────────────────

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap()
}

fn make_series(id: &str, n: usize, phase: f64) -> PriceSeries {
    let points: Vec<(NaiveDate, f64)> = (0..n)
        .map(|i| {
            let close = 1000.0 + ((i as f64 * 0.05) + phase).sin() * 50.0 + i as f64 * 0.1;
            (base_date() + Duration::days(i as i64), close)
        })
        .collect();
    PriceSeries::from_closes(id, &points)
}

fn make_table(n: usize) -> RawTable {
    let mut table = RawTable::with_columns(&["date", "open", "high", "low", "close", "volume"]);
    for i in 0..n {
        let close = 1000.0 + (i as f64 * 0.05).sin() * 50.0;
        let date = base_date() + Duration::days(i as i64);
        table.push_row(vec![
            json!(date.to_string()),
            json!(close - 2.0),
            json!(close + 5.0),
            json!(close - 5.0),
            json!(format!("{close:.2}")),
            json!(1_000_000 + i),
        ]);
    }
    table
}

// ── 1. Rolling statistics ────────────────────────────────────────────

fn bench_rolling(c: &mut Criterion) {
    let series = make_series("X", 2520, 0.0);
    let mut group = c.benchmark_group("rolling");
    for window in [20usize, 200] {
        group.bench_with_input(BenchmarkId::new("sma", window), &window, |b, &w| {
            b.iter(|| analytics::sma(black_box(&series), w))
        });
        group.bench_with_input(BenchmarkId::new("volatility", window), &window, |b, &w| {
            b.iter(|| analytics::volatility_and_risk(black_box(&series), w))
        });
    }
    group.bench_function("ema_20", |b| b.iter(|| analytics::ema(black_box(&series), 20)));
    group.bench_function("abrupt_5pct", |b| {
        b.iter(|| analytics::abrupt_changes(black_box(&series), 0.05))
    });
    group.finish();
}

// ── 2. Alignment / correlation ───────────────────────────────────────

fn bench_correlation(c: &mut Criterion) {
    let universe: Vec<PriceSeries> = (0..10)
        .map(|i| make_series(&format!("S{i}"), 2520 - i * 30, i as f64))
        .collect();
    c.bench_function("align_10x2520", |b| b.iter(|| analytics::align(black_box(&universe))));
    c.bench_function("correlate_10x2520", |b| {
        b.iter(|| analytics::correlate(black_box(&universe)))
    });
}

// ── 3. Normalization ─────────────────────────────────────────────────

fn bench_normalize(c: &mut Criterion) {
    let table = make_table(2520);
    let normalizer = ColumnNormalizer::default();
    c.bench_function("normalize_2520_rows", |b| {
        b.iter(|| normalizer.normalize("X", black_box(&table)))
    });
}

criterion_group!(benches, bench_rolling, bench_correlation, bench_normalize);
criterion_main!(benches);
