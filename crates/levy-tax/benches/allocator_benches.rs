//! Criterion benchmarks for levy-tax hot paths.
//!
//! Covers: power-law allocation and the full gated computation over an
//! in-memory store.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use levy_core::store::MemoryStore;
use levy_core::traits::{RecordStore, TaxCalculator};
use levy_core::types::{User, UserId};
use levy_tax::engine::TaxEngine;
use levy_tax::PowerLawAllocator;

fn incomes(n: u64) -> BTreeMap<UserId, u64> {
    (0..n)
        .map(|i| (UserId::new(format!("U{i:06}")).unwrap(), 100 + i * 37))
        .collect()
}

fn bench_allocate(c: &mut Criterion) {
    let allocator = PowerLawAllocator::default();
    let small = incomes(4);
    let large = incomes(1_000);

    c.bench_function("allocate_4_users", |b| {
        b.iter(|| allocator.allocate(black_box(&small), black_box(749)))
    });
    c.bench_function("allocate_1000_users", |b| {
        b.iter(|| allocator.allocate(black_box(&large), black_box(1_000_000)))
    });
}

fn bench_preview_tax(c: &mut Criterion) {
    let start = NaiveDate::from_ymd_opt(2021, 9, 6).unwrap();
    let mut store = MemoryStore::new();
    let mut target = None;
    for k in 0..4 {
        let s = start + Duration::days(14 * k);
        target = Some(store.insert_interval(s, s + Duration::days(13), 1100).unwrap());
    }
    let target = target.unwrap();
    for i in 0..100u64 {
        let id = UserId::new(format!("U{i:03}")).unwrap();
        store
            .insert_user(User {
                id: id.clone(),
                name: format!("user {i}"),
            })
            .unwrap();
        let src = store.insert_income_source(&id, "Job").unwrap();
        for d in 0..28 {
            store
                .insert_income(src.id, 10 + i, target.end_date - Duration::days(d))
                .unwrap();
        }
    }
    let engine = TaxEngine::default();

    c.bench_function("preview_tax_100_users", |b| {
        b.iter(|| engine.preview_tax(black_box(&store), black_box(target.id)))
    });
}

criterion_group!(benches, bench_allocate, bench_preview_tax);
criterion_main!(benches);
