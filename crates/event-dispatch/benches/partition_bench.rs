// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use event_dispatch::batch::Partitioner;
use event_dispatch::message::MessageFormatter;
use event_dispatch::offload::{SizeEvaluator, SizedMessage};
use event_dispatch::{Event, PublishContext, TenantFallback};
use serde_json::json;

fn sized_messages(count: usize, payload_bytes: usize) -> Vec<SizedMessage> {
    let formatter = MessageFormatter::new("bench-service", TenantFallback::default());
    let evaluator = SizeEvaluator::default();
    let context = PublishContext::for_tenant("bench");
    (0..count)
        .map(|i| {
            let event = Event::new(json!({"id": i, "data": "x".repeat(payload_bytes)}))
                .with_fixed_properties(["id"]);
            let msg = formatter
                .format(&event, "bench-queue", i + 1, &context)
                .expect("format should succeed");
            evaluator.evaluate(msg)
        })
        .collect()
}

fn benchmark_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("Partitioner::partition");
    let partitioner = Partitioner::default();

    let test_cases = vec![
        ("tiny", 1_000, 64),
        ("medium", 1_000, 16 * 1024),
        ("near_limit", 200, 250 * 1024),
        ("offloaded", 200, 300 * 1024),
    ];

    for (name, count, payload_bytes) in test_cases {
        let messages = sized_messages(count, payload_bytes);
        group.bench_with_input(BenchmarkId::from_parameter(name), &messages, |b, messages| {
            b.iter(|| partitioner.partition(black_box(messages.clone())));
        });
    }
    group.finish();
}

fn benchmark_evaluate(c: &mut Criterion) {
    let formatter = MessageFormatter::new("bench-service", TenantFallback::default());
    let evaluator = SizeEvaluator::default();
    let context = PublishContext::default();
    let event = Event::new(json!({"id": 1, "data": "x".repeat(300 * 1024)}))
        .with_fixed_properties(["id"]);

    c.bench_function("SizeEvaluator::evaluate/offloaded", |b| {
        b.iter(|| {
            let msg = formatter
                .format(black_box(&event), "bench-queue", 1, &context)
                .expect("format should succeed");
            evaluator.evaluate(msg)
        });
    });
}

criterion_group!(benches, benchmark_partition, benchmark_evaluate);
criterion_main!(benches);
