// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Router dispatch benchmark.
//!
//! Measures `router::dispatch`'s per-update cost as the number of `Ready`
//! mappings sourced from a single signal grows, since a busy hub fans one
//! update out to every mapping that reads it.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sigmesh::database::{Database, Direction, MappingRecord, MappingStatus, SignalRecord, SignalType, SlotRef};
use sigmesh::expression::IdentityEvaluator;
use sigmesh::property::Value;
use sigmesh::router::{dispatch, BoundAction, Mode};
use std::collections::HashSet;

fn setup(num_mappings: usize) -> Database {
    let db = Database::new();
    db.add_signal(SignalRecord {
        device_name: "src.1".into(),
        name: "x".into(),
        direction: Direction::Output,
        signal_type: SignalType::F64,
        length: 1,
        unit: None,
        minimum: None,
        maximum: None,
        rate: None,
        num_instances: 1,
        current_value: None,
    });

    for i in 0..num_mappings {
        let dst_device = format!("dst{i}.1");
        db.add_signal(SignalRecord {
            device_name: dst_device.clone(),
            name: "y".into(),
            direction: Direction::Input,
            signal_type: SignalType::F64,
            length: 1,
            unit: None,
            minimum: None,
            maximum: None,
            rate: None,
            num_instances: 1,
            current_value: None,
        });
        db.add_mapping(MappingRecord {
            id: i as u64,
            src_slots: vec![SlotRef {
                device: "src.1".into(),
                signal: "x".into(),
            }],
            dst_slot: SlotRef {
                device: dst_device,
                signal: "y".into(),
            },
            mode: Mode::Linear,
            expression: None,
            src_min: Some(vec![Value::F64(0.0)]),
            src_max: Some(vec![Value::F64(1.0)]),
            dst_min: Some(vec![Value::F64(0.0)]),
            dst_max: Some(vec![Value::F64(100.0)]),
            bound_min: BoundAction::Clamp,
            bound_max: BoundAction::Clamp,
            muted: false,
            send_as_instance: false,
            scope: HashSet::new(),
            status: MappingStatus::Ready,
        });
    }
    db
}

fn bench_dispatch_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_dispatch");
    for &n in &[1usize, 10, 100] {
        let db = setup(n);
        group.bench_function(format!("mappings_{n}"), |b| {
            b.iter(|| {
                let out = dispatch(
                    black_box(&db),
                    "src.1",
                    "x",
                    black_box(&[Value::F64(0.5)]),
                    None,
                    &IdentityEvaluator,
                );
                black_box(out);
            });
        });
    }
    group.finish();
}

criterion_group!(router_benches, bench_dispatch_fan_out);
criterion_main!(router_benches);
