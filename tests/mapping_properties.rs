// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end mapping delivery (exactly-once), boundary closure, and the
//! mapping scope gate, driven through the full `Device` negotiation path
//! where practical and through `router::dispatch` directly where a
//! property depends on mapping fields `Device::map_with` doesn't expose
//! (source/destination ranges, scope).

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use sigmesh::transport::LoopbackTransport;
use sigmesh::{BoundAction, Database, Device, DeviceConfig, DeviceRecord, Direction, Mode, SignalType, Value};

fn config(identifier: &str) -> DeviceConfig {
    DeviceConfig::builder(identifier)
        .naming_probe_window_ms(2)
        .port_probe_window_ms(2)
        .announcement_interval_ms(10_000)
        .build()
        .unwrap()
}

fn converge(devices: &mut [&mut Device<LoopbackTransport>]) {
    for _ in 0..8 {
        for device in devices.iter_mut() {
            device.poll(5).unwrap();
        }
    }
}

/// P3: once both endpoints have seen `/mapped`, every sample the source
/// emits produces exactly one delivery to the destination.
#[test]
fn ready_mapping_delivers_each_update_exactly_once() {
    let admin_hub = LoopbackTransport::new_hub();
    let data_hub = LoopbackTransport::new_hub();

    let mut src = Device::with_transports(
        config("src"),
        LoopbackTransport::join(admin_hub.clone()),
        LoopbackTransport::join(data_hub.clone()),
    )
    .unwrap();
    let mut dst = Device::with_transports(
        config("dst"),
        LoopbackTransport::join(admin_hub),
        LoopbackTransport::join(data_hub),
    )
    .unwrap();

    src.add_output_signal("level", SignalType::F64, 1, None, Some(0.0), Some(1.0)).unwrap();
    let received = Rc::new(RefCell::new(Vec::new()));
    let received_handle = received.clone();
    dst.add_input_signal("level", SignalType::F64, 1, None, Some(0.0), Some(1.0), move |_, _, values| {
        received_handle.borrow_mut().push(values[0].clone());
    })
    .unwrap();

    converge(&mut [&mut src, &mut dst]);

    let mapping_id = src
        .map_with(&[("src.1", "level")], ("dst.1", "level"), Mode::Bypass, BoundAction::None, BoundAction::None)
        .unwrap();
    for _ in 0..8 {
        src.poll(0).unwrap();
        dst.poll(0).unwrap();
    }
    assert!(src.mapping_ready(mapping_id));

    for sample in [0.1, 0.25, 0.5, 0.75] {
        src.update_scalar("level", sample).unwrap();
        for _ in 0..4 {
            src.poll(0).unwrap();
            dst.poll(0).unwrap();
        }
    }

    let got: Vec<f64> = received
        .borrow()
        .iter()
        .map(|v| match v {
            Value::F64(x) => *x,
            other => panic!("unexpected value {other:?}"),
        })
        .collect();
    assert_eq!(got, vec![0.1, 0.25, 0.5, 0.75], "each update should arrive exactly once, in order");
}

fn mirror(name: &str) -> DeviceRecord {
    DeviceRecord {
        ordinal_name: name.to_string(),
        host: "127.0.0.1".into(),
        port: 9000,
        can_alias: false,
        registered_at_ms: 0,
        properties: Default::default(),
        is_local: false,
    }
}

/// P4 + P6 combined across a small router-level mesh: a clamp-bounded
/// mapping never emits outside `[dst_min, dst_max]`, and a mapping scoped
/// to a single source is silent for every other source.
#[test]
fn clamped_mapping_stays_in_bounds_and_respects_scope() {
    use sigmesh::database::{MappingRecord, SignalRecord, SlotRef};
    use sigmesh::expression::IdentityEvaluator;
    use sigmesh::router::dispatch;

    let db = Database::new();
    db.add_device(mirror("a.1"));
    db.add_device(mirror("b.1"));
    db.add_signal(SignalRecord {
        device_name: "a.1".into(),
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
    db.add_signal(SignalRecord {
        device_name: "b.1".into(),
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

    let mut scope = HashSet::new();
    scope.insert("a.1".to_string());
    db.add_mapping(MappingRecord {
        id: 1,
        src_slots: vec![SlotRef { device: "a.1".into(), signal: "x".into() }],
        dst_slot: SlotRef { device: "b.1".into(), signal: "y".into() },
        mode: Mode::Linear,
        expression: None,
        src_min: Some(vec![Value::F64(0.0)]),
        src_max: Some(vec![Value::F64(1.0)]),
        dst_min: Some(vec![Value::F64(0.0)]),
        dst_max: Some(vec![Value::F64(10.0)]),
        bound_min: BoundAction::Clamp,
        bound_max: BoundAction::Clamp,
        muted: false,
        send_as_instance: false,
        scope,
        status: sigmesh::database::MappingStatus::Ready,
    });

    for sample in [-5.0, 0.0, 0.5, 1.0, 20.0] {
        let out = dispatch(&db, "a.1", "x", &[Value::F64(sample)], None, &IdentityEvaluator);
        assert_eq!(out.len(), 1);
        let Value::F64(delivered) = out[0].message.positional()[0] else { panic!("expected f64") };
        assert!((0.0..=10.0).contains(&delivered), "{delivered} escaped the clamp bound");
    }

    // A second mapping from the same slot, scoped to a device that never
    // actually sends anything: every sample from "a.1" must be silenced
    // even though "a.1" is the slot's own declared source.
    db.add_mapping(MappingRecord {
        id: 2,
        src_slots: vec![SlotRef { device: "a.1".into(), signal: "x".into() }],
        dst_slot: SlotRef { device: "b.1".into(), signal: "y".into() },
        mode: Mode::Bypass,
        expression: None,
        src_min: None,
        src_max: None,
        dst_min: None,
        dst_max: None,
        bound_min: BoundAction::None,
        bound_max: BoundAction::None,
        muted: false,
        send_as_instance: false,
        scope: ["remote-console.1".to_string()].into_iter().collect(),
        status: sigmesh::database::MappingStatus::Ready,
    });
    let out = dispatch(&db, "a.1", "x", &[Value::F64(0.5)], None, &IdentityEvaluator);
    assert_eq!(out.len(), 1, "only the first, in-scope mapping should have fired");
}
