// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Periodic self-announcement and liveness reaping of stale mirrors.

use crate::admin::timers::Timer;
use crate::database::{Database, DeviceRecord, Direction, SignalRecord, SignalType};
use crate::property::{Key, Message, MessageBuilder, Value, ValueType};

/// Build this device's `/device` announcement message.
pub fn build_announcement(device: &DeviceRecord) -> Message {
    MessageBuilder::new("/device")
        .positional(Value::Str(device.ordinal_name.clone()))
        .scalar(Key::Ip, Value::Str(device.host.clone()))
        .scalar(Key::Port, Value::I32(device.port as i32))
        .scalar(
            Key::CanAlias,
            Value::Str(if device.can_alias { "y" } else { "n" }.into()),
        )
        .build()
}

/// Ingest a peer's `/device` announcement as a mirror, refreshing
/// `registered_at_ms` so the liveness sweep doesn't reap it.
pub fn ingest_announcement(db: &Database, now_ms: u64, msg: &Message) -> Option<()> {
    let name = match msg.positional().first()? {
        Value::Str(s) => s.clone(),
        _ => return None,
    };
    let host = msg.get_str(Key::Ip)?.to_string();
    let port = msg.get_i32(Key::Port)? as u16;
    let can_alias = msg.get_str(Key::CanAlias) == Some("y");

    db.add_device(DeviceRecord {
        ordinal_name: name,
        host,
        port,
        can_alias,
        registered_at_ms: now_ms,
        properties: Default::default(),
        is_local: false,
    });
    Some(())
}

/// Remove every mirror whose last-seen timestamp is older than
/// `liveness_timeout_ms`, firing `Removed` for each (via `Database`).
/// Local records (`is_local`) are never reaped.
pub fn reap_stale_mirrors(db: &Database, now_ms: u64, liveness_timeout_ms: u64) {
    let mut cursor = db.devices();
    let mut stale = Vec::new();
    while let Some(name) = cursor.advance() {
        if let Some(record) = db.get_device(name) {
            if !record.is_local && now_ms.saturating_sub(record.registered_at_ms) > liveness_timeout_ms {
                stale.push(record.ordinal_name);
            }
        }
    }
    for name in stale {
        db.remove_device(&name);
    }
}

/// Build a `/signal` announcement for `signal`, carrying enough of its
/// declaration for a peer to mirror it locally.
pub fn build_signal_announcement(signal: &SignalRecord) -> Message {
    let direction = match signal.direction {
        Direction::Input => "in",
        Direction::Output => "out",
    };
    let mut builder = MessageBuilder::new("/signal")
        .positional(Value::Str(format!("{}/{}", signal.device_name, signal.name)))
        .scalar(Key::Direction, Value::Str(direction.into()))
        .scalar(Key::Type, Value::Str(signal.signal_type.to_value_type().tag().to_string()))
        .scalar(Key::Length, Value::I32(signal.length as i32))
        .scalar(Key::Instances, Value::I32(signal.num_instances as i32));
    if let Some(min) = &signal.minimum {
        builder = builder.arg(Key::Min, min.clone());
    }
    if let Some(max) = &signal.maximum {
        builder = builder.arg(Key::Max, max.clone());
    }
    if let Some(rate) = signal.rate {
        builder = builder.scalar(Key::Rate, Value::F64(rate));
    }
    if let Some(unit) = &signal.unit {
        builder = builder.scalar(Key::Units, Value::Str(unit.clone()));
    }
    builder.build()
}

/// Ingest a peer's `/signal` announcement as a mirror.
pub fn ingest_signal_announcement(db: &Database, msg: &Message) -> Option<()> {
    let path = match msg.positional().first()? {
        Value::Str(s) => s.clone(),
        _ => return None,
    };
    let (device_name, name) = path.split_once('/')?;
    let direction = match msg.get_str(Key::Direction)? {
        "in" => Direction::Input,
        "out" => Direction::Output,
        _ => return None,
    };
    let type_tag = msg.get_str(Key::Type)?.chars().next()?;
    let signal_type = SignalType::from_value_type(ValueType::from_tag(type_tag)?)?;
    let length = msg.get_i32(Key::Length)? as usize;
    let num_instances = msg.get_i32(Key::Instances).unwrap_or(1).max(1) as u32;

    db.add_signal(SignalRecord {
        device_name: device_name.to_string(),
        name: name.to_string(),
        direction,
        signal_type,
        length,
        unit: msg.get_str(Key::Units).map(str::to_string),
        minimum: msg.get(Key::Min).map(|v| v.to_vec()),
        maximum: msg.get(Key::Max).map(|v| v.to_vec()),
        rate: msg.get_f64_vec(Key::Rate).and_then(|v| v.first().copied()),
        num_instances,
        current_value: None,
    });
    Some(())
}

/// Whether `announce_timer` should fire and re-broadcast now, rescheduling
/// it if so.
pub fn announce_due(announce_timer: &mut Timer, now_ms: u64) -> bool {
    if announce_timer.is_due(now_ms) {
        announce_timer.reschedule(now_ms);
        true
    } else {
        false
    }
}
