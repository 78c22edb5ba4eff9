// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mapping negotiation: `/map` -> `/mapTo` -> `/mapped`, `/map/modify`,
//! and `/unmap`.
//!
//! Slot paths travel as plain `"<device>/<signal>"` positional strings;
//! the last positional argument is always the destination slot, every
//! argument before it is a source slot. This avoids needing a literal
//! separator token in a vector that must stay homogeneously typed.

use crate::database::{Database, MappingRecord, MappingStatus, SlotRef};
use crate::property::{Key, Message, MessageBuilder, Value};
use crate::router::{BoundAction, Mode};

fn slot_path(slot: &SlotRef) -> String {
    format!("{}/{}", slot.device, slot.signal)
}

fn parse_slot(path: &str) -> Option<SlotRef> {
    let (device, signal) = path.split_once('/')?;
    Some(SlotRef {
        device: device.to_string(),
        signal: signal.to_string(),
    })
}

fn parse_slots(msg: &Message) -> Option<(Vec<SlotRef>, SlotRef)> {
    let paths: Vec<&str> = msg
        .positional()
        .iter()
        .map(|v| match v {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    let (dst_path, src_paths) = paths.split_last()?;
    let dst = parse_slot(dst_path)?;
    let src = src_paths.iter().map(|p| parse_slot(p)).collect::<Option<Vec<_>>>()?;
    if src.is_empty() {
        return None;
    }
    Some((src, dst))
}

/// Build a `/map`, `/mapTo`, `/mapped`, or `/map/modify` message carrying
/// `mapping`'s negotiable parameters.
pub fn build_mapping_message(path: &str, mapping: &MappingRecord) -> Message {
    let mut builder = MessageBuilder::new(path);
    for slot in &mapping.src_slots {
        builder = builder.positional(Value::Str(slot_path(slot)));
    }
    builder = builder.positional(Value::Str(slot_path(&mapping.dst_slot)));
    builder = builder
        .scalar(Key::Id, Value::I32(mapping.id as i32))
        .scalar(Key::Mode, Value::Str(mapping.mode.to_string()))
        .scalar(Key::BoundMin, Value::Str(mapping.bound_min.to_string()))
        .scalar(Key::BoundMax, Value::Str(mapping.bound_max.to_string()))
        .scalar(
            Key::Mute,
            Value::Str(if mapping.muted { "y" } else { "n" }.into()),
        )
        .scalar(
            Key::SendAsInstance,
            Value::Str(if mapping.send_as_instance { "y" } else { "n" }.into()),
        );

    if let Some(expr) = &mapping.expression {
        builder = builder.scalar(Key::Expression, Value::Str(expr.clone()));
    }
    if let Some(v) = &mapping.src_min {
        builder = builder.arg(Key::SrcMin, v.clone());
    }
    if let Some(v) = &mapping.src_max {
        builder = builder.arg(Key::SrcMax, v.clone());
    }
    if let Some(v) = &mapping.dst_min {
        builder = builder.arg(Key::DestMin, v.clone());
    }
    if let Some(v) = &mapping.dst_max {
        builder = builder.arg(Key::DestMax, v.clone());
    }
    if !mapping.scope.is_empty() {
        let scope: Vec<Value> = mapping.scope.iter().cloned().map(Value::Str).collect();
        builder = builder.arg(Key::Scope, scope);
    }

    builder.build()
}

/// Reconstruct a [`MappingRecord`] (status left at `Proposed`) from a
/// `/map`-family message's fields.
fn mapping_from_message(msg: &Message, fallback_id: u64) -> Option<MappingRecord> {
    let (src_slots, dst_slot) = parse_slots(msg)?;
    let id = msg.get_i32(Key::Id).map(|v| v as u64).unwrap_or(fallback_id);
    let mode = msg
        .get_str(Key::Mode)
        .and_then(Mode::parse)
        .unwrap_or(Mode::Linear);
    let bound_min = msg
        .get_str(Key::BoundMin)
        .and_then(BoundAction::parse)
        .unwrap_or(BoundAction::None);
    let bound_max = msg
        .get_str(Key::BoundMax)
        .and_then(BoundAction::parse)
        .unwrap_or(BoundAction::None);
    let muted = msg.get_str(Key::Mute) == Some("y");
    let send_as_instance = msg.get_str(Key::SendAsInstance) == Some("y");
    let expression = msg.get_str(Key::Expression).map(str::to_string);
    let src_min = msg.get(Key::SrcMin).map(|v| v.to_vec());
    let src_max = msg.get(Key::SrcMax).map(|v| v.to_vec());
    let dst_min = msg.get(Key::DestMin).map(|v| v.to_vec());
    let dst_max = msg.get(Key::DestMax).map(|v| v.to_vec());
    let scope = msg
        .get(Key::Scope)
        .map(|vs| {
            vs.iter()
                .filter_map(|v| match v {
                    Value::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Some(MappingRecord {
        id,
        src_slots,
        dst_slot,
        mode,
        expression,
        src_min,
        src_max,
        dst_min,
        dst_max,
        bound_min,
        bound_max,
        muted,
        send_as_instance,
        scope,
        status: MappingStatus::Proposed,
    })
}

/// Process an inbound `/map` proposal. If this device owns the
/// destination slot, stores it as `Pending` and returns the `/mapTo`
/// reply.
pub fn handle_map_request(db: &Database, local_device: &str, msg: &Message, next_id: u64) -> Option<Message> {
    let mut mapping = mapping_from_message(msg, next_id)?;
    if mapping.dst_slot.device != local_device {
        return None;
    }
    mapping.status = MappingStatus::Pending;
    db.add_mapping(mapping.clone());
    Some(build_mapping_message("/mapTo", &mapping))
}

/// Process an inbound `/mapTo` reply. If this device owns (any of) the
/// source slots, reconciles and returns the `/mapped` ack.
pub fn handle_map_to(db: &Database, local_device: &str, msg: &Message) -> Option<Message> {
    let mapping = mapping_from_message(msg, 0)?;
    if !mapping.src_slots.iter().any(|s| s.device == local_device) {
        return None;
    }
    let mut mapping = mapping;
    mapping.status = MappingStatus::Ready;
    db.add_mapping(mapping.clone());
    Some(build_mapping_message("/mapped", &mapping))
}

/// Process an inbound `/mapped` ack. If this device owns the destination
/// slot, marks the mapping `Ready`.
pub fn handle_mapped(db: &Database, local_device: &str, msg: &Message) {
    let Some(mut mapping) = mapping_from_message(msg, 0) else {
        return;
    };
    if mapping.dst_slot.device != local_device {
        return;
    }
    mapping.status = MappingStatus::Ready;
    db.add_mapping(mapping);
}

/// Process an inbound `/map/modify`: re-propose as `Pending`, same as a
/// fresh `/map` but preserving the mapping id.
pub fn handle_map_modify(db: &Database, local_device: &str, msg: &Message) -> Option<Message> {
    handle_map_request(db, local_device, msg, 0)
}

/// Revert a mapping whose `/map/modify` was not ack'd within the
/// negotiation window back to its last known-good state.
pub fn revert_modification(db: &Database, previous: MappingRecord) {
    db.add_mapping(previous);
}

/// Process an inbound `/unmap <id>`: release the mapping.
pub fn handle_unmap(db: &Database, msg: &Message) {
    if let Some(id) = msg.get_i32(Key::Id) {
        db.remove_mapping(id as u64);
    }
}

pub fn build_unmap(id: u64) -> Message {
    MessageBuilder::new("/unmap").scalar(Key::Id, Value::I32(id as i32)).build()
}
