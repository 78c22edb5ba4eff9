// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outgoing mapping dispatch: turns one local signal update into zero or
//! more addressed messages for remote destination devices.

use crate::database::{Database, Direction, MappingStatus};
use crate::expression::ExpressionEvaluator;
use crate::property::{MessageBuilder, Value};
use crate::router::{bound, mode};

/// One transformed sample addressed to a remote device, ready to hand to
/// a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingSample {
    pub dst_device: String,
    pub dst_signal: String,
    pub message: crate::property::Message,
}

/// Evaluates every `Ready` mapping sourced from `(src_device, src_signal)`
/// against `values`, producing the destination-addressed messages to send.
///
/// Mappings that are not `Ready`, out of scope for `src_device`, muted, or
/// whose destination signal is unknown are silently skipped — none of
/// these are error conditions, just a sample with nowhere to go yet.
pub fn dispatch(
    db: &Database,
    src_device: &str,
    src_signal: &str,
    values: &[Value],
    instance: Option<i32>,
    evaluator: &dyn ExpressionEvaluator,
) -> Vec<OutgoingSample> {
    let mut out = Vec::new();

    for mut mapping in db.mappings_from(src_device, src_signal) {
        if mapping.status != MappingStatus::Ready || mapping.muted {
            continue;
        }
        if !mapping.scope_admits(src_device) {
            continue;
        }

        let dst_slot = mapping.dst_slot.clone();
        let Some(dst) = db.get_signal(&dst_slot.device, &dst_slot.signal, Direction::Input) else {
            continue;
        };

        let dst_type = dst.signal_type.to_value_type();
        let dst_len = dst.length;

        let Some(transformed) = mode::apply(&mut mapping, values, dst_type, dst_len, evaluator)
        else {
            continue;
        };
        db.replace_mapping(mapping.clone());

        let Some(bounded) = apply_bounds(&mapping, &transformed) else {
            continue;
        };

        let mut builder = MessageBuilder::new(format!("/{}/{}", dst_slot.device, dst_slot.signal));
        if mapping.send_as_instance {
            if let Some(inst) = instance {
                builder = builder.positional(Value::I32(inst));
            }
        }
        for v in bounded {
            builder = builder.positional(v);
        }

        out.push(OutgoingSample {
            dst_device: dst_slot.device.clone(),
            dst_signal: dst_slot.signal.clone(),
            message: builder.build(),
        });
    }

    out
}

/// Apply `mapping`'s per-element boundary actions. A muted element mutes
/// the whole sample, per the "mute on any element mutes the entire
/// vector" rule — a partially-delivered sample would desynchronize a
/// multi-element destination signal.
fn apply_bounds(mapping: &crate::database::MappingRecord, values: &[Value]) -> Option<Vec<Value>> {
    let mut out = Vec::with_capacity(values.len());
    for (i, v) in values.iter().enumerate() {
        let ty = v.value_type();
        let x = v.as_f64()?;
        let min = bound_at(mapping.dst_min.as_deref(), i);
        let max = bound_at(mapping.dst_max.as_deref(), i);

        let x = bound::apply(mapping.bound_min, x, min, max)?;
        let x = bound::apply(mapping.bound_max, x, min, max)?;
        out.push(Value::from_f64(ty, x)?);
    }
    Some(out)
}

fn bound_at(values: Option<&[Value]>, index: usize) -> f64 {
    let Some(values) = values else {
        return f64::NAN;
    };
    if values.is_empty() {
        return f64::NAN;
    }
    values[index.min(values.len() - 1)]
        .as_f64()
        .unwrap_or(f64::NAN)
}
