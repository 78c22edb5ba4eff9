// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mapping-mode transforms.

use std::fmt;

use crate::database::MappingRecord;
use crate::expression::ExpressionEvaluator;
use crate::property::{Value, ValueType};

/// The transform a mapping applies between its source and destination
/// slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The mapping exists but is not live; no sample is ever emitted.
    None,
    /// Emit the sample without interpretation (non-numeric types).
    Raw,
    /// Pass the value unchanged if types/lengths match.
    Bypass,
    /// Affine rescale from `[src_min, src_max]` to `[dst_min, dst_max]`.
    Linear,
    /// Invoke the expression evaluator.
    Expression,
    /// Like `linear`, but `src_min`/`src_max` expand to include every
    /// observed sample.
    Calibrate,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::None => "none",
            Mode::Raw => "raw",
            Mode::Bypass => "bypass",
            Mode::Linear => "linear",
            Mode::Expression => "expression",
            Mode::Calibrate => "calibrate",
        }
    }

    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "none" => Some(Mode::None),
            "raw" => Some(Mode::Raw),
            "bypass" => Some(Mode::Bypass),
            "linear" => Some(Mode::Linear),
            "expression" => Some(Mode::Expression),
            "calibrate" => Some(Mode::Calibrate),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply `mapping`'s mode to `src`, producing the untransformed (not yet
/// boundary-checked) destination vector. `None` means the sample is
/// muted and nothing should be emitted.
///
/// `calibrate` mutates `mapping.src_min`/`src_max` in place to expand
/// around the observed sample before falling through to the linear
/// formula.
pub fn apply(
    mapping: &mut MappingRecord,
    src: &[Value],
    dst_type: ValueType,
    dst_len: usize,
    evaluator: &dyn ExpressionEvaluator,
) -> Option<Vec<Value>> {
    match mapping.mode {
        Mode::None => None,
        Mode::Raw => Some(src.to_vec()),
        Mode::Bypass => {
            if src.len() == dst_len && src.iter().all(|v| v.value_type() == dst_type) {
                Some(src.to_vec())
            } else {
                None
            }
        }
        Mode::Expression => {
            let expr = mapping.expression.as_deref().unwrap_or("");
            evaluator.evaluate(expr, src, dst_type, dst_len)
        }
        Mode::Calibrate => {
            expand_calibration(mapping, src);
            linear(mapping, src, dst_type, dst_len)
        }
        Mode::Linear => linear(mapping, src, dst_type, dst_len),
    }
}

fn expand_calibration(mapping: &mut MappingRecord, src: &[Value]) {
    let samples: Vec<f64> = src.iter().filter_map(Value::as_f64).collect();
    if samples.is_empty() {
        return;
    }

    let mins = mapping
        .src_min
        .get_or_insert_with(|| src.iter().map(|_| Value::F64(f64::INFINITY)).collect());
    let maxs = mapping
        .src_max
        .get_or_insert_with(|| src.iter().map(|_| Value::F64(f64::NEG_INFINITY)).collect());

    for (i, &sample) in samples.iter().enumerate() {
        if let Some(Some(cur)) = mins.get(i).map(Value::as_f64) {
            if sample < cur {
                mins[i] = Value::F64(sample);
            }
        }
        if let Some(Some(cur)) = maxs.get(i).map(Value::as_f64) {
            if sample > cur {
                maxs[i] = Value::F64(sample);
            }
        }
    }
}

/// `dst = dst_min + (src - src_min) * (dst_max - dst_min) / (src_max - src_min)`,
/// per element. A zero or undefined denominator mutes that element's
/// sample; the caller, `router::dispatch`, applies the "mute on any
/// element mutes the entire vector for that sample" rule.
fn linear(
    mapping: &MappingRecord,
    src: &[Value],
    dst_type: ValueType,
    dst_len: usize,
) -> Option<Vec<Value>> {
    let src_min = mapping.src_min.as_ref()?;
    let src_max = mapping.src_max.as_ref()?;
    let dst_min = mapping.dst_min.as_ref()?;
    let dst_max = mapping.dst_max.as_ref()?;

    if src.is_empty() || src_min.is_empty() || src_max.is_empty() || dst_min.is_empty() || dst_max.is_empty() {
        return None;
    }

    (0..dst_len)
        .map(|i| {
            let s = src.get(i.min(src.len() - 1))?.as_f64()?;
            let smin = src_min.get(i.min(src_min.len() - 1))?.as_f64()?;
            let smax = src_max.get(i.min(src_max.len() - 1))?.as_f64()?;
            let dmin = dst_min.get(i.min(dst_min.len() - 1))?.as_f64()?;
            let dmax = dst_max.get(i.min(dst_max.len() - 1))?.as_f64()?;

            let denom = smax - smin;
            if denom == 0.0 {
                return None;
            }
            let scaled = dmin + (s - smin) * (dmax - dmin) / denom;
            Value::from_f64(dst_type, scaled)
        })
        .collect()
}
