// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The pluggable expression evaluator invoked by `expression`-mode mappings.
//!
//! A real deployment is expected to supply a full expression-language
//! evaluator (parsing and JIT-compiling per-mapping expression strings);
//! that engine is outside this crate. [`IdentityEvaluator`] is the
//! default stand-in so the crate runs standalone: it copies/casts the
//! source vector into the destination type and length, which is the same
//! behavior `bypass` mode gives a same-typed same-length mapping.

use crate::property::{Value, ValueType};

/// Evaluates an `expression`-mode mapping's transform as a pure function
/// of the source vector.
pub trait ExpressionEvaluator {
    /// Compute the destination vector for one sample.
    ///
    /// `expression` is the mapping's declared expression string (opaque to
    /// this trait); `src` is the source sample, already validated against
    /// `src_type`; `dst_type`/`dst_len` describe the destination slot.
    /// Returning `None` mutes this sample (treated like `bound_min ==
    /// mute`).
    fn evaluate(
        &self,
        expression: &str,
        src: &[Value],
        dst_type: ValueType,
        dst_len: usize,
    ) -> Option<Vec<Value>>;
}

/// Default evaluator: ignores the expression string and copies/casts the
/// source vector elementwise into the destination type and length.
/// Shorter source vectors repeat their last element; longer ones are
/// truncated.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityEvaluator;

impl ExpressionEvaluator for IdentityEvaluator {
    fn evaluate(
        &self,
        _expression: &str,
        src: &[Value],
        dst_type: ValueType,
        dst_len: usize,
    ) -> Option<Vec<Value>> {
        if src.is_empty() || dst_len == 0 {
            return None;
        }
        (0..dst_len)
            .map(|i| {
                let v = &src[i.min(src.len() - 1)];
                Value::from_f64(dst_type, v.as_f64()?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_evaluator_casts_and_pads_short_vector() {
        let eval = IdentityEvaluator;
        let out = eval
            .evaluate("ignored", &[Value::F64(1.5)], ValueType::I32, 3)
            .unwrap();
        assert_eq!(out, vec![Value::I32(2), Value::I32(2), Value::I32(2)]);
    }

    #[test]
    fn identity_evaluator_truncates_long_vector() {
        let eval = IdentityEvaluator;
        let src = [Value::F64(1.0), Value::F64(2.0), Value::F64(3.0)];
        let out = eval.evaluate("ignored", &src, ValueType::F64, 2).unwrap();
        assert_eq!(out, vec![Value::F64(1.0), Value::F64(2.0)]);
    }

    #[test]
    fn identity_evaluator_mutes_on_empty_source() {
        let eval = IdentityEvaluator;
        assert_eq!(eval.evaluate("ignored", &[], ValueType::F32, 1), None);
    }
}
