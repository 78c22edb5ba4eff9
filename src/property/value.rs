// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed argument model shared by signals, property values, and wire
//! arguments, using a single-character type tag alphabet
//! (`'i'`, `'f'`, `'d'`, `'c'`, `'s'`).

use std::fmt;

/// The declared type of a single argument or signal sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    F32,
    F64,
    Char,
    Str,
}

impl ValueType {
    /// The single-character wire tag for this type (`i`,`f`,`d`,`c`,`s`).
    pub fn tag(self) -> char {
        match self {
            ValueType::I32 => 'i',
            ValueType::F32 => 'f',
            ValueType::F64 => 'd',
            ValueType::Char => 'c',
            ValueType::Str => 's',
        }
    }

    /// Parse a wire tag character back into a `ValueType`.
    pub fn from_tag(tag: char) -> Option<ValueType> {
        match tag {
            'i' => Some(ValueType::I32),
            'f' => Some(ValueType::F32),
            'd' => Some(ValueType::F64),
            'c' => Some(ValueType::Char),
            's' | 'S' => Some(ValueType::Str),
            _ => None,
        }
    }

    /// Whether this is one of the numeric signal sample types
    /// (`i32`/`f32`/`f64`/`char`, as opposed to `Str`).
    pub fn is_signal_type(self) -> bool {
        !matches!(self, ValueType::Str)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A single typed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I32(i32),
    F32(f32),
    F64(f64),
    Char(char),
    Str(String),
}

impl Value {
    /// The `ValueType` this value carries.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::Char(_) => ValueType::Char,
            Value::Str(_) => ValueType::Str,
        }
    }

    /// Widen to `f64`, the common type used by router numeric transforms:
    /// integer modes compute in `f64` then cast back with
    /// round-to-nearest-even. Returns `None` for `Str`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I32(v) => Some(*v as f64),
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            Value::Char(v) => Some(*v as u32 as f64),
            Value::Str(_) => None,
        }
    }

    /// Construct a value of `ty` from an `f64`, rounding to nearest with
    /// ties-to-even for integer types.
    pub fn from_f64(ty: ValueType, v: f64) -> Option<Value> {
        match ty {
            ValueType::I32 => Some(Value::I32(round_ties_even(v) as i32)),
            ValueType::F32 => Some(Value::F32(v as f32)),
            ValueType::F64 => Some(Value::F64(v)),
            ValueType::Char => Some(Value::Char(
                char::from_u32(round_ties_even(v).clamp(0.0, u32::MAX as f64) as u32)
                    .unwrap_or('\0'),
            )),
            ValueType::Str => None,
        }
    }
}

/// Round-half-to-even, since `f64::round()` rounds half away from zero.
pub fn round_ties_even(v: f64) -> f64 {
    let floor = v.floor();
    let diff = v - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Checks that every value in `values` shares the same `ValueType`.
/// Heterogeneous vectors are rejected (treated as length zero) with a
/// logged diagnostic by the message parser.
pub fn homogeneous_type(values: &[Value]) -> Option<ValueType> {
    let mut iter = values.iter();
    let first = iter.next()?.value_type();
    if iter.all(|v| v.value_type() == first) {
        Some(first)
    } else {
        None
    }
}
