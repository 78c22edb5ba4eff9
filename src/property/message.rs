// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Message parsing and building: the wire-level glue between the
//! property-key schema, the local database, and the router.
//!
//! The parsing algorithm scans the flat argument list left to right, and
//! whenever a string token starting with `@` is seen, treats it as a key
//! and greedily collects the run of same-typed arguments that follows as
//! its vector value.

use std::collections::HashMap;

use super::{homogeneous_type, Key, PropertyTable, Value};
use crate::error::{Error, Result};

/// A parsed admin or data-plane message: a path plus its typed, keyed
/// argument table. Unknown `@keys` land in [`Message::extra`] rather than
/// being discarded, so that peers running a newer schema degrade
/// gracefully on older ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    path: String,
    params: HashMap<Key, Vec<Value>>,
    extra: PropertyTable,
    /// Positional (non-keyed) arguments preceding the first `@key`, e.g.
    /// `/name/probe identifier ordinal` or the sample vector on a
    /// data-plane path. Order preserved.
    positional: Vec<Value>,
}

impl Message {
    /// Parse `args` against the closed key schema.
    ///
    /// Heterogeneous-typed runs following a key are rejected: the key is
    /// left out of the parsed table entirely (length zero) rather than
    /// included with a mismatched vector, so `get()` on that key returns
    /// `None`.
    pub fn parse(path: impl Into<String> + std::fmt::Display, args: Vec<Value>) -> Message {
        let mut params: HashMap<Key, Vec<Value>> = HashMap::new();
        let mut extra = PropertyTable::new();
        let mut positional = Vec::new();

        let mut i = 0usize;
        while i < args.len() {
            let key_token = match &args[i] {
                Value::Str(s) if s.starts_with('@') => Some(s.clone()),
                _ => None,
            };

            let Some(token) = key_token else {
                // Only non-keyed args preceding the first '@key' are kept;
                // this branch otherwise can't be reached since the scan
                // always resumes right after a key's run.
                positional.push(args[i].clone());
                i += 1;
                continue;
            };

            i += 1;
            let run_start = i;
            while i < args.len() {
                if matches!(&args[i], Value::Str(s) if s.starts_with('@')) {
                    break;
                }
                i += 1;
            }
            let run = &args[run_start..i];
            let uniform = homogeneous_type(run);

            if let Some(key) = Key::parse(&token) {
                if uniform.is_some() && !run.is_empty() {
                    params.insert(key, run.to_vec());
                } else {
                    log::debug!("message {path}: key {token} has no values or heterogeneous types");
                }
            } else if !run.is_empty() {
                if uniform.is_some() {
                    extra.set(token.trim_start_matches('@').to_string(), run.to_vec());
                } else {
                    log::debug!(
                        "message {path}: extra key {token} has heterogeneous value vector"
                    );
                }
            }
        }

        Message {
            path: path.into(),
            params,
            extra,
            positional,
        }
    }

    /// The message's path, e.g. `/device` or `/synth.1/pitch`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Positional arguments preceding the first `@key` (e.g. the device
    /// name on `/device`, or the sample vector on a data-plane path).
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// The raw typed vector for `key`, if present and well-formed.
    pub fn get(&self, key: Key) -> Option<&[Value]> {
        self.params.get(&key).map(|v| v.as_slice())
    }

    /// The declared length of `key`'s vector (0 if absent or rejected).
    pub fn length(&self, key: Key) -> usize {
        self.params.get(&key).map_or(0, |v| v.len())
    }

    /// View `key` as a single string, if its type and length allow it.
    pub fn get_str(&self, key: Key) -> Option<&str> {
        match self.get(key)? {
            [Value::Str(s)] => Some(s.as_str()),
            _ => None,
        }
    }

    /// View `key` as a single i32.
    pub fn get_i32(&self, key: Key) -> Option<i32> {
        match self.get(key)? {
            [Value::I32(v)] => Some(*v),
            _ => None,
        }
    }

    /// View `key` as a single char (also accepts a 1-char string, matching
    /// `mapper_msg_get_param_if_char`'s leniency).
    pub fn get_char(&self, key: Key) -> Option<char> {
        match self.get(key)? {
            [Value::Char(c)] => Some(*c),
            [Value::Str(s)] if s.chars().count() == 1 => s.chars().next(),
            _ => None,
        }
    }

    /// View `key` as an f32/f64 vector widened to `f64` (numeric modes
    /// operate in f64 internally).
    pub fn get_f64_vec(&self, key: Key) -> Option<Vec<f64>> {
        self.get(key)?.iter().map(Value::as_f64).collect()
    }

    /// The extras bag of unrecognized `@keys`.
    pub fn extra(&self) -> &PropertyTable {
        &self.extra
    }

    /// Ensure every key in `keys` is present with a non-empty vector.
    /// Callers on a required path should drop the message on error rather
    /// than propagate it further.
    pub fn require(&self, keys: &[Key]) -> Result<()> {
        for &key in keys {
            if self.length(key) == 0 {
                return Err(Error::Codec(format!(
                    "message {} missing required key {key}",
                    self.path
                )));
            }
        }
        Ok(())
    }
}

/// Fluent builder for outgoing [`Message`]s. Each `.arg()` call is
/// debug-validated against the vector it is given, rather than trusting
/// an untyped variadic argument list.
pub struct MessageBuilder {
    path: String,
    positional: Vec<Value>,
    params: Vec<(Key, Vec<Value>)>,
    extra: Vec<(String, Vec<Value>)>,
}

impl MessageBuilder {
    /// Start building a message for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            positional: Vec::new(),
            params: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Append a positional (non-keyed) argument.
    pub fn positional(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Set a schema key to a vector of values. Debug-asserts the vector is
    /// homogeneously typed, since a heterogeneous vector would just be
    /// rejected again on the receiving end.
    pub fn arg(mut self, key: Key, values: Vec<Value>) -> Self {
        debug_assert!(
            homogeneous_type(&values).is_some() || values.is_empty(),
            "heterogeneous vector for key {key}"
        );
        self.params.push((key, values));
        self
    }

    /// Convenience for a single scalar argument.
    pub fn scalar(self, key: Key, value: Value) -> Self {
        self.arg(key, vec![value])
    }

    /// Set an extension ("extra") key not in the closed schema.
    pub fn extra(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.extra.push((key.into(), values));
        self
    }

    /// Finalize into an immutable [`Message`].
    pub fn build(self) -> Message {
        let mut params = HashMap::new();
        for (k, v) in self.params {
            params.insert(k, v);
        }
        let mut extra = PropertyTable::new();
        for (k, v) in self.extra {
            extra.set(k, v);
        }
        Message {
            path: self.path,
            params,
            extra,
            positional: self.positional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_then_keyed_args() {
        let msg = Message::parse(
            "/device",
            vec![
                Value::Str("@IP".into()),
                Value::Str("10.0.0.2".into()),
                Value::Str("@port".into()),
                Value::I32(9000),
                Value::Str("@canAlias".into()),
                Value::Str("no".into()),
            ],
        );
        assert_eq!(msg.get_str(Key::Ip), Some("10.0.0.2"));
        assert_eq!(msg.get_i32(Key::Port), Some(9000));
    }

    #[test]
    fn rejects_heterogeneous_vector_with_zero_length() {
        let msg = Message::parse(
            "/map",
            vec![
                Value::Str("@min".into()),
                Value::I32(1),
                Value::F64(2.0),
            ],
        );
        assert_eq!(msg.length(Key::Min), 0);
        assert_eq!(msg.get(Key::Min), None);
    }

    #[test]
    fn unknown_key_lands_in_extras() {
        let msg = Message::parse(
            "/device",
            vec![Value::Str("@futureKey".into()), Value::I32(7)],
        );
        assert_eq!(msg.extra().get("futureKey"), Some(&[Value::I32(7)][..]));
    }

    #[test]
    fn require_fails_on_missing_key() {
        let msg = Message::parse("/signal", vec![]);
        assert!(msg.require(&[Key::Type]).is_err());
    }

    #[test]
    fn builder_round_trips_through_parse() {
        let built = MessageBuilder::new("/device")
            .scalar(Key::Ip, Value::Str("127.0.0.1".into()))
            .scalar(Key::Port, Value::I32(9001))
            .build();
        assert_eq!(built.get_str(Key::Ip), Some("127.0.0.1"));
        assert_eq!(built.get_i32(Key::Port), Some(9001));
    }

    #[test]
    fn positional_args_precede_first_key() {
        let msg = Message::parse(
            "/name/probe",
            vec![Value::Str("synth".into()), Value::I32(1)],
        );
        assert_eq!(
            msg.positional(),
            &[Value::Str("synth".into()), Value::I32(1)]
        );
    }
}
