// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary wire codec for [`Message`].
//!
//! A small length-prefixed binary encoding carrying exactly what
//! [`Message`] needs — a path, a positional argument vector, a keyed
//! parameter table, and an extras bag — independent of any particular
//! transport's own type system.
//!
//! Frame layout (all integers little-endian):
//!
//! ```text
//! magic: [u8; 4]            b"SGM1"
//! path_len: u16, path: [u8; path_len]
//! positional_count: u16, positional_count * <value>
//! param_count: u16, param_count * (key_tag: u8, <value vector>)
//! extra_count: u16, extra_count * (key_len: u16, key: [u8; key_len], <value vector>)
//!
//! <value>: type_tag: u8, <payload>
//!   'i' -> i32 (4 bytes)      'f' -> f32 (4 bytes)      'd' -> f64 (8 bytes)
//!   'c' -> u32 (4 bytes, the char's scalar value)
//!   's' -> u16 len, [u8; len] (UTF-8)
//!
//! <value vector>: type_tag: u8, count: u16, count * <payload-only, sharing type_tag>
//! ```

use crate::error::{Error, Result};
use crate::property::{Key, Message, MessageBuilder, Value, ValueType, ALL};

const MAGIC: &[u8; 4] = b"SGM1";

/// Encode `msg` into its binary wire frame.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(MAGIC);

    write_str(&mut out, msg.path());

    write_u16(&mut out, msg.positional().len() as u16);
    for v in msg.positional() {
        write_value(&mut out, v);
    }

    let params: Vec<(Key, &[Value])> = ALL
        .iter()
        .filter_map(|&k| msg.get(k).map(|v| (k, v)))
        .collect();
    write_u16(&mut out, params.len() as u16);
    for (key, values) in params {
        out.push(key_to_tag(key));
        write_value_vec(&mut out, values);
    }

    let extras: Vec<_> = msg.extra().iter().collect();
    write_u16(&mut out, extras.len() as u16);
    for (key, values) in extras {
        write_str(&mut out, key);
        write_value_vec(&mut out, values);
    }

    out
}

/// Decode a binary wire frame previously produced by [`encode`].
pub fn decode(path_hint: &str, bytes: &[u8]) -> Result<Message> {
    let mut cur = Cursor::new(bytes);
    let magic = cur.take(4)?;
    if magic != MAGIC {
        return Err(Error::Codec(format!(
            "bad magic for {path_hint}: {magic:02x?}"
        )));
    }

    let path = cur.read_str()?;
    let mut builder = MessageBuilder::new(path);

    let positional_count = cur.read_u16()?;
    for _ in 0..positional_count {
        builder = builder.positional(cur.read_value()?);
    }

    let param_count = cur.read_u16()?;
    for _ in 0..param_count {
        let tag = cur.take(1)?[0];
        let key = key_from_tag(tag)
            .ok_or_else(|| Error::Codec(format!("unknown key tag {tag} in {path_hint}")))?;
        let values = cur.read_value_vec()?;
        builder = builder.arg(key, values);
    }

    let extra_count = cur.read_u16()?;
    for _ in 0..extra_count {
        let key = cur.read_str()?;
        let values = cur.read_value_vec()?;
        builder = builder.extra(key, values);
    }

    Ok(builder.build())
}

/// Stable per-key tag used on the wire, independent of enum discriminant
/// layout. The key table is part of the wire ABI, so its ordering must
/// stay fixed across releases.
fn key_to_tag(key: Key) -> u8 {
    ALL.iter()
        .position(|&k| k == key)
        .expect("Key::ALL is exhaustive") as u8
}

fn key_from_tag(tag: u8) -> Option<Key> {
    ALL.get(tag as usize).copied()
}

fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

fn write_value(out: &mut Vec<u8>, v: &Value) {
    out.push(v.value_type().tag() as u8);
    write_value_payload(out, v);
}

fn write_value_payload(out: &mut Vec<u8>, v: &Value) {
    match v {
        Value::I32(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::F32(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::F64(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::Char(c) => out.extend_from_slice(&(*c as u32).to_le_bytes()),
        Value::Str(s) => write_str(out, s),
    }
}

fn write_value_vec(out: &mut Vec<u8>, values: &[Value]) {
    let ty = values.first().map(Value::value_type).unwrap_or(ValueType::I32);
    out.push(ty.tag() as u8);
    write_u16(out, values.len() as u16);
    for v in values {
        write_value_payload(out, v);
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::Codec("unexpected end of frame".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_char(&mut self) -> Result<char> {
        let scalar = u32::from_le_bytes(self.take(4)?.try_into().unwrap());
        char::from_u32(scalar).ok_or_else(|| Error::Codec(format!("invalid char scalar {scalar}")))
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Codec(e.to_string()))
    }

    fn read_value_payload(&mut self, ty: ValueType) -> Result<Value> {
        Ok(match ty {
            ValueType::I32 => Value::I32(self.read_i32()?),
            ValueType::F32 => Value::F32(self.read_f32()?),
            ValueType::F64 => Value::F64(self.read_f64()?),
            ValueType::Char => Value::Char(self.read_char()?),
            ValueType::Str => Value::Str(self.read_str()?),
        })
    }

    fn read_value(&mut self) -> Result<Value> {
        let tag = self.take(1)?[0] as char;
        let ty = ValueType::from_tag(tag)
            .ok_or_else(|| Error::Codec(format!("unknown type tag '{tag}'")))?;
        self.read_value_payload(ty)
    }

    fn read_value_vec(&mut self) -> Result<Vec<Value>> {
        let tag = self.take(1)?[0] as char;
        let ty = ValueType::from_tag(tag)
            .ok_or_else(|| Error::Codec(format!("unknown type tag '{tag}'")))?;
        let count = self.read_u16()?;
        (0..count).map(|_| self.read_value_payload(ty)).collect()
    }
}
