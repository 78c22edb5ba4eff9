// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Entity record types stored in the [`super::Database`].

use std::collections::HashSet;

use crate::property::{PropertyTable, Value};
use crate::router::{BoundAction, Mode};

/// Whether a signal is consumed or produced by its owning device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// The numeric sample type carried by a signal. A subset of
/// [`crate::property::ValueType`] — signals never carry `Str` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    I32,
    F32,
    F64,
    Char,
}

impl SignalType {
    pub fn to_value_type(self) -> crate::property::ValueType {
        match self {
            SignalType::I32 => crate::property::ValueType::I32,
            SignalType::F32 => crate::property::ValueType::F32,
            SignalType::F64 => crate::property::ValueType::F64,
            SignalType::Char => crate::property::ValueType::Char,
        }
    }

    pub fn from_value_type(ty: crate::property::ValueType) -> Option<SignalType> {
        match ty {
            crate::property::ValueType::I32 => Some(SignalType::I32),
            crate::property::ValueType::F32 => Some(SignalType::F32),
            crate::property::ValueType::F64 => Some(SignalType::F64),
            crate::property::ValueType::Char => Some(SignalType::Char),
            crate::property::ValueType::Str => None,
        }
    }
}

/// A registered device, local or mirrored from another peer's
/// announcements.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    /// `<identifier>.<ordinal>`, unique across the mesh.
    pub ordinal_name: String,
    pub host: String,
    pub port: u16,
    pub can_alias: bool,
    /// Milliseconds since the admin bus's local clock epoch (device
    /// runtime's monotonic timer, not wall-clock time).
    pub registered_at_ms: u64,
    pub properties: PropertyTable,
    /// `true` for this process's own device; `false` for a mirror.
    pub is_local: bool,
}

/// A registered signal, keyed by `(device, name, direction)`.
#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub device_name: String,
    pub name: String,
    pub direction: Direction,
    pub signal_type: SignalType,
    pub length: usize,
    pub unit: Option<String>,
    pub minimum: Option<Vec<Value>>,
    pub maximum: Option<Vec<Value>>,
    pub rate: Option<f64>,
    pub num_instances: u32,
    pub current_value: Option<Vec<Value>>,
}

impl SignalRecord {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.device_name, self.name)
    }
}

/// A device-to-device data-plane affinity, created implicitly by the
/// first mapping between two devices.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub src_device: String,
    pub dst_device: String,
    pub extra: PropertyTable,
}

/// The negotiation state of a [`MappingRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingStatus {
    Proposed,
    Pending,
    Ready,
    Released,
}

/// One end of a mapping: a fully qualified signal reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRef {
    pub device: String,
    pub signal: String,
}

/// A route from one or more source signals to a destination signal.
#[derive(Debug, Clone)]
pub struct MappingRecord {
    pub id: u64,
    pub src_slots: Vec<SlotRef>,
    pub dst_slot: SlotRef,
    pub mode: Mode,
    pub expression: Option<String>,
    pub src_min: Option<Vec<Value>>,
    pub src_max: Option<Vec<Value>>,
    pub dst_min: Option<Vec<Value>>,
    pub dst_max: Option<Vec<Value>>,
    pub bound_min: BoundAction,
    pub bound_max: BoundAction,
    pub muted: bool,
    pub send_as_instance: bool,
    pub scope: HashSet<String>,
    pub status: MappingStatus,
}

impl MappingRecord {
    /// Whether `device` may act as a source for this mapping's updates.
    pub fn scope_admits(&self, device: &str) -> bool {
        self.scope.is_empty() || self.scope.contains(device)
    }
}
