// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-device in-memory registry: devices, signals, links, and
//! mappings, with prefix queries, explicit cursors, and change callbacks
//! symmetric across all four entity kinds.

mod callbacks;
mod cursor;
mod records;
mod store;

pub use callbacks::{CallbackHandle, CallbackRegistry, Event};
pub use cursor::Cursor;
pub use records::{
    DeviceRecord, Direction, LinkRecord, MappingRecord, MappingStatus, SignalRecord, SignalType,
    SlotRef,
};
pub use store::Database;
