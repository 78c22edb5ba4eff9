// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The in-memory registry of devices, signals, links, and mappings.
//!
//! A single device's `Database` is not shared across threads, but it is
//! shared within a device between the admin bus, the router, and the host
//! application, all of which call through `&Database`. Interior
//! mutability (`RefCell`) takes the place of the `Arc<RwLock<_>>` pattern
//! used where state genuinely crosses threads elsewhere in this crate's
//! style.

use std::cell::RefCell;
use std::collections::HashMap;

use super::callbacks::{CallbackHandle, CallbackRegistry, Event};
use super::cursor::Cursor;
use super::records::{DeviceRecord, Direction, LinkRecord, MappingRecord, SignalRecord};

type SignalKey = (String, String, Direction);
type LinkKey = (String, String);

#[derive(Default)]
struct Inner {
    devices: HashMap<String, DeviceRecord>,
    signals: HashMap<SignalKey, SignalRecord>,
    links: HashMap<LinkKey, LinkRecord>,
    mappings: HashMap<u64, MappingRecord>,
    next_mapping_id: u64,
    device_callbacks: CallbackRegistry<DeviceRecord>,
    signal_callbacks: CallbackRegistry<SignalRecord>,
    link_callbacks: CallbackRegistry<LinkRecord>,
    mapping_callbacks: CallbackRegistry<MappingRecord>,
}

/// The per-device registry of everything known about the mesh: this
/// device's own records plus mirrors synthesized from peer announcements.
#[derive(Default)]
pub struct Database {
    inner: RefCell<Inner>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    // -- devices ----------------------------------------------------

    /// Insert or overwrite a device record, firing `New` or `Modified`.
    pub fn add_device(&self, record: DeviceRecord) {
        let mut inner = self.inner.borrow_mut();
        let event = if inner.devices.contains_key(&record.ordinal_name) {
            Event::Modified
        } else {
            Event::New
        };
        inner.devices.insert(record.ordinal_name.clone(), record.clone());
        inner.device_callbacks.fire(&record, event);
    }

    pub fn get_device(&self, name: &str) -> Option<DeviceRecord> {
        self.inner.borrow().devices.get(name).cloned()
    }

    pub fn remove_device(&self, name: &str) -> Option<DeviceRecord> {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.devices.remove(name)?;
        inner.device_callbacks.fire(&removed, Event::Removed);
        Some(removed)
    }

    /// Snapshot cursor over every known device's ordinal name.
    pub fn devices(&self) -> Cursor<String> {
        let keys = self.inner.borrow().devices.keys().cloned().collect();
        Cursor::new(keys)
    }

    /// Snapshot cursor over device names starting with `prefix`.
    pub fn devices_matching(&self, prefix: &str) -> Cursor<String> {
        let keys = self
            .inner
            .borrow()
            .devices
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        Cursor::new(keys)
    }

    pub fn on_device(&self, callback: impl FnMut(&DeviceRecord, Event) + 'static) -> CallbackHandle {
        self.inner.borrow_mut().device_callbacks.add(callback)
    }

    pub fn remove_device_callback(&self, handle: CallbackHandle) -> bool {
        self.inner.borrow_mut().device_callbacks.remove(handle)
    }

    // -- signals ------------------------------------------------------

    pub fn add_signal(&self, record: SignalRecord) {
        let mut inner = self.inner.borrow_mut();
        let key = (record.device_name.clone(), record.name.clone(), record.direction);
        let event = if inner.signals.contains_key(&key) {
            Event::Modified
        } else {
            Event::New
        };
        inner.signals.insert(key, record.clone());
        inner.signal_callbacks.fire(&record, event);
    }

    pub fn get_signal(&self, device: &str, name: &str, direction: Direction) -> Option<SignalRecord> {
        self.inner
            .borrow()
            .signals
            .get(&(device.to_string(), name.to_string(), direction))
            .cloned()
    }

    /// Update a signal's current value in place, firing `Modified`.
    pub fn set_signal_value(
        &self,
        device: &str,
        name: &str,
        direction: Direction,
        value: Vec<crate::property::Value>,
    ) {
        let mut inner = self.inner.borrow_mut();
        let key = (device.to_string(), name.to_string(), direction);
        if let Some(record) = inner.signals.get_mut(&key) {
            record.current_value = Some(value);
            let record = record.clone();
            inner.signal_callbacks.fire(&record, Event::Modified);
        }
    }

    pub fn remove_signal(&self, device: &str, name: &str, direction: Direction) -> Option<SignalRecord> {
        let mut inner = self.inner.borrow_mut();
        let removed = inner
            .signals
            .remove(&(device.to_string(), name.to_string(), direction))?;
        inner.signal_callbacks.fire(&removed, Event::Removed);
        Some(removed)
    }

    /// Snapshot cursor over every signal owned by `device`.
    pub fn signals_for_device(&self, device: &str) -> Cursor<SignalKey> {
        let keys = self
            .inner
            .borrow()
            .signals
            .keys()
            .filter(|(d, _, _)| d == device)
            .cloned()
            .collect();
        Cursor::new(keys)
    }

    pub fn resolve_signal(&self, key: &SignalKey) -> Option<SignalRecord> {
        self.inner.borrow().signals.get(key).cloned()
    }

    pub fn on_signal(&self, callback: impl FnMut(&SignalRecord, Event) + 'static) -> CallbackHandle {
        self.inner.borrow_mut().signal_callbacks.add(callback)
    }

    pub fn remove_signal_callback(&self, handle: CallbackHandle) -> bool {
        self.inner.borrow_mut().signal_callbacks.remove(handle)
    }

    // -- links ----------------------------------------------------------

    /// Install or overwrite the link between `src` and `dst`.
    pub fn add_link(&self, record: LinkRecord) {
        let mut inner = self.inner.borrow_mut();
        let key = (record.src_device.clone(), record.dst_device.clone());
        let event = if inner.links.contains_key(&key) {
            Event::Modified
        } else {
            Event::New
        };
        inner.links.insert(key, record.clone());
        inner.link_callbacks.fire(&record, event);
    }

    pub fn get_link(&self, src: &str, dst: &str) -> Option<LinkRecord> {
        self.inner
            .borrow()
            .links
            .get(&(src.to_string(), dst.to_string()))
            .cloned()
    }

    /// Ensure a link exists between `src` and `dst`, creating an empty one
    /// if absent. Called when the first mapping between two devices is
    /// established.
    pub fn ensure_link(&self, src: &str, dst: &str) -> LinkRecord {
        if let Some(existing) = self.get_link(src, dst) {
            return existing;
        }
        let record = LinkRecord {
            src_device: src.to_string(),
            dst_device: dst.to_string(),
            extra: crate::property::PropertyTable::new(),
        };
        self.add_link(record.clone());
        record
    }

    pub fn remove_link(&self, src: &str, dst: &str) -> Option<LinkRecord> {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.links.remove(&(src.to_string(), dst.to_string()))?;
        inner.link_callbacks.fire(&removed, Event::Removed);
        Some(removed)
    }

    pub fn links(&self) -> Cursor<LinkKey> {
        let keys = self.inner.borrow().links.keys().cloned().collect();
        Cursor::new(keys)
    }

    pub fn resolve_link(&self, key: &LinkKey) -> Option<LinkRecord> {
        self.inner.borrow().links.get(key).cloned()
    }

    pub fn on_link(&self, callback: impl FnMut(&LinkRecord, Event) + 'static) -> CallbackHandle {
        self.inner.borrow_mut().link_callbacks.add(callback)
    }

    pub fn remove_link_callback(&self, handle: CallbackHandle) -> bool {
        self.inner.borrow_mut().link_callbacks.remove(handle)
    }

    // -- mappings ---------------------------------------------------

    /// Allocate the next mapping id. Ids are never reused within a
    /// device's lifetime.
    pub fn next_mapping_id(&self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.next_mapping_id += 1;
        inner.next_mapping_id
    }

    pub fn add_mapping(&self, record: MappingRecord) {
        let mut inner = self.inner.borrow_mut();
        let event = if inner.mappings.contains_key(&record.id) {
            Event::Modified
        } else {
            Event::New
        };
        inner.mappings.insert(record.id, record.clone());
        inner.mapping_callbacks.fire(&record, event);
    }

    /// Overwrite an existing mapping's state (e.g. after a mode transform
    /// mutates `src_min`/`src_max` under `calibrate`), firing `Modified`.
    pub fn replace_mapping(&self, record: MappingRecord) {
        let mut inner = self.inner.borrow_mut();
        inner.mappings.insert(record.id, record.clone());
        inner.mapping_callbacks.fire(&record, Event::Modified);
    }

    pub fn get_mapping(&self, id: u64) -> Option<MappingRecord> {
        self.inner.borrow().mappings.get(&id).cloned()
    }

    pub fn remove_mapping(&self, id: u64) -> Option<MappingRecord> {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.mappings.remove(&id)?;
        inner.mapping_callbacks.fire(&removed, Event::Removed);
        Some(removed)
    }

    pub fn mappings(&self) -> Cursor<u64> {
        let keys = self.inner.borrow().mappings.keys().copied().collect();
        Cursor::new(keys)
    }

    pub fn resolve_mapping(&self, id: u64) -> Option<MappingRecord> {
        self.get_mapping(id)
    }

    /// Every `Ready`-or-not mapping whose source slots reference
    /// `(device, signal)`. The router filters by status itself; this
    /// returns the raw candidate set.
    pub fn mappings_from(&self, device: &str, signal: &str) -> Vec<MappingRecord> {
        self.inner
            .borrow()
            .mappings
            .values()
            .filter(|m| {
                m.src_slots
                    .iter()
                    .any(|s| s.device == device && s.signal == signal)
            })
            .cloned()
            .collect()
    }

    /// Every mapping whose destination slot is `(device, signal)`.
    pub fn mappings_to(&self, device: &str, signal: &str) -> Vec<MappingRecord> {
        self.inner
            .borrow()
            .mappings
            .values()
            .filter(|m| m.dst_slot.device == device && m.dst_slot.signal == signal)
            .cloned()
            .collect()
    }

    pub fn on_mapping(&self, callback: impl FnMut(&MappingRecord, Event) + 'static) -> CallbackHandle {
        self.inner.borrow_mut().mapping_callbacks.add(callback)
    }

    pub fn remove_mapping_callback(&self, handle: CallbackHandle) -> bool {
        self.inner.borrow_mut().mapping_callbacks.remove(handle)
    }
}
