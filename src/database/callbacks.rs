// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-entity-kind change callback registry.
//!
//! Every entity kind (device, signal, link, mapping) gets its own
//! `CallbackRegistry<T>` rather than one registry keyed by a type tag,
//! so each fires with its own concrete record type and no downcasting is
//! needed. User context is captured by the closure itself — idiomatic
//! Rust has no need for the `void*` context parameter this pattern
//! usually carries.

/// Why a change callback fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    New,
    Modified,
    Removed,
}

/// Opaque registration handle returned by `add`, required by `remove`.
/// Registration/removal is idempotent: removing an already-removed or
/// unknown handle is a no-op that returns `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

pub struct CallbackRegistry<T> {
    next_id: u64,
    entries: Vec<(u64, Box<dyn FnMut(&T, Event)>)>,
}

impl<T> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }
}

impl<T> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`, returning a handle for later removal.
    pub fn add(&mut self, callback: impl FnMut(&T, Event) + 'static) -> CallbackHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, Box::new(callback)));
        CallbackHandle(id)
    }

    /// Remove a previously registered callback. Returns `true` if it was
    /// present.
    pub fn remove(&mut self, handle: CallbackHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| *id != handle.0);
        self.entries.len() != before
    }

    /// Fire every registered callback with `record` and `event`, in
    /// registration order.
    pub fn fire(&mut self, record: &T, event: Event) {
        for (_, cb) in &mut self.entries {
            cb(record, event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fire_invokes_every_registered_callback_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reg: CallbackRegistry<i32> = CallbackRegistry::new();

        let log_a = log.clone();
        reg.add(move |v, e| log_a.borrow_mut().push((*v, e, 'a')));
        let log_b = log.clone();
        reg.add(move |v, e| log_b.borrow_mut().push((*v, e, 'b')));

        reg.fire(&42, Event::New);
        assert_eq!(
            *log.borrow(),
            vec![(42, Event::New, 'a'), (42, Event::New, 'b')]
        );
    }

    #[test]
    fn remove_stops_further_firing() {
        let count = Rc::new(RefCell::new(0));
        let mut reg: CallbackRegistry<()> = CallbackRegistry::new();
        let c = count.clone();
        let handle = reg.add(move |_, _| *c.borrow_mut() += 1);

        reg.fire(&(), Event::Modified);
        assert!(reg.remove(handle));
        reg.fire(&(), Event::Modified);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut reg: CallbackRegistry<()> = CallbackRegistry::new();
        let handle = reg.add(|_, _| {});
        assert!(reg.remove(handle));
        assert!(!reg.remove(handle));
    }
}
