// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subscription leases: `/subscribe <flags> <lease_seconds>`.
//!
//! A subscription is bus-level bookkeeping, not a database entity — it
//! gets no `new`/`modified`/`removed` callback of its own. A subscriber
//! that lets its lease lapse is simply dropped from the table on the next
//! sweep.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::property::{Message, MessageBuilder, Value};

/// An outstanding subscriber and when its lease expires.
#[derive(Debug, Clone, Copy)]
struct Subscription {
    flags: i32,
    expires_at_ms: u64,
}

/// Table of outstanding subscriptions, keyed by subscriber address.
#[derive(Default)]
pub struct SubscriptionTable {
    subscribers: HashMap<SocketAddr, Subscription>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or renew `addr`'s subscription. Returns `true` if this is
    /// a fresh subscription (the caller should send a full snapshot) as
    /// opposed to a renewal of an existing one.
    pub fn subscribe(&mut self, addr: SocketAddr, flags: i32, lease_seconds: i32, now_ms: u64) -> bool {
        let expires_at_ms = now_ms + (lease_seconds.max(0) as u64) * 1000;
        let is_new = !self.subscribers.contains_key(&addr);
        self.subscribers.insert(addr, Subscription { flags, expires_at_ms });
        is_new
    }

    /// Drop every subscriber whose lease has lapsed.
    pub fn sweep_expired(&mut self, now_ms: u64) {
        self.subscribers.retain(|_, sub| sub.expires_at_ms > now_ms);
    }

    pub fn is_subscribed(&self, addr: &SocketAddr) -> bool {
        self.subscribers.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

pub fn build_subscribe(flags: i32, lease_seconds: i32) -> Message {
    MessageBuilder::new("/subscribe")
        .positional(Value::I32(flags))
        .positional(Value::I32(lease_seconds))
        .build()
}

pub fn parse_subscribe(msg: &Message) -> Option<(i32, i32)> {
    match msg.positional() {
        [Value::I32(flags), Value::I32(lease)] => Some((*flags, *lease)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
    }

    #[test]
    fn first_subscribe_reports_new_renewal_does_not() {
        let mut table = SubscriptionTable::new();
        assert!(table.subscribe(addr(9000), 0, 60, 0));
        assert!(!table.subscribe(addr(9000), 0, 60, 1000));
    }

    #[test]
    fn sweep_drops_lapsed_subscribers_only() {
        let mut table = SubscriptionTable::new();
        table.subscribe(addr(9000), 0, 10, 0);
        table.subscribe(addr(9001), 0, 60, 0);

        table.sweep_expired(11_000);

        assert!(!table.is_subscribed(&addr(9000)));
        assert!(table.is_subscribed(&addr(9001)));
    }

    #[test]
    fn subscribe_message_round_trips() {
        let msg = build_subscribe(3, 120);
        assert_eq!(parse_subscribe(&msg), Some((3, 120)));
    }
}
