// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link negotiation: `/link` -> `/linkTo` -> `/linked`.
//!
//! A link is a lightweight device-to-device affinity, created implicitly
//! the first time two devices are mapped together. The handshake has no
//! retry budget of its own: an unacknowledged `/link` simply never
//! produces a `LinkRecord`, and the convener is free to re-broadcast.

use crate::database::{Database, LinkRecord};
use crate::property::{Key, Message, MessageBuilder, Value};

/// Broadcast by the device that wants a link to `dst`.
pub fn build_link_request(src: &str, dst: &str) -> Message {
    MessageBuilder::new("/link")
        .positional(Value::Str(src.to_string()))
        .positional(Value::Str(dst.to_string()))
        .build()
}

/// `dst`'s reply once it observes a `/link` naming it as destination.
pub fn build_link_to_reply(src: &str, dst: &str, host: &str, port: u16) -> Message {
    MessageBuilder::new("/linkTo")
        .positional(Value::Str(dst.to_string()))
        .positional(Value::Str(src.to_string()))
        .scalar(Key::Ip, Value::Str(host.to_string()))
        .scalar(Key::Port, Value::I32(port as i32))
        .build()
}

/// `src`'s final ack once it observes `/linkTo` addressed to it.
pub fn build_linked_ack(src: &str, dst: &str) -> Message {
    MessageBuilder::new("/linked")
        .positional(Value::Str(src.to_string()))
        .positional(Value::Str(dst.to_string()))
        .build()
}

fn path_pair(msg: &Message) -> Option<(String, String)> {
    match msg.positional() {
        [Value::Str(a), Value::Str(b)] => Some((a.clone(), b.clone())),
        _ => None,
    }
}

/// Process an inbound `/link <src> <dst>`. If this device is `dst`,
/// returns the `/linkTo` reply to broadcast.
pub fn handle_link_request(local_device: &str, local_host: &str, local_port: u16, msg: &Message) -> Option<Message> {
    let (src, dst) = path_pair(msg)?;
    if dst != local_device {
        return None;
    }
    Some(build_link_to_reply(&src, &dst, local_host, local_port))
}

/// Process an inbound `/linkTo <dst> <src> @IP @port`. If this device is
/// `src`, installs the link (pointed at `dst`) and returns the `/linked`
/// ack to broadcast.
pub fn handle_link_to(db: &Database, local_device: &str, msg: &Message) -> Option<Message> {
    let (dst, src) = path_pair(msg)?;
    if src != local_device {
        return None;
    }
    db.add_link(LinkRecord {
        src_device: src.clone(),
        dst_device: dst.clone(),
        extra: Default::default(),
    });
    Some(build_linked_ack(&src, &dst))
}

/// Process an inbound `/linked <src> <dst>`. If this device is `dst`,
/// installs the mirrored link record.
pub fn handle_linked(db: &Database, local_device: &str, msg: &Message) {
    let Some((src, dst)) = path_pair(msg) else {
        return;
    };
    if dst != local_device {
        return;
    }
    db.add_link(LinkRecord {
        src_device: src,
        dst_device: dst,
        extra: Default::default(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_handshake_installs_link_on_both_sides() {
        let db_src = Database::new();
        let db_dst = Database::new();

        let request = build_link_request("a.1", "b.1");

        let reply = handle_link_request("b.1", "10.0.0.2", 9100, &request).unwrap();
        assert_eq!(reply.path(), "/linkTo");

        let ack = handle_link_to(&db_src, "a.1", &reply).unwrap();
        assert_eq!(ack.path(), "/linked");
        assert!(db_src.get_link("a.1", "b.1").is_some());

        handle_linked(&db_dst, "b.1", &ack);
        assert!(db_dst.get_link("a.1", "b.1").is_some());
    }

    #[test]
    fn link_request_for_a_different_destination_is_ignored() {
        let request = build_link_request("a.1", "b.1");
        assert!(handle_link_request("c.1", "10.0.0.3", 9100, &request).is_none());
    }

    #[test]
    fn link_to_for_a_different_source_is_ignored() {
        let db = Database::new();
        let reply = build_link_to_reply("a.1", "b.1", "10.0.0.2", 9100);
        assert!(handle_link_to(&db, "z.1", &reply).is_none());
    }
}
