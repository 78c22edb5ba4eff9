// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ties naming, announcement, link/mapping negotiation and subscriptions
//! together against a shared [`Database`] and [`Transport`].

use std::net::SocketAddr;

use crate::admin::naming::{Allocator, NamingState};
use crate::admin::subscribe::SubscriptionTable;
use crate::admin::{announce, link, mapping, naming, subscribe, timers::Timer};
use crate::config::DeviceConfig;
use crate::database::{Database, DeviceRecord, MappingRecord};
use crate::error::Result;
use crate::property::{Key, Message, MessageBuilder, Value};
use crate::transport::Transport;
use crate::wire;

/// A `/map/modify` this device is waiting on a fresh `/mapped` ack for,
/// bounded by `mapping_ack_timeout_ms`. If the deadline passes first, the
/// mapping reverts to `previous`.
struct PendingModification {
    mapping_id: u64,
    previous: Option<MappingRecord>,
    deadline_ms: u64,
}

/// Drives the naming state machine and processes every admin-bus message
/// for one device. Owns no signals or router state — those belong to
/// [`crate::device::Device`], which calls [`AdminBus::poll`] each step.
pub struct AdminBus {
    allocator: Allocator,
    announce_timer: Timer,
    liveness_timeout_ms: u64,
    mapping_ack_timeout_ms: u64,
    subscriptions: SubscriptionTable,
    pending_modifications: Vec<PendingModification>,
    local_host: String,
    local_data_port: u16,
    was_registered: bool,
}

impl AdminBus {
    pub fn new(now_ms: u64, config: &DeviceConfig, local_host: String, local_data_port: u16) -> Self {
        AdminBus {
            allocator: Allocator::new(
                now_ms,
                config.identifier(),
                local_data_port,
                config.port_probe_window_ms(),
                config.naming_probe_window_ms(),
                config.probe_retries(),
            ),
            announce_timer: Timer::periodic(now_ms, config.announcement_interval_ms(), 10),
            liveness_timeout_ms: config.liveness_timeout_ms(),
            mapping_ack_timeout_ms: config.mapping_ack_timeout_ms(),
            subscriptions: SubscriptionTable::new(),
            pending_modifications: Vec::new(),
            local_host,
            local_data_port,
            was_registered: false,
        }
    }

    pub fn naming_state(&self) -> NamingState {
        self.allocator.state()
    }

    /// This device's stable `<identifier>.<ordinal>` name, once registered.
    pub fn local_device_name(&self) -> Option<String> {
        (self.allocator.state() == NamingState::Registered).then(|| self.allocator.ordinal_name())
    }

    /// Service the admin socket, advance naming/announcement timers, and
    /// reap stale mirrors. Call every `Device::poll`.
    pub fn poll(
        &mut self,
        now_ms: u64,
        db: &Database,
        transport: &mut dyn Transport,
    ) -> Result<()> {
        // Drain before ticking the allocator forward: a `/name/registered`
        // claim that arrived this tick must have a chance to bump our own
        // candidate ordinal before we'd otherwise commit to it ourselves.
        for (from, bytes) in transport.poll_recv()? {
            let Ok(msg) = wire::decode("", &bytes) else {
                log::debug!("admin bus: dropping undecodable datagram");
                continue;
            };
            self.dispatch(now_ms, db, transport, from, &msg)?;
        }

        let advanced = self.allocator.tick(now_ms)?;
        if advanced && self.allocator.state() == NamingState::Registered && !self.was_registered {
            self.was_registered = true;
            let local = DeviceRecord {
                ordinal_name: self.allocator.ordinal_name(),
                host: self.local_host.clone(),
                port: self.local_data_port,
                can_alias: true,
                registered_at_ms: now_ms,
                properties: Default::default(),
                is_local: true,
            };
            db.add_device(local.clone());
            transport.broadcast(&wire::encode(&naming::build_registered_announcement(
                self.allocator.identifier(),
                self.allocator.candidate_ordinal(),
            )))?;
            transport.broadcast(&wire::encode(&announce::build_announcement(&local)))?;
        }

        if self.allocator.state() == NamingState::Registered {
            if announce::announce_due(&mut self.announce_timer, now_ms) {
                if let Some(local) = db.get_device(&self.allocator.ordinal_name()) {
                    transport.broadcast(&wire::encode(&announce::build_announcement(&local)))?;
                }
            }
        }

        announce::reap_stale_mirrors(db, now_ms, self.liveness_timeout_ms);
        self.subscriptions.sweep_expired(now_ms);
        self.revert_expired_modifications(db, now_ms);
        Ok(())
    }

    /// Revert any `/map/modify` that hasn't seen a fresh `/mapped` ack
    /// within `mapping_ack_timeout_ms` back to its pre-modification state
    /// (or drop it entirely if there was no previous state to restore).
    fn revert_expired_modifications(&mut self, db: &Database, now_ms: u64) {
        let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_modifications)
            .into_iter()
            .partition(|p| p.deadline_ms <= now_ms);
        self.pending_modifications = pending;
        for modification in expired {
            let acked = db
                .get_mapping(modification.mapping_id)
                .map(|m| m.status == crate::database::MappingStatus::Ready)
                .unwrap_or(false);
            if acked {
                continue;
            }
            match modification.previous {
                Some(previous) => mapping::revert_modification(db, previous),
                None => {
                    db.remove_mapping(modification.mapping_id);
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        now_ms: u64,
        db: &Database,
        transport: &mut dyn Transport,
        from: SocketAddr,
        msg: &Message,
    ) -> Result<()> {
        let Some(local) = self.local_device_name() else {
            // Naming probes still need to observe collisions even before
            // this device is registered: a `/name/registered` claim catches
            // a peer settling concurrently, and a `/device` heartbeat
            // catches one that settled and started announcing before we
            // began probing.
            match msg.path() {
                "/name/registered" => self.observe_naming_collision(now_ms, msg),
                "/device" => self.observe_announced_name_collision(now_ms, msg),
                _ => {}
            }
            return Ok(());
        };

        match msg.path() {
            "/device" => {
                announce::ingest_announcement(db, now_ms, msg);
            }
            "/signal" => {
                announce::ingest_signal_announcement(db, msg);
            }
            "/who" => {
                if let Some(record) = db.get_device(&local) {
                    transport.broadcast(&wire::encode(&announce::build_announcement(&record)))?;
                }
            }
            "/logout" => {
                if let Some(Value::Str(name)) = msg.positional().first() {
                    db.remove_device(name);
                }
            }
            "/name/registered" => self.observe_naming_collision(now_ms, msg),
            "/link" => {
                if let Some(reply) = link::handle_link_request(&local, &self.local_host, self.local_data_port, msg) {
                    transport.broadcast(&wire::encode(&reply))?;
                }
            }
            "/linkTo" => {
                if let Some(ack) = link::handle_link_to(db, &local, msg) {
                    transport.broadcast(&wire::encode(&ack))?;
                }
            }
            "/linked" => link::handle_linked(db, &local, msg),
            "/map" => {
                let next_id = db.next_mapping_id();
                if let Some(reply) = mapping::handle_map_request(db, &local, msg, next_id) {
                    transport.broadcast(&wire::encode(&reply))?;
                }
            }
            "/map/modify" => {
                let existing_id = msg.get_i32(Key::Id).map(|v| v as u64);
                let previous = existing_id.and_then(|id| db.get_mapping(id));
                if let Some(reply) = mapping::handle_map_modify(db, &local, msg) {
                    let mapping_id = existing_id.unwrap_or_else(|| db.next_mapping_id());
                    self.pending_modifications.push(PendingModification {
                        mapping_id,
                        previous,
                        deadline_ms: now_ms + self.mapping_ack_timeout_ms,
                    });
                    transport.broadcast(&wire::encode(&reply))?;
                }
            }
            "/mapTo" => {
                if let Some(ack) = mapping::handle_map_to(db, &local, msg) {
                    transport.broadcast(&wire::encode(&ack))?;
                }
            }
            "/mapped" => mapping::handle_mapped(db, &local, msg),
            "/unmap" => mapping::handle_unmap(db, msg),
            "/subscribe" => {
                if let Some((flags, lease)) = subscribe::parse_subscribe(msg) {
                    let is_new = self.subscriptions.subscribe(from, flags, lease, now_ms);
                    log::debug!(
                        "admin bus: {} subscriber {from}, sending full snapshot",
                        if is_new { "new" } else { "renewed" }
                    );
                    self.send_snapshot(db, transport, from)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Send `dest` every device, signal, link, and mapping currently known
    /// to `db`, unicast, so a subscriber's view converges immediately
    /// instead of waiting out each record's own periodic announcement.
    fn send_snapshot(&self, db: &Database, transport: &mut dyn Transport, dest: SocketAddr) -> Result<()> {
        let mut devices = db.devices();
        while let Some(name) = devices.advance() {
            let Some(device) = db.get_device(name) else {
                continue;
            };
            transport.send_to(dest, &wire::encode(&announce::build_announcement(&device)))?;

            let mut signals = db.signals_for_device(name);
            while let Some(key) = signals.advance() {
                if let Some(signal) = db.resolve_signal(key) {
                    transport.send_to(dest, &wire::encode(&announce::build_signal_announcement(&signal)))?;
                }
            }
        }

        let mut links = db.links();
        while let Some(key) = links.advance() {
            if let Some(link) = db.resolve_link(key) {
                transport.send_to(
                    dest,
                    &wire::encode(&link::build_linked_ack(&link.src_device, &link.dst_device)),
                )?;
            }
        }

        let mut mappings = db.mappings();
        while let Some(id) = mappings.advance() {
            if let Some(mapping) = db.resolve_mapping(*id) {
                transport.send_to(dest, &wire::encode(&mapping::build_mapping_message("/mapped", &mapping)))?;
            }
        }

        Ok(())
    }

    fn observe_naming_collision(&mut self, now_ms: u64, msg: &Message) {
        let Some(Value::Str(identifier)) = msg.positional().first() else {
            return;
        };
        let Some(Value::I32(ordinal)) = msg.positional().get(1) else {
            return;
        };
        if identifier == self.allocator.identifier() && *ordinal as u32 == self.allocator.candidate_ordinal() {
            self.allocator.observe_collision(now_ms);
        }
    }

    /// A late-joining device probing `ProbingName` needs to check its
    /// candidate against already-registered peers too, since their one-shot
    /// `/name/registered` claim fired before we existed to hear it — their
    /// ongoing `/device` heartbeat is the only remaining signal.
    fn observe_announced_name_collision(&mut self, now_ms: u64, msg: &Message) {
        if self.allocator.state() != NamingState::ProbingName {
            return;
        }
        let Some(Value::Str(announced)) = msg.positional().first() else {
            return;
        };
        if *announced == self.allocator.ordinal_name() {
            self.allocator.observe_collision(now_ms);
        }
    }

    /// Broadcast a `/signal` announcement for a newly registered local
    /// signal, so peers can mirror its type, length, and range before
    /// they propose a mapping against it.
    pub fn announce_signal(&self, transport: &mut dyn Transport, signal: &crate::database::SignalRecord) -> Result<()> {
        transport.broadcast(&wire::encode(&announce::build_signal_announcement(signal)))
    }

    /// Broadcast a `/map` proposal and record it locally as `Proposed`,
    /// first requesting a link to the destination device if none exists
    /// yet (a link is created implicitly by a mesh's first mapping
    /// between two devices).
    pub fn propose_mapping(&mut self, transport: &mut dyn Transport, db: &Database, mapping: MappingRecord) -> Result<()> {
        if let Some(local) = self.local_device_name() {
            if db.get_link(&local, &mapping.dst_slot.device).is_none() {
                let link_msg = link::build_link_request(&local, &mapping.dst_slot.device);
                transport.broadcast(&wire::encode(&link_msg))?;
            }
        }
        db.add_mapping(mapping.clone());
        let msg = mapping::build_mapping_message("/map", &mapping);
        transport.broadcast(&wire::encode(&msg))
    }

    /// Broadcast `/unmap <id>` and drop the local record.
    pub fn retract_mapping(&mut self, transport: &mut dyn Transport, db: &Database, id: u64) -> Result<()> {
        db.remove_mapping(id);
        transport.broadcast(&wire::encode(&mapping::build_unmap(id)))
    }

    /// Broadcast `/logout` and stop naming. Call on device shutdown.
    pub fn shutdown(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if let Some(local) = self.local_device_name() {
            let msg = MessageBuilder::new("/logout")
                .positional(Value::Str(local))
                .build();
            transport.broadcast(&wire::encode(&msg))?;
        }
        self.allocator.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::database::{MappingStatus, SlotRef};
    use crate::router::{BoundAction, Mode};
    use crate::transport::LoopbackTransport;

    fn bus(now_ms: u64, identifier: &str, port: u16) -> AdminBus {
        bus_with_ack_timeout(now_ms, identifier, port, crate::config::DEFAULT_MAPPING_ACK_TIMEOUT_MS)
    }

    fn bus_with_ack_timeout(now_ms: u64, identifier: &str, port: u16, mapping_ack_timeout_ms: u64) -> AdminBus {
        let config = DeviceConfig::builder(identifier)
            .port_probe_window_ms(10)
            .naming_probe_window_ms(10)
            .announcement_interval_ms(10_000)
            .mapping_ack_timeout_ms(mapping_ack_timeout_ms)
            .build()
            .unwrap();
        AdminBus::new(now_ms, &config, "127.0.0.1".into(), port)
    }

    fn ready_mapping(id: u64, mode: Mode) -> MappingRecord {
        MappingRecord {
            id,
            src_slots: vec![SlotRef {
                device: "a.1".into(),
                signal: "x".into(),
            }],
            dst_slot: SlotRef {
                device: "b.1".into(),
                signal: "y".into(),
            },
            mode,
            expression: None,
            src_min: None,
            src_max: None,
            dst_min: None,
            dst_max: None,
            bound_min: BoundAction::None,
            bound_max: BoundAction::None,
            muted: false,
            send_as_instance: false,
            scope: HashSet::new(),
            status: MappingStatus::Ready,
        }
    }

    #[test]
    fn naming_converges_to_registered_after_probe_windows() {
        let mut bus = bus(0, "synth", 9000);
        let db = Database::new();
        let hub = LoopbackTransport::new_hub();
        let mut transport = LoopbackTransport::join(hub);

        assert_eq!(bus.naming_state(), NamingState::ProbingPort);
        bus.poll(5, &db, &mut transport).unwrap();
        assert_eq!(bus.naming_state(), NamingState::ProbingPort);
        bus.poll(15, &db, &mut transport).unwrap();
        assert_eq!(bus.naming_state(), NamingState::ProbingName);
        bus.poll(30, &db, &mut transport).unwrap();
        assert_eq!(bus.naming_state(), NamingState::Registered);
        assert_eq!(bus.local_device_name(), Some("synth.1".to_string()));
    }

    #[test]
    fn two_devices_on_the_same_hub_see_each_others_announcement() {
        let hub = LoopbackTransport::new_hub();
        let mut a = bus(0, "a", 9000);
        let mut t_a = LoopbackTransport::join(hub.clone());
        let db_a = Database::new();

        let mut b = bus(0, "b", 9001);
        let mut t_b = LoopbackTransport::join(hub);
        let db_b = Database::new();

        for now in [5, 15, 30, 40] {
            a.poll(now, &db_a, &mut t_a).unwrap();
            b.poll(now, &db_b, &mut t_b).unwrap();
        }

        assert!(db_b.get_device("a.1").is_some());
        assert!(db_a.get_device("b.1").is_some());
    }

    #[test]
    fn unacked_modify_reverts_to_previous_ready_state_after_timeout() {
        let hub = LoopbackTransport::new_hub();
        let mut dst = bus_with_ack_timeout(0, "b", 9001, 50);
        let mut t_dst = LoopbackTransport::join(hub.clone());
        let db_dst = Database::new();
        for now in [5, 15, 30] {
            dst.poll(now, &db_dst, &mut t_dst).unwrap();
        }
        assert_eq!(dst.local_device_name(), Some("b.1".to_string()));

        let previous = ready_mapping(5, Mode::Linear);
        db_dst.add_mapping(previous.clone());

        let mut modified = previous.clone();
        modified.mode = Mode::Calibrate;
        let mut t_src = LoopbackTransport::join(hub);
        t_src
            .broadcast(&wire::encode(&mapping::build_mapping_message("/map/modify", &modified)))
            .unwrap();

        dst.poll(40, &db_dst, &mut t_dst).unwrap();
        let pending = db_dst.get_mapping(5).unwrap();
        assert_eq!(pending.status, MappingStatus::Pending);
        assert_eq!(pending.mode, Mode::Calibrate);

        // No `/mapped` ack ever arrives; once the ack window elapses the
        // mapping should fall back to its last known-good state.
        dst.poll(40 + 50 + 1, &db_dst, &mut t_dst).unwrap();
        let reverted = db_dst.get_mapping(5).unwrap();
        assert_eq!(reverted.status, MappingStatus::Ready);
        assert_eq!(reverted.mode, Mode::Linear);
    }

    #[test]
    fn acked_modify_is_not_reverted() {
        let hub = LoopbackTransport::new_hub();
        let mut dst = bus_with_ack_timeout(0, "b", 9001, 50);
        let mut t_dst = LoopbackTransport::join(hub.clone());
        let db_dst = Database::new();
        for now in [5, 15, 30] {
            dst.poll(now, &db_dst, &mut t_dst).unwrap();
        }

        let previous = ready_mapping(5, Mode::Linear);
        db_dst.add_mapping(previous.clone());

        let mut modified = previous.clone();
        modified.mode = Mode::Calibrate;
        let mut t_src = LoopbackTransport::join(hub);
        t_src
            .broadcast(&wire::encode(&mapping::build_mapping_message("/map/modify", &modified)))
            .unwrap();
        dst.poll(40, &db_dst, &mut t_dst).unwrap();

        // The ack arrives before the deadline.
        let mapped = mapping::build_mapping_message("/mapped", &db_dst.get_mapping(5).unwrap());
        t_src.broadcast(&wire::encode(&mapped)).unwrap();
        dst.poll(45, &db_dst, &mut t_dst).unwrap();

        dst.poll(40 + 50 + 1, &db_dst, &mut t_dst).unwrap();
        let current = db_dst.get_mapping(5).unwrap();
        assert_eq!(current.status, MappingStatus::Ready);
        assert_eq!(current.mode, Mode::Calibrate, "a timely ack should not be reverted");
    }

    #[test]
    fn subscribe_triggers_a_full_snapshot_to_the_subscriber() {
        let hub = LoopbackTransport::new_hub();
        let mut host = bus(0, "a", 9000);
        let mut t_host = LoopbackTransport::join(hub.clone());
        let db_host = Database::new();
        for now in [5, 15, 30] {
            host.poll(now, &db_host, &mut t_host).unwrap();
        }

        db_host.add_device(DeviceRecord {
            ordinal_name: "c.1".into(),
            host: "127.0.0.1".into(),
            port: 9500,
            can_alias: false,
            registered_at_ms: 0,
            properties: Default::default(),
            is_local: false,
        });

        let mut t_sub = LoopbackTransport::join(hub);
        t_sub
            .broadcast(&wire::encode(&subscribe::build_subscribe(0, 60)))
            .unwrap();
        host.poll(40, &db_host, &mut t_host).unwrap();

        let received = t_sub.poll_recv().unwrap();
        let paths: Vec<String> = received
            .iter()
            .map(|(_, bytes)| wire::decode("", bytes).unwrap().path().to_string())
            .collect();
        assert!(paths.iter().any(|p| p == "/device"), "expected a /device snapshot message, got {paths:?}");
    }
}
