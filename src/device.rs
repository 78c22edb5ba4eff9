// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The top-level per-process runtime: owns the admin bus, the database,
//! the router, and the data-plane listener for one device.
//!
//! Generic over [`Transport`] so tests can swap in [`LoopbackTransport`]
//! for a loopback-only mesh; [`Device::new`] is only available for the
//! real [`UdpMulticastTransport`], since that's the only transport able
//! to bind a socket from a bare [`DeviceConfig`].

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use crate::admin::AdminBus;
use crate::config::DeviceConfig;
use crate::database::{
    Database, Direction, MappingRecord, MappingStatus, SignalRecord, SignalType, SlotRef,
};
use crate::error::{Error, Result};
use crate::expression::{ExpressionEvaluator, IdentityEvaluator};
use crate::property::{Message, Value};
use crate::router::{self, BoundAction, Mode};
use crate::transport::{Transport, UdpMulticastTransport};
use crate::wire;

type InputHandler = Box<dyn FnMut(&str, Option<i32>, &[Value])>;

/// A participant in the mesh: a named bundle of input/output signals,
/// reachable once naming converges, that can be mapped to and from other
/// devices and polled for admin and data-plane traffic.
pub struct Device<T: Transport = UdpMulticastTransport> {
    db: Database,
    admin: AdminBus,
    admin_transport: T,
    data_transport: T,
    local_name: Option<String>,
    pending_signals: Vec<SignalRecord>,
    handlers: HashMap<String, InputHandler>,
    evaluator: Box<dyn ExpressionEvaluator>,
    start: Instant,
}

impl Device<UdpMulticastTransport> {
    /// Construct a device bound to real multicast/UDP sockets, from
    /// `config` alone.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let group: Ipv4Addr = config
            .multicast_group()
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("bad multicast group {}", config.multicast_group())))?;
        let admin_port = config.preferred_admin_port().unwrap_or(crate::config::DEFAULT_ADMIN_PORT);
        let admin_transport = UdpMulticastTransport::join(group, admin_port, admin_port, Ipv4Addr::UNSPECIFIED)?;
        let data_port = config.preferred_data_port().unwrap_or(0);
        let data_transport = UdpMulticastTransport::join(group, admin_port, data_port, Ipv4Addr::UNSPECIFIED)?;
        Self::with_transports(config, admin_transport, data_transport)
    }
}

impl<T: Transport> Device<T> {
    /// Construct a device over caller-supplied transports (real or a test
    /// double). [`Device::new`] is the entry point for real sockets.
    pub fn with_transports(config: DeviceConfig, admin_transport: T, data_transport: T) -> Result<Self> {
        let local_host = match admin_transport.local_addr() {
            Some(SocketAddr::V4(v4)) => v4.ip().to_string(),
            Some(SocketAddr::V6(v6)) => v6.ip().to_string(),
            None => "0.0.0.0".to_string(),
        };
        let local_data_port = data_transport.local_addr().map(|a| a.port()).unwrap_or(0);
        let admin = AdminBus::new(0, &config, local_host, local_data_port);
        Ok(Device {
            db: Database::new(),
            admin,
            admin_transport,
            data_transport,
            local_name: None,
            pending_signals: Vec::new(),
            handlers: HashMap::new(),
            evaluator: Box::new(IdentityEvaluator),
            start: Instant::now(),
        })
    }

    /// Install a custom expression evaluator for `calibrate`/`expression`
    /// mode mappings sourced from this device.
    pub fn set_evaluator(&mut self, evaluator: Box<dyn ExpressionEvaluator>) {
        self.evaluator = evaluator;
    }

    /// This device's `<identifier>.<ordinal>` name, once registered.
    pub fn name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Whether naming has converged and this device is addressable.
    pub fn ready(&self) -> bool {
        self.local_name.is_some()
    }

    /// A direct read-only handle to this device's database, for host
    /// applications that want to browse mirrors or register change
    /// callbacks.
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn register_signal(&mut self, record: SignalRecord) -> Result<()> {
        let already_exists = self.pending_signals.iter().any(|s| s.name == record.name)
            || self
                .local_name
                .as_deref()
                .map(|local| self.db.get_signal(local, &record.name, record.direction).is_some())
                .unwrap_or(false);
        if already_exists {
            return Err(Error::DuplicateSignal(record.name.clone()));
        }
        match &self.local_name {
            Some(local) => {
                let mut record = record;
                record.device_name = local.clone();
                self.db.add_signal(record.clone());
                self.admin.announce_signal(&mut self.admin_transport, &record)?;
            }
            None => self.pending_signals.push(record),
        }
        Ok(())
    }

    /// Register a signal this device produces.
    pub fn add_output_signal(
        &mut self,
        name: impl Into<String>,
        signal_type: SignalType,
        length: usize,
        unit: Option<String>,
        minimum: Option<f64>,
        maximum: Option<f64>,
    ) -> Result<()> {
        let name = name.into();
        self.register_signal(SignalRecord {
            device_name: String::new(),
            name,
            direction: Direction::Output,
            signal_type,
            length,
            unit,
            minimum: minimum.and_then(|v| Value::from_f64(signal_type.to_value_type(), v)).map(|v| vec![v]),
            maximum: maximum.and_then(|v| Value::from_f64(signal_type.to_value_type(), v)).map(|v| vec![v]),
            rate: None,
            num_instances: 1,
            current_value: None,
        })
    }

    /// Register a signal this device consumes, with a handler invoked on
    /// every inbound update: `(signal_name, instance, values)`.
    pub fn add_input_signal(
        &mut self,
        name: impl Into<String>,
        signal_type: SignalType,
        length: usize,
        unit: Option<String>,
        minimum: Option<f64>,
        maximum: Option<f64>,
        handler: impl FnMut(&str, Option<i32>, &[Value]) + 'static,
    ) -> Result<()> {
        let name = name.into();
        self.register_signal(SignalRecord {
            device_name: String::new(),
            name: name.clone(),
            direction: Direction::Input,
            signal_type,
            length,
            unit,
            minimum: minimum.and_then(|v| Value::from_f64(signal_type.to_value_type(), v)).map(|v| vec![v]),
            maximum: maximum.and_then(|v| Value::from_f64(signal_type.to_value_type(), v)).map(|v| vec![v]),
            rate: None,
            num_instances: 1,
            current_value: None,
        })?;
        self.handlers.insert(name, Box::new(handler));
        Ok(())
    }

    /// Push a new value for an output signal, fanning it out through
    /// every `Ready` mapping sourced from it.
    pub fn update(&mut self, name: &str, values: Vec<Value>, instance: Option<i32>) -> Result<()> {
        let local = self.local_name.clone().ok_or(Error::NotRegistered)?;
        let record = self
            .db
            .get_signal(&local, name, Direction::Output)
            .ok_or_else(|| Error::UnknownSignal(name.to_string()))?;

        if values.len() != record.length || values.iter().any(|v| v.value_type() != record.signal_type.to_value_type()) {
            return Err(Error::SignalTypeMismatch {
                signal: name.to_string(),
                expected: format!("{}x{}", record.length, record.signal_type.to_value_type()),
            });
        }

        self.db.set_signal_value(&local, name, Direction::Output, values.clone());

        let samples = router::dispatch(&self.db, &local, name, &values, instance, self.evaluator.as_ref());
        for sample in samples {
            let Some(dst) = self.db.get_device(&sample.dst_device) else {
                log::debug!("device {local}: no known route to {}", sample.dst_device);
                continue;
            };
            let Ok(ip) = dst.host.parse::<IpAddr>() else {
                log::debug!("device {local}: bad host address {}", dst.host);
                continue;
            };
            self.data_transport.send_to(SocketAddr::new(ip, dst.port), &wire::encode(&sample.message))?;
        }
        Ok(())
    }

    /// Convenience for a single-element numeric signal.
    pub fn update_scalar(&mut self, name: &str, value: f64) -> Result<()> {
        let local = self.local_name.clone().ok_or(Error::NotRegistered)?;
        let record = self
            .db
            .get_signal(&local, name, Direction::Output)
            .ok_or_else(|| Error::UnknownSignal(name.to_string()))?;
        let v = Value::from_f64(record.signal_type.to_value_type(), value)
            .ok_or_else(|| Error::SignalTypeMismatch { signal: name.to_string(), expected: "numeric".into() })?;
        self.update(name, vec![v], None)
    }

    /// Propose a mapping from one or more source slots to a destination
    /// slot, with `linear` mode and no bounds. Use [`Self::map_with`] for
    /// finer control over mode/bounds/expression before proposing.
    pub fn map(&mut self, sources: &[(&str, &str)], destination: (&str, &str)) -> Result<u64> {
        self.map_with(sources, destination, Mode::Linear, BoundAction::None, BoundAction::None)
    }

    /// Propose a mapping with an explicit mode and boundary actions.
    pub fn map_with(
        &mut self,
        sources: &[(&str, &str)],
        destination: (&str, &str),
        mode: Mode,
        bound_min: BoundAction,
        bound_max: BoundAction,
    ) -> Result<u64> {
        if sources.is_empty() {
            return Err(Error::IncompatibleMapping("a mapping needs at least one source slot".into()));
        }
        let id = self.db.next_mapping_id();
        let mapping = MappingRecord {
            id,
            src_slots: sources.iter().map(|(d, s)| SlotRef { device: d.to_string(), signal: s.to_string() }).collect(),
            dst_slot: SlotRef { device: destination.0.to_string(), signal: destination.1.to_string() },
            mode,
            expression: None,
            src_min: None,
            src_max: None,
            dst_min: None,
            dst_max: None,
            bound_min,
            bound_max,
            muted: false,
            send_as_instance: false,
            scope: HashSet::new(),
            status: MappingStatus::Proposed,
        };
        self.admin.propose_mapping(&mut self.admin_transport, &self.db, mapping)?;
        Ok(id)
    }

    /// Check whether mapping `id` has reached `Ready` on this device's
    /// side of the negotiation.
    pub fn mapping_ready(&self, id: u64) -> bool {
        self.db.get_mapping(id).map(|m| m.status == MappingStatus::Ready).unwrap_or(false)
    }

    /// Release a mapping.
    pub fn unmap(&mut self, id: u64) -> Result<()> {
        self.admin.retract_mapping(&mut self.admin_transport, &self.db, id)
    }

    /// Service admin and data-plane traffic, naming and announcement
    /// timers, and liveness reaping. Returns once at least one message
    /// has been handled or `timeout_ms` has elapsed.
    pub fn poll(&mut self, timeout_ms: u64) -> Result<()> {
        let poll_start = Instant::now();
        let now_ms = self.start.elapsed().as_millis() as u64;
        self.admin.poll(now_ms, &self.db, &mut self.admin_transport)?;

        if self.local_name.is_none() {
            if let Some(name) = self.admin.local_device_name() {
                for mut signal in self.pending_signals.drain(..) {
                    signal.device_name = name.clone();
                    self.db.add_signal(signal.clone());
                    self.admin.announce_signal(&mut self.admin_transport, &signal)?;
                }
                self.local_name = Some(name);
            }
        }

        let mut handled = 0usize;
        for (_from, bytes) in self.data_transport.poll_recv()? {
            let Ok(msg) = wire::decode("", &bytes) else {
                log::debug!("device: dropping undecodable data-plane datagram");
                continue;
            };
            self.dispatch_inbound(&msg);
            handled += 1;
        }

        if handled == 0 {
            let elapsed = poll_start.elapsed();
            let budget = Duration::from_millis(timeout_ms);
            if elapsed < budget {
                std::thread::sleep(budget - elapsed);
            }
        }
        Ok(())
    }

    fn dispatch_inbound(&mut self, msg: &Message) {
        let Some(local) = self.local_name.as_deref() else { return };
        let Some(rest) = msg.path().strip_prefix('/') else { return };
        let Some((device, signal)) = rest.split_once('/') else { return };
        if device != local {
            return;
        }
        let Some(record) = self.db.get_signal(local, signal, Direction::Input) else { return };

        let positional = msg.positional();
        let (instance, values) = if positional.len() == record.length + 1 {
            match positional.first() {
                Some(Value::I32(id)) => (Some(*id), &positional[1..]),
                _ => (None, positional),
            }
        } else {
            (None, positional)
        };

        self.db.set_signal_value(local, signal, Direction::Input, values.to_vec());
        if let Some(handler) = self.handlers.get_mut(signal) {
            handler(signal, instance, values);
        }
    }

    /// Broadcast `/logout` and release this device's name.
    pub fn free(&mut self) -> Result<()> {
        self.admin.shutdown(&mut self.admin_transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    fn config(identifier: &str) -> DeviceConfig {
        DeviceConfig::builder(identifier)
            .naming_probe_window_ms(2)
            .announcement_interval_ms(10_000)
            .build()
            .unwrap()
    }

    /// Drive naming to completion. `poll`'s idle-sleep makes each call
    /// advance the wall clock by roughly `timeout_ms`, so a handful of
    /// rounds reliably cross both probe windows regardless of host speed.
    fn converge(devices: &mut [&mut Device<LoopbackTransport>]) {
        for _ in 0..6 {
            for device in devices.iter_mut() {
                device.poll(5).unwrap();
            }
        }
    }

    #[test]
    fn device_converges_and_reports_ready() {
        let hub = LoopbackTransport::new_hub();
        let data_hub = LoopbackTransport::new_hub();
        let mut device = Device::with_transports(
            config("synth"),
            LoopbackTransport::join(hub),
            LoopbackTransport::join(data_hub),
        )
        .unwrap();

        assert!(!device.ready());
        converge(&mut [&mut device]);
        assert!(device.ready());
        assert_eq!(device.name(), Some("synth.1"));
    }

    #[test]
    fn duplicate_signal_name_is_rejected() {
        let hub = LoopbackTransport::new_hub();
        let data_hub = LoopbackTransport::new_hub();
        let mut device = Device::with_transports(
            config("synth"),
            LoopbackTransport::join(hub),
            LoopbackTransport::join(data_hub),
        )
        .unwrap();

        device.add_output_signal("pitch", SignalType::F32, 1, None, None, None).unwrap();
        let err = device
            .add_output_signal("pitch", SignalType::F32, 1, None, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSignal(_)));
    }

    #[test]
    fn update_before_registration_is_rejected() {
        let hub = LoopbackTransport::new_hub();
        let data_hub = LoopbackTransport::new_hub();
        let mut device = Device::with_transports(
            config("synth"),
            LoopbackTransport::join(hub),
            LoopbackTransport::join(data_hub),
        )
        .unwrap();
        device.add_output_signal("pitch", SignalType::F32, 1, None, None, None).unwrap();
        let err = device.update_scalar("pitch", 1.0).unwrap_err();
        assert_eq!(err, Error::NotRegistered);
    }

    #[test]
    fn end_to_end_mapping_delivers_transformed_sample() {
        let admin_hub = LoopbackTransport::new_hub();
        let data_hub = LoopbackTransport::new_hub();

        let mut src = Device::with_transports(
            config("src"),
            LoopbackTransport::join(admin_hub.clone()),
            LoopbackTransport::join(data_hub.clone()),
        )
        .unwrap();
        let mut dst = Device::with_transports(
            config("dst"),
            LoopbackTransport::join(admin_hub),
            LoopbackTransport::join(data_hub),
        )
        .unwrap();

        src.add_output_signal("outsig", SignalType::F64, 1, None, Some(0.0), Some(10.0)).unwrap();

        let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let received_handle = received.clone();
        dst.add_input_signal("insig", SignalType::F64, 1, None, Some(0.0), Some(1.0), move |_, _, values| {
            received_handle.borrow_mut().push(values.to_vec());
        })
        .unwrap();

        converge(&mut [&mut src, &mut dst]);
        assert!(src.ready());
        assert!(dst.ready());

        let mapping_id = src
            .map_with(&[("src.1", "outsig")], ("dst.1", "insig"), Mode::Bypass, BoundAction::None, BoundAction::None)
            .unwrap();

        for _ in 0..6 {
            src.poll(0).unwrap();
            dst.poll(0).unwrap();
        }
        assert!(src.mapping_ready(mapping_id));

        src.update_scalar("outsig", 5.0).unwrap();
        for _ in 0..4 {
            src.poll(0).unwrap();
            dst.poll(0).unwrap();
        }

        assert_eq!(received.borrow().as_slice(), &[vec![Value::F64(5.0)]]);
    }
}
