// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # sigmesh — peer-to-peer signal-mapping middleware core
//!
//! `sigmesh` is the distributed state machine shared by every device in a
//! signal-mapping mesh: discovery and collision-resolved naming over a
//! multicast admin bus, an eventually-consistent local database of devices,
//! signals, links and mappings, and a per-device router that evaluates
//! outgoing mappings and emits transformed samples to remote peers.
//!
//! ## Quick start
//!
//! ```no_run
//! use sigmesh::{Device, DeviceConfig, Direction, SignalType};
//!
//! # fn main() -> sigmesh::Result<()> {
//! let mut device = Device::new(DeviceConfig::builder("synth").build()?)?;
//! device.add_output_signal("pitch", SignalType::F32, 1, None, Some(0.0), Some(127.0))?;
//! loop {
//!     device.poll(10)?;
//!     device.update_scalar("pitch", 64.0)?;
//!     break;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |                          Host application                        |
//! |        Device::add_*_signal / update / set_mapping / poll         |
//! +-------------------------------------------------------------------+
//! |                            Device runtime                        |
//! |   AdminBus (naming, announce, link/map negotiation, liveness)    |
//! |   Database (devices, signals, links, mappings + callbacks)       |
//! |   Router (mode transform, boundary action, instance fan-out)     |
//! +-------------------------------------------------------------------+
//! |                             Transport                            |
//! |         UdpMulticastTransport (admin bus + data plane)           |
//! +-------------------------------------------------------------------+
//! ```
//!
//! ## Modules
//!
//! - [`device`] — top-level per-process runtime, start here.
//! - [`database`] — in-memory registry of devices/signals/links/mappings.
//! - [`router`] — outgoing mapping dispatch.
//! - [`admin`] — multicast discovery, naming, and negotiation state machines.
//! - [`property`] — the closed property-key schema and message codec.
//! - [`transport`] — the pluggable message transport abstraction.
//! - [`expression`] — the pluggable expression-evaluator abstraction.

pub mod admin;
pub mod config;
pub mod database;
pub mod device;
pub mod error;
pub mod expression;
pub mod property;
pub mod router;
pub mod transport;
pub mod wire;

pub use config::{DeviceConfig, DeviceConfigBuilder};
pub use database::{
    Database, DeviceRecord, Direction, Event, LinkRecord, MappingRecord, SignalRecord, SignalType,
};
pub use device::Device;
pub use error::{Error, Result};
pub use property::{Key, Message, MessageBuilder, Value, ValueType};
pub use router::{BoundAction, Mode};
