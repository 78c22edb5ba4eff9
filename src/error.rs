// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error and result types shared across the crate's public surface.
//!
//! A single flat enum with a hand-written `Display` impl rather than a
//! derive macro, so every variant's message can be worded for the operator
//! reading a log line rather than for a derive template.

use std::fmt;

/// Errors that can surface from any public entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------
    /// A configuration value was out of range or contradictory.
    InvalidConfig(String),

    // ------------------------------------------------------------------
    // Naming / admin
    // ------------------------------------------------------------------
    /// The port or name probe exhausted its retry budget without
    /// converging on a collision-free candidate.
    NamingFailed(String),
    /// The device is not yet `registered`; the requested operation
    /// requires a stable ordinal name.
    NotRegistered,

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------
    /// A signal with this `(device, name, direction)` is already registered.
    DuplicateSignal(String),
    /// No signal with this name is registered on this device.
    UnknownSignal(String),
    /// The supplied value vector's length or type didn't match the signal.
    SignalTypeMismatch { signal: String, expected: String },

    // ------------------------------------------------------------------
    // Mapping / database
    // ------------------------------------------------------------------
    /// A mapping referenced a signal the database has no record of.
    UnknownMappingSignal(String),
    /// A mapping's source and destination types/lengths are incompatible
    /// with the requested mode (e.g. `bypass` across differing lengths).
    IncompatibleMapping(String),
    /// No mapping exists with this id.
    UnknownMapping(u64),

    // ------------------------------------------------------------------
    // Transport / wire
    // ------------------------------------------------------------------
    /// The underlying transport failed to bind, send, or receive.
    Transport(String),
    /// A wire message failed to decode. Inbound admin-bus traffic prefers
    /// logging a diagnostic and dropping the datagram over propagating
    /// this variant.
    Codec(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Error::NamingFailed(msg) => write!(f, "name/port allocation failed: {msg}"),
            Error::NotRegistered => write!(f, "device has not completed naming"),
            Error::DuplicateSignal(name) => write!(f, "signal already registered: {name}"),
            Error::UnknownSignal(name) => write!(f, "no such signal: {name}"),
            Error::SignalTypeMismatch { signal, expected } => {
                write!(f, "signal {signal} expected {expected}")
            }
            Error::UnknownMappingSignal(name) => {
                write!(f, "mapping references unknown signal: {name}")
            }
            Error::IncompatibleMapping(msg) => write!(f, "incompatible mapping: {msg}"),
            Error::UnknownMapping(id) => write!(f, "no mapping with id {id}"),
            Error::Transport(msg) => write!(f, "transport error: {msg}"),
            Error::Codec(msg) => write!(f, "codec error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

/// Convenience alias for this crate's public `Result`.
pub type Result<T> = std::result::Result<T, Error>;
