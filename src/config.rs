// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device construction configuration, with a fluent builder and documented
//! defaults.

use crate::error::{Error, Result};

/// Default admin-bus multicast group.
pub const DEFAULT_MULTICAST_GROUP: &str = "224.0.1.3";
/// Default admin-bus UDP port.
pub const DEFAULT_ADMIN_PORT: u16 = 7570;
/// Default periodic announcement interval, before jitter.
pub const DEFAULT_ANNOUNCE_INTERVAL_MS: u64 = 5_000;
/// Default naming/port probe quiescent window.
pub const DEFAULT_PROBE_WINDOW_MS: u64 = 500;
/// Default bounded retry budget for naming/port probes.
pub const DEFAULT_PROBE_RETRIES: u32 = 8;
/// Default window to wait for a `/mapped` ack before reverting a modify.
pub const DEFAULT_MAPPING_ACK_TIMEOUT_MS: u64 = 5_000;

/// Immutable configuration for a [`crate::Device`], produced by
/// [`DeviceConfigBuilder`].
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub(crate) identifier: String,
    pub(crate) preferred_admin_port: Option<u16>,
    pub(crate) preferred_data_port: Option<u16>,
    pub(crate) multicast_group: String,
    pub(crate) announcement_interval_ms: u64,
    pub(crate) liveness_timeout_ms: u64,
    pub(crate) naming_probe_window_ms: u64,
    pub(crate) port_probe_window_ms: u64,
    pub(crate) probe_retries: u32,
    pub(crate) mapping_ack_timeout_ms: u64,
}

impl DeviceConfig {
    /// Start building a configuration for a device named `identifier`
    /// (the ordinal suffix is assigned later, during naming).
    pub fn builder(identifier: impl Into<String>) -> DeviceConfigBuilder {
        DeviceConfigBuilder::new(identifier)
    }

    /// The base identifier this device will probe an ordinal for.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The multicast group carrying admin-bus traffic.
    pub fn multicast_group(&self) -> &str {
        &self.multicast_group
    }

    /// Liveness window: a mirror silent longer than this is reaped.
    pub fn liveness_timeout_ms(&self) -> u64 {
        self.liveness_timeout_ms
    }

    /// Requested admin-bus port, if the host didn't accept the default.
    pub fn preferred_admin_port(&self) -> Option<u16> {
        self.preferred_admin_port
    }

    /// Requested data-plane port, if the host didn't accept the probe.
    pub fn preferred_data_port(&self) -> Option<u16> {
        self.preferred_data_port
    }

    /// Periodic `/device` announcement interval, before jitter.
    pub fn announcement_interval_ms(&self) -> u64 {
        self.announcement_interval_ms
    }

    /// Quiet window a naming probe waits for a collision before advancing.
    pub fn naming_probe_window_ms(&self) -> u64 {
        self.naming_probe_window_ms
    }

    /// Quiet window a port probe waits for a collision before advancing.
    pub fn port_probe_window_ms(&self) -> u64 {
        self.port_probe_window_ms
    }

    /// Bounded retry budget shared by the port and naming probes.
    pub fn probe_retries(&self) -> u32 {
        self.probe_retries
    }

    /// Window to wait for a fresh `/mapped` ack before reverting a modify.
    pub fn mapping_ack_timeout_ms(&self) -> u64 {
        self.mapping_ack_timeout_ms
    }
}

/// Fluent builder for [`DeviceConfig`], validated at [`Self::build`].
pub struct DeviceConfigBuilder {
    identifier: String,
    preferred_admin_port: Option<u16>,
    preferred_data_port: Option<u16>,
    multicast_group: String,
    announcement_interval_ms: u64,
    liveness_timeout_ms: Option<u64>,
    naming_probe_window_ms: u64,
    port_probe_window_ms: u64,
    probe_retries: u32,
    mapping_ack_timeout_ms: u64,
}

impl DeviceConfigBuilder {
    fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            preferred_admin_port: None,
            preferred_data_port: None,
            multicast_group: DEFAULT_MULTICAST_GROUP.to_string(),
            announcement_interval_ms: DEFAULT_ANNOUNCE_INTERVAL_MS,
            liveness_timeout_ms: None,
            naming_probe_window_ms: DEFAULT_PROBE_WINDOW_MS,
            port_probe_window_ms: DEFAULT_PROBE_WINDOW_MS,
            probe_retries: DEFAULT_PROBE_RETRIES,
            mapping_ack_timeout_ms: DEFAULT_MAPPING_ACK_TIMEOUT_MS,
        }
    }

    /// Request a specific admin-bus port rather than the default.
    pub fn admin_port(mut self, port: u16) -> Self {
        self.preferred_admin_port = Some(port);
        self
    }

    /// Request a specific data-plane port rather than letting the port
    /// probe pick one.
    pub fn data_port(mut self, port: u16) -> Self {
        self.preferred_data_port = Some(port);
        self
    }

    /// Override the admin-bus multicast group (default `224.0.1.3`).
    pub fn multicast_group(mut self, group: impl Into<String>) -> Self {
        self.multicast_group = group.into();
        self
    }

    /// Override the periodic announcement interval in milliseconds
    /// (default 5000, ±10% jitter applied at send time).
    pub fn announcement_interval_ms(mut self, ms: u64) -> Self {
        self.announcement_interval_ms = ms;
        self
    }

    /// Override the liveness timeout (default: 3x the announcement
    /// interval, i.e. three missed announcements).
    pub fn liveness_timeout_ms(mut self, ms: u64) -> Self {
        self.liveness_timeout_ms = Some(ms);
        self
    }

    /// Override the window to wait for a fresh `/mapped` ack on a
    /// mapping modification before reverting (default 5000ms).
    pub fn mapping_ack_timeout_ms(mut self, ms: u64) -> Self {
        self.mapping_ack_timeout_ms = ms;
        self
    }

    /// Override the naming probe's quiet window (default 500ms).
    pub fn naming_probe_window_ms(mut self, ms: u64) -> Self {
        self.naming_probe_window_ms = ms;
        self
    }

    /// Override the port probe's quiet window (default 500ms).
    pub fn port_probe_window_ms(mut self, ms: u64) -> Self {
        self.port_probe_window_ms = ms;
        self
    }

    /// Override the bounded retry budget shared by the port and naming
    /// probes (default 8).
    pub fn probe_retries(mut self, retries: u32) -> Self {
        self.probe_retries = retries;
        self
    }

    /// Validate and produce the immutable [`DeviceConfig`].
    pub fn build(self) -> Result<DeviceConfig> {
        if self.identifier.is_empty() {
            return Err(Error::InvalidConfig("identifier must not be empty".into()));
        }
        if self.identifier.contains('.') || self.identifier.contains('/') {
            return Err(Error::InvalidConfig(
                "identifier must not contain '.' or '/'".into(),
            ));
        }
        if self.multicast_group.parse::<std::net::Ipv4Addr>().is_err() {
            return Err(Error::InvalidConfig(format!(
                "multicast_group '{}' is not a valid IPv4 address",
                self.multicast_group
            )));
        }
        if self.announcement_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "announcement_interval_ms must be > 0".into(),
            ));
        }

        let liveness_timeout_ms = self
            .liveness_timeout_ms
            .unwrap_or(self.announcement_interval_ms * 3);

        Ok(DeviceConfig {
            identifier: self.identifier,
            preferred_admin_port: self.preferred_admin_port,
            preferred_data_port: self.preferred_data_port,
            multicast_group: self.multicast_group,
            announcement_interval_ms: self.announcement_interval_ms,
            liveness_timeout_ms,
            naming_probe_window_ms: self.naming_probe_window_ms,
            port_probe_window_ms: self.port_probe_window_ms,
            probe_retries: self.probe_retries,
            mapping_ack_timeout_ms: self.mapping_ack_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let cfg = DeviceConfig::builder("synth").build().unwrap();
        assert_eq!(cfg.identifier(), "synth");
        assert_eq!(cfg.multicast_group(), DEFAULT_MULTICAST_GROUP);
        assert_eq!(cfg.liveness_timeout_ms(), DEFAULT_ANNOUNCE_INTERVAL_MS * 3);
    }

    #[test]
    fn rejects_empty_identifier() {
        assert!(DeviceConfig::builder("").build().is_err());
    }

    #[test]
    fn rejects_dotted_identifier() {
        assert!(DeviceConfig::builder("synth.1").build().is_err());
    }

    #[test]
    fn rejects_bad_multicast_group() {
        let err = DeviceConfig::builder("synth")
            .multicast_group("not-an-ip")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn explicit_liveness_timeout_overrides_default() {
        let cfg = DeviceConfig::builder("synth")
            .liveness_timeout_ms(1_000)
            .build()
            .unwrap();
        assert_eq!(cfg.liveness_timeout_ms(), 1_000);
    }
}
