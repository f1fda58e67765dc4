//! Configuration for the scale connection subsystem.
//!
//! The wire profile and all timeout values are configuration rather than
//! compile-time constants: deployed hardware revisions expose the same
//! protocol under different UUIDs, and kiosks in challenging RF spots need
//! longer timeouts.

use std::time::Duration;

use uuid::Uuid;

use crate::error::{Error, Result};
use scalelink_types::uuids;

/// Default timeout for establishing a transport connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service and characteristic resolution.
const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single characteristic read.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval for the read-polling fallback.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default scan duration for interactive device selection.
const DEFAULT_PICK_TIMEOUT: Duration = Duration::from_secs(10);

/// GATT addresses of the weight protocol on a given hardware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireProfile {
    /// Service UUID advertised by the scale.
    pub service: Uuid,
    /// Characteristic carrying raw weight payloads.
    pub weight: Uuid,
}

impl Default for WireProfile {
    fn default() -> Self {
        Self {
            service: uuids::SCALE_SERVICE,
            weight: uuids::WEIGHT_CHARACTERISTIC,
        }
    }
}

impl WireProfile {
    /// Create a profile with the default UUIDs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service UUID.
    #[must_use]
    pub fn service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }

    /// Set the weight characteristic UUID.
    #[must_use]
    pub fn weight(mut self, weight: Uuid) -> Self {
        self.weight = weight;
        self
    }
}

/// Timeouts and cadences for a single GATT session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for opening the transport connection.
    pub connect_timeout: Duration,
    /// Timeout for resolving the service and characteristic.
    pub resolve_timeout: Duration,
    /// Timeout for a single poll read.
    pub read_timeout: Duration,
    /// Interval between reads when the characteristic only supports
    /// on-demand reads (no notifications).
    pub poll_interval: Duration,
    /// Scan duration for interactive device selection.
    pub pick_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pick_timeout: DEFAULT_PICK_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Create a session config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the service/characteristic resolution timeout.
    #[must_use]
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Set the poll read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the poll interval for the read fallback.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the scan duration for interactive selection.
    #[must_use]
    pub fn pick_timeout(mut self, timeout: Duration) -> Self {
        self.pick_timeout = timeout;
        self
    }

    /// Validate the config and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be > 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::invalid_config("connect_timeout must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_profile_defaults() {
        let profile = WireProfile::default();
        assert_eq!(
            profile.service.to_string(),
            "0000fff0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            profile.weight.to_string(),
            "0000fff1-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_wire_profile_override() {
        let service = Uuid::from_u128(0xfee0);
        let weight = Uuid::from_u128(0xfee1);
        let profile = WireProfile::new().service(service).weight(weight);
        assert_eq!(profile.service, service);
        assert_eq!(profile.weight, weight);
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new()
            .connect_timeout(Duration::from_secs(25))
            .poll_interval(Duration::from_millis(250));
        assert_eq!(config.connect_timeout, Duration::from_secs(25));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_session_config_rejects_zero_poll() {
        let config = SessionConfig::new().poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
