//! Trait seam over the platform BLE stack.
//!
//! The session and facade layers depend only on this capability set:
//! discovery with a service filter, connect, characteristic resolution,
//! read, notification subscription, and a disconnect-event stream. Never
//! on a concrete Bluetooth API. [`crate::btle`] implements the seam over
//! btleplug; [`crate::mock`] implements it in-memory for tests.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{SessionConfig, WireProfile};
use crate::error::Result;
use scalelink_types::DeviceIdentity;

/// Capabilities of the weight characteristic on a particular device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicCaps {
    /// The characteristic supports push notifications.
    pub notify: bool,
    /// The characteristic supports on-demand reads.
    pub read: bool,
}

impl CharacteristicCaps {
    /// Whether the device can deliver payloads at all.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.notify || self.read
    }
}

/// Stream of raw payloads pushed by the device.
pub type PayloadStream = BoxStream<'static, Vec<u8>>;

/// Stream yielding once per platform-reported disconnect of this link.
pub type DisconnectStream = BoxStream<'static, ()>;

/// A radio transport that can discover scales and open links to them.
#[async_trait]
pub trait ScaleTransport: Send + Sync + 'static {
    /// The link type this transport produces.
    type Link: ScaleLink;

    /// Interactive discovery: scan with the profile's service filter and
    /// return the selected device.
    ///
    /// `Ok(None)` means nothing was chosen (the user declined, or no scale
    /// advertised within the scan window); callers treat it as a
    /// cancelled selection, not an error.
    async fn pick_device(
        &self,
        profile: &WireProfile,
        timeout: Duration,
    ) -> Result<Option<DeviceIdentity>>;

    /// Open a transport-level connection to a known identity.
    async fn open(&self, identity: &DeviceIdentity, config: &SessionConfig) -> Result<Self::Link>;
}

/// One physical connection to a scale.
///
/// Call [`resolve`](Self::resolve) before [`subscribe`](Self::subscribe)
/// or [`read_payload`](Self::read_payload); resolution locates the weight
/// characteristic and caches it for the lifetime of the link.
#[async_trait]
pub trait ScaleLink: Send + Sync + 'static {
    /// Resolve the service and weight characteristic, reporting what the
    /// characteristic supports.
    async fn resolve(&self, profile: &WireProfile) -> Result<CharacteristicCaps>;

    /// Subscribe to notifications on the weight characteristic.
    ///
    /// The returned stream ends when the link goes away.
    async fn subscribe(&self) -> Result<PayloadStream>;

    /// Read the weight characteristic once (polling fallback).
    async fn read_payload(&self) -> Result<Vec<u8>>;

    /// Stream of platform disconnect events for this link.
    async fn disconnects(&self) -> Result<DisconnectStream>;

    /// Release the subscription and close the transport connection.
    ///
    /// Also the escape hatch for a hung connect/resolve: closing the
    /// handle cancels outstanding radio operations.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_usable() {
        assert!(
            CharacteristicCaps {
                notify: true,
                read: false
            }
            .is_usable()
        );
        assert!(
            CharacteristicCaps {
                notify: false,
                read: true
            }
            .is_usable()
        );
        assert!(!CharacteristicCaps::default().is_usable());
    }
}
