//! btleplug implementation of the transport seam.
//!
//! This is the production radio path: adapter acquisition, scanning with
//! the scale's service filter, connection with timeouts, characteristic
//! resolution, reads, notification subscription, and platform disconnect
//! events.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::future;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, WireProfile};
use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::transport::{
    CharacteristicCaps, DisconnectStream, PayloadStream, ScaleLink, ScaleTransport,
};
use scalelink_types::DeviceIdentity;

/// A scale seen during a scan, for presenting a chooser to the operator.
#[derive(Debug, Clone)]
pub struct DiscoveredScale {
    /// Identity to remember and reconnect with.
    pub identity: DeviceIdentity,
    /// Signal strength at discovery time.
    pub rssi: Option<i16>,
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Format a peripheral ID as a plain string.
///
/// On macOS peripheral IDs are UUIDs; elsewhere they wrap the address.
fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Build the stable identifier for a peripheral.
///
/// On macOS the address is 00:00:00:00:00:00, so the peripheral ID is the
/// only stable handle; on other platforms the MAC address is used.
fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == "00:00:00:00:00:00" {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether a peripheral's advertisement carries the scale service.
fn advertises_scale(properties: &btleplug::api::PeripheralProperties, profile: &WireProfile) -> bool {
    properties.services.contains(&profile.service)
        || properties.service_data.contains_key(&profile.service)
}

/// Production transport over the platform BLE stack.
#[derive(Debug, Clone)]
pub struct BtleTransport {
    adapter: Adapter,
    profile: WireProfile,
}

impl BtleTransport {
    /// Create a transport on the first available adapter, with the default
    /// wire profile.
    pub async fn new() -> Result<Self> {
        Ok(Self {
            adapter: get_adapter().await?,
            profile: WireProfile::default(),
        })
    }

    /// Create a transport on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            profile: WireProfile::default(),
        }
    }

    /// Use a non-default wire profile (other hardware revisions).
    #[must_use]
    pub fn profile(mut self, profile: WireProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Scan for scales advertising the profile's service.
    ///
    /// Returns every candidate seen within the scan window so callers can
    /// present a chooser. An empty list means no scales in range, not an
    /// error.
    #[tracing::instrument(level = "info", skip_all, fields(duration_secs = duration.as_secs()))]
    pub async fn scan_for_scales(
        &self,
        profile: &WireProfile,
        duration: Duration,
    ) -> Result<Vec<DiscoveredScale>> {
        info!("Starting BLE scan for {} seconds...", duration.as_secs());

        self.adapter
            .start_scan(ScanFilter {
                services: vec![profile.service],
            })
            .await?;
        sleep(duration).await;
        self.adapter.stop_scan().await?;

        let mut discovered = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Error reading peripheral properties: {}", e);
                    continue;
                }
            };

            if !advertises_scale(&properties, profile) {
                continue;
            }

            let id = create_identifier(&properties.address.to_string(), &peripheral.id());
            let identity = match properties.local_name.clone() {
                Some(name) => DeviceIdentity::with_name(id, name),
                None => DeviceIdentity::new(id),
            };
            info!("Found scale: {}", identity);
            discovered.push(DiscoveredScale {
                identity,
                rssi: properties.rssi,
            });
        }

        info!("Scan complete. Found {} scale(s)", discovered.len());
        Ok(discovered)
    }

    /// Search known peripherals for one matching the identity.
    async fn find_cached_peripheral(&self, identity: &DeviceIdentity) -> Result<Option<Peripheral>> {
        let wanted = identity.id.to_lowercase();

        for peripheral in self.adapter.peripherals().await? {
            if let Ok(Some(props)) = peripheral.properties().await {
                let address = props.address.to_string().to_lowercase();
                let peripheral_id = format_peripheral_id(&peripheral.id()).to_lowercase();

                if peripheral_id == wanted {
                    debug!("Matched by peripheral ID: {}", peripheral_id);
                    return Ok(Some(peripheral));
                }

                if address != "00:00:00:00:00:00"
                    && address.replace(':', "") == wanted.replace(':', "")
                {
                    debug!("Matched by address: {}", address);
                    return Ok(Some(peripheral));
                }

                if let Some(name) = &props.local_name
                    && identity.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name))
                {
                    debug!("Matched by name: {}", name);
                    return Ok(Some(peripheral));
                }
            }
        }

        Ok(None)
    }

    /// Find the peripheral for an identity, scanning if it is not cached.
    ///
    /// Advertisements can be missed on any single scan, so the cache check
    /// is followed by a filtered scan before giving up.
    async fn find_peripheral(
        &self,
        identity: &DeviceIdentity,
        profile: &WireProfile,
        scan_duration: Duration,
    ) -> Result<Peripheral> {
        if let Some(peripheral) = self.find_cached_peripheral(identity).await? {
            debug!("Found {} in adapter cache, no scan needed", identity.id);
            return Ok(peripheral);
        }

        info!("Scanning for remembered scale {}...", identity);
        self.adapter
            .start_scan(ScanFilter {
                services: vec![profile.service],
            })
            .await?;
        sleep(scan_duration).await;
        self.adapter.stop_scan().await?;

        match self.find_cached_peripheral(identity).await? {
            Some(peripheral) => Ok(peripheral),
            None => {
                warn!("Scale {} not found after scan", identity.id);
                Err(Error::device_not_found(identity.id.clone()))
            }
        }
    }
}

#[async_trait]
impl ScaleTransport for BtleTransport {
    type Link = BtleLink;

    async fn pick_device(
        &self,
        profile: &WireProfile,
        timeout: Duration,
    ) -> Result<Option<DeviceIdentity>> {
        let mut candidates = self.scan_for_scales(profile, timeout).await?;
        // Nearest scale wins: the kiosk's own scale is the strongest signal.
        candidates.sort_by_key(|c| std::cmp::Reverse(c.rssi.unwrap_or(i16::MIN)));
        Ok(candidates.into_iter().next().map(|c| c.identity))
    }

    #[tracing::instrument(level = "info", skip_all, fields(device = %identity))]
    async fn open(&self, identity: &DeviceIdentity, config: &SessionConfig) -> Result<BtleLink> {
        let peripheral = self
            .find_peripheral(identity, &self.profile, config.pick_timeout)
            .await?;

        info!("Connecting to scale...");
        timeout(config.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to scale", config.connect_timeout))??;

        info!("Connected, discovering services...");
        timeout(config.resolve_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", config.resolve_timeout))??;

        Ok(BtleLink {
            adapter: self.adapter.clone(),
            peripheral,
            characteristic: std::sync::OnceLock::new(),
            config: config.clone(),
        })
    }
}

/// One physical btleplug connection to a scale.
pub struct BtleLink {
    adapter: Adapter,
    peripheral: Peripheral,
    /// The resolved weight characteristic, cached by [`resolve`](ScaleLink::resolve).
    characteristic: std::sync::OnceLock<Characteristic>,
    config: SessionConfig,
}

impl std::fmt::Debug for BtleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleLink")
            .field("peripheral", &format_peripheral_id(&self.peripheral.id()))
            .field("resolved", &self.characteristic.get().is_some())
            .finish_non_exhaustive()
    }
}

impl BtleLink {
    fn resolved(&self) -> Result<&Characteristic> {
        self.characteristic.get().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl ScaleLink for BtleLink {
    async fn resolve(&self, profile: &WireProfile) -> Result<CharacteristicCaps> {
        let services = self.peripheral.services();
        let service_count = services.len();

        let characteristic = services
            .iter()
            .filter(|s| s.uuid == profile.service)
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == profile.weight)
            .cloned()
            .ok_or_else(|| {
                Error::characteristic_not_found(profile.weight.to_string(), service_count)
            })?;

        let caps = CharacteristicCaps {
            notify: characteristic.properties.contains(CharPropFlags::NOTIFY),
            read: characteristic.properties.contains(CharPropFlags::READ),
        };
        debug!(
            "Resolved weight characteristic {} (notify={}, read={})",
            characteristic.uuid, caps.notify, caps.read
        );

        let _ = self.characteristic.set(characteristic);
        Ok(caps)
    }

    async fn subscribe(&self) -> Result<PayloadStream> {
        let characteristic = self.resolved()?.clone();
        self.peripheral.subscribe(&characteristic).await?;

        let stream = self.peripheral.notifications().await?;
        let uuid = characteristic.uuid;
        Ok(stream
            .filter_map(move |notification| {
                future::ready((notification.uuid == uuid).then_some(notification.value))
            })
            .boxed())
    }

    async fn read_payload(&self) -> Result<Vec<u8>> {
        let characteristic = self.resolved()?;
        let data = timeout(self.config.read_timeout, self.peripheral.read(characteristic))
            .await
            .map_err(|_| Error::timeout("read weight characteristic", self.config.read_timeout))??;
        Ok(data)
    }

    async fn disconnects(&self) -> Result<DisconnectStream> {
        let id = self.peripheral.id();
        let events = self.adapter.events().await?;
        Ok(events
            .filter_map(move |event| {
                future::ready(match event {
                    CentralEvent::DeviceDisconnected(peripheral_id) if peripheral_id == id => {
                        Some(())
                    }
                    _ => None,
                })
            })
            .boxed())
    }

    async fn close(&self) -> Result<()> {
        if let Some(characteristic) = self.characteristic.get()
            && let Err(e) = self.peripheral.unsubscribe(characteristic).await
        {
            // The link may already be down; unsubscribe is best-effort.
            debug!("Unsubscribe failed during close: {}", e);
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
