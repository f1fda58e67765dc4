//! Core types for scale identity and readings.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of a physical scale, captured from a discovery result.
///
/// The `id` is an opaque platform identifier (a MAC address on Linux and
/// Windows, a CoreBluetooth UUID on macOS) and is the key used to target
/// the same device across sessions. The identity is immutable once
/// captured; renaming a scale produces a new identity on the next pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// Opaque platform identifier for the device.
    pub id: String,
    /// Advertised device name, if the scale broadcast one.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
}

impl DeviceIdentity {
    /// Create an identity without a display name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Create an identity with a display name.
    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    /// Human-readable label: the advertised name when known, the raw
    /// identifier otherwise.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A single decoded weight sample.
///
/// Derived solely from the most recent valid payload; the subsystem keeps
/// no history (consumers may buffer readings themselves).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightReading {
    /// Net weight on the platter, in grams.
    pub grams: u64,
}

impl WeightReading {
    /// Create a reading from a gram value.
    #[must_use]
    pub fn new(grams: u64) -> Self {
        Self { grams }
    }

    /// Weight in kilograms, for display purposes.
    #[must_use]
    pub fn kilograms(&self) -> f64 {
        self.grams as f64 / 1000.0
    }
}

impl fmt::Display for WeightReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} g", self.grams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_label_prefers_name() {
        let identity = DeviceIdentity::with_name("AA:BB:CC:DD:EE:FF", "Refill Scale 01");
        assert_eq!(identity.label(), "Refill Scale 01");

        let anonymous = DeviceIdentity::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(anonymous.label(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_identity_display() {
        let identity = DeviceIdentity::with_name("AA:BB", "Scale");
        assert_eq!(identity.to_string(), "Scale (AA:BB)");
        assert_eq!(DeviceIdentity::new("AA:BB").to_string(), "AA:BB");
    }

    #[test]
    fn test_reading_kilograms() {
        let reading = WeightReading::new(1250);
        assert!((reading.kilograms() - 1.25).abs() < f64::EPSILON);
        assert_eq!(reading.to_string(), "1250 g");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_identity_json_round_trip() {
        let identity = DeviceIdentity::with_name("AA:BB:CC:DD:EE:FF", "Refill Scale 01");
        let json = serde_json::to_string(&identity).unwrap();
        let back: DeviceIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(identity, back);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_identity_json_omits_absent_name() {
        let identity = DeviceIdentity::new("AA:BB");
        let json = serde_json::to_string(&identity).unwrap();
        assert!(!json.contains("name"));
    }
}
