//! Bluetooth UUIDs for supported scales.
//!
//! These are the defaults for the currently deployed hardware revision.
//! Other revisions expose the same protocol under different UUIDs, so the
//! connection layer takes them as configuration rather than compiling them
//! in (see the core crate's wire profile).

use uuid::{Uuid, uuid};

/// Vendor service carrying the weight characteristic.
pub const SCALE_SERVICE: Uuid = uuid!("0000fff0-0000-1000-8000-00805f9b34fb");

/// Characteristic emitting raw weight payloads.
pub const WEIGHT_CHARACTERISTIC: Uuid = uuid!("0000fff1-0000-1000-8000-00805f9b34fb");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_service_uuid() {
        let expected = "0000fff0-0000-1000-8000-00805f9b34fb";
        assert_eq!(SCALE_SERVICE.to_string(), expected);
    }

    #[test]
    fn test_weight_characteristic_uuid() {
        let expected = "0000fff1-0000-1000-8000-00805f9b34fb";
        assert_eq!(WEIGHT_CHARACTERISTIC.to_string(), expected);
    }

    #[test]
    fn test_uuids_are_distinct() {
        assert_ne!(SCALE_SERVICE, WEIGHT_CHARACTERISTIC);
    }

    #[test]
    fn test_uuids_share_base() {
        // Both are 16-bit UUIDs on the Bluetooth base, in the fff0 block.
        assert!(SCALE_SERVICE.to_string().starts_with("0000fff"));
        assert!(WEIGHT_CHARACTERISTIC.to_string().starts_with("0000fff"));
    }
}
