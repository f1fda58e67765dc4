//! Platform-agnostic types for BLE weighing scales.
//!
//! This crate provides the shared data model used by the native scale
//! connection subsystem (scalelink-core) and any other consumers that
//! need to talk about scales without pulling in a Bluetooth stack.
//!
//! # Contents
//!
//! - Device identity and weight reading types
//! - The pure weight-payload decoder
//! - UUID constants for the scale's GATT service and characteristic
//!
//! # Example
//!
//! ```
//! use scalelink_types::{WeightReading, decode::decode_grams};
//!
//! let payload = [
//!     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // header
//!     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x32, // weight field: 50 g
//! ];
//! let reading = WeightReading::new(decode_grams(&payload).unwrap());
//! assert_eq!(reading.grams, 50);
//! ```

pub mod decode;
pub mod types;
pub mod uuid;

pub use decode::{DecodeError, decode_grams, decode_reading};
pub use types::{DeviceIdentity, WeightReading};
pub use uuid as uuids;
