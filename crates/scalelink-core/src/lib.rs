//! BLE connection subsystem for point-of-sale weighing scales.
//!
//! This crate discovers, pairs with, and streams readings from a BLE
//! weighing scale, decodes its binary protocol into gram values, and keeps
//! the logical connection alive across transient radio failures without
//! requiring a human to repeat the pairing gesture each time.
//!
//! # Architecture
//!
//! - [`transport`]: the capability seam over the platform BLE stack;
//!   [`btle`] implements it over btleplug, [`mock`] in memory for tests
//! - [`session`]: one state machine per connection attempt
//!   (`Idle -> Connecting -> Subscribing -> Active -> Closing`)
//! - [`supervisor`]: bounded fixed-interval reconnection after failures
//! - [`registry`]: the remembered device, one JSON record on disk
//! - [`client`]: the facade everything else talks to
//!
//! # Quick start
//!
//! ```no_run
//! use scalelink_core::{BtleTransport, ScaleClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = BtleTransport::new().await?;
//!     let client = ScaleClient::new(transport);
//!
//!     // Pair explicitly once; the pick is remembered.
//!     let status = client.connect(true).await;
//!     println!("connected: {}", status.connected);
//!
//!     // Follow the live weight.
//!     let mut weight = client.weight_watch();
//!     while weight.changed().await.is_ok() {
//!         println!("{}", *weight.borrow());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Later launches can skip the pairing gesture entirely with
//! `client.connect(false)`, which targets the remembered scale and does
//! nothing when none is remembered.

pub mod btle;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod mock;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod transport;

// Core exports
pub use btle::{BtleLink, BtleTransport, DiscoveredScale, get_adapter};
pub use client::{ClientConfig, ScaleClient, ScaleStatus};
pub use config::{SessionConfig, WireProfile};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use events::{DisconnectReason, EventReceiver, EventSender, ScaleEvent};
pub use mock::{MockTransport, MockTransportBuilder};
pub use registry::DeviceRegistry;
pub use session::{Delivery, SessionFailure, SessionState};
pub use supervisor::RetryPolicy;
pub use transport::{CharacteristicCaps, ScaleLink, ScaleTransport};

// Re-export the shared data model
pub use scalelink_types::{DecodeError, DeviceIdentity, WeightReading, decode_grams, uuids};
