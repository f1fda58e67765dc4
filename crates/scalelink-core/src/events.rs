//! Event system for connection and reading notifications.
//!
//! Consumers that want more than the latest-value surfaces (the weight and
//! status watches) subscribe here: every reading, state change, and retry
//! attempt is published on a broadcast bus.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::Delivery;
use scalelink_types::DeviceIdentity;

/// Events emitted by the scale connection subsystem.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ScaleEvent {
    /// A scale was selected during discovery.
    Discovered {
        /// The selected device.
        device: DeviceIdentity,
    },
    /// A session reached the active state.
    Connected {
        /// The connected device.
        device: DeviceIdentity,
        /// How payloads are being delivered.
        delivery: Delivery,
    },
    /// A session ended.
    Disconnected {
        /// The device that was connected.
        device: DeviceIdentity,
        /// Why the session ended.
        reason: DisconnectReason,
    },
    /// A payload decoded successfully.
    Reading {
        /// Decoded weight in grams.
        grams: u64,
    },
    /// The reconnection supervisor is starting another attempt.
    ReconnectStarted {
        /// The device being retried.
        device: DeviceIdentity,
        /// Attempt number (1-based).
        attempt: u32,
        /// Retry ceiling.
        max: u32,
    },
    /// Reconnection succeeded.
    ReconnectSucceeded {
        /// The reconnected device.
        device: DeviceIdentity,
        /// How many attempts it took.
        attempts: u32,
    },
    /// The supervisor gave up after its retry ceiling.
    RetriesExhausted {
        /// The device that stayed unreachable.
        device: DeviceIdentity,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// An error occurred that is surfaced to the user.
    Error {
        /// Human-readable description.
        message: String,
    },
}

/// Reason a session ended.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Deliberate disconnect requested by the user.
    UserRequested,
    /// The platform reported an unexpected disconnect.
    LinkLost,
    /// The characteristic supports neither notify nor read.
    Unsupported,
    /// A transport operation failed.
    TransportError(String),
}

/// Sender for scale events.
pub type EventSender = broadcast::Sender<ScaleEvent>;

/// Receiver for scale events.
pub type EventReceiver = broadcast::Receiver<ScaleEvent>;

/// Event dispatcher fanning events out to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: ScaleEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
