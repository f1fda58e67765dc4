//! Error types for scalelink-core.
//!
//! # Recovery policy
//!
//! Failures fall into three buckets, and the subsystem treats them very
//! differently:
//!
//! | Error | Handling |
//! |-------|----------|
//! | [`Error::DiscoveryCancelled`] | Not an error: return quietly to idle |
//! | [`Error::Unsupported`] | Terminal for this device, surfaced, no retry |
//! | [`Error::Decode`] | Logged and dropped, the session stays active |
//! | transport / connect failures | Reconnection supervisor, if a device is remembered |
//! | [`Error::LinkLost`] | Always the reconnection supervisor |
//!
//! Decode failures never bubble past the session; transport and link
//! failures are recovered automatically up to the retry ceiling, after
//! which they become a user-visible terminal status requiring a manual
//! `connect()`.

use std::time::Duration;

use thiserror::Error;

use scalelink_types::DecodeError;

/// Errors that can occur when communicating with a scale.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error
/// variants in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// The user declined device selection. Not a failure; callers return
    /// to idle without surfacing anything.
    #[error("device selection cancelled")]
    DiscoveryCancelled,

    /// The weight characteristic supports neither notifications nor reads.
    /// Terminal for this device; retrying cannot help.
    #[error("characteristic {uuid} supports neither notify nor read")]
    Unsupported {
        /// The characteristic UUID that was probed.
        uuid: String,
    },

    /// Required characteristic not found on the device.
    #[error("characteristic not found: {uuid} (searched {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Connection failed with a specific reason.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// The platform reported an unexpected mid-session disconnect.
    #[error("link to scale lost")]
    LinkLost,

    /// Operation attempted while not connected.
    #[error("not connected to scale")]
    NotConnected,

    /// Operation timed out.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The reconnection supervisor gave up after its retry ceiling.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A payload could not be decoded into a weight.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Device is out of range.
    OutOfRange,
    /// Device rejected the connection.
    Rejected,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified identifier not found.
    NotFound {
        /// The identifier that was searched for.
        identifier: String,
    },
    /// Scan timed out before finding the device.
    ScanTimeout {
        /// How long the scan ran.
        duration: Duration,
    },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::ScanTimeout { duration } => write!(f, "scan timed out after {:?}", duration),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create an unsupported-characteristic error.
    pub fn unsupported(uuid: impl Into<String>) -> Self {
        Self::Unsupported { uuid: uuid.into() }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the reconnection supervisor may recover from this error.
    ///
    /// Transport-level failures are worth retrying against the same
    /// identity; protocol and configuration failures are not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Bluetooth(_)
                | Self::DeviceNotFound(_)
                | Self::ConnectionFailed { .. }
                | Self::LinkLost
                | Self::NotConnected
                | Self::Timeout { .. }
                | Self::Io(_)
        )
    }
}

/// Result type alias using scalelink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB:CC:DD:EE:FF");
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "not connected to scale");

        let err = Error::unsupported("0000fff1-0000-1000-8000-00805f9b34fb");
        assert!(err.to_string().contains("neither notify nor read"));

        let err = Error::timeout("connect to scale", Duration::from_secs(15));
        assert!(err.to_string().contains("connect to scale"));
        assert!(err.to_string().contains("15s"));

        let err = Error::RetriesExhausted { attempts: 10 };
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_connection_failure_reasons() {
        let err = Error::connection_failed(
            Some("AA:BB".to_string()),
            ConnectionFailureReason::OutOfRange,
        );
        assert!(err.to_string().contains("out of range"));

        let err = Error::connection_failed(None, ConnectionFailureReason::AdapterUnavailable);
        assert!(err.to_string().contains("adapter unavailable"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::LinkLost.is_recoverable());
        assert!(Error::NotConnected.is_recoverable());
        assert!(Error::timeout("connect", Duration::from_secs(1)).is_recoverable());
        assert!(
            Error::connection_failed(None, ConnectionFailureReason::OutOfRange).is_recoverable()
        );

        assert!(!Error::unsupported("fff1").is_recoverable());
        assert!(!Error::DiscoveryCancelled.is_recoverable());
        assert!(!Error::invalid_config("bad").is_recoverable());
        let decode: Error = scalelink_types::DecodeError::TooShort {
            expected: 15,
            actual: 3,
        }
        .into();
        assert!(!decode.is_recoverable());
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: Error = scalelink_types::DecodeError::TooShort {
            expected: 15,
            actual: 7,
        }
        .into();
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }
}
