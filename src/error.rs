//! Error types for the qbike-lock-ble crate.

use thiserror::Error;

use crate::ble::connection::LifecycleState;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The host refused the capabilities required for BLE.
    #[error("Bluetooth permissions were denied")]
    PermissionDenied,

    /// The scan could not be started or was aborted by the radio stack.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Description of why the scan failed.
        reason: String,
    },

    /// Failed to establish a connection to the lock.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Connected, but the services and characteristics could not be discovered.
    #[error("Service discovery failed: {reason}")]
    ServiceDiscoveryFailed {
        /// Description of why discovery failed.
        reason: String,
    },

    /// The connection to the lock was lost.
    #[error("Connection lost")]
    ConnectionLost,

    /// Operation requires a connection but the lock is not connected.
    #[error("Lock not connected")]
    NotConnected,

    /// A transport operation did not complete in time.
    #[error("Operation timed out")]
    Timeout,

    /// The status characteristic returned no data.
    #[error("Characteristic returned no value")]
    EmptyPayload,

    /// Invalid data was received from the lock.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// The specified peripheral is unknown to the current scan session.
    #[error("Peripheral not found: {identifier}")]
    PeripheralNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// The request conflicts with the current lifecycle state.
    #[error("Controller busy: already {state}")]
    Busy {
        /// The lifecycle state that rejected the request.
        state: LifecycleState,
    },

    /// The controller task is no longer running.
    #[error("Controller stopped")]
    ControllerStopped,

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check whether this error means the underlying link is gone.
    ///
    /// Structured variants are checked first. Platform errors that only
    /// carry a message fall back to matching on its text.
    pub fn is_link_loss(&self) -> bool {
        match self {
            Self::ConnectionLost | Self::NotConnected => true,
            Self::Bluetooth(btleplug::Error::NotConnected)
            | Self::Bluetooth(btleplug::Error::DeviceNotFound) => true,
            Self::Bluetooth(btleplug::Error::Other(_))
            | Self::Bluetooth(btleplug::Error::RuntimeError(_)) => {
                message_indicates_link_loss(&self.to_string())
            }
            _ => false,
        }
    }

    /// Check whether this error only affects a single exchange cycle.
    pub fn is_transient(&self) -> bool {
        !self.is_link_loss()
            && !matches!(
                self,
                Self::PermissionDenied | Self::BluetoothUnavailable | Self::ControllerStopped
            )
    }
}

/// Match the wording platform stacks use when a link has dropped.
pub(crate) fn message_indicates_link_loss(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("disconnected") || message.contains("not connected")
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
