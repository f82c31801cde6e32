//! Controller configuration.

use std::time::Duration;

use uuid::Uuid;

use crate::ble::uuids::{
    DATA_SERVICE_UUID, LOCK_DEVICE_NAME, READ_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID,
};

/// The GATT layout used for the exchange cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GattProfile {
    /// Service holding both characteristics.
    pub service: Uuid,
    /// Characteristic the status is read from.
    pub read_characteristic: Uuid,
    /// Characteristic the command is written to.
    pub write_characteristic: Uuid,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            service: DATA_SERVICE_UUID,
            read_characteristic: READ_CHARACTERISTIC_UUID,
            write_characteristic: WRITE_CHARACTERISTIC_UUID,
        }
    }
}

/// Configuration for [`LockController`](crate::LockController).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerConfig {
    /// Advertised name to connect to.
    pub device_name: String,
    /// Period of the exchange cycle.
    pub poll_interval: Duration,
    /// Deadline for the connect primitive. `None` leaves it to the transport.
    pub connect_timeout: Option<Duration>,
    /// Connect to the first match instead of waiting for [`connect_to`](crate::LockController::connect_to).
    pub auto_connect: bool,
    /// Service and characteristic identifiers.
    pub profile: GattProfile,
}

impl ControllerConfig {
    /// Default exchange cycle period.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Default connect deadline.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Set the advertised name to connect to.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the exchange cycle period.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set or clear the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Choose between auto-connect and manual selection.
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Use a different GATT layout.
    pub fn with_profile(mut self, profile: GattProfile) -> Self {
        self.profile = profile;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_name: LOCK_DEVICE_NAME.to_string(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            connect_timeout: Some(Self::DEFAULT_CONNECT_TIMEOUT),
            auto_connect: true,
            profile: GattProfile::default(),
        }
    }
}
