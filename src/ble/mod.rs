//! BLE communication module.
//!
//! This module provides the radio-facing pieces of the engine: the
//! transport capability, its btleplug implementation, peripheral
//! discovery and the connection lifecycle types.

pub mod advertising;
pub mod connection;
pub mod platform;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use advertising::{Advertisement, PeripheralHandle, PeripheralId};
pub use connection::{Connection, LifecycleState, SessionId};
pub use platform::BtleplugTransport;
pub use scanner::{discover, PeripheralDiscovery};
pub use transport::{RadioTransport, ScanEvents};
pub use uuids::*;
