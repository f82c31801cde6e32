// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # qbike-lock-ble
//!
//! Client-side controller for the QBike Lock, a Bluetooth Low Energy bike
//! lock.
//!
//! The controller finds the lock by its advertised name, connects, and then
//! polls it: every cycle reads the lock's status characteristic, derives an
//! indicator color from the first status byte, and writes the status back
//! to the lock's command characteristic.
//!
//! ## Features
//!
//! - **Discovery**: Scan for locks named `QBike Lock`, connecting to the
//!   first match or letting the caller pick one
//! - **Polling**: Read and write back the lock status every five seconds
//! - **Indicator Color**: Blue, red, green or white derived from the status
//! - **Link Supervision**: Unexpected disconnects reset the controller
//! - **Observable State**: Whole-snapshot updates through a watch channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qbike_lock_ble::{ControllerConfig, LockController, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let controller = LockController::with_platform(ControllerConfig::default()).await?;
//!     controller.trigger_scan_and_connect().await?;
//!
//!     let mut state = controller.state();
//!     while let Some(snapshot) = state.changed().await {
//!         println!("{}: {}", snapshot.phase, snapshot.color);
//!     }
//!
//!     controller.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for state types

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod permissions;
pub mod protocol;
pub mod state;
pub mod supervisor;

// Re-exports for convenience
pub use config::{ControllerConfig, GattProfile};
pub use error::{Error, Result};
pub use permissions::{AlwaysGranted, PermissionGate, StaticPermission};
pub use state::{ConnectionPhase, LockSnapshot, LockState};
pub use supervisor::LockController;

// Re-export commonly used types from submodules
pub use ble::{
    BtleplugTransport, LifecycleState, PeripheralHandle, PeripheralId, RadioTransport,
};
pub use protocol::{IndicatorColor, WirePayload};
