//! Radio stack capability.
//!
//! The engine never talks to a BLE library directly. Everything it needs
//! from the radio stack goes through [`RadioTransport`], which keeps the
//! supervisor testable without hardware.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::ble::advertising::{Advertisement, PeripheralId};
use crate::error::Result;
use crate::protocol::WirePayload;

/// Advertisements produced by a running scan.
///
/// An `Err` item reports a scan failure; the scan produces nothing after it.
pub type ScanEvents = mpsc::Receiver<Result<Advertisement>>;

/// Primitives the engine consumes from the BLE radio stack.
#[async_trait]
pub trait RadioTransport: Send + Sync {
    /// Start scanning without a service filter.
    async fn start_scan(&self) -> Result<ScanEvents>;

    /// Stop the running scan. Stopping an idle scanner is not an error.
    async fn stop_scan(&self) -> Result<()>;

    /// Establish a link to a peripheral.
    async fn connect(&self, id: &PeripheralId) -> Result<()>;

    /// Discover services and characteristics on a connected peripheral.
    async fn discover_services(&self, id: &PeripheralId) -> Result<()>;

    /// Read a characteristic value.
    async fn read_characteristic(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<WirePayload>;

    /// Write a characteristic value, waiting for the peripheral's response.
    async fn write_characteristic(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        payload: &WirePayload,
    ) -> Result<()>;

    /// Subscribe to disconnect notifications for all peripherals.
    ///
    /// The subscription is active as soon as this returns.
    fn disconnections(&self) -> broadcast::Receiver<PeripheralId>;

    /// Tear down the link to a peripheral.
    async fn disconnect(&self, id: &PeripheralId) -> Result<()>;
}
