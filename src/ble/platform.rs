//! btleplug-backed radio transport.
//!
//! Implements [`RadioTransport`] on the host's first Bluetooth adapter.
//! Characteristic values are converted to the base64 wire form at this
//! boundary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::advertising::{Advertisement, PeripheralId};
use crate::ble::transport::{RadioTransport, ScanEvents};
use crate::error::{Error, Result};
use crate::protocol::WirePayload;

/// Radio transport over btleplug.
pub struct BtleplugTransport {
    /// The BLE adapter in use.
    adapter: Adapter,
    /// Peripherals seen while scanning, by identifier.
    peripherals: Arc<RwLock<HashMap<PeripheralId, Peripheral>>>,
    /// Disconnect notifications.
    disconnect_tx: broadcast::Sender<PeripheralId>,
    /// Task forwarding scan events.
    scan_handle: RwLock<Option<JoinHandle<()>>>,
    /// Task watching adapter-level disconnects.
    monitor_handle: JoinHandle<()>,
}

impl BtleplugTransport {
    /// Open the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Self::with_adapter(adapter).await
    }

    /// Use a specific adapter.
    pub async fn with_adapter(adapter: Adapter) -> Result<Self> {
        let (disconnect_tx, _) = broadcast::channel(16);

        let mut events = adapter.events().await.map_err(Error::Bluetooth)?;
        let tx = disconnect_tx.clone();
        let monitor_handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    debug!("Device disconnected: {:?}", id);
                    let _ = tx.send(PeripheralId::new(id.to_string()));
                }
            }
            debug!("Adapter event stream ended");
        });

        Ok(Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            disconnect_tx,
            scan_handle: RwLock::new(None),
            monitor_handle,
        })
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral> {
        self.peripherals
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound {
                identifier: id.to_string(),
            })
    }

    fn characteristic(
        peripheral: &Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic> {
        let characteristics = peripheral.characteristics();

        if !characteristics.iter().any(|c| c.service_uuid == service) {
            return Err(Error::ServiceNotFound {
                uuid: service.to_string(),
            });
        }

        characteristics
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: characteristic.to_string(),
            })
    }

    /// Turn a central event into an advertisement, if it concerns a peripheral.
    async fn process_event(
        adapter: &Adapter,
        event: CentralEvent,
        peripherals: &RwLock<HashMap<PeripheralId, Peripheral>>,
    ) -> Option<Advertisement> {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => return None,
        };

        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        let id = PeripheralId::new(id.to_string());
        peripherals.write().insert(id.clone(), peripheral);

        Some(Advertisement {
            id,
            local_name: properties.local_name,
            name: None,
            rssi: properties.rssi,
        })
    }
}

#[async_trait]
impl RadioTransport for BtleplugTransport {
    async fn start_scan(&self) -> Result<ScanEvents> {
        if let Some(handle) = self.scan_handle.write().take() {
            debug!("Replacing running scan");
            handle.abort();
        }

        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| Error::ScanFailed {
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(64);
        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Some(adv) = Self::process_event(&adapter, event, &peripherals).await {
                    if tx.send(Ok(adv)).await.is_err() {
                        break;
                    }
                }
            }
            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<()> {
        let handle = self.scan_handle.write().take();
        let forwarding = handle.is_some();
        if let Some(handle) = handle {
            handle.abort();
        }

        // The radio may be scanning even without a forwarding task, if
        // start_scan was cancelled before it stored its handle.
        match self.adapter.stop_scan().await {
            Ok(()) => Ok(()),
            Err(e) if !forwarding => {
                debug!("Stop scan with no scan running: {}", e);
                Ok(())
            }
            Err(e) => Err(Error::Bluetooth(e)),
        }
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.peripheral(id)?;

        if peripheral.is_connected().await.unwrap_or(false) {
            info!("Peripheral already connected at BLE level");
            return Ok(());
        }

        peripheral.connect().await.map_err(|e| Error::ConnectionFailed {
            reason: e.to_string(),
        })?;

        info!("Successfully connected to {}", id);
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.peripheral(id)?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| Error::ServiceDiscoveryFailed {
                reason: e.to_string(),
            })?;

        for characteristic in peripheral.characteristics() {
            debug!(
                "Found characteristic: {} in service {}",
                characteristic.uuid, characteristic.service_uuid
            );
        }

        Ok(())
    }

    async fn read_characteristic(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<WirePayload> {
        let peripheral = self.peripheral(id)?;
        let characteristic = Self::characteristic(&peripheral, service, characteristic)?;

        let data = peripheral
            .read(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        trace!(
            "Read {} bytes from characteristic {}",
            data.len(),
            characteristic.uuid
        );

        Ok(WirePayload::from_bytes(&data))
    }

    async fn write_characteristic(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        payload: &WirePayload,
    ) -> Result<()> {
        let peripheral = self.peripheral(id)?;
        let characteristic = Self::characteristic(&peripheral, service, characteristic)?;
        let data = payload.decode()?;

        peripheral
            .write(&characteristic, &data, WriteType::WithResponse)
            .await
            .map_err(Error::Bluetooth)?;

        trace!(
            "Wrote {} bytes to characteristic {}",
            data.len(),
            characteristic.uuid
        );

        Ok(())
    }

    fn disconnections(&self) -> broadcast::Receiver<PeripheralId> {
        self.disconnect_tx.subscribe()
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.peripheral(id)?;

        match peripheral.disconnect().await {
            Ok(()) => {
                info!("Successfully disconnected from {}", id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.scan_handle.write().take() {
            warn!("Transport dropped while scanning");
            handle.abort();
        }
        self.monitor_handle.abort();
    }
}
