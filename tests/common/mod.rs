//! Scripted in-memory radio for driving the controller without hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use qbike_lock_ble::ble::{Advertisement, ScanEvents};
use qbike_lock_ble::{
    ControllerConfig, Error, LockController, PeripheralId, RadioTransport, Result,
    StaticPermission, WirePayload,
};

/// Status byte `B`.
pub const BLUE: &str = "Qg==";
/// Status byte `R`.
pub const RED: &str = "Ug==";
/// Status byte `G`.
pub const GREEN: &str = "Rw==";

/// One scripted read result.
#[derive(Debug, Clone)]
pub enum ReadStep {
    Payload(&'static str),
    Transient,
    LinkLost,
}

#[derive(Debug, Default)]
struct Radio {
    reads: VecDeque<ReadStep>,
    fallback: Option<&'static str>,
    read_count: usize,
    writes: Vec<(Uuid, WirePayload)>,
    connects: Vec<PeripheralId>,
    disconnects: Vec<PeripheralId>,
    scans_started: usize,
    scans_stopped: usize,
    stop_calls: usize,
    fail_scan: bool,
    fail_write: bool,
    connect_delay: Option<Duration>,
}

/// In-memory [`RadioTransport`] with scripted reads.
pub struct FakeTransport {
    radio: Mutex<Radio>,
    scan_tx: Mutex<Option<mpsc::Sender<Result<Advertisement>>>>,
    disconnect_tx: broadcast::Sender<PeripheralId>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (disconnect_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            radio: Mutex::new(Radio::default()),
            scan_tx: Mutex::new(None),
            disconnect_tx,
        })
    }

    /// Queue read results, consumed one per cycle.
    pub fn script_reads(&self, steps: impl IntoIterator<Item = ReadStep>) {
        self.radio.lock().reads.extend(steps);
    }

    /// Payload returned once the script runs out.
    pub fn set_fallback(&self, payload: &'static str) {
        self.radio.lock().fallback = Some(payload);
    }

    pub fn fail_scan(&self) {
        self.radio.lock().fail_scan = true;
    }

    pub fn fail_writes(&self) {
        self.radio.lock().fail_write = true;
    }

    pub fn delay_connect(&self, delay: Duration) {
        self.radio.lock().connect_delay = Some(delay);
    }

    /// Deliver an advertisement to the running scan.
    pub fn advertise(&self, id: &str, name: &str) {
        let tx = self.scan_tx.lock().clone();
        let tx = tx.expect("no scan running");
        tx.try_send(Ok(Advertisement::named(id, name)))
            .expect("scan channel full");
    }

    /// Close the running scan's stream, as a radio does when its event
    /// source goes away.
    pub fn end_scan(&self) {
        self.scan_tx.lock().take();
    }

    /// Drop the link from the peripheral side.
    pub fn drop_link(&self, id: &str) {
        let _ = self.disconnect_tx.send(PeripheralId::from(id));
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_tx.lock().is_some()
    }

    pub fn read_count(&self) -> usize {
        self.radio.lock().read_count
    }

    pub fn writes(&self) -> Vec<WirePayload> {
        self.radio
            .lock()
            .writes
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn write_targets(&self) -> Vec<Uuid> {
        self.radio.lock().writes.iter().map(|(uuid, _)| *uuid).collect()
    }

    pub fn connects(&self) -> Vec<PeripheralId> {
        self.radio.lock().connects.clone()
    }

    pub fn disconnects(&self) -> Vec<PeripheralId> {
        self.radio.lock().disconnects.clone()
    }

    pub fn scans_started(&self) -> usize {
        self.radio.lock().scans_started
    }

    pub fn scans_stopped(&self) -> usize {
        self.radio.lock().scans_stopped
    }

    /// Every call to `stop_scan`, whether or not a scan was live.
    pub fn stop_calls(&self) -> usize {
        self.radio.lock().stop_calls
    }
}

#[async_trait]
impl RadioTransport for FakeTransport {
    async fn start_scan(&self) -> Result<ScanEvents> {
        {
            let mut radio = self.radio.lock();
            if radio.fail_scan {
                return Err(Error::ScanFailed {
                    reason: "adapter powered off".to_string(),
                });
            }
            radio.scans_started += 1;
        }

        let (tx, rx) = mpsc::channel(64);
        *self.scan_tx.lock() = Some(tx);
        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.radio.lock().stop_calls += 1;
        if self.scan_tx.lock().take().is_some() {
            self.radio.lock().scans_stopped += 1;
        }
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let delay = {
            let mut radio = self.radio.lock();
            radio.connects.push(id.clone());
            radio.connect_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn discover_services(&self, _id: &PeripheralId) -> Result<()> {
        Ok(())
    }

    async fn read_characteristic(
        &self,
        _id: &PeripheralId,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> Result<WirePayload> {
        let mut radio = self.radio.lock();
        radio.read_count += 1;

        let step = match radio.reads.pop_front() {
            Some(step) => step,
            None => ReadStep::Payload(radio.fallback.unwrap_or("")),
        };

        match step {
            ReadStep::Payload(encoded) => Ok(WirePayload::new(encoded)),
            ReadStep::Transient => Err(Error::Timeout),
            ReadStep::LinkLost => Err(Error::ConnectionLost),
        }
    }

    async fn write_characteristic(
        &self,
        _id: &PeripheralId,
        _service: Uuid,
        characteristic: Uuid,
        payload: &WirePayload,
    ) -> Result<()> {
        let mut radio = self.radio.lock();
        if radio.fail_write {
            return Err(Error::Internal("write rejected".to_string()));
        }
        radio.writes.push((characteristic, payload.clone()));
        Ok(())
    }

    fn disconnections(&self) -> broadcast::Receiver<PeripheralId> {
        self.disconnect_tx.subscribe()
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        self.radio.lock().disconnects.push(id.clone());
        let _ = self.disconnect_tx.send(id.clone());
        Ok(())
    }
}

/// Controller over `transport` with permission granted.
pub fn controller(transport: &Arc<FakeTransport>, config: ControllerConfig) -> LockController {
    LockController::new(
        transport.clone(),
        Arc::new(StaticPermission(true)),
        config,
    )
}

/// Let spawned tasks run until the runtime is idle.
///
/// Relies on a paused clock: time only advances once nothing is runnable.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
