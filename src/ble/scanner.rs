//! Peripheral discovery.
//!
//! Filters a scan down to advertisements from the lock, yielding each
//! matching peripheral once per scan session.

use std::collections::HashSet;

use tracing::{debug, info, trace, warn};

use crate::ble::advertising::{Advertisement, PeripheralHandle, PeripheralId};
use crate::ble::transport::{RadioTransport, ScanEvents};
use crate::error::{Error, Result};

/// Start a scan and filter it for peripherals advertising `name`.
///
/// The returned discovery is unbounded. The caller stops the scan through
/// the transport, either on the first match or on cancellation.
pub async fn discover(transport: &dyn RadioTransport, name: &str) -> Result<PeripheralDiscovery> {
    info!("Starting BLE scan for {:?}", name);

    let events = transport.start_scan().await.map_err(|e| match e {
        Error::ScanFailed { .. } => e,
        other => Error::ScanFailed {
            reason: other.to_string(),
        },
    })?;

    Ok(PeripheralDiscovery::new(events, name))
}

/// A filtered, deduplicated view of one scan session.
pub struct PeripheralDiscovery {
    /// Raw scan events.
    events: ScanEvents,
    /// Advertised name to match.
    target_name: String,
    /// Peripherals already yielded in this session.
    seen: HashSet<PeripheralId>,
    /// Set once the scan has reported an error or closed.
    finished: bool,
}

impl PeripheralDiscovery {
    /// Wrap the event stream of a started scan.
    pub fn new(events: ScanEvents, target_name: impl Into<String>) -> Self {
        Self {
            events,
            target_name: target_name.into(),
            seen: HashSet::new(),
            finished: false,
        }
    }

    /// Wait for the next matching peripheral.
    ///
    /// Returns `None` once the scan has ended. A scan error is returned
    /// once and ends the discovery.
    pub async fn next(&mut self) -> Option<Result<PeripheralHandle>> {
        if self.finished {
            return None;
        }

        while let Some(event) = self.events.recv().await {
            match event {
                Ok(adv) => {
                    if let Some(handle) = self.accept(&adv) {
                        return Some(Ok(handle));
                    }
                }
                Err(e) => {
                    warn!("Scan error: {}", e);
                    self.finished = true;
                    return Some(Err(match e {
                        Error::ScanFailed { .. } => e,
                        other => Error::ScanFailed {
                            reason: other.to_string(),
                        },
                    }));
                }
            }
        }

        debug!("Scan event stream closed");
        self.finished = true;
        None
    }

    /// Apply the name filter and session dedup to one advertisement.
    pub fn accept(&mut self, adv: &Advertisement) -> Option<PeripheralHandle> {
        if !adv.matches_name(&self.target_name) {
            trace!("Ignoring advertisement from {}", adv.id);
            return None;
        }

        if !self.seen.insert(adv.id.clone()) {
            trace!("Duplicate advertisement from {}", adv.id);
            return None;
        }

        info!("Found {}: {}", self.target_name, adv.id);
        Some(PeripheralHandle::from(adv))
    }

    /// Number of distinct matches yielded so far.
    pub fn match_count(&self) -> usize {
        self.seen.len()
    }
}
