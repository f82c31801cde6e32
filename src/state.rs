//! Public state surface.
//!
//! Presentation code reads [`LockSnapshot`]s through [`LockState`]. Every
//! update replaces the whole snapshot, so readers never see a half-applied
//! transition.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::ble::advertising::PeripheralHandle;
use crate::ble::connection::LifecycleState;
use crate::protocol::IndicatorColor;

/// Lifecycle phase reduced for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionPhase {
    /// Not connected, nothing in progress.
    #[default]
    Idle,
    /// Looking for the lock.
    Scanning,
    /// Connecting to the lock.
    Connecting,
    /// Connected to the lock.
    Connected,
}

impl From<LifecycleState> for ConnectionPhase {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Idle => Self::Idle,
            LifecycleState::Scanning => Self::Scanning,
            LifecycleState::Connecting => Self::Connecting,
            LifecycleState::ConnectedIdle
            | LifecycleState::Polling
            | LifecycleState::Disconnecting => Self::Connected,
        }
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LockSnapshot {
    /// Reduced lifecycle phase.
    pub phase: ConnectionPhase,
    /// Full lifecycle state.
    pub lifecycle: LifecycleState,
    /// The connected lock, if any.
    pub peripheral: Option<PeripheralHandle>,
    /// Last decoded indicator color.
    pub color: IndicatorColor,
    /// Locks found by the current scan.
    pub discovered: Vec<PeripheralHandle>,
    /// Most recent error, cleared when a new scan starts.
    pub last_error: Option<String>,
    /// Time of the last cycle that decoded a status.
    pub last_exchange_at: Option<DateTime<Utc>>,
    /// Cycles that decoded and wrote successfully on this connection.
    pub completed_cycles: u64,
    /// Cycles that failed without losing the link on this connection.
    pub failed_cycles: u64,
}

impl LockSnapshot {
    /// Check if a lock is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Connected)
    }

    /// Check if a connect attempt is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Connecting)
    }

    /// Check if scanning.
    pub fn is_scanning(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Scanning)
    }

    /// Name of the connected lock, if any.
    pub fn peripheral_name(&self) -> Option<String> {
        self.peripheral.as_ref().map(PeripheralHandle::display_name)
    }
}

/// Read-only handle on the controller's state.
#[derive(Debug, Clone)]
pub struct LockState {
    rx: watch::Receiver<LockSnapshot>,
}

impl LockState {
    pub(crate) fn new(rx: watch::Receiver<LockSnapshot>) -> Self {
        Self { rx }
    }

    /// Get the current snapshot.
    pub fn snapshot(&self) -> LockSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait until the snapshot changes, then return it.
    ///
    /// Returns `None` once the controller has stopped.
    pub async fn changed(&mut self) -> Option<LockSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`.
    ///
    /// Returns `None` if the controller stops first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&LockSnapshot) -> bool,
    ) -> Option<LockSnapshot> {
        self.rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}
