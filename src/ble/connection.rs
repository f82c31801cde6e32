//! Connection lifecycle types.
//!
//! The lifecycle state is owned by the supervisor; a [`Connection`] is the
//! context handle every connection-scoped task receives instead of sharing
//! mutable state with the supervisor.

use crate::ble::advertising::{PeripheralHandle, PeripheralId};

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LifecycleState {
    /// Nothing in progress.
    #[default]
    Idle,
    /// Scanning for the lock.
    Scanning,
    /// Connect primitive in flight.
    Connecting,
    /// Link established, services not yet discovered.
    ConnectedIdle,
    /// Exchange cycles are running.
    Polling,
    /// Explicit disconnect in progress.
    Disconnecting,
}

impl LifecycleState {
    /// Check whether a [`Connection`] exists in this state.
    pub fn has_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectedIdle | Self::Polling | Self::Disconnecting
        )
    }

    /// Check if nothing is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::ConnectedIdle => write!(f, "Connected"),
            Self::Polling => write!(f, "Polling"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Identifies one scan, or one connect attempt and the connection it
/// produces.
///
/// Events tagged with a session that is no longer current are stale and
/// are dropped by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Context for one connection to the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    peripheral: PeripheralHandle,
    session: SessionId,
}

impl Connection {
    /// Create a connection context for a connect attempt.
    pub fn new(peripheral: PeripheralHandle, session: SessionId) -> Self {
        Self {
            peripheral,
            session,
        }
    }

    /// The peripheral this connection talks to.
    pub fn peripheral(&self) -> &PeripheralHandle {
        &self.peripheral
    }

    /// Shortcut for the peripheral identifier.
    pub fn id(&self) -> &PeripheralId {
        &self.peripheral.id
    }

    /// The session this connection belongs to.
    pub fn session(&self) -> SessionId {
        self.session
    }
}
