//! Connection lifecycle state machine.
//!
//! [`Supervisor`] is a pure transition function: it consumes requests and
//! transport events, updates its state, and returns the [`Command`]s the
//! controller must execute. It never touches the radio itself.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::ble::advertising::{PeripheralHandle, PeripheralId};
use crate::ble::connection::{Connection, LifecycleState, SessionId};
use crate::error::{Error, Result};
use crate::protocol::IndicatorColor;
use crate::state::LockSnapshot;
use crate::supervisor::exchange::CycleOutcome;

/// Something that happened on the transport side.
#[derive(Debug)]
pub enum Event {
    /// Discovery yielded a matching peripheral.
    PeripheralFound {
        /// Scan that saw the peripheral.
        scan: SessionId,
        /// The matching peripheral.
        handle: PeripheralHandle,
    },
    /// The scan failed to start, aborted or ended on its own.
    ScanFailed {
        /// Scan that failed.
        scan: SessionId,
        /// Why it failed.
        error: Error,
    },
    /// The connect primitive succeeded.
    Connected(Connection),
    /// The connect primitive failed or timed out.
    ConnectFailed {
        /// Attempt that failed.
        session: SessionId,
        /// Why it failed.
        error: Error,
    },
    /// Services and characteristics are available.
    ServicesDiscovered {
        /// Connection that finished discovery.
        session: SessionId,
    },
    /// Service discovery failed.
    ServiceDiscoveryFailed {
        /// Connection that failed discovery.
        session: SessionId,
        /// Why it failed.
        error: Error,
    },
    /// The transport reported the link as gone.
    LinkLost {
        /// Connection whose link dropped.
        session: SessionId,
    },
    /// An exchange cycle finished.
    CycleFinished {
        /// Connection the cycle ran on.
        session: SessionId,
        /// What the cycle achieved.
        outcome: CycleOutcome,
    },
    /// The disconnect primitive returned.
    DisconnectFinished {
        /// Connection that was torn down.
        session: SessionId,
        /// Result of the primitive.
        result: Result<()>,
    },
}

/// Work the controller performs on the supervisor's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start peripheral discovery, tagging its events with the scan id.
    StartScan(SessionId),
    /// Stop peripheral discovery.
    StopScan,
    /// Invoke the connect primitive.
    Connect(Connection),
    /// Discover services and characteristics.
    DiscoverServices(Connection),
    /// Register the disconnect listener for a connection.
    WatchDisconnect(Connection),
    /// Start the poll timer for a connection.
    StartPolling(Connection),
    /// Cancel the poll timer.
    CancelPolling,
    /// Drop the disconnect listener.
    UnwatchDisconnect,
    /// Invoke the disconnect primitive.
    Disconnect(Connection),
}

/// The lifecycle state machine.
#[derive(Debug)]
pub struct Supervisor {
    /// Connect to the first match during a scan.
    auto_connect: bool,
    lifecycle: LifecycleState,
    /// Scan whose events are accepted.
    scan: Option<SessionId>,
    /// Connect attempt in flight.
    attempt: Option<Connection>,
    /// Established connection.
    connection: Option<Connection>,
    color: IndicatorColor,
    discovered: Vec<PeripheralHandle>,
    next_session: u64,
    /// Whether a poll timer is running.
    polling: bool,
    /// Whether a disconnect listener is registered.
    watching: bool,
    last_error: Option<String>,
    last_exchange_at: Option<chrono::DateTime<Utc>>,
    completed_cycles: u64,
    failed_cycles: u64,
}

impl Supervisor {
    /// Create an idle supervisor.
    pub fn new(auto_connect: bool) -> Self {
        Self {
            auto_connect,
            lifecycle: LifecycleState::Idle,
            scan: None,
            attempt: None,
            connection: None,
            color: IndicatorColor::default(),
            discovered: Vec::new(),
            next_session: 0,
            polling: false,
            watching: false,
            last_error: None,
            last_exchange_at: None,
            completed_cycles: 0,
            failed_cycles: 0,
        }
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// The established connection, if any.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Last decoded indicator color.
    pub fn color(&self) -> IndicatorColor {
        self.color
    }

    /// Whether a poll timer should be running.
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Build the public snapshot of the current state.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            phase: self.lifecycle.into(),
            lifecycle: self.lifecycle,
            peripheral: self.connection.as_ref().map(|c| c.peripheral().clone()),
            color: self.color,
            discovered: self.discovered.clone(),
            last_error: self.last_error.clone(),
            last_exchange_at: self.last_exchange_at,
            completed_cycles: self.completed_cycles,
            failed_cycles: self.failed_cycles,
        }
    }

    // === Requests ===

    /// Begin discovery. Rejected unless idle.
    pub fn request_scan(&mut self) -> Result<Vec<Command>> {
        if !self.lifecycle.is_idle() {
            return Err(Error::Busy {
                state: self.lifecycle,
            });
        }

        let scan = self.next_session();
        info!("Scanning for lock (scan {})", scan);
        self.discovered.clear();
        self.last_error = None;
        self.scan = Some(scan);
        self.lifecycle = LifecycleState::Scanning;
        Ok(vec![Command::StartScan(scan)])
    }

    /// Connect to a peripheral found by the current scan.
    pub fn request_connect(&mut self, id: &PeripheralId) -> Result<Vec<Command>> {
        if self.lifecycle != LifecycleState::Scanning {
            return Err(Error::Busy {
                state: self.lifecycle,
            });
        }

        let handle = self
            .discovered
            .iter()
            .find(|h| &h.id == id)
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound {
                identifier: id.to_string(),
            })?;

        Ok(self.begin_connect(handle))
    }

    /// Stop a running scan. No-op in any other state.
    pub fn request_cancel_scan(&mut self) -> Vec<Command> {
        if self.lifecycle != LifecycleState::Scanning {
            return Vec::new();
        }

        info!("Scan cancelled");
        self.reset()
    }

    /// Disconnect, or abandon whatever is in progress.
    pub fn request_disconnect(&mut self) -> Vec<Command> {
        match self.lifecycle {
            LifecycleState::ConnectedIdle | LifecycleState::Polling => {
                let Some(connection) = self.connection.clone() else {
                    return self.reset();
                };

                info!("Disconnecting from {}", connection.id());
                let mut commands = Vec::new();
                if self.polling {
                    self.polling = false;
                    commands.push(Command::CancelPolling);
                }
                self.lifecycle = LifecycleState::Disconnecting;
                commands.push(Command::Disconnect(connection));
                commands
            }
            LifecycleState::Scanning => self.request_cancel_scan(),
            LifecycleState::Connecting => {
                info!("Abandoning connect attempt");
                self.reset()
            }
            LifecycleState::Idle | LifecycleState::Disconnecting => Vec::new(),
        }
    }

    // === Events ===

    /// Apply a transport event.
    pub fn on_event(&mut self, event: Event) -> Vec<Command> {
        match event {
            Event::PeripheralFound { scan, handle } => {
                if !self.is_current_scan(scan) {
                    debug!("Ignoring {} from stale scan {}", handle.id, scan);
                    return Vec::new();
                }
                self.on_peripheral_found(handle)
            }
            Event::ScanFailed { scan, error } => {
                if !self.is_current_scan(scan) {
                    debug!("Ignoring failure of stale scan {}: {}", scan, error);
                    return Vec::new();
                }
                warn!("Scan failed: {}", error);
                self.fail(error)
            }
            Event::Connected(connection) => self.on_connected(connection),
            Event::ConnectFailed { session, error } => {
                if !self.is_current_attempt(session) {
                    debug!("Ignoring connect failure for stale session {}", session);
                    return Vec::new();
                }
                warn!("Failed to connect: {}", error);
                self.fail(error)
            }
            Event::ServicesDiscovered { session } => self.on_services_discovered(session),
            Event::ServiceDiscoveryFailed { session, error } => {
                let Some(connection) = self.current_connection(session) else {
                    return Vec::new();
                };
                warn!("Service discovery failed: {}", error);
                let error = match error {
                    Error::ServiceDiscoveryFailed { .. } => error,
                    other => Error::ServiceDiscoveryFailed {
                        reason: other.to_string(),
                    },
                };
                let mut commands = self.fail(error);
                commands.push(Command::Disconnect(connection));
                commands
            }
            Event::LinkLost { session } => {
                if self.current_connection(session).is_none() {
                    return Vec::new();
                }
                info!("Lock disconnected");
                self.reset()
            }
            Event::CycleFinished { session, outcome } => self.on_cycle_finished(session, outcome),
            Event::DisconnectFinished { session, result } => {
                if let Err(e) = result {
                    warn!("Error disconnecting: {}", e);
                }
                if self.current_connection(session).is_none() {
                    return Vec::new();
                }
                info!("Disconnected");
                self.reset()
            }
        }
    }

    /// Return to idle, releasing everything tied to the connection.
    ///
    /// Every terminal path goes through here. Calling it again is a no-op
    /// that returns no commands.
    pub fn reset(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();

        if self.polling {
            self.polling = false;
            commands.push(Command::CancelPolling);
        }
        if self.watching {
            self.watching = false;
            commands.push(Command::UnwatchDisconnect);
        }
        if self.lifecycle == LifecycleState::Scanning {
            commands.push(Command::StopScan);
        }

        if !self.lifecycle.is_idle() {
            debug!("Resetting from {}", self.lifecycle);
        }

        self.scan = None;
        self.attempt = None;
        self.connection = None;
        self.color = IndicatorColor::default();
        self.lifecycle = LifecycleState::Idle;
        commands
    }

    // === Internal ===

    fn fail(&mut self, error: Error) -> Vec<Command> {
        self.last_error = Some(error.to_string());
        self.reset()
    }

    fn next_session(&mut self) -> SessionId {
        self.next_session += 1;
        SessionId(self.next_session)
    }

    fn begin_connect(&mut self, handle: PeripheralHandle) -> Vec<Command> {
        let attempt = Connection::new(handle, self.next_session());
        info!(
            "Connecting to {} (session {})",
            attempt.peripheral().display_name(),
            attempt.session()
        );

        self.scan = None;
        self.lifecycle = LifecycleState::Connecting;
        self.attempt = Some(attempt.clone());
        vec![Command::StopScan, Command::Connect(attempt)]
    }

    fn on_peripheral_found(&mut self, handle: PeripheralHandle) -> Vec<Command> {
        if self.discovered.iter().any(|h| h.id == handle.id) {
            return Vec::new();
        }

        self.discovered.push(handle.clone());

        if self.auto_connect {
            self.begin_connect(handle)
        } else {
            Vec::new()
        }
    }

    fn on_connected(&mut self, connection: Connection) -> Vec<Command> {
        if !self.is_current_attempt(connection.session()) {
            warn!(
                "Connect for session {} completed after it was abandoned",
                connection.session()
            );
            return vec![Command::Disconnect(connection)];
        }

        info!("Connected to {}", connection.peripheral().display_name());
        self.attempt = None;
        self.connection = Some(connection.clone());
        self.completed_cycles = 0;
        self.failed_cycles = 0;
        self.last_exchange_at = None;
        self.lifecycle = LifecycleState::ConnectedIdle;
        vec![Command::DiscoverServices(connection)]
    }

    fn on_services_discovered(&mut self, session: SessionId) -> Vec<Command> {
        if self.lifecycle != LifecycleState::ConnectedIdle {
            return Vec::new();
        }
        let Some(connection) = self.current_connection(session) else {
            return Vec::new();
        };

        debug!("Services discovered for session {}", session);
        self.watching = true;
        self.polling = true;
        self.lifecycle = LifecycleState::Polling;
        vec![
            Command::WatchDisconnect(connection.clone()),
            Command::StartPolling(connection),
        ]
    }

    fn on_cycle_finished(&mut self, session: SessionId, outcome: CycleOutcome) -> Vec<Command> {
        if self.lifecycle != LifecycleState::Polling || self.current_connection(session).is_none()
        {
            debug!("Ignoring cycle result for session {}", session);
            return Vec::new();
        }

        if let Some(color) = outcome.color() {
            if color != self.color {
                info!("Indicator changed: {} -> {}", self.color, color);
            }
            self.color = color;
            self.last_exchange_at = Some(Utc::now());
        }

        match outcome.error() {
            None => {
                self.completed_cycles += 1;
                Vec::new()
            }
            Some(error) if !error.error.is_transient() => {
                warn!("Exchange cycle {}, dropping connection", error);
                self.last_error = Some(error.to_string());
                self.reset()
            }
            Some(error) => {
                warn!("Exchange cycle {}", error);
                self.failed_cycles += 1;
                self.last_error = Some(error.to_string());
                Vec::new()
            }
        }
    }

    fn is_current_scan(&self, scan: SessionId) -> bool {
        self.lifecycle == LifecycleState::Scanning && self.scan == Some(scan)
    }

    fn is_current_attempt(&self, session: SessionId) -> bool {
        self.lifecycle == LifecycleState::Connecting
            && self.attempt.as_ref().map(Connection::session) == Some(session)
    }

    fn current_connection(&self, session: SessionId) -> Option<Connection> {
        self.connection
            .as_ref()
            .filter(|c| c.session() == session)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::exchange::{CycleError, CycleStage};
    use pretty_assertions::assert_eq;

    fn handle(id: &str) -> PeripheralHandle {
        PeripheralHandle::new(PeripheralId::from(id), Some("QBike Lock".to_string()))
    }

    fn start_scan(supervisor: &mut Supervisor) -> SessionId {
        match supervisor.request_scan().unwrap().as_slice() {
            [Command::StartScan(scan)] => *scan,
            other => panic!("unexpected commands {:?}", other),
        }
    }

    fn found(scan: SessionId, id: &str) -> Event {
        Event::PeripheralFound {
            scan,
            handle: handle(id),
        }
    }

    fn connect_command(commands: &[Command]) -> Connection {
        commands
            .iter()
            .find_map(|c| match c {
                Command::Connect(connection) => Some(connection.clone()),
                _ => None,
            })
            .expect("connect command")
    }

    /// Drive a supervisor to Polling and return its connection.
    fn polling(supervisor: &mut Supervisor) -> Connection {
        let scan = start_scan(supervisor);
        let commands = supervisor.on_event(found(scan, "lock-1"));
        let connection = connect_command(&commands);
        supervisor.on_event(Event::Connected(connection.clone()));
        supervisor.on_event(Event::ServicesDiscovered {
            session: connection.session(),
        });
        assert_eq!(supervisor.lifecycle(), LifecycleState::Polling);
        connection
    }

    fn assert_invariants(supervisor: &Supervisor) {
        assert_eq!(
            supervisor.connection().is_some(),
            supervisor.lifecycle().has_connection()
        );
        if supervisor.is_polling() {
            assert_eq!(supervisor.lifecycle(), LifecycleState::Polling);
        }
    }

    #[test]
    fn test_scan_rejected_unless_idle() {
        let mut supervisor = Supervisor::new(true);
        assert_eq!(
            supervisor.request_scan().unwrap(),
            vec![Command::StartScan(SessionId(1))]
        );
        assert!(matches!(
            supervisor.request_scan(),
            Err(Error::Busy {
                state: LifecycleState::Scanning
            })
        ));

        let mut connected = Supervisor::new(true);
        polling(&mut connected);
        assert!(connected.request_scan().is_err());
    }

    #[test]
    fn test_happy_path_commands() {
        let mut supervisor = Supervisor::new(true);
        let scan = start_scan(&mut supervisor);

        let commands = supervisor.on_event(found(scan, "lock-1"));
        assert_eq!(commands[0], Command::StopScan);
        let connection = connect_command(&commands);
        assert_eq!(supervisor.lifecycle(), LifecycleState::Connecting);
        assert_invariants(&supervisor);

        let commands = supervisor.on_event(Event::Connected(connection.clone()));
        assert_eq!(commands, vec![Command::DiscoverServices(connection.clone())]);
        assert_eq!(supervisor.lifecycle(), LifecycleState::ConnectedIdle);
        assert_invariants(&supervisor);

        let commands = supervisor.on_event(Event::ServicesDiscovered {
            session: connection.session(),
        });
        // The listener must be registered before polling starts.
        assert_eq!(
            commands,
            vec![
                Command::WatchDisconnect(connection.clone()),
                Command::StartPolling(connection),
            ]
        );
        assert_invariants(&supervisor);
    }

    #[test]
    fn test_overlapping_matches_do_not_start_second_connect() {
        let mut supervisor = Supervisor::new(true);
        let scan = start_scan(&mut supervisor);
        supervisor.on_event(found(scan, "lock-1"));

        let commands = supervisor.on_event(found(scan, "lock-2"));
        assert!(commands.is_empty());
        assert_eq!(supervisor.lifecycle(), LifecycleState::Connecting);
    }

    #[test]
    fn test_connect_failure_resets() {
        let mut supervisor = Supervisor::new(true);
        let scan = start_scan(&mut supervisor);
        let connection =
            connect_command(&supervisor.on_event(found(scan, "lock-1")));

        let commands = supervisor.on_event(Event::ConnectFailed {
            session: connection.session(),
            error: Error::Timeout,
        });
        assert!(commands.is_empty());
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
        assert_eq!(
            supervisor.snapshot().last_error.as_deref(),
            Some("Operation timed out")
        );
        assert_invariants(&supervisor);
    }

    #[test]
    fn test_service_discovery_failure_disconnects() {
        let mut supervisor = Supervisor::new(true);
        let scan = start_scan(&mut supervisor);
        let connection =
            connect_command(&supervisor.on_event(found(scan, "lock-1")));
        supervisor.on_event(Event::Connected(connection.clone()));

        let commands = supervisor.on_event(Event::ServiceDiscoveryFailed {
            session: connection.session(),
            error: Error::ServiceNotFound {
                uuid: "x".to_string(),
            },
        });
        assert_eq!(commands, vec![Command::Disconnect(connection)]);
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
        assert_invariants(&supervisor);
    }

    #[test]
    fn test_scan_failure_returns_to_idle() {
        let mut supervisor = Supervisor::new(true);
        let scan = start_scan(&mut supervisor);
        let commands = supervisor.on_event(Event::ScanFailed {
            scan,
            error: Error::ScanFailed {
                reason: "radio off".to_string(),
            },
        });
        assert_eq!(commands, vec![Command::StopScan]);
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
        assert!(supervisor.snapshot().last_error.is_some());
    }

    #[test]
    fn test_cycle_updates_color() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);

        supervisor.on_event(Event::CycleFinished {
            session: connection.session(),
            outcome: CycleOutcome::Exchanged {
                color: IndicatorColor::Blue,
            },
        });

        let snapshot = supervisor.snapshot();
        assert_eq!(snapshot.color, IndicatorColor::Blue);
        assert_eq!(snapshot.completed_cycles, 1);
        assert!(snapshot.last_exchange_at.is_some());
    }

    #[test]
    fn test_transient_cycle_failure_keeps_polling() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);
        supervisor.on_event(Event::CycleFinished {
            session: connection.session(),
            outcome: CycleOutcome::Exchanged {
                color: IndicatorColor::Green,
            },
        });

        let commands = supervisor.on_event(Event::CycleFinished {
            session: connection.session(),
            outcome: CycleOutcome::Skipped(CycleError {
                stage: CycleStage::Read,
                error: Error::Timeout,
            }),
        });

        assert!(commands.is_empty());
        assert_eq!(supervisor.lifecycle(), LifecycleState::Polling);
        assert_eq!(supervisor.color(), IndicatorColor::Green);
        assert_eq!(supervisor.snapshot().failed_cycles, 1);
    }

    #[test]
    fn test_write_failure_still_updates_color() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);

        supervisor.on_event(Event::CycleFinished {
            session: connection.session(),
            outcome: CycleOutcome::WriteFailed {
                color: IndicatorColor::Red,
                error: CycleError {
                    stage: CycleStage::Write,
                    error: Error::Timeout,
                },
            },
        });

        assert_eq!(supervisor.color(), IndicatorColor::Red);
        assert_eq!(supervisor.lifecycle(), LifecycleState::Polling);
    }

    #[test]
    fn test_link_loss_during_cycle_resets() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);
        supervisor.on_event(Event::CycleFinished {
            session: connection.session(),
            outcome: CycleOutcome::Exchanged {
                color: IndicatorColor::Blue,
            },
        });

        let commands = supervisor.on_event(Event::CycleFinished {
            session: connection.session(),
            outcome: CycleOutcome::Skipped(CycleError {
                stage: CycleStage::Read,
                error: Error::NotConnected,
            }),
        });

        assert_eq!(
            commands,
            vec![Command::CancelPolling, Command::UnwatchDisconnect]
        );
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
        assert_eq!(supervisor.color(), IndicatorColor::White);
        assert_invariants(&supervisor);
    }

    #[test]
    fn test_disconnect_notification_resets() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);

        let commands = supervisor.on_event(Event::LinkLost {
            session: connection.session(),
        });
        assert_eq!(
            commands,
            vec![Command::CancelPolling, Command::UnwatchDisconnect]
        );
        assert!(!supervisor.snapshot().is_connected());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut supervisor = Supervisor::new(true);
        polling(&mut supervisor);

        let first = supervisor.reset();
        let after_first = supervisor.snapshot();
        let second = supervisor.reset();

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(supervisor.snapshot(), after_first);
    }

    #[test]
    fn test_explicit_disconnect_racing_notification() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);

        let commands = supervisor.request_disconnect();
        assert_eq!(
            commands,
            vec![
                Command::CancelPolling,
                Command::Disconnect(connection.clone())
            ]
        );
        assert_eq!(supervisor.lifecycle(), LifecycleState::Disconnecting);
        assert_invariants(&supervisor);

        let commands = supervisor.on_event(Event::LinkLost {
            session: connection.session(),
        });
        assert_eq!(commands, vec![Command::UnwatchDisconnect]);

        let commands = supervisor.on_event(Event::DisconnectFinished {
            session: connection.session(),
            result: Err(Error::NotConnected),
        });
        assert!(commands.is_empty());
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
    }

    #[test]
    fn test_failed_disconnect_still_clears_state() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);
        supervisor.request_disconnect();

        supervisor.on_event(Event::DisconnectFinished {
            session: connection.session(),
            result: Err(Error::Timeout),
        });
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
        assert!(supervisor.connection().is_none());
    }

    #[test]
    fn test_stale_cycle_after_reset_is_ignored() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);
        supervisor.reset();

        supervisor.on_event(Event::CycleFinished {
            session: connection.session(),
            outcome: CycleOutcome::Exchanged {
                color: IndicatorColor::Red,
            },
        });
        assert_eq!(supervisor.color(), IndicatorColor::White);
    }

    #[test]
    fn test_connect_completing_after_abandon_is_torn_down() {
        let mut supervisor = Supervisor::new(true);
        let scan = start_scan(&mut supervisor);
        let connection =
            connect_command(&supervisor.on_event(found(scan, "lock-1")));
        supervisor.request_disconnect();

        let commands = supervisor.on_event(Event::Connected(connection.clone()));
        assert_eq!(commands, vec![Command::Disconnect(connection)]);
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
    }

    #[test]
    fn test_manual_selection() {
        let mut supervisor = Supervisor::new(false);
        let scan = start_scan(&mut supervisor);
        assert!(supervisor
            .on_event(found(scan, "lock-1"))
            .is_empty());
        supervisor.on_event(found(scan, "lock-2"));
        assert_eq!(supervisor.snapshot().discovered.len(), 2);

        assert!(matches!(
            supervisor.request_connect(&PeripheralId::from("lock-9")),
            Err(Error::PeripheralNotFound { .. })
        ));

        let commands = supervisor
            .request_connect(&PeripheralId::from("lock-2"))
            .unwrap();
        assert_eq!(connect_command(&commands).id().as_str(), "lock-2");
        assert_eq!(supervisor.lifecycle(), LifecycleState::Connecting);
    }

    #[test]
    fn test_cancel_scan() {
        let mut supervisor = Supervisor::new(true);
        assert!(supervisor.request_cancel_scan().is_empty());

        supervisor.request_scan().unwrap();
        assert_eq!(supervisor.snapshot().phase.to_string(), "scanning");
        assert_eq!(supervisor.request_cancel_scan(), vec![Command::StopScan]);
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
    }

    #[test]
    fn test_events_from_cancelled_scan_are_ignored() {
        let mut supervisor = Supervisor::new(true);
        let old = start_scan(&mut supervisor);
        supervisor.request_cancel_scan();
        let scan = start_scan(&mut supervisor);
        assert_ne!(old, scan);

        let commands = supervisor.on_event(Event::ScanFailed {
            scan: old,
            error: Error::ScanFailed {
                reason: "scan ended".to_string(),
            },
        });
        assert!(commands.is_empty());
        assert!(supervisor.on_event(found(old, "lock-1")).is_empty());
        assert_eq!(supervisor.lifecycle(), LifecycleState::Scanning);
        assert!(supervisor.snapshot().last_error.is_none());

        let commands = supervisor.on_event(found(scan, "lock-1"));
        assert_eq!(connect_command(&commands).id().as_str(), "lock-1");
    }

    #[test]
    fn test_service_discovery_error_is_not_rewrapped() {
        let mut supervisor = Supervisor::new(true);
        let scan = start_scan(&mut supervisor);
        let connection = connect_command(&supervisor.on_event(found(scan, "lock-1")));
        supervisor.on_event(Event::Connected(connection.clone()));

        supervisor.on_event(Event::ServiceDiscoveryFailed {
            session: connection.session(),
            error: Error::ServiceDiscoveryFailed {
                reason: "no GATT server".to_string(),
            },
        });
        assert_eq!(
            supervisor.snapshot().last_error.as_deref(),
            Some("Service discovery failed: no GATT server")
        );
    }

    #[test]
    fn test_fatal_cycle_error_resets() {
        let mut supervisor = Supervisor::new(true);
        let connection = polling(&mut supervisor);

        let commands = supervisor.on_event(Event::CycleFinished {
            session: connection.session(),
            outcome: CycleOutcome::Skipped(CycleError {
                stage: CycleStage::Read,
                error: Error::BluetoothUnavailable,
            }),
        });

        assert_eq!(
            commands,
            vec![Command::CancelPolling, Command::UnwatchDisconnect]
        );
        assert_eq!(supervisor.lifecycle(), LifecycleState::Idle);
        assert_invariants(&supervisor);
    }
}
