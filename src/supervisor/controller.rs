//! Lock controller.
//!
//! [`LockController`] is the public entry point. It runs the
//! [`Supervisor`] on a single background task: requests from callers and
//! events from transport tasks are applied one at a time, and the commands
//! the supervisor returns are executed before the next message is taken.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ble::advertising::PeripheralId;
use crate::ble::connection::{Connection, SessionId};
use crate::ble::platform::BtleplugTransport;
use crate::ble::scanner::discover;
use crate::ble::transport::RadioTransport;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::permissions::{AlwaysGranted, PermissionGate};
use crate::state::{LockSnapshot, LockState};
use crate::supervisor::exchange::PollTimer;
use crate::supervisor::machine::{Command, Event, Supervisor};

/// Caller requests handled by the controller task.
#[derive(Debug)]
enum Request {
    ScanAndConnect,
    ConnectTo(PeripheralId),
    CancelScan,
    Disconnect,
    Shutdown,
}

type Reply = oneshot::Sender<Result<()>>;

/// Client-side controller for one QBike Lock.
///
/// Must be created inside a Tokio runtime.
pub struct LockController {
    /// Checked before every scan.
    permissions: Arc<dyn PermissionGate>,
    /// Request channel into the controller task.
    request_tx: mpsc::UnboundedSender<(Request, Reply)>,
    /// Read side of the state surface.
    state: LockState,
    /// The controller task.
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LockController {
    /// Create a controller on top of a transport and permission gate.
    pub fn new(
        transport: Arc<dyn RadioTransport>,
        permissions: Arc<dyn PermissionGate>,
        config: ControllerConfig,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(config.auto_connect);
        let (snapshot_tx, snapshot_rx) = watch::channel(supervisor.snapshot());

        let runner = Runner {
            transport,
            config,
            supervisor,
            event_tx,
            snapshot_tx,
            scan_task: None,
            connect_tasks: Vec::new(),
            poll_timer: None,
            disconnect_watch: None,
        };

        let task = tokio::spawn(runner.run(request_rx, event_rx));

        Self {
            permissions,
            request_tx,
            state: LockState::new(snapshot_rx),
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Create a controller on the host's first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn with_platform(config: ControllerConfig) -> Result<Self> {
        let transport = BtleplugTransport::new().await?;
        Ok(Self::new(Arc::new(transport), Arc::new(AlwaysGranted), config))
    }

    /// Scan for the lock and connect to it.
    ///
    /// Returns once the scan has started. Progress is visible through
    /// [`state`](Self::state).
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] if the gate refuses, [`Error::Busy`] if a
    /// scan or connection is already active.
    pub async fn trigger_scan_and_connect(&self) -> Result<()> {
        if !self.permissions.request_permissions().await {
            warn!("Bluetooth permissions denied");
            return Err(Error::PermissionDenied);
        }

        self.send(Request::ScanAndConnect).await
    }

    /// Connect to a lock found by the running scan.
    ///
    /// Used when auto-connect is disabled.
    pub async fn connect_to(&self, id: &PeripheralId) -> Result<()> {
        self.send(Request::ConnectTo(id.clone())).await
    }

    /// Stop a running scan without connecting.
    pub async fn cancel_scan(&self) -> Result<()> {
        self.send(Request::CancelScan).await
    }

    /// Disconnect from the lock, or abandon a scan or connect in progress.
    ///
    /// State is cleared even if the transport fails to disconnect cleanly.
    pub async fn request_disconnect(&self) -> Result<()> {
        self.send(Request::Disconnect).await
    }

    /// Read-only view of the controller state.
    pub fn state(&self) -> LockState {
        self.state.clone()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> LockSnapshot {
        self.state.snapshot()
    }

    /// Disconnect and stop the controller task.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down lock controller");

        let result = self.send(Request::Shutdown).await;

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        match result {
            Err(Error::ControllerStopped) => Ok(()),
            other => other,
        }
    }

    async fn send(&self, request: Request) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send((request, reply_tx))
            .map_err(|_| Error::ControllerStopped)?;
        reply_rx.await.map_err(|_| Error::ControllerStopped)?
    }
}

impl Drop for LockController {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for LockController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("LockController")
            .field("lifecycle", &snapshot.lifecycle)
            .field("peripheral", &snapshot.peripheral_name())
            .field("color", &snapshot.color)
            .finish()
    }
}

/// State owned by the controller task.
struct Runner {
    transport: Arc<dyn RadioTransport>,
    config: ControllerConfig,
    supervisor: Supervisor,
    /// Handed to every spawned transport task.
    event_tx: mpsc::UnboundedSender<Event>,
    snapshot_tx: watch::Sender<LockSnapshot>,
    scan_task: Option<JoinHandle<()>>,
    /// Connect attempts whose result the supervisor has not seen yet.
    connect_tasks: Vec<(Connection, JoinHandle<()>)>,
    poll_timer: Option<PollTimer>,
    disconnect_watch: Option<JoinHandle<()>>,
}

impl Runner {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<(Request, Reply)>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        debug!("Lock controller task started");

        loop {
            tokio::select! {
                biased;

                request = requests.recv() => {
                    let Some((request, reply)) = request else {
                        break;
                    };

                    if let Request::Shutdown = request {
                        self.shutdown().await;
                        self.publish();
                        let _ = reply.send(Ok(()));
                        break;
                    }

                    let result = self.handle_request(request).await;
                    self.publish();
                    let _ = reply.send(result);
                }
                Some(event) = events.recv() => {
                    self.forget_connect(&event);
                    let commands = self.supervisor.on_event(event);
                    self.execute(commands).await;
                    self.publish();
                }
            }
        }

        debug!("Lock controller task ended");
    }

    async fn handle_request(&mut self, request: Request) -> Result<()> {
        let commands = match request {
            Request::ScanAndConnect => self.supervisor.request_scan()?,
            Request::ConnectTo(id) => self.supervisor.request_connect(&id)?,
            Request::CancelScan => self.supervisor.request_cancel_scan(),
            Request::Disconnect => self.supervisor.request_disconnect(),
            Request::Shutdown => return Ok(()),
        };

        self.execute(commands).await;
        Ok(())
    }

    /// Reset and tear down every link, including connects still in flight.
    async fn shutdown(&mut self) {
        let mut links: Vec<PeripheralId> = self
            .supervisor
            .connection()
            .map(|c| c.id().clone())
            .into_iter()
            .collect();
        let commands = self.supervisor.reset();
        self.execute(commands).await;

        for (attempt, task) in self.connect_tasks.drain(..) {
            debug!("Abandoning connect for session {}", attempt.session());
            task.abort();
            if !links.contains(attempt.id()) {
                links.push(attempt.id().clone());
            }
        }

        for id in links {
            if let Err(e) = self.transport.disconnect(&id).await {
                warn!("Error disconnecting {} during shutdown: {}", id, e);
            }
        }
    }

    /// Stop tracking a connect attempt once its result reaches the supervisor.
    fn forget_connect(&mut self, event: &Event) {
        let session = match event {
            Event::Connected(connection) => connection.session(),
            Event::ConnectFailed { session, .. } => *session,
            _ => return,
        };
        self.connect_tasks
            .retain(|(attempt, _)| attempt.session() != session);
    }

    /// Replace the published snapshot if it changed.
    fn publish(&self) {
        let next = self.supervisor.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    async fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            debug!("Executing {:?}", command);

            match command {
                Command::StartScan(scan) => self.start_scan(scan),
                Command::StopScan => self.stop_scan().await,
                Command::Connect(connection) => self.connect(connection),
                Command::DiscoverServices(connection) => self.discover_services(connection),
                Command::WatchDisconnect(connection) => self.watch_disconnect(connection),
                Command::StartPolling(connection) => self.start_polling(connection),
                Command::CancelPolling => {
                    if let Some(timer) = self.poll_timer.take() {
                        timer.cancel();
                    }
                }
                Command::UnwatchDisconnect => {
                    if let Some(watch) = self.disconnect_watch.take() {
                        watch.abort();
                    }
                }
                Command::Disconnect(connection) => self.disconnect(connection),
            }
        }
    }

    fn start_scan(&mut self, scan: SessionId) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }

        let transport = self.transport.clone();
        let name = self.config.device_name.clone();
        let events = self.event_tx.clone();

        self.scan_task = Some(tokio::spawn(async move {
            let mut discovery = match discover(transport.as_ref(), &name).await {
                Ok(discovery) => discovery,
                Err(error) => {
                    let _ = events.send(Event::ScanFailed { scan, error });
                    return;
                }
            };

            while let Some(found) = discovery.next().await {
                let event = match found {
                    Ok(handle) => Event::PeripheralFound { scan, handle },
                    Err(error) => Event::ScanFailed { scan, error },
                };
                let failed = matches!(event, Event::ScanFailed { .. });

                if events.send(event).is_err() || failed {
                    return;
                }
            }

            debug!(
                "Scan {} closed after {} matches",
                scan,
                discovery.match_count()
            );
            let _ = events.send(Event::ScanFailed {
                scan,
                error: Error::ScanFailed {
                    reason: "scan ended".to_string(),
                },
            });
        }));
    }

    async fn stop_scan(&mut self) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }

        info!("Stopping BLE scan");
        if let Err(e) = self.transport.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
    }

    fn connect(&mut self, connection: Connection) {
        let transport = self.transport.clone();
        let timeout = self.config.connect_timeout;
        let events = self.event_tx.clone();
        let pending = connection.clone();

        let task = tokio::spawn(async move {
            let attempt = transport.connect(connection.id());
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, attempt)
                    .await
                    .unwrap_or(Err(Error::Timeout)),
                None => attempt.await,
            };

            let event = match result {
                Ok(()) => Event::Connected(connection),
                Err(error) => Event::ConnectFailed {
                    session: connection.session(),
                    error,
                },
            };
            let _ = events.send(event);
        });
        self.connect_tasks.push((pending, task));
    }

    fn discover_services(&self, connection: Connection) {
        let transport = self.transport.clone();
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            let session = connection.session();
            let event = match transport.discover_services(connection.id()).await {
                Ok(()) => Event::ServicesDiscovered { session },
                Err(error) => Event::ServiceDiscoveryFailed { session, error },
            };
            let _ = events.send(event);
        });
    }

    /// Subscribe before returning so no cycle can run unobserved.
    fn watch_disconnect(&mut self, connection: Connection) {
        if let Some(watch) = self.disconnect_watch.take() {
            watch.abort();
        }

        let mut disconnections = self.transport.disconnections();
        let events = self.event_tx.clone();

        self.disconnect_watch = Some(tokio::spawn(async move {
            loop {
                match disconnections.recv().await {
                    Ok(id) if &id == connection.id() => {
                        let _ = events.send(Event::LinkLost {
                            session: connection.session(),
                        });
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Disconnect listener lagged by {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Transport closed its disconnect channel");
                        let _ = events.send(Event::LinkLost {
                            session: connection.session(),
                        });
                        break;
                    }
                }
            }
        }));
    }

    fn start_polling(&mut self, connection: Connection) {
        if let Some(timer) = self.poll_timer.take() {
            warn!("Replacing poll timer for session {}", timer.session());
            timer.cancel();
        }

        self.poll_timer = Some(PollTimer::start(
            self.transport.clone(),
            self.config.profile,
            connection,
            self.config.poll_interval,
            self.event_tx.clone(),
        ));
    }

    fn disconnect(&self, connection: Connection) {
        let transport = self.transport.clone();
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            let result = transport.disconnect(connection.id()).await;
            let _ = events.send(Event::DisconnectFinished {
                session: connection.session(),
                result,
            });
        });
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
        for (_, task) in self.connect_tasks.drain(..) {
            task.abort();
        }
        if let Some(watch) = self.disconnect_watch.take() {
            watch.abort();
        }
    }
}
