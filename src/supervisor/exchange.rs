//! The exchange cycle and its poll timer.
//!
//! One cycle reads the status characteristic, decodes it, and writes the
//! transcoded bytes to the command characteristic. Cycles are best-effort:
//! a failed cycle is reported and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::ble::connection::{Connection, SessionId};
use crate::ble::transport::RadioTransport;
use crate::config::GattProfile;
use crate::error::Error;
use crate::protocol::{transcode, IndicatorColor};
use crate::supervisor::machine::Event;

/// Step of the cycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    /// Reading the status characteristic.
    Read,
    /// Decoding the status payload.
    Decode,
    /// Writing the command characteristic.
    Write,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Decode => write!(f, "decode"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// A failure inside one cycle.
#[derive(Debug)]
pub struct CycleError {
    /// Where the cycle failed.
    pub stage: CycleStage,
    /// The underlying error.
    pub error: Error,
}

impl CycleError {
    fn new(stage: CycleStage, error: Error) -> Self {
        Self { stage, error }
    }

    /// Check if the failure means the link is gone.
    pub fn is_link_loss(&self) -> bool {
        self.error.is_link_loss()
    }
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

/// What one cycle achieved.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Status decoded and command written.
    Exchanged {
        /// The decoded indicator color.
        color: IndicatorColor,
    },
    /// Status decoded but the write failed.
    WriteFailed {
        /// The decoded indicator color.
        color: IndicatorColor,
        /// The write failure.
        error: CycleError,
    },
    /// Nothing usable was read; the write was skipped.
    Skipped(CycleError),
}

impl CycleOutcome {
    /// The decoded color, if the read succeeded.
    pub fn color(&self) -> Option<IndicatorColor> {
        match self {
            Self::Exchanged { color } | Self::WriteFailed { color, .. } => Some(*color),
            Self::Skipped(_) => None,
        }
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&CycleError> {
        match self {
            Self::Exchanged { .. } => None,
            Self::WriteFailed { error, .. } | Self::Skipped(error) => Some(error),
        }
    }
}

/// Run one exchange cycle against `connection`.
///
/// The connection is only borrowed for the duration of the call.
pub async fn run_exchange(
    transport: &dyn RadioTransport,
    profile: &GattProfile,
    connection: &Connection,
) -> CycleOutcome {
    let id = connection.id();

    let read = match transport
        .read_characteristic(id, profile.service, profile.read_characteristic)
        .await
    {
        Ok(read) => read,
        Err(e) => return CycleOutcome::Skipped(CycleError::new(CycleStage::Read, e)),
    };

    let frame = match transcode(&read) {
        Ok(frame) => frame,
        Err(e) => return CycleOutcome::Skipped(CycleError::new(CycleStage::Decode, e)),
    };

    let color = IndicatorColor::from_payload(&frame.raw);
    debug!("Status from {}: 0x{} ({})", id, frame.hex(), color);

    if let Err(e) = transport
        .write_characteristic(
            id,
            profile.service,
            profile.write_characteristic,
            &frame.response,
        )
        .await
    {
        return CycleOutcome::WriteFailed {
            color,
            error: CycleError::new(CycleStage::Write, e),
        };
    }

    trace!("Wrote 0x{} as {}", frame.hex(), frame.response);
    CycleOutcome::Exchanged { color }
}

/// The recurring task driving exchange cycles for one connection.
///
/// Cycles run sequentially inside the task, so two cycles never overlap;
/// ticks missed while a slow cycle runs are skipped.
pub(crate) struct PollTimer {
    session: SessionId,
    handle: JoinHandle<()>,
}

impl PollTimer {
    /// Start polling. The first cycle runs immediately.
    pub(crate) fn start(
        transport: Arc<dyn RadioTransport>,
        profile: GattProfile,
        connection: Connection,
        period: Duration,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let session = connection.session();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let outcome = run_exchange(transport.as_ref(), &profile, &connection).await;
                let event = Event::CycleFinished {
                    session: connection.session(),
                    outcome,
                };

                if events.send(event).is_err() {
                    break;
                }
            }

            debug!("Poll timer for session {} ended", connection.session());
        });

        info!("Started polling session {} every {:?}", session, period);

        Self { session, handle }
    }

    /// Session this timer polls for.
    pub(crate) fn session(&self) -> SessionId {
        self.session
    }

    /// Stop the timer. A cycle in flight is dropped at its next await.
    pub(crate) fn cancel(self) {
        debug!("Cancelling poll timer for session {}", self.session);
        self.handle.abort();
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
