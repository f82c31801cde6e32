//! Connection supervision.
//!
//! - [`machine`]: the pure lifecycle state machine
//! - [`exchange`]: the read/decode/write cycle and its poll timer
//! - [`controller`]: the task that executes the machine's commands

pub mod controller;
pub mod exchange;
pub mod machine;

pub use controller::LockController;
pub use exchange::{run_exchange, CycleError, CycleOutcome, CycleStage};
pub use machine::{Command, Event, Supervisor};
