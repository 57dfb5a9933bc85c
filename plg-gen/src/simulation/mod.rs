//! Turning a process into an event log.
//!
//! [`TraceGenerator`] plays the token game for one case; [`SimulationEngine`] runs many such
//! cases on a bounded pool of worker threads; [`LogGenerator`] ties the two together and collects
//! the resulting [`EventLog`].

/// Bounded worker pool.
mod engine;
/// Event log types and the log generator.
mod log;
/// Token game for a single case.
mod trace;

use plg_core::{
    ProcessError,
    ScriptError,
};
use thiserror::Error;

pub use self::engine::{
    BatchReport,
    CancellationToken,
    JobOutcome,
    Progress,
    SimulationEngine,
};
pub use self::log::{
    Event,
    EventLog,
    Lifecycle,
    LogGenerator,
    Trace,
    TraceFailure,
};
pub use self::trace::{
    TraceGenerator,
    LOOP_CAPPED_WEIGHT,
};

/// Why a single case could not be simulated.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The process is not sound.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A script failed for this case.
    #[error(transparent)]
    Script(#[from] ScriptError),
}
