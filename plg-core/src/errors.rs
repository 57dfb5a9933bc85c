//! Error taxonomy shared by the model, the generators and the simulator.

use thiserror::Error;

use crate::model::ComponentId;

/// Topology rule broken by a rejected sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceViolation {
    /// End events have no outgoing flow.
    SourceIsEndEvent,
    /// Start events have no incoming flow.
    SinkIsStartEvent,
    /// Two start events cannot be connected.
    BothStartEvents,
}

impl std::fmt::Display for SequenceViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceIsEndEvent => write!(f, "the source is an end event"),
            Self::SinkIsStartEvent => write!(f, "the sink is a start event"),
            Self::BothStartEvents => write!(f, "both endpoints are start events"),
        }
    }
}

/// First soundness rule found violated by [`Process::check`](crate::model::Process::check).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidRule {
    /// The process has no start event.
    NoStartEvent,
    /// The process has no end event.
    NoEndEvent,
    /// The process has no task.
    NoTask,
    /// The component has neither incoming nor outgoing sequences.
    Isolated(ComponentId),
    /// No end event is reachable from the component.
    CannotReachEndEvent(ComponentId),
}

impl std::fmt::Display for InvalidRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStartEvent => write!(f, "no start event given"),
            Self::NoEndEvent => write!(f, "no end event given"),
            Self::NoTask => write!(f, "no task given"),
            Self::Isolated(id) => write!(f, "{id} is isolated"),
            Self::CannotReachEndEvent(id) => write!(f, "{id} cannot reach an end event"),
        }
    }
}

/// Structural errors raised by the process graph model.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// A sequence that would break the topology rules was refused.
    #[error("illegal sequence from {from} to {to}: {violation}")]
    IllegalSequence {
        /// Requested source.
        from: ComponentId,
        /// Requested sink.
        to: ComponentId,
        /// The rule the sequence would break.
        violation: SequenceViolation,
    },

    /// The process failed its soundness check.
    #[error("invalid process: {0}")]
    InvalidProcess(InvalidRule),

    /// The id is not a component of the process, or not of the expected kind.
    #[error("component {0} does not belong to this process")]
    UnknownComponent(ComponentId),
}

/// A per-case script could not produce a value.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The script failed for one case; only that case is affected.
    #[error("script `{script}` failed for case `{case_id}`: {reason}")]
    InvalidScript {
        /// Name of the failing script.
        script: String,
        /// Case being simulated.
        case_id: String,
        /// What went wrong.
        reason: String,
    },
}

impl ScriptError {
    /// Shorthand for [`ScriptError::InvalidScript`].
    pub fn invalid(script: impl Into<String>, case_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidScript {
            script: script.into(),
            case_id: case_id.to_owned(),
            reason: reason.into(),
        }
    }
}

/// An out-of-range configuration value.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A count below its lower bound.
    #[error("`{field}` must be at least {min}, got {value}")]
    TooSmall {
        /// Dotted path of the setting.
        field: &'static str,
        /// Smallest accepted value.
        min: usize,
        /// Value found.
        value: usize,
    },

    /// A probability outside `[0, 1]`.
    #[error("`{field}` must be within [0, 1], got {value}")]
    NotAProbability {
        /// Dotted path of the setting.
        field: &'static str,
        /// Value found.
        value: f64,
    },

    /// Any other malformed setting.
    #[error("`{field}` is invalid: {reason}")]
    Invalid {
        /// Dotted path of the setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Check that `value` lies within `[0, 1]`.
    pub fn probability(field: &'static str, value: f64) -> Result<(), Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(Self::NotAProbability { field, value })
        }
    }

    /// Check that `value` is at least `min`.
    pub fn at_least(field: &'static str, min: usize, value: usize) -> Result<(), Self> {
        if value >= min {
            Ok(())
        } else {
            Err(Self::TooSmall { field, min, value })
        }
    }
}
