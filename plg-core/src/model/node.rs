//! Flow objects (nodes) and sequences (edges) of a process.

use std::sync::Arc;

use super::ComponentId;
use crate::errors::ScriptError;
use crate::script::{
    ActivityScript,
    DEFAULT_TIME_AFTER,
};

/// A unit of work. Only tasks produce events in a simulated trace.
#[derive(Clone, Debug)]
pub struct Task {
    /// Unique within a generated process.
    name: String,
    /// Duration and idle time per case; instantaneous when absent.
    timing: Option<Arc<dyn ActivityScript>>,
}

impl Task {
    /// Untimed task.
    pub(crate) fn new(name: String) -> Self {
        Self { name, timing: None }
    }

    /// Activity name recorded in events.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The timing script, if any.
    #[must_use]
    pub fn timing(&self) -> Option<&Arc<dyn ActivityScript>> {
        self.timing.as_ref()
    }

    /// Replace the timing script.
    pub(crate) fn set_timing(&mut self, timing: Option<Arc<dyn ActivityScript>>) {
        self.timing = timing;
    }

    /// Seconds the task lasts for `case_id` (0 without a timing script).
    pub fn duration(&self, case_id: &str) -> Result<i64, ScriptError> {
        self.timing.as_ref().map_or(Ok(0), |t| t.duration(case_id))
    }

    /// Seconds the case idles after the task for `case_id`.
    pub fn time_after(&self, case_id: &str) -> Result<i64, ScriptError> {
        self.timing.as_ref().map_or(Ok(DEFAULT_TIME_AFTER), |t| t.time_after(case_id))
    }
}

/// Closed set of flow object types; execution semantics match on this exhaustively.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Where a case begins; no incoming sequences.
    StartEvent,
    /// Where a branch of a case ends; no outgoing sequences.
    EndEvent,
    /// Executable activity.
    Task(Task),
    /// AND split (several outgoing) or join (several incoming).
    ParallelGateway,
    /// XOR split or merge; exactly one outgoing sequence is taken.
    ExclusiveGateway,
}

impl NodeKind {
    /// Parallel or exclusive gateway.
    #[must_use]
    pub const fn is_gateway(&self) -> bool {
        matches!(self, Self::ParallelGateway | Self::ExclusiveGateway)
    }

    /// Human-readable kind, used in messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::StartEvent => "start event",
            Self::EndEvent => "end event",
            Self::Task(_) => "task",
            Self::ParallelGateway => "parallel gateway",
            Self::ExclusiveGateway => "exclusive gateway",
        }
    }
}

/// A node of the process graph.
#[derive(Clone, Debug)]
pub struct FlowObject {
    /// Identity within the process.
    id: ComponentId,
    /// What the node is.
    kind: NodeKind,
}

impl FlowObject {
    /// Wrap a kind under a freshly allocated id.
    pub(crate) const fn new(id: ComponentId, kind: NodeKind) -> Self {
        Self { id, kind }
    }

    /// Identity within the process.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// What the node is.
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Mutable access for task updates.
    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    /// The task payload, when the node is a task.
    #[must_use]
    pub const fn as_task(&self) -> Option<&Task> {
        match &self.kind {
            NodeKind::Task(t) => Some(t),
            _ => None,
        }
    }
}

impl PartialEq for FlowObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FlowObject {}

impl std::fmt::Display for FlowObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NodeKind::Task(t) => write!(f, "task `{}` ({})", t.name(), self.id),
            kind => write!(f, "{} ({})", kind.label(), self.id),
        }
    }
}

/// Directed edge payload. Endpoints are owned by the graph arena.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence {
    /// Identity within the process.
    id: ComponentId,
}

impl Sequence {
    /// Payload for a freshly allocated id.
    pub(crate) const fn new(id: ComponentId) -> Self {
        Self { id }
    }

    /// Identity within the process.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }
}
