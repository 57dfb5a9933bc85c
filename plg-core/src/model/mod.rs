//! Process graph model: typed flow objects, sequences and data objects owned by a [`Process`].
//!
//! Nodes and sequences live in a single [`petgraph::stable_graph::StableDiGraph`] arena, so the
//! adjacency views (`incoming`/`outgoing`) are always derived from the one edge list. Every
//! component receives a [`ComponentId`] from its process's own allocator at creation time.

mod data;
mod node;
mod process;

use serde::{
    Deserialize,
    Serialize,
};

pub use self::data::{
    DataObject,
    DataObjectKind,
    DataValue,
    Direction,
    GeneratedValue,
    Owner,
};
pub use self::node::{
    FlowObject,
    NodeKind,
    Sequence,
    Task,
};
pub use self::process::Process;

/// Process-unique identifier of a component. Equality of components is equality of ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
