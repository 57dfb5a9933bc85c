//! The process graph and its soundness check.

use std::collections::{
    BTreeMap,
    HashMap,
};
use std::sync::{
    Arc,
    OnceLock,
};

use petgraph::stable_graph::{
    EdgeIndex,
    NodeIndex,
    StableDiGraph,
};
use petgraph::visit::{
    Dfs,
    EdgeRef,
};
use petgraph::Direction::{
    Incoming,
    Outgoing,
};
use tracing::{
    debug,
    instrument,
};

use super::{
    ComponentId,
    DataObject,
    DataObjectKind,
    Direction,
    FlowObject,
    NodeKind,
    Owner,
    Sequence,
    Task,
};
use crate::errors::{
    InvalidRule,
    ProcessError,
    SequenceViolation,
};
use crate::script::ActivityScript;

/// A business process: flow objects connected by sequences, plus data objects.
///
/// The validity of the process is computed lazily by [`Process::check`] and cached until the next
/// structural mutation.
#[derive(Debug)]
pub struct Process {
    /// Display name.
    name: String,
    /// Flow objects and sequences; indices stay valid across removals.
    graph: StableDiGraph<FlowObject, Sequence>,
    /// Id to arena index for flow objects.
    nodes: HashMap<ComponentId, NodeIndex>,
    /// Id to arena index for sequences.
    sequences: HashMap<ComponentId, EdgeIndex>,
    /// Data objects by id.
    data_objects: BTreeMap<ComponentId, DataObject>,
    /// Next id handed out by this process.
    next_id: u64,
    /// Cached outcome of the last check.
    validity: OnceLock<Result<(), InvalidRule>>,
}

impl Process {
    /// Empty process.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: StableDiGraph::new(),
            nodes: HashMap::new(),
            sequences: HashMap::new(),
            data_objects: BTreeMap::new(),
            next_id: 0,
            validity: OnceLock::new(),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the process.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Hand out the next component id.
    fn allocate_id(&mut self) -> ComponentId {
        let id = ComponentId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Forget the cached check outcome.
    fn invalidate(&mut self) {
        self.validity = OnceLock::new();
    }

    /// Register a flow object of `kind`.
    fn add_node(&mut self, kind: NodeKind) -> ComponentId {
        let id = self.allocate_id();
        let idx = self.graph.add_node(FlowObject::new(id, kind));
        self.nodes.insert(id, idx);
        self.invalidate();
        id
    }

    /// Add an untimed task.
    pub fn new_task(&mut self, name: impl Into<String>) -> ComponentId {
        self.add_node(NodeKind::Task(Task::new(name.into())))
    }

    /// Add a start event.
    pub fn new_start_event(&mut self) -> ComponentId {
        self.add_node(NodeKind::StartEvent)
    }

    /// Add an end event.
    pub fn new_end_event(&mut self) -> ComponentId {
        self.add_node(NodeKind::EndEvent)
    }

    /// Add an AND gateway.
    pub fn new_parallel_gateway(&mut self) -> ComponentId {
        self.add_node(NodeKind::ParallelGateway)
    }

    /// Add an XOR gateway.
    pub fn new_exclusive_gateway(&mut self) -> ComponentId {
        self.add_node(NodeKind::ExclusiveGateway)
    }

    /// Attach (or clear) the timing script of a task.
    pub fn set_task_timing(
        &mut self,
        task: ComponentId,
        timing: Option<Arc<dyn ActivityScript>>,
    ) -> Result<(), ProcessError> {
        let idx = self.node_index(task).ok_or(ProcessError::UnknownComponent(task))?;
        match self.graph[idx].kind_mut() {
            NodeKind::Task(t) => {
                t.set_timing(timing);
                Ok(())
            },
            _ => Err(ProcessError::UnknownComponent(task)),
        }
    }

    /// Connect `from` to `to`.
    ///
    /// Returns the existing sequence when the two nodes are already connected. Nothing is
    /// changed when the sequence would violate the topology rules.
    pub fn new_sequence(&mut self, from: ComponentId, to: ComponentId) -> Result<ComponentId, ProcessError> {
        let from_idx = self.node_index(from).ok_or(ProcessError::UnknownComponent(from))?;
        let to_idx = self.node_index(to).ok_or(ProcessError::UnknownComponent(to))?;

        let violation = match (self.graph[from_idx].kind(), self.graph[to_idx].kind()) {
            (NodeKind::EndEvent, _) => Some(SequenceViolation::SourceIsEndEvent),
            (NodeKind::StartEvent, NodeKind::StartEvent) => Some(SequenceViolation::BothStartEvents),
            (_, NodeKind::StartEvent) => Some(SequenceViolation::SinkIsStartEvent),
            _ => None,
        };
        if let Some(violation) = violation {
            return Err(ProcessError::IllegalSequence { from, to, violation });
        }

        if let Some(existing) = self.graph.find_edge(from_idx, to_idx) {
            return Ok(self.graph[existing].id());
        }

        let id = self.allocate_id();
        let edge = self.graph.add_edge(from_idx, to_idx, Sequence::new(id));
        self.sequences.insert(id, edge);
        self.invalidate();
        Ok(id)
    }

    /// The sequence connecting `from` to `to`, if any.
    #[must_use]
    pub fn get_sequence(&self, from: ComponentId, to: ComponentId) -> Option<ComponentId> {
        let edge = self.graph.find_edge(self.node_index(from)?, self.node_index(to)?)?;
        Some(self.graph[edge].id())
    }

    /// Source and sink of a sequence.
    #[must_use]
    pub fn sequence_endpoints(&self, sequence: ComponentId) -> Option<(ComponentId, ComponentId)> {
        let (from, to) = self.graph.edge_endpoints(*self.sequences.get(&sequence)?)?;
        Some((self.graph[from].id(), self.graph[to].id()))
    }

    /// Remove a flow object, sequence or data object.
    ///
    /// Removing a flow object first removes every sequence touching it. Data objects owned by a
    /// removed node or sequence are removed along with it.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_component(&mut self, id: ComponentId) -> Result<(), ProcessError> {
        if let Some(&idx) = self.nodes.get(&id) {
            let touching: Vec<ComponentId> = self
                .graph
                .edges_directed(idx, Incoming)
                .chain(self.graph.edges_directed(idx, Outgoing))
                .map(|e| e.weight().id())
                .collect();
            for sequence in touching {
                self.remove_sequence(sequence);
            }
            self.graph.remove_node(idx);
            self.nodes.remove(&id);
            self.remove_owned_data_objects(Owner::Node(id));
        } else if self.sequences.contains_key(&id) {
            self.remove_sequence(id);
        } else if self.data_objects.remove(&id).is_none() {
            return Err(ProcessError::UnknownComponent(id));
        }

        debug!(%id, "component removed");
        self.invalidate();
        Ok(())
    }

    /// Drop a sequence and its data objects.
    fn remove_sequence(&mut self, id: ComponentId) {
        if let Some(edge) = self.sequences.remove(&id) {
            self.graph.remove_edge(edge);
            self.remove_owned_data_objects(Owner::Sequence(id));
        }
    }

    /// Drop every data object attached to `owner`.
    fn remove_owned_data_objects(&mut self, owner: Owner) {
        self.data_objects.retain(|_, d| d.owner() != Some(owner));
    }

    /// Register a data object, optionally attached to a node or sequence of this process.
    pub fn new_data_object(
        &mut self,
        name: impl Into<String>,
        kind: DataObjectKind,
        owner: Option<(Owner, Direction)>,
    ) -> Result<ComponentId, ProcessError> {
        if let Some((owner, _)) = owner {
            let known = match owner {
                Owner::Node(id) => self.nodes.contains_key(&id),
                Owner::Sequence(id) => self.sequences.contains_key(&id),
            };
            if !known {
                return Err(ProcessError::UnknownComponent(owner.id()));
            }
        }
        let id = self.allocate_id();
        self.data_objects.insert(id, DataObject::new(id, name.into(), kind, owner));
        Ok(id)
    }

    /// Data object by id.
    #[must_use]
    pub fn data_object(&self, id: ComponentId) -> Option<&DataObject> {
        self.data_objects.get(&id)
    }

    /// Every data object, ordered by id.
    pub fn data_objects(&self) -> impl Iterator<Item = &DataObject> {
        self.data_objects.values()
    }

    /// Data objects attached to `owner` in the given direction.
    pub fn data_objects_of(&self, owner: Owner, direction: Direction) -> impl Iterator<Item = &DataObject> {
        self.data_objects
            .values()
            .filter(move |d| d.owner() == Some(owner) && d.direction() == Some(direction))
    }

    /// Data objects attached to `owner` regardless of direction.
    pub fn data_objects_owned_by(&self, owner: Owner) -> impl Iterator<Item = &DataObject> {
        self.data_objects.values().filter(move |d| d.owner() == Some(owner))
    }

    /// Data objects describing the whole case rather than a single node or sequence.
    pub fn case_data_objects(&self) -> impl Iterator<Item = &DataObject> {
        self.data_objects.values().filter(|d| d.owner().is_none())
    }

    /// Flow object by id.
    #[must_use]
    pub fn node(&self, id: ComponentId) -> Option<&FlowObject> {
        self.node_index(id).map(|idx| &self.graph[idx])
    }

    /// Arena index of a flow object.
    #[must_use]
    pub fn node_index(&self, id: ComponentId) -> Option<NodeIndex> {
        self.nodes.get(&id).copied()
    }

    /// Arena index of a sequence.
    #[must_use]
    pub fn sequence_index(&self, id: ComponentId) -> Option<EdgeIndex> {
        self.sequences.get(&id).copied()
    }

    /// Read-only view of the underlying arena, for traversal-heavy consumers.
    #[must_use]
    pub const fn graph(&self) -> &StableDiGraph<FlowObject, Sequence> {
        &self.graph
    }

    /// Predecessors of `id`, ordered by id.
    #[must_use]
    pub fn incoming(&self, id: ComponentId) -> Vec<ComponentId> {
        self.neighbors(id, Incoming)
    }

    /// Successors of `id`, ordered by id.
    #[must_use]
    pub fn outgoing(&self, id: ComponentId) -> Vec<ComponentId> {
        self.neighbors(id, Outgoing)
    }

    /// Sorted, deduplicated neighbour ids.
    fn neighbors(&self, id: ComponentId, dir: petgraph::Direction) -> Vec<ComponentId> {
        let Some(idx) = self.node_index(id) else {
            return Vec::new();
        };
        let mut ids: Vec<_> = self.graph.neighbors_directed(idx, dir).map(|n| self.graph[n].id()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Sorted ids of the flow objects matching `pred`.
    fn ids_where(&self, pred: impl Fn(&NodeKind) -> bool) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self
            .flow_objects()
            .filter(|n| pred(n.kind()))
            .map(FlowObject::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Every flow object, in arena order.
    pub fn flow_objects(&self) -> impl Iterator<Item = &FlowObject> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    /// Start event ids.
    #[must_use]
    pub fn start_events(&self) -> Vec<ComponentId> {
        self.ids_where(|k| matches!(k, NodeKind::StartEvent))
    }

    /// End event ids.
    #[must_use]
    pub fn end_events(&self) -> Vec<ComponentId> {
        self.ids_where(|k| matches!(k, NodeKind::EndEvent))
    }

    /// Task ids.
    #[must_use]
    pub fn tasks(&self) -> Vec<ComponentId> {
        self.ids_where(|k| matches!(k, NodeKind::Task(_)))
    }

    /// Gateway ids, both kinds.
    #[must_use]
    pub fn gateways(&self) -> Vec<ComponentId> {
        self.ids_where(NodeKind::is_gateway)
    }

    /// Sequence ids.
    #[must_use]
    pub fn sequences(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self.sequences.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The task carrying `name`, if any.
    #[must_use]
    pub fn find_task(&self, name: &str) -> Option<ComponentId> {
        self.flow_objects()
            .find(|n| n.as_task().is_some_and(|t| t.name() == name))
            .map(FlowObject::id)
    }

    /// The data object carrying `name`, if any.
    #[must_use]
    pub fn find_data_object(&self, name: &str) -> Option<ComponentId> {
        self.data_objects().find(|d| d.name() == name).map(DataObject::id)
    }

    /// Whether an end event is reachable from `id`. Cycles are visited once.
    #[must_use]
    pub fn can_reach_end_event(&self, id: ComponentId) -> bool {
        self.node_index(id).is_some_and(|idx| self.reaches_end_event(idx))
    }

    /// Depth-first search from `start` for an end event.
    fn reaches_end_event(&self, start: NodeIndex) -> bool {
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(idx) = dfs.next(&self.graph) {
            if matches!(self.graph[idx].kind(), NodeKind::EndEvent) {
                return true;
            }
        }
        false
    }

    /// No sequence touches the node.
    fn is_isolated(&self, idx: NodeIndex) -> bool {
        self.graph.neighbors_directed(idx, Incoming).next().is_none()
            && self.graph.neighbors_directed(idx, Outgoing).next().is_none()
    }

    /// Validate the soundness rules, reporting the first violation.
    ///
    /// The outcome is cached until the next structural change.
    pub fn check(&self) -> Result<(), ProcessError> {
        (*self.validity.get_or_init(|| self.validate())).map_err(ProcessError::InvalidProcess)
    }

    /// Whether [`Process::check`] passes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.check().is_ok()
    }

    /// Uncached soundness check.
    fn validate(&self) -> Result<(), InvalidRule> {
        if self.start_events().is_empty() {
            return Err(InvalidRule::NoStartEvent);
        }
        if self.end_events().is_empty() {
            return Err(InvalidRule::NoEndEvent);
        }
        if self.tasks().is_empty() {
            return Err(InvalidRule::NoTask);
        }

        let mut ordered: Vec<_> = self.nodes.iter().map(|(id, idx)| (*id, *idx)).collect();
        ordered.sort_unstable_by_key(|(id, _)| *id);
        for (id, idx) in ordered {
            if self.is_isolated(idx) {
                return Err(InvalidRule::Isolated(id));
            }
            let must_reach_end = !matches!(self.graph[idx].kind(), NodeKind::EndEvent);
            if must_reach_end && !self.reaches_end_event(idx) {
                return Err(InvalidRule::CannotReachEndEvent(id));
            }
        }
        Ok(())
    }
}

impl Clone for Process {
    /// Deep copy with identical ids, scripts and data objects; the copy is re-validated.
    fn clone(&self) -> Self {
        let copy = Self {
            name: self.name.clone(),
            graph: self.graph.clone(),
            nodes: self.nodes.clone(),
            sequences: self.sequences.clone(),
            data_objects: self.data_objects.clone(),
            next_id: self.next_id,
            validity: OnceLock::new(),
        };
        if let Err(e) = copy.check() {
            debug!(process = %copy.name, %e, "cloned an invalid process");
        }
        copy
    }
}
