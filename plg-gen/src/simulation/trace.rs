use std::collections::{
    HashMap,
    HashSet,
};

use petgraph::stable_graph::{
    EdgeIndex,
    NodeIndex,
};
use petgraph::visit::EdgeRef;
use petgraph::Direction::{
    Incoming,
    Outgoing,
};
use plg_core::model::{
    DataObject,
    Direction,
    NodeKind,
    Owner,
};
use plg_core::{
    InvalidRule,
    Process,
    ProcessError,
};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use tracing::{
    instrument,
    trace,
};

use super::log::{
    Event,
    Lifecycle,
    Trace,
};
use super::SimulationError;
use crate::config::SimulationConfiguration;
use crate::noise::{
    NoiseConfiguration,
    NoiseProcessor,
};

/// Selection weight of a sequence that has been traversed more than `max_loop_cycles` times.
///
/// The weight is collapsed rather than zeroed, so a process whose only way forward is an
/// over-used sequence still terminates.
pub const LOOP_CAPPED_WEIGHT: f64 = 0.001;

/// Script durations are in seconds, timestamps in milliseconds.
const MS_PER_SECOND: i64 = 1000;

/// Weight of a sequence already traversed `observed` times.
#[must_use]
pub fn sequence_weight(observed: u32, max_loop_cycles: u32) -> f64 {
    if observed > max_loop_cycles {
        LOOP_CAPPED_WEIGHT
    } else {
        1.0
    }
}

/// Plays the token game of a process for a single case.
pub struct TraceGenerator<'a> {
    /// Process to simulate.
    process: &'a Process,
    /// Case being simulated.
    case_id: String,
    /// Simulation settings.
    config: &'a SimulationConfiguration,
    /// Noise applied to values and the finished trace.
    noise: NoiseProcessor<'a>,
}

impl<'a> TraceGenerator<'a> {
    /// Generator of case `case_id`.
    #[must_use]
    pub fn new(
        process: &'a Process,
        case_id: impl Into<String>,
        config: &'a SimulationConfiguration,
        noise: &'a NoiseConfiguration,
    ) -> Self {
        Self {
            process,
            case_id: case_id.into(),
            config,
            noise: NoiseProcessor::new(noise),
        }
    }

    /// Simulate one case.
    ///
    /// Fails when the process is not sound or when one of its scripts fails for this case.
    #[instrument(level = "debug", skip_all, fields(case_id = %self.case_id))]
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Trace, SimulationError> {
        self.process.check()?;
        let start = self
            .process
            .start_events()
            .choose(rng)
            .and_then(|&id| self.process.node_index(id))
            .ok_or(ProcessError::InvalidProcess(InvalidRule::NoStartEvent))?;

        let mut run = Run::new(self, rng);
        run.pending.push(Firing { via: None, node: start, time: 0 });
        while let Some(firing) = run.pending.pop() {
            run.fire(firing)?;
        }
        let Run { mut events, rng, .. } = run;

        let mut trace = Trace::new(self.case_id.clone());
        for object in self.process.case_data_objects() {
            let value = self.noise.apply_data_noise(&object.generate(&self.case_id)?, rng);
            trace.attributes.insert(object.name().to_owned(), value.value);
        }

        events.sort_by_key(|e| e.timestamp);
        self.noise.apply_trace_noise(&mut events, rng);
        trace.events = events;
        Ok(trace)
    }
}

/// A node about to execute, reached through `via` at relative time `time` (ms).
#[derive(Clone, Copy, Debug)]
struct Firing {
    /// Sequence the token arrived on. `None` for the start event.
    via: Option<EdgeIndex>,
    /// Node to execute.
    node: NodeIndex,
    /// Arrival time.
    time: i64,
}

/// State of one run. Nothing here outlives the trace it produces.
struct Run<'g, 'r, R: ?Sized> {
    /// Owner of the process and settings.
    generator: &'g TraceGenerator<'g>,
    /// Case rng.
    rng: &'r mut R,
    /// Nodes waiting to fire, as a stack.
    pending: Vec<Firing>,
    /// Sequences holding a token.
    tokens: HashSet<EdgeIndex>,
    /// Times each sequence was traversed.
    observations: HashMap<EdgeIndex, u32>,
    /// Latest completion time of each node.
    completion: HashMap<NodeIndex, i64>,
    /// Events recorded so far.
    events: Vec<Event>,
}

impl<'g, 'r, R: Rng + ?Sized> Run<'g, 'r, R> {
    /// Empty run.
    fn new(generator: &'g TraceGenerator<'g>, rng: &'r mut R) -> Self {
        Self {
            generator,
            rng,
            pending: Vec::new(),
            tokens: HashSet::new(),
            observations: HashMap::new(),
            completion: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Execute `node` and route its token onwards.
    fn fire(&mut self, Firing { via, node, time }: Firing) -> Result<(), SimulationError> {
        let graph = self.generator.process.graph();
        let elapsed = self.execute(node, time)?;
        self.completion.insert(node, time + elapsed);
        if let Some(edge) = via {
            *self.observations.entry(edge).or_default() += 1;
        }

        match graph[node].kind() {
            NodeKind::StartEvent | NodeKind::Task(_) | NodeKind::ExclusiveGateway => {
                self.consume(via);
                self.advance(node, time + elapsed)
            },
            NodeKind::ParallelGateway if graph.edges_directed(node, Outgoing).count() > 1 => {
                self.consume(via);
                self.split(node, time);
                Ok(())
            },
            NodeKind::ParallelGateway if graph.edges_directed(node, Incoming).count() > 1 => self.join(node, time),
            NodeKind::ParallelGateway => {
                self.consume(via);
                self.advance(node, time)
            },
            NodeKind::EndEvent => {
                self.consume(via);
                trace!(node = %graph[node], time, "branch completed");
                Ok(())
            },
        }
    }

    /// Drop the token on `via`.
    fn consume(&mut self, via: Option<EdgeIndex>) {
        if let Some(edge) = via {
            self.tokens.remove(&edge);
        }
    }

    /// Record the events of a task starting at `time`, returning the time it holds the case.
    fn execute(&mut self, node: NodeIndex, time: i64) -> Result<i64, SimulationError> {
        let process = self.generator.process;
        let case_id = self.generator.case_id.as_str();
        let flow_object = &process.graph()[node];
        let NodeKind::Task(task) = flow_object.kind() else {
            return Ok(0);
        };

        let name = self.generator.noise.activity_name(task.name(), self.rng);
        let duration = task.duration(case_id)? * MS_PER_SECOND;
        let first = self.events.len();
        self.events.push(Event::new(name.clone(), Lifecycle::None, time));
        if duration > 0 {
            self.events[first].lifecycle = Lifecycle::Start;
            self.events.push(Event::new(name, Lifecycle::Complete, time + duration));
        }

        let generated: Vec<_> = process
            .data_objects_of(Owner::Node(flow_object.id()), Direction::Generated)
            .collect();
        self.decorate(&generated, first)?;

        Ok(duration + task.time_after(case_id)? * MS_PER_SECOND)
    }

    /// Attach the values of `objects` to every event from index `from` onwards.
    fn decorate(&mut self, objects: &[&DataObject], from: usize) -> Result<(), SimulationError> {
        let case_id = self.generator.case_id.as_str();
        for object in objects {
            let generated = object.generate(case_id)?;
            for event in &mut self.events[from..] {
                let value = self.generator.noise.apply_data_noise(&generated, self.rng);
                event.attributes.insert(object.name().to_owned(), value.value);
            }
        }
        Ok(())
    }

    /// Pick one outgoing sequence of `node`, favouring those below the loop cap.
    fn choose_outgoing(&mut self, node: NodeIndex) -> Option<(EdgeIndex, NodeIndex)> {
        let graph = self.generator.process.graph();
        let max_loop_cycles = self.generator.config.max_loop_cycles;
        let mut candidates: Vec<_> = graph
            .edges_directed(node, Outgoing)
            .map(|e| (e.weight().id(), e.id(), e.target()))
            .collect();
        candidates.sort_unstable_by_key(|(id, ..)| *id);

        let weights = candidates
            .iter()
            .map(|(_, edge, _)| sequence_weight(self.observations.get(edge).copied().unwrap_or(0), max_loop_cycles));
        let chosen = WeightedIndex::new(weights).ok()?.sample(self.rng);
        candidates.get(chosen).map(|&(_, edge, target)| (edge, target))
    }

    /// Move the token of `node` to one successor, recording data required on the way.
    fn advance(&mut self, node: NodeIndex, time: i64) -> Result<(), SimulationError> {
        let Some((edge, next)) = self.choose_outgoing(node) else {
            return Ok(());
        };
        let process = self.generator.process;
        if let Some(last) = self.events.len().checked_sub(1) {
            let sequence = process.graph()[edge].id();
            let mut required: Vec<_> = process.data_objects_owned_by(Owner::Sequence(sequence)).collect();
            required.extend(process.data_objects_of(Owner::Node(process.graph()[next].id()), Direction::Required));
            self.decorate(&required, last)?;
        }
        self.tokens.insert(edge);
        self.pending.push(Firing { via: Some(edge), node: next, time });
        Ok(())
    }

    /// Put a token on every outgoing sequence of an AND-split.
    ///
    /// Branches are pushed directly, so the data objects of the split's sequences and the
    /// required data objects of each branch's first node are not recorded.
    fn split(&mut self, node: NodeIndex, time: i64) {
        let graph = self.generator.process.graph();
        let mut branches: Vec<_> = graph.edges_directed(node, Outgoing).map(|e| (e.id(), e.target())).collect();
        branches.sort_unstable_by_key(|(edge, _)| graph[*edge].id());
        self.tokens.extend(branches.iter().map(|(edge, _)| *edge));
        branches.shuffle(self.rng);

        // the stack is LIFO: push in reverse so the first shuffled branch runs first
        for (edge, next) in branches.into_iter().rev() {
            self.pending.push(Firing { via: Some(edge), node: next, time });
        }
    }

    /// Fire an AND-join once every incoming sequence holds a token.
    fn join(&mut self, node: NodeIndex, time: i64) -> Result<(), SimulationError> {
        let graph = self.generator.process.graph();
        let incoming: Vec<_> = graph.edges_directed(node, Incoming).map(|e| (e.id(), e.source())).collect();
        if !incoming.iter().all(|(edge, _)| self.tokens.contains(edge)) {
            trace!(node = %graph[node], "join waiting for siblings");
            return Ok(());
        }

        let ready_at = incoming
            .iter()
            .filter_map(|(_, source)| self.completion.get(source).copied())
            .max()
            .unwrap_or(time);
        for (edge, _) in &incoming {
            self.tokens.remove(edge);
        }
        self.completion.insert(node, ready_at);
        self.advance(node, ready_at)
    }
}
