//! Random block-structured process generation.
//!
//! Processes are grown top-down from a small grammar of single-entry/single-exit patterns. Every
//! production wires its children between gateways or tasks it creates itself, so the result is
//! sound by construction; the nesting depth is bounded, so generation always terminates.

/// Process evolution.
mod evolution;
/// Fragment bounds.
mod frame;

use std::sync::Arc;

use plg_core::model::{
    DataObjectKind,
    DataValue,
    Direction,
    Owner,
};
use plg_core::script::{
    ChoiceStringScript,
    UniformIntegerScript,
};
use plg_core::{
    ComponentId,
    Process,
    ProcessError,
};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use tracing::{
    debug,
    info,
    instrument,
};

pub use self::evolution::{
    evolve_process,
    evolve_task,
};
pub use self::frame::PatternFrame;
use crate::config::RandomizationConfiguration;
use crate::utils::alphabetic_label;

/// Name template of generated tasks.
pub const ACTIVITY_NAME_PREFIX: &str = "Activity ";
/// Name template of generated data objects.
pub const DATA_OBJECT_NAME_PREFIX: &str = "variable_";

/// Values generated string data objects choose from.
const STRING_VALUES: [&str; 5] = ["value_a", "value_b", "value_c", "value_d", "value_e"];

/// Productions of the block grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// One task.
    SingleActivity,
    /// Two fragments one after the other.
    Sequence,
    /// AND block with two or more branches.
    ParallelExecution,
    /// XOR block with two or more branches.
    MutualExclusion,
    /// XOR split/join pair with a back edge.
    Loop,
    /// Nothing at all.
    Skip,
}

/// Generate a new random process named `name`.
#[instrument(skip(config, rng))]
pub fn generate_process<R: Rng + ?Sized>(
    name: &str,
    config: &RandomizationConfiguration,
    rng: &mut R,
) -> anyhow::Result<Process> {
    config.validate()?;
    let mut process = Process::new(name);
    randomize_process(&mut process, config, rng)?;
    process.check()?;
    info!(
        tasks = process.tasks().len(),
        gateways = process.gateways().len(),
        sequences = process.sequences().len(),
        "process generated"
    );
    Ok(process)
}

/// Add a start event, an end event and a random fragment between them to `process`.
pub fn randomize_process<R: Rng + ?Sized>(
    process: &mut Process,
    config: &RandomizationConfiguration,
    rng: &mut R,
) -> Result<(), ProcessError> {
    let start = process.new_start_event();
    let end = process.new_end_event();
    let mut generator = ProcessGenerator::new(process, config, rng);
    let frame = generator.internal_pattern(1, true, false)?;
    PatternFrame::link(process, start, frame, end)
}

/// Grows fragments inside a process. Naming counters resume from the process's current size, so
/// one generator can extend an existing process without name clashes.
pub struct ProcessGenerator<'a, R: ?Sized> {
    /// Process being grown.
    process: &'a mut Process,
    /// Pattern weights and limits.
    config: &'a RandomizationConfiguration,
    /// Source of every random choice.
    rng: &'a mut R,
    /// Task names handed out so far.
    generated_activities: usize,
    /// Data object names handed out so far.
    generated_data_objects: usize,
}

impl<'a, R: Rng + ?Sized> ProcessGenerator<'a, R> {
    /// Generator extending `process`.
    pub fn new(process: &'a mut Process, config: &'a RandomizationConfiguration, rng: &'a mut R) -> Self {
        let generated_activities = process.tasks().len();
        let generated_data_objects = process.data_objects().count();
        Self {
            process,
            config,
            rng,
            generated_activities,
            generated_data_objects,
        }
    }

    /// Generate one fragment at nesting `depth`; `None` means the pattern was skipped.
    pub fn internal_pattern(
        &mut self,
        depth: usize,
        can_loop: bool,
        can_skip: bool,
    ) -> Result<Option<PatternFrame>, ProcessError> {
        let pattern = if depth > self.config.max_depth {
            let forced: &[Pattern] = if can_skip {
                &[Pattern::SingleActivity, Pattern::Skip]
            } else {
                &[Pattern::SingleActivity]
            };
            self.random_pattern(forced)
        } else {
            let mut options = vec![
                Pattern::SingleActivity,
                Pattern::Sequence,
                Pattern::ParallelExecution,
                Pattern::MutualExclusion,
            ];
            if can_skip {
                options.push(Pattern::Skip);
            }
            if can_loop {
                options.push(Pattern::Loop);
            }
            self.random_pattern(&options)
        };
        debug!(?pattern, depth, "pattern selected");

        match pattern {
            Pattern::SingleActivity => self.new_activity().map(Some),
            Pattern::Sequence => self.new_sequence(depth + 1, can_loop, can_skip),
            Pattern::ParallelExecution => self.new_and_branches(depth + 1, can_loop).map(Some),
            Pattern::MutualExclusion => self.new_xor_branches(depth + 1, can_loop, can_skip).map(Some),
            Pattern::Loop => self.new_loop(depth + 1).map(Some),
            Pattern::Skip => Ok(None),
        }
    }

    /// Roulette-wheel draw among `options`. Falls back to the first option when every weight
    /// is zero.
    fn random_pattern(&mut self, options: &[Pattern]) -> Pattern {
        let weights = options.iter().map(|p| self.config.weights.weight(*p));
        WeightedIndex::new(weights)
            .ok()
            .and_then(|dist| options.get(dist.sample(self.rng)).copied())
            .unwrap_or(Pattern::SingleActivity)
    }

    /// A uniquely named task, sometimes with a data object.
    fn new_activity(&mut self) -> Result<PatternFrame, ProcessError> {
        let name = self.ask_new_name();
        let task = self.process.new_task(name);
        if self.rng.gen_bool(self.config.data_object_probability) {
            let direction = if self.rng.gen_bool(0.5) { Direction::Generated } else { Direction::Required };
            self.new_data_object(Owner::Node(task), direction)?;
        }
        Ok(PatternFrame::single(task))
    }

    /// Two fragments chained; skipped halves drop out.
    fn new_sequence(&mut self, depth: usize, can_loop: bool, can_skip: bool) -> Result<Option<PatternFrame>, ProcessError> {
        let first = self.internal_pattern(depth, can_loop, can_skip)?;
        let second = self.internal_pattern(depth, can_loop, can_skip)?;
        PatternFrame::connect(self.process, first, second)
    }

    /// AND block; branches are never skipped.
    fn new_and_branches(&mut self, depth: usize, can_loop: bool) -> Result<PatternFrame, ProcessError> {
        let before = self.new_activity()?;
        let split = self.process.new_parallel_gateway();
        let join = self.process.new_parallel_gateway();
        let after = self.new_activity()?;

        let branches = self.rng.gen_range(2..=self.config.and_branches);
        for _ in 0..branches {
            let branch = self.internal_pattern(depth, can_loop, false)?;
            PatternFrame::link(self.process, split, branch, join)?;
        }
        self.close_block(before, split, join, after)
    }

    /// XOR block whose branches may carry guard data objects.
    fn new_xor_branches(&mut self, depth: usize, can_loop: bool, can_skip: bool) -> Result<PatternFrame, ProcessError> {
        let before = self.new_activity()?;
        let split = self.process.new_exclusive_gateway();
        let join = self.process.new_exclusive_gateway();
        let after = self.new_activity()?;

        let branches = self.rng.gen_range(2..=self.config.xor_branches);
        for _ in 0..branches {
            let branch = self.internal_pattern(depth, can_loop, can_skip)?;
            let target = branch.map_or(join, |b| b.entry());
            PatternFrame::link(self.process, split, branch, join)?;
            if self.rng.gen_bool(self.config.data_object_probability) {
                if let Some(guard) = self.process.get_sequence(split, target) {
                    self.new_data_object(Owner::Sequence(guard), Direction::Required)?;
                }
            }
        }
        self.close_block(before, split, join, after)
    }

    /// Loop block; body and rollback contain no nested loop.
    fn new_loop(&mut self, depth: usize) -> Result<PatternFrame, ProcessError> {
        let before = self.new_activity()?;
        let split = self.process.new_exclusive_gateway();
        let join = self.process.new_exclusive_gateway();
        let after = self.new_activity()?;

        let body = self.internal_pattern(depth, false, false)?;
        let rollback = self.internal_pattern(depth, false, true)?;
        PatternFrame::link(self.process, split, body, join)?;
        PatternFrame::link(self.process, join, rollback, split)?;
        self.close_block(before, split, join, after)
    }

    /// Attach the entry task before `split` and the exit task after `join`.
    fn close_block(
        &mut self,
        before: PatternFrame,
        split: ComponentId,
        join: ComponentId,
        after: PatternFrame,
    ) -> Result<PatternFrame, ProcessError> {
        self.process.new_sequence(before.exit(), split)?;
        self.process.new_sequence(join, after.entry())?;
        Ok(PatternFrame::new(before.entry(), after.exit()))
    }

    /// Attach a fresh data object to `owner`.
    fn new_data_object(&mut self, owner: Owner, direction: Direction) -> Result<ComponentId, ProcessError> {
        let name = self.ask_new_data_object_name();
        let kind = match owner {
            Owner::Sequence(_) => {
                DataObjectKind::Plain(DataValue::Text((*STRING_VALUES.choose(self.rng).unwrap_or(&"value_a")).into()))
            },
            Owner::Node(_) if self.rng.gen_bool(0.5) => {
                DataObjectKind::Integer(Arc::new(UniformIntegerScript { min: 0, max: 100 }))
            },
            Owner::Node(_) => DataObjectKind::String(Arc::new(ChoiceStringScript {
                values: STRING_VALUES.iter().map(|&v| v.to_owned()).collect(),
            })),
        };
        self.process.new_data_object(name, kind, Some((owner, direction)))
    }

    /// Next unused data object name.
    fn ask_new_data_object_name(&mut self) -> String {
        loop {
            self.generated_data_objects += 1;
            let label = alphabetic_label(self.generated_data_objects).to_lowercase();
            let name = format!("{DATA_OBJECT_NAME_PREFIX}{label}");
            if self.process.find_data_object(&name).is_none() {
                return name;
            }
        }
    }

    /// Next unused task name.
    fn ask_new_name(&mut self) -> String {
        loop {
            self.generated_activities += 1;
            let name = format!("{ACTIVITY_NAME_PREFIX}{}", alphabetic_label(self.generated_activities));
            if self.process.find_task(&name).is_none() {
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assertables::*;
    use plg_core::model::NodeKind;
    use rand::rngs::StdRng;
    use rstest::*;

    use super::*;
    use crate::config::PatternWeights;

    fn only(pattern: Pattern) -> RandomizationConfiguration {
        let mut weights = PatternWeights {
            single_activity: 0.0,
            sequence: 0.0,
            parallel_execution: 0.0,
            mutual_exclusion: 0.0,
            loop_: 0.0,
            skip: 0.0,
        };
        match pattern {
            Pattern::SingleActivity => weights.single_activity = 1.0,
            Pattern::Sequence => weights.sequence = 1.0,
            Pattern::ParallelExecution => weights.parallel_execution = 1.0,
            Pattern::MutualExclusion => weights.mutual_exclusion = 1.0,
            Pattern::Loop => weights.loop_ = 1.0,
            Pattern::Skip => weights.skip = 1.0,
        }
        RandomizationConfiguration { weights, max_depth: 2, ..Default::default() }
    }

    #[rstest]
    fn test_single_activity_process() {
        let config = only(Pattern::SingleActivity);
        let process = generate_process("single", &config, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(process.tasks().len(), 1);
        assert_eq!(process.find_task("Activity A"), process.tasks().first().copied());
        assert_eq!(process.sequences().len(), 2);
    }

    #[rstest]
    fn test_loop_only_weights_still_terminate() {
        let config = only(Pattern::Loop);
        for seed in 0..20 {
            let process = generate_process("loops", &config, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert!(process.is_valid());
        }
    }

    #[rstest]
    fn test_zero_weights_fall_back_to_activity() {
        let mut config = only(Pattern::Skip);
        config.weights.skip = 0.0;
        let process = generate_process("empty_weights", &config, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(process.tasks().len(), 1);
    }

    #[rstest]
    fn test_and_block_shape() {
        let config = RandomizationConfiguration { max_depth: 1, ..only(Pattern::ParallelExecution) };
        let process = generate_process("and", &config, &mut StdRng::seed_from_u64(5)).unwrap();

        let gateways = process.gateways();
        assert_eq!(gateways.len(), 2);
        let (split, join) = (gateways[0], gateways[1]);
        assert_ge!(process.outgoing(split).len(), 2);
        assert_le!(process.outgoing(split).len(), 5);
        assert_eq!(process.outgoing(split).len(), process.incoming(join).len());
        assert!(matches!(process.node(split).map(|n| n.kind()), Some(NodeKind::ParallelGateway)));
    }

    #[rstest]
    fn test_loop_block_has_back_edge() {
        let config = RandomizationConfiguration { max_depth: 1, ..only(Pattern::Loop) };
        let process = generate_process("loop", &config, &mut StdRng::seed_from_u64(8)).unwrap();
        let gateways = process.gateways();
        let (split, join) = (gateways[0], gateways[1]);
        // join -> (rollback ->)* split
        assert!(process.can_reach_end_event(split));
        assert!(process.outgoing(join).iter().any(|&n| n == split || process.outgoing(n).contains(&split)));
    }

    #[rstest]
    fn test_names_unique_when_extending() {
        let config = RandomizationConfiguration::default();
        let mut rng = StdRng::seed_from_u64(13);
        let mut process = generate_process("base", &config, &mut rng).unwrap();
        let mut generator = ProcessGenerator::new(&mut process, &config, &mut rng);
        generator.internal_pattern(1, true, false).unwrap();

        let names: Vec<_> = process
            .flow_objects()
            .filter_map(|n| n.as_task().map(|t| t.name().to_owned()))
            .collect();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[rstest]
    fn test_invalid_configuration_rejected() {
        let config = RandomizationConfiguration { and_branches: 1, ..Default::default() };
        assert!(generate_process("bad", &config, &mut StdRng::seed_from_u64(0)).is_err());
    }
}
