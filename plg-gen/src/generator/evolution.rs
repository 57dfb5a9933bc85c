//! Deriving a variant of an existing process by splicing fresh fragments in place of tasks.

use plg_core::{
    ComponentId,
    Process,
    ProcessError,
};
use rand::prelude::*;
use tracing::{
    debug,
    info,
    instrument,
};

use super::{
    PatternFrame,
    ProcessGenerator,
};
use crate::config::{
    EvolutionConfiguration,
    RandomizationConfiguration,
};

/// Return an evolved copy of `original` named "Evolution of <name>".
///
/// Every task of the original is replaced with probability `activity_evolution_probability`.
/// When no replacement took place, one random task is evolved unconditionally.
#[instrument(skip_all, fields(process = %original.name()))]
pub fn evolve_process<R: Rng + ?Sized>(
    original: &Process,
    config: &EvolutionConfiguration,
    rng: &mut R,
) -> anyhow::Result<Process> {
    config.validate()?;
    original.check()?;

    let mut process = original.clone();
    process.set_name(format!("Evolution of {}", original.name()));

    let mut evolved = 0;
    for task in original.tasks() {
        if rng.gen_bool(config.activity_evolution_probability) && evolve_task(&mut process, task, &config.randomization, rng)? {
            evolved += 1;
        }
    }
    if evolved == 0 {
        if let Some(&task) = process.tasks().choose(rng) {
            if evolve_task(&mut process, task, &config.randomization, rng)? {
                evolved += 1;
            }
        }
    }

    info!(evolved, tasks = process.tasks().len(), "process evolved");
    Ok(process)
}

/// Replace `task` with a freshly generated fragment, or bypass it when the fragment is skipped.
///
/// The change is made on a copy and only kept if the result is still a valid process; returns
/// whether it was kept.
pub fn evolve_task<R: Rng + ?Sized>(
    process: &mut Process,
    task: ComponentId,
    config: &RandomizationConfiguration,
    rng: &mut R,
) -> Result<bool, ProcessError> {
    let mut candidate = process.clone();
    splice(&mut candidate, task, config, rng)?;
    match candidate.check() {
        Ok(()) => {
            debug!(%task, "task evolved");
            *process = candidate;
            Ok(true)
        },
        Err(e) => {
            debug!(%task, %e, "evolution rolled back");
            Ok(false)
        },
    }
}

/// Replace `task` by a fresh fragment, or bypass it when the fragment is skipped.
fn splice<R: Rng + ?Sized>(
    process: &mut Process,
    task: ComponentId,
    config: &RandomizationConfiguration,
    rng: &mut R,
) -> Result<(), ProcessError> {
    if process.node(task).and_then(|n| n.as_task()).is_none() {
        return Err(ProcessError::UnknownComponent(task));
    }
    let incoming = process.incoming(task);
    let outgoing = process.outgoing(task);

    let fragment = ProcessGenerator::new(process, config, rng).internal_pattern(1, true, true)?;
    match fragment {
        Some(frame) => {
            for &from in &incoming {
                PatternFrame::link(process, from, None, frame.entry())?;
            }
            for &to in &outgoing {
                PatternFrame::link(process, frame.exit(), None, to)?;
            }
        },
        None => {
            for &from in &incoming {
                for &to in &outgoing {
                    process.new_sequence(from, to)?;
                }
            }
        },
    }
    process.remove_component(task)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rstest::*;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::PatternWeights;

    #[fixture]
    fn chain() -> (Process, Vec<ComponentId>) {
        let mut p = Process::new("chain");
        let start = p.new_start_event();
        let tasks: Vec<_> = ["Activity A", "Activity B", "Activity C"].into_iter().map(|n| p.new_task(n)).collect();
        let end = p.new_end_event();
        p.new_sequence(start, tasks[0]).unwrap();
        p.new_sequence(tasks[0], tasks[1]).unwrap();
        p.new_sequence(tasks[1], tasks[2]).unwrap();
        p.new_sequence(tasks[2], end).unwrap();
        (p, tasks)
    }

    fn skipping() -> RandomizationConfiguration {
        RandomizationConfiguration {
            weights: PatternWeights {
                single_activity: 0.0,
                sequence: 0.0,
                parallel_execution: 0.0,
                mutual_exclusion: 0.0,
                loop_: 0.0,
                skip: 1.0,
            },
            ..Default::default()
        }
    }

    #[rstest]
    fn test_skip_bypasses_task(chain: (Process, Vec<ComponentId>)) {
        let (mut p, tasks) = chain;
        let mut rng = StdRng::seed_from_u64(1);
        assert!(evolve_task(&mut p, tasks[1], &skipping(), &mut rng).unwrap());

        assert!(p.node(tasks[1]).is_none());
        assert!(p.get_sequence(tasks[0], tasks[2]).is_some());
        assert!(p.is_valid());
    }

    #[rstest]
    fn test_evolution_renames_and_keeps_original(chain: (Process, Vec<ComponentId>)) {
        let (p, _) = chain;
        let config = EvolutionConfiguration { activity_evolution_probability: 0.5, ..Default::default() };
        for seed in 0..20 {
            let evolved = evolve_process(&p, &config, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert_eq!(evolved.name(), "Evolution of chain");
            assert!(evolved.is_valid());
            assert_eq!(p.tasks().len(), 3);
        }
    }

    #[rstest]
    fn test_evolution_always_changes_something(chain: (Process, Vec<ComponentId>)) {
        let (p, _) = chain;
        let config = EvolutionConfiguration { activity_evolution_probability: 0.0, ..Default::default() };
        let evolved = evolve_process(&p, &config, &mut StdRng::seed_from_u64(4)).unwrap();
        assert_ne!(evolved.tasks(), p.tasks());
    }

    #[test]
    #[traced_test]
    fn test_invalidating_change_is_rolled_back() {
        let mut p = Process::new("lonely");
        let start = p.new_start_event();
        let a = p.new_task("Activity A");
        let end = p.new_end_event();
        p.new_sequence(start, a).unwrap();
        p.new_sequence(a, end).unwrap();

        // skipping the only task would leave a process without tasks
        let kept = evolve_task(&mut p, a, &skipping(), &mut StdRng::seed_from_u64(2)).unwrap();
        assert!(!kept);
        assert!(p.node(a).is_some());
        assert!(logs_contain("evolution rolled back"));
    }

    #[rstest]
    fn test_unknown_task_rejected(chain: (Process, Vec<ComponentId>)) {
        let (mut p, _) = chain;
        let start = p.start_events()[0];
        let res = evolve_task(&mut p, start, &RandomizationConfiguration::default(), &mut StdRng::seed_from_u64(0));
        assert_eq!(res, Err(ProcessError::UnknownComponent(start)));
    }
}
