use std::collections::HashSet;

use plg_core::model::NodeKind;
use plg_core::Process;
use plg_gen::config::{
    EvolutionConfiguration,
    PatternWeights,
    RandomizationConfiguration,
};
use plg_gen::{
    evolve_process,
    generate_process,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstest::*;

fn weights(single_activity: f64, sequence: f64, and: f64, xor: f64, loop_: f64, skip: f64) -> PatternWeights {
    PatternWeights {
        single_activity,
        sequence,
        parallel_execution: and,
        mutual_exclusion: xor,
        loop_,
        skip,
    }
}

fn task_names(process: &Process) -> Vec<String> {
    process
        .flow_objects()
        .filter_map(|n| n.as_task().map(|t| t.name().to_owned()))
        .collect()
}

#[rstest]
#[case::defaults(RandomizationConfiguration::default())]
#[case::deep(RandomizationConfiguration { max_depth: 5, ..Default::default() })]
#[case::loops_only(RandomizationConfiguration { weights: weights(0.0, 0.0, 0.0, 0.0, 1.0, 0.0), ..Default::default() })]
#[case::loop_heavy(RandomizationConfiguration { weights: weights(0.1, 0.5, 0.3, 0.3, 1.0, 1.0), max_depth: 4, ..Default::default() })]
#[case::skip_heavy(RandomizationConfiguration { weights: weights(0.0, 1.0, 0.0, 1.0, 0.0, 1.0), ..Default::default() })]
#[case::two_branches(RandomizationConfiguration { and_branches: 2, xor_branches: 2, data_object_probability: 1.0, ..Default::default() })]
fn test_generated_processes_are_sound(#[case] config: RandomizationConfiguration) {
    for seed in 0..25 {
        let process = generate_process("random", &config, &mut StdRng::seed_from_u64(seed)).unwrap();
        assert_eq!(process.check(), Ok(()), "seed {seed}");
        assert_eq!(process.start_events().len(), 1);
        assert_eq!(process.end_events().len(), 1);

        let names = task_names(&process);
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len(), "duplicate task names for seed {seed}");
    }
}

#[rstest]
fn test_parallel_blocks_are_balanced() {
    let config = RandomizationConfiguration {
        weights: weights(0.2, 0.5, 1.0, 0.2, 0.1, 0.1),
        max_depth: 4,
        ..Default::default()
    };
    for seed in 0..25 {
        let process = generate_process("parallel", &config, &mut StdRng::seed_from_u64(seed)).unwrap();
        let mut split_degrees = Vec::new();
        let mut join_degrees = Vec::new();
        for gateway in process.gateways() {
            let Some(NodeKind::ParallelGateway) = process.node(gateway).map(|n| n.kind()) else {
                continue;
            };
            let (ins, outs) = (process.incoming(gateway).len(), process.outgoing(gateway).len());
            if outs > 1 {
                split_degrees.push(outs);
            } else {
                join_degrees.push(ins);
            }
        }
        split_degrees.sort_unstable();
        join_degrees.sort_unstable();
        assert_eq!(split_degrees, join_degrees, "seed {seed}");
    }
}

#[rstest]
fn test_clone_matches_original() {
    let process = generate_process("original", &RandomizationConfiguration::default(), &mut StdRng::seed_from_u64(99)).unwrap();
    let copy = process.clone();
    assert_eq!(copy.check(), process.check());
    assert_eq!(copy.tasks(), process.tasks());
    assert_eq!(copy.gateways(), process.gateways());
    assert_eq!(copy.sequences(), process.sequences());
    assert_eq!(task_names(&copy), task_names(&process));
}

#[rstest]
fn test_evolved_processes_stay_sound() {
    let config = EvolutionConfiguration { activity_evolution_probability: 0.3, ..Default::default() };
    for seed in 0..15 {
        let mut rng = StdRng::seed_from_u64(seed);
        let original = generate_process("base", &config.randomization, &mut rng).unwrap();
        let evolved = evolve_process(&original, &config, &mut rng).unwrap();

        assert!(evolved.is_valid(), "seed {seed}");
        assert_eq!(evolved.name(), "Evolution of base");
        let names = task_names(&evolved);
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}

#[rstest]
fn test_same_seed_same_process() {
    let config = RandomizationConfiguration::default();
    let a = generate_process("p", &config, &mut StdRng::seed_from_u64(5)).unwrap();
    let b = generate_process("p", &config, &mut StdRng::seed_from_u64(5)).unwrap();
    assert_eq!(task_names(&a), task_names(&b));
    assert_eq!(a.sequences(), b.sequences());
}

#[rstest]
fn test_evolved_data_object_names_stay_unique() {
    let config = EvolutionConfiguration {
        activity_evolution_probability: 0.5,
        randomization: RandomizationConfiguration { data_object_probability: 1.0, ..Default::default() },
    };
    for seed in 0..30 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut process = generate_process("data", &config.randomization, &mut rng).unwrap();
        for _ in 0..3 {
            process = evolve_process(&process, &config, &mut rng).unwrap();
            let names: Vec<_> = process.data_objects().map(|d| d.name().to_owned()).collect();
            let unique: HashSet<_> = names.iter().collect();
            assert_eq!(unique.len(), names.len(), "duplicate data object names for seed {seed}");
        }
    }
}
