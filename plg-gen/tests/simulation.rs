use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use std::sync::Arc;

use assertables::*;
use plg_core::script::FixedTiming;
use plg_core::{
    ComponentId,
    Process,
};
use plg_gen::config::{
    RandomizationConfiguration,
    SimulationConfiguration,
};
use plg_gen::generate_process;
use plg_gen::noise::NoiseConfiguration;
use plg_gen::simulation::{
    Lifecycle,
    LogGenerator,
    SimulationEngine,
    TraceGenerator,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstest::*;

fn connect(p: &mut Process, edges: &[(ComponentId, ComponentId)]) {
    for &(from, to) in edges {
        p.new_sequence(from, to).unwrap();
    }
}

fn timed(p: &mut Process, name: &str, duration: i64) -> ComponentId {
    let id = p.new_task(name);
    p.set_task_timing(id, Some(Arc::new(FixedTiming { duration, time_after: 0 }))).unwrap();
    id
}

/// start -> A -> x1 -> B -> x2 -> end, with the back edge x2 -> x1
#[fixture]
fn looping() -> Process {
    let mut p = Process::new("looping");
    let start = p.new_start_event();
    let a = timed(&mut p, "A", 0);
    let x1 = p.new_exclusive_gateway();
    let b = timed(&mut p, "B", 1);
    let x2 = p.new_exclusive_gateway();
    let end = p.new_end_event();
    connect(&mut p, &[(start, a), (a, x1), (x1, b), (b, x2), (x2, x1), (x2, end)]);
    p
}

#[rstest]
fn test_single_instant_task() {
    let mut p = Process::new("single");
    let start = p.new_start_event();
    let a = timed(&mut p, "A", 0);
    let end = p.new_end_event();
    connect(&mut p, &[(start, a), (a, end)]);

    let config = SimulationConfiguration { number_of_traces: 3, seed: Some(0), ..Default::default() };
    let noise = NoiseConfiguration::none();
    let log = LogGenerator::new(&p, &config, &noise).generate(&()).unwrap();

    assert_eq!(log.traces.len(), 3);
    for trace in &log.traces {
        assert_eq!(trace.events.len(), 1);
        assert_eq!(trace.events[0].activity, "A");
        assert_eq!(trace.events[0].timestamp, 0);
        assert_eq!(trace.events[0].lifecycle, Lifecycle::None);
        assert!(trace.attributes.is_empty());
    }
}

#[rstest]
#[case(2, 7)]
#[case(12, 3)]
fn test_join_time_is_max_of_branches(#[case] d1: i64, #[case] d2: i64) {
    let mut p = Process::new("and");
    let start = p.new_start_event();
    let split = p.new_parallel_gateway();
    let a = timed(&mut p, "A", d1);
    let b = timed(&mut p, "B", d2);
    let join = p.new_parallel_gateway();
    let c = timed(&mut p, "C", 0);
    let end = p.new_end_event();
    connect(&mut p, &[(start, split), (split, a), (split, b), (a, join), (b, join), (join, c), (c, end)]);

    let config = SimulationConfiguration::default();
    let noise = NoiseConfiguration::none();
    let mut rng = StdRng::seed_from_u64(17);
    for i in 0..20 {
        let trace = TraceGenerator::new(&p, format!("case_{i}"), &config, &noise).generate(&mut rng).unwrap();
        let c_event = trace.events.iter().find(|e| e.activity == "C").unwrap();
        assert_eq!(c_event.timestamp, d1.max(d2) * 1000);
        assert_ne!(c_event.timestamp, (d1 + d2) * 1000);
    }
}

#[rstest]
fn test_loop_visits_are_softly_capped(looping: Process) {
    let max_loop_cycles = 3;
    let config = SimulationConfiguration {
        number_of_traces: 1000,
        max_loop_cycles,
        seed: Some(21),
        ..Default::default()
    };
    let noise = NoiseConfiguration::none();
    let log = LogGenerator::new(&looping, &config, &noise).generate(&()).unwrap();
    assert_eq!(log.traces.len(), 1000);

    // B emits a start and a complete event per pass; every pass after the first used the back edge
    let mut back_edges: Vec<usize> = log
        .traces
        .iter()
        .map(|t| t.events.iter().filter(|e| e.activity == "B" && e.lifecycle == Lifecycle::Start).count() - 1)
        .collect();
    back_edges.sort_unstable();
    let median = back_edges[back_edges.len() / 2];
    assert_le!(median, max_loop_cycles as usize + 1);
}

#[rstest]
fn test_seeded_logs_are_reproducible_across_workers() {
    let process = generate_process("p", &RandomizationConfiguration::default(), &mut StdRng::seed_from_u64(3)).unwrap();
    let noise = NoiseConfiguration::complete();
    let parallel = SimulationConfiguration { number_of_traces: 200, seed: Some(8), ..Default::default() };
    let serial = SimulationConfiguration { multithreading: false, ..parallel.clone() };

    let a = LogGenerator::new(&process, &parallel, &noise).generate(&()).unwrap();
    let b = LogGenerator::new(&process, &serial, &noise).generate(&()).unwrap();
    assert_eq!(a, b);
    assert!(a.failures.is_empty());

    let ids: Vec<_> = a.traces.iter().map(|t| t.case_id.clone()).collect();
    let expected: Vec<_> = (0..200).map(|i| format!("case_{i}")).collect();
    assert_eq!(ids, expected);
}

#[rstest]
fn test_generated_processes_simulate() {
    let config = SimulationConfiguration { number_of_traces: 50, seed: Some(1), ..Default::default() };
    let noise = NoiseConfiguration::none();
    for seed in 0..10 {
        let process = generate_process("p", &RandomizationConfiguration::default(), &mut StdRng::seed_from_u64(seed)).unwrap();
        let ticks = AtomicUsize::new(0);
        let log = LogGenerator::new(&process, &config, &noise).generate(&ticks).unwrap();
        assert_eq!(ticks.load(Ordering::Relaxed), 50);
        assert_eq!(log.traces.len(), 50);
        for trace in &log.traces {
            assert!(!trace.events.is_empty());
            assert!(trace.events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }
}

#[rstest]
fn test_pool_isolates_failing_job() {
    let engine = SimulationEngine::new(4, 4);
    let ticks = AtomicUsize::new(0);
    let jobs = (0..50).map(|i| {
        let label = format!("case_{i}");
        let job = move || -> anyhow::Result<usize> {
            anyhow::ensure!(i != 17, "case {i} always fails");
            Ok(i)
        };
        (label, job)
    });
    let report = engine.run(jobs, &ticks);

    assert_eq!(report.successes().count(), 49);
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.failures().next().map(|o| o.label.as_str()), Some("case_17"));
    assert_eq!(ticks.load(Ordering::Relaxed), 50);
}
