use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{
    DateTime,
    TimeDelta,
    Utc,
};
use plg_core::model::DataValue;
use plg_core::Process;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    info,
    instrument,
};

use super::engine::{
    CancellationToken,
    Progress,
    SimulationEngine,
};
use super::trace::TraceGenerator;
use crate::config::SimulationConfiguration;
use crate::noise::NoiseConfiguration;
use crate::utils::trace_rng;

/// Lifecycle transition recorded by an event. Instantaneous tasks produce a single
/// [`Lifecycle::None`] event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Work on the activity began.
    Start,
    /// Work on the activity ended.
    Complete,
    /// Instantaneous activity.
    None,
}

/// One observed activity occurrence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Activity name.
    pub activity: String,
    /// Lifecycle transition.
    pub lifecycle: Lifecycle,
    /// Milliseconds since the start of the case.
    pub timestamp: i64,
    /// Data objects written by the activity.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, DataValue>,
}

impl Event {
    /// Event without attributes.
    #[must_use]
    pub fn new(activity: impl Into<String>, lifecycle: Lifecycle, timestamp: i64) -> Self {
        Self {
            activity: activity.into(),
            lifecycle,
            timestamp,
            attributes: BTreeMap::new(),
        }
    }

    /// Wall-clock time of the event for a case starting at `epoch`.
    #[must_use]
    pub fn absolute_time(&self, epoch: DateTime<Utc>) -> Option<DateTime<Utc>> {
        epoch.checked_add_signed(TimeDelta::try_milliseconds(self.timestamp)?)
    }
}

/// The events of one case, ordered by timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Case identifier.
    pub case_id: String,
    /// Case-level data objects.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, DataValue>,
    /// Events in time order.
    pub events: Vec<Event>,
}

impl Trace {
    /// Empty trace of `case_id`.
    #[must_use]
    pub fn new(case_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            attributes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Milliseconds between the first and the last event.
    #[must_use]
    pub fn duration(&self) -> i64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0,
        }
    }
}

/// A case that could not be simulated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFailure {
    /// Case that failed.
    pub case_id: String,
    /// Rendered error chain.
    pub error: String,
}

/// Simulated traces of one process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    /// Log name.
    pub name: String,
    /// Traces in case order.
    pub traces: Vec<Trace>,
    /// Cases that failed to simulate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<TraceFailure>,
}

/// Simulates `number_of_traces` cases of a process on the [`SimulationEngine`].
pub struct LogGenerator<'a> {
    /// Process to simulate.
    process: &'a Process,
    /// Simulation settings.
    config: &'a SimulationConfiguration,
    /// Noise settings.
    noise: &'a NoiseConfiguration,
    /// Cancels the batch.
    cancel: CancellationToken,
}

impl<'a> LogGenerator<'a> {
    /// Generator for `process`.
    #[must_use]
    pub fn new(process: &'a Process, config: &'a SimulationConfiguration, noise: &'a NoiseConfiguration) -> Self {
        Self { process, config, noise, cancel: CancellationToken::new() }
    }

    /// Share `token` with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run every case and collect the traces in case order.
    ///
    /// A case whose scripts fail is reported in [`EventLog::failures`] and does not affect the
    /// others. Cancellation is an error.
    #[instrument(skip_all, fields(process = %self.process.name(), traces = self.config.number_of_traces))]
    pub fn generate(&self, progress: &dyn Progress) -> anyhow::Result<EventLog> {
        self.config.validate()?;
        self.noise.validate()?;
        self.process
            .check()
            .with_context(|| format!("cannot simulate process `{}`", self.process.name()))?;

        let (process, config, noise) = (self.process, self.config, self.noise);
        let jobs = (0..config.number_of_traces).map(move |index| {
            let case_id = config.case_id(index);
            let label = case_id.clone();
            let job = move || -> anyhow::Result<Trace> {
                let mut rng = trace_rng(config.seed, index);
                let trace = TraceGenerator::new(process, case_id, config, noise).generate(&mut rng)?;
                Ok(trace)
            };
            (label, job)
        });

        let workers = config.workers();
        info!(workers, "simulating cases");
        let engine = SimulationEngine::new(workers, config.queue_capacity()).with_cancellation(self.cancel.clone());
        let report = engine.run(jobs, progress);
        if report.cancelled {
            anyhow::bail!(
                "simulation cancelled after {} of {} cases",
                report.outcomes.len(),
                config.number_of_traces
            );
        }

        let mut log = EventLog { name: config.log_name.clone(), traces: Vec::new(), failures: Vec::new() };
        for outcome in report.outcomes {
            match outcome.result {
                Ok(trace) => log.traces.push(trace),
                Err(e) => log.failures.push(TraceFailure { case_id: outcome.label, error: format!("{e:#}") }),
            }
        }
        info!(traces = log.traces.len(), failures = log.failures.len(), "event log generated");
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use plg_core::errors::ScriptError;
    use plg_core::model::{
        DataObjectKind,
        Direction,
        Owner,
    };
    use plg_core::script::FnScript;
    use rstest::*;

    use super::*;

    #[fixture]
    fn flaky() -> Process {
        let mut p = Process::new("flaky");
        let start = p.new_start_event();
        let a = p.new_task("A");
        let end = p.new_end_event();
        p.new_sequence(start, a).unwrap();
        p.new_sequence(a, end).unwrap();
        let script = FnScript::new("fails_on_case_3", |case: &str| -> Result<i64, ScriptError> {
            if case == "case_3" {
                Err(ScriptError::invalid("fails_on_case_3", case, "no value"))
            } else {
                Ok(1)
            }
        });
        p.new_data_object("amount", DataObjectKind::Integer(Arc::new(script)), Some((Owner::Node(a), Direction::Generated)))
            .unwrap();
        p
    }

    #[rstest]
    fn test_failing_case_is_isolated(flaky: Process) {
        let config = SimulationConfiguration { number_of_traces: 6, seed: Some(1), ..Default::default() };
        let noise = NoiseConfiguration::none();
        let log = LogGenerator::new(&flaky, &config, &noise).generate(&()).unwrap();

        let ids: Vec<_> = log.traces.iter().map(|t| t.case_id.as_str()).collect();
        assert_eq!(ids, vec!["case_0", "case_1", "case_2", "case_4", "case_5"]);
        assert_eq!(log.failures.len(), 1);
        assert_eq!(log.failures[0].case_id, "case_3");
        assert!(log.failures[0].error.contains("no value"));
        assert_eq!(log.name, "tmp-log");
    }

    #[rstest]
    fn test_invalid_process_is_rejected() {
        let process = Process::new("empty");
        let config = SimulationConfiguration::default();
        let noise = NoiseConfiguration::none();
        assert!(LogGenerator::new(&process, &config, &noise).generate(&()).is_err());
    }

    #[rstest]
    fn test_cancelled_generation_fails(flaky: Process) {
        let config = SimulationConfiguration { number_of_traces: 5, ..Default::default() };
        let noise = NoiseConfiguration::none();
        let token = CancellationToken::new();
        token.cancel();
        let res = LogGenerator::new(&flaky, &config, &noise).with_cancellation(token).generate(&());
        assert!(res.is_err());
    }

    #[rstest]
    fn test_absolute_time() {
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let event = Event::new("A", Lifecycle::Complete, 90_000);
        assert_eq!(event.absolute_time(epoch), Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 30).unwrap()));
    }
}
