//! Knobs for process generation, evolution, simulation and streaming.
//!
//! Every struct deserializes with `#[serde(default)]`, so a config file only needs to name the
//! values it overrides. Values are range-checked by `validate()` before any work starts.

use std::path::Path;

use anyhow::{
    bail,
    Context,
};
use plg_core::ConfigError;
use serde::{
    Deserialize,
    Serialize,
};

use crate::generator::Pattern;
use crate::noise::NoiseConfiguration;
use crate::stream::StreamConfiguration;

/// Relative weights of the patterns drawn by the generator's roulette wheel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternWeights {
    /// Weight of a lone task.
    pub single_activity: f64,
    /// Weight of two chained fragments.
    pub sequence: f64,
    /// Weight of an AND block.
    pub parallel_execution: f64,
    /// Weight of an XOR block.
    pub mutual_exclusion: f64,
    /// Weight of a loop block.
    #[serde(rename = "loop")]
    pub loop_: f64,
    /// Weight of an empty fragment, where allowed.
    pub skip: f64,
}

impl Default for PatternWeights {
    fn default() -> Self {
        Self {
            single_activity: 0.2,
            sequence: 0.7,
            parallel_execution: 0.3,
            mutual_exclusion: 0.3,
            loop_: 0.1,
            skip: 0.1,
        }
    }
}

impl PatternWeights {
    /// Weight of `pattern`.
    #[must_use]
    pub const fn weight(&self, pattern: Pattern) -> f64 {
        match pattern {
            Pattern::SingleActivity => self.single_activity,
            Pattern::Sequence => self.sequence,
            Pattern::ParallelExecution => self.parallel_execution,
            Pattern::MutualExclusion => self.mutual_exclusion,
            Pattern::Loop => self.loop_,
            Pattern::Skip => self.skip,
        }
    }

    /// Every weight must lie within `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::probability("weights.single_activity", self.single_activity)?;
        ConfigError::probability("weights.sequence", self.sequence)?;
        ConfigError::probability("weights.parallel_execution", self.parallel_execution)?;
        ConfigError::probability("weights.mutual_exclusion", self.mutual_exclusion)?;
        ConfigError::probability("weights.loop", self.loop_)?;
        ConfigError::probability("weights.skip", self.skip)
    }
}

/// Shape of randomly generated processes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomizationConfiguration {
    /// Maximum number of branches of a parallel block.
    pub and_branches: usize,
    /// Maximum number of branches of an exclusive block.
    pub xor_branches: usize,
    /// Pattern weights.
    pub weights: PatternWeights,
    /// Nesting depth past which only single activities (or skips) are produced.
    pub max_depth: usize,
    /// Chance that a new task or exclusive branch receives a data object.
    pub data_object_probability: f64,
}

impl Default for RandomizationConfiguration {
    fn default() -> Self {
        Self {
            and_branches: 5,
            xor_branches: 5,
            weights: PatternWeights::default(),
            max_depth: 3,
            data_object_probability: 0.1,
        }
    }
}

impl RandomizationConfiguration {
    /// Check branch counts, depth and probabilities.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::at_least("and_branches", 2, self.and_branches)?;
        ConfigError::at_least("xor_branches", 2, self.xor_branches)?;
        ConfigError::at_least("max_depth", 1, self.max_depth)?;
        ConfigError::probability("data_object_probability", self.data_object_probability)?;
        self.weights.validate()
    }
}

/// Settings for deriving a new process from an existing one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfiguration {
    /// Chance that each task of the source process is replaced by a fresh fragment.
    pub activity_evolution_probability: f64,
    /// Shape of the replacement fragments.
    pub randomization: RandomizationConfiguration,
}

impl Default for EvolutionConfiguration {
    fn default() -> Self {
        Self {
            activity_evolution_probability: 0.1,
            randomization: RandomizationConfiguration::default(),
        }
    }
}

impl EvolutionConfiguration {
    /// Check the probability and the replacement shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::probability("activity_evolution_probability", self.activity_evolution_probability)?;
        self.randomization.validate()
    }
}

/// How many traces to simulate and how.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfiguration {
    /// Cases to simulate.
    pub number_of_traces: usize,
    /// Run the cases on every available core instead of a single worker.
    pub multithreading: bool,
    /// Passes over the same sequence after which looping back becomes unlikely.
    pub max_loop_cycles: u32,
    /// Case id template; `{}` is replaced with the case index.
    pub case_id_pattern: String,
    /// Base seed. Cases are reproducible when set.
    pub seed: Option<u64>,
    /// Pending cases buffered ahead of the workers. Defaults to twice the worker count.
    pub queue_capacity: Option<usize>,
    /// Name of the produced log.
    pub log_name: String,
}

impl Default for SimulationConfiguration {
    fn default() -> Self {
        Self {
            number_of_traces: 1000,
            multithreading: true,
            max_loop_cycles: 3,
            case_id_pattern: "case_{}".into(),
            seed: None,
            queue_capacity: None,
            log_name: "tmp-log".into(),
        }
    }
}

impl SimulationConfiguration {
    /// Check the loop cap, the queue capacity and the case id template.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::at_least("max_loop_cycles", 1, self.max_loop_cycles as usize)?;
        if let Some(capacity) = self.queue_capacity {
            ConfigError::at_least("queue_capacity", 1, capacity)?;
        }
        if !self.case_id_pattern.contains("{}") {
            return Err(ConfigError::Invalid {
                field: "case_id_pattern",
                reason: format!("`{}` has no `{{}}` placeholder", self.case_id_pattern),
            });
        }
        Ok(())
    }

    /// Case id of the `index`-th trace.
    #[must_use]
    pub fn case_id(&self, index: usize) -> String {
        self.case_id_pattern.replacen("{}", &index.to_string(), 1)
    }

    /// Number of worker threads the simulation runs on.
    #[must_use]
    pub fn workers(&self) -> usize {
        if self.multithreading {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            1
        }
    }

    /// Capacity of the job queue.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or_else(|| 2 * self.workers())
    }
}

/// Everything the command line tool can read from a config file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Process generation.
    pub randomization: RandomizationConfiguration,
    /// Log simulation.
    pub simulation: SimulationConfiguration,
    /// Noise applied while simulating.
    pub noise: NoiseConfiguration,
    /// Process evolution.
    pub evolution: EvolutionConfiguration,
    /// Stream interleaving.
    pub stream: StreamConfiguration,
}

impl GeneratorConfig {
    /// Read a YAML (`.yml`/`.yaml`) or JSON (`.json`) config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yml" | "yaml") => serde_yaml::from_str(&contents)?,
            Some("json") => serde_json::from_str(&contents)?,
            _ => bail!("unsupported config format for {}; expected .yaml or .json", path.display()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.randomization.validate()?;
        self.simulation.validate()?;
        self.noise.validate()?;
        self.evolution.validate()?;
        self.stream.validate()
    }
}
