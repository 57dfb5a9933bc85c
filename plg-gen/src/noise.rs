//! Noise injected into simulated traces: perturbed data values, renamed activities and
//! structural trace corruptions.

use plg_core::model::{
    DataValue,
    GeneratedValue,
};
use plg_core::ConfigError;
use rand::Rng;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::simulation::{
    Event,
    Lifecycle,
};

/// Digits of [`random_token`].
const TOKEN_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Probability of one noise kind plus its size parameter (delta for integers, number of events
/// for missing head/tail/episode; ignored elsewhere).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseSetting {
    /// Chance that the noise fires.
    pub probability: f64,
    /// Size of the perturbation.
    #[serde(default = "one")]
    pub magnitude: usize,
}

/// Serde default of `magnitude`.
const fn one() -> usize {
    1
}

impl NoiseSetting {
    /// Setting firing with `probability`.
    #[must_use]
    pub const fn new(probability: f64, magnitude: usize) -> Self {
        Self { probability, magnitude }
    }

    /// Setting that never fires.
    const fn off() -> Self {
        Self::new(0.0, 1)
    }
}

/// Kinds of noise, each with its own [`NoiseSetting`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseKind {
    /// Shift an integer attribute by up to `magnitude`.
    IntegerData,
    /// Replace a text attribute with a random token.
    StringData,
    /// Replace an activity name with a random token.
    ActivityName,
    /// Drop the first events of a trace.
    MissingHead,
    /// Drop the last events of a trace.
    MissingTail,
    /// Drop a run of events from the middle of a trace.
    MissingEpisode,
    /// Swap two events.
    PerturbedOrder,
    /// Repeat an event.
    DoubledEvent,
    /// Insert an event for an unknown activity.
    AlienEvent,
}

impl NoiseKind {
    /// Structural kinds in the order they are tried on a trace; at most one fires.
    pub const TRACE_KINDS: [Self; 6] = [
        Self::AlienEvent,
        Self::DoubledEvent,
        Self::MissingEpisode,
        Self::MissingHead,
        Self::MissingTail,
        Self::PerturbedOrder,
    ];
}

/// Per-kind noise settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfiguration {
    /// Integer attribute noise.
    pub integer_data: NoiseSetting,
    /// Text attribute noise.
    pub string_data: NoiseSetting,
    /// Activity renaming.
    pub activity_name: NoiseSetting,
    /// Missing trace head.
    pub missing_head: NoiseSetting,
    /// Missing trace tail.
    pub missing_tail: NoiseSetting,
    /// Missing episode.
    pub missing_episode: NoiseSetting,
    /// Swapped events.
    pub perturbed_order: NoiseSetting,
    /// Doubled events.
    pub doubled_event: NoiseSetting,
    /// Alien events.
    pub alien_event: NoiseSetting,
}

impl Default for NoiseConfiguration {
    fn default() -> Self {
        Self::none()
    }
}

impl NoiseConfiguration {
    /// No noise at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            integer_data: NoiseSetting::off(),
            string_data: NoiseSetting::off(),
            activity_name: NoiseSetting::off(),
            missing_head: NoiseSetting::off(),
            missing_tail: NoiseSetting::off(),
            missing_episode: NoiseSetting::off(),
            perturbed_order: NoiseSetting::off(),
            doubled_event: NoiseSetting::off(),
            alien_event: NoiseSetting::off(),
        }
    }

    /// A little of everything.
    #[must_use]
    pub const fn complete() -> Self {
        Self {
            integer_data: NoiseSetting::new(0.01, 5),
            string_data: NoiseSetting::new(0.01, 1),
            activity_name: NoiseSetting::new(0.01, 1),
            missing_head: NoiseSetting::new(0.01, 1),
            missing_tail: NoiseSetting::new(0.01, 1),
            missing_episode: NoiseSetting::new(0.01, 1),
            perturbed_order: NoiseSetting::new(0.01, 1),
            doubled_event: NoiseSetting::new(0.01, 1),
            alien_event: NoiseSetting::new(0.01, 1),
        }
    }

    /// Data noise only.
    #[must_use]
    pub const fn only_data() -> Self {
        Self {
            integer_data: NoiseSetting::new(0.01, 5),
            string_data: NoiseSetting::new(0.01, 1),
            ..Self::none()
        }
    }

    /// Missing and reordered events only.
    #[must_use]
    pub const fn only_control_flow() -> Self {
        Self {
            missing_head: NoiseSetting::new(0.005, 2),
            missing_tail: NoiseSetting::new(0.005, 2),
            missing_episode: NoiseSetting::new(0.005, 2),
            perturbed_order: NoiseSetting::new(0.005, 1),
            ..Self::none()
        }
    }

    /// Activity-level noise only.
    #[must_use]
    pub const fn only_names() -> Self {
        Self {
            activity_name: NoiseSetting::new(0.001, 1),
            doubled_event: NoiseSetting::new(0.001, 1),
            alien_event: NoiseSetting::new(0.001, 1),
            ..Self::none()
        }
    }

    /// Setting of `kind`.
    #[must_use]
    pub const fn setting(&self, kind: NoiseKind) -> NoiseSetting {
        match kind {
            NoiseKind::IntegerData => self.integer_data,
            NoiseKind::StringData => self.string_data,
            NoiseKind::ActivityName => self.activity_name,
            NoiseKind::MissingHead => self.missing_head,
            NoiseKind::MissingTail => self.missing_tail,
            NoiseKind::MissingEpisode => self.missing_episode,
            NoiseKind::PerturbedOrder => self.perturbed_order,
            NoiseKind::DoubledEvent => self.doubled_event,
            NoiseKind::AlienEvent => self.alien_event,
        }
    }

    /// Every probability must lie within `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::probability("noise.integer_data", self.integer_data.probability)?;
        ConfigError::probability("noise.string_data", self.string_data.probability)?;
        ConfigError::probability("noise.activity_name", self.activity_name.probability)?;
        ConfigError::probability("noise.missing_head", self.missing_head.probability)?;
        ConfigError::probability("noise.missing_tail", self.missing_tail.probability)?;
        ConfigError::probability("noise.missing_episode", self.missing_episode.probability)?;
        ConfigError::probability("noise.perturbed_order", self.perturbed_order.probability)?;
        ConfigError::probability("noise.doubled_event", self.doubled_event.probability)?;
        ConfigError::probability("noise.alien_event", self.alien_event.probability)
    }
}

/// Random lowercase base-32 token built from 65 random bits (up to 13 characters).
pub fn random_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bits = rng.gen::<u128>() & ((1u128 << 65) - 1);
    if bits == 0 {
        return "0".into();
    }
    let mut digits = Vec::with_capacity(13);
    while bits > 0 {
        digits.push(TOKEN_ALPHABET[(bits % 32) as usize]);
        bits /= 32;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Applies a [`NoiseConfiguration`] to values, names and whole traces.
#[derive(Clone, Copy, Debug)]
pub struct NoiseProcessor<'a> {
    /// Settings in use.
    config: &'a NoiseConfiguration,
}

impl<'a> NoiseProcessor<'a> {
    /// Processor applying `config`.
    #[must_use]
    pub const fn new(config: &'a NoiseConfiguration) -> Self {
        Self { config }
    }

    /// Draw whether `kind` fires.
    fn fires<R: Rng + ?Sized>(&self, kind: NoiseKind, rng: &mut R) -> bool {
        let p = self.config.setting(kind).probability;
        p > 0.0 && rng.gen::<f64>() < p
    }

    /// Possibly perturbed copy of `generated`; the original value is always preserved.
    pub fn apply_data_noise<R: Rng + ?Sized>(&self, generated: &GeneratedValue, rng: &mut R) -> GeneratedValue {
        let value = match &generated.original {
            DataValue::Integer(original) if self.fires(NoiseKind::IntegerData, rng) => {
                let delta = i64::try_from(self.config.integer_data.magnitude).unwrap_or(i64::MAX);
                DataValue::Integer(original.saturating_add(rng.gen_range(-delta..=delta)))
            },
            DataValue::Text(_) if self.fires(NoiseKind::StringData, rng) => DataValue::Text(random_token(rng)),
            _ => generated.value.clone(),
        };
        GeneratedValue { value, original: generated.original.clone() }
    }

    /// The name recorded for an executed task.
    pub fn activity_name<R: Rng + ?Sized>(&self, name: &str, rng: &mut R) -> String {
        if self.fires(NoiseKind::ActivityName, rng) {
            random_token(rng)
        } else {
            name.to_owned()
        }
    }

    /// Apply at most one structural corruption to a time-ordered trace, returning the one applied.
    pub fn apply_trace_noise<R: Rng + ?Sized>(&self, events: &mut Vec<Event>, rng: &mut R) -> Option<NoiseKind> {
        let kind = NoiseKind::TRACE_KINDS.into_iter().find(|&k| self.fires(k, rng))?;
        let size = self.config.setting(kind).magnitude.max(1);
        match kind {
            NoiseKind::AlienEvent => {
                let name = random_token(rng);
                if events.is_empty() {
                    events.push(Event::new(name, Lifecycle::None, 0));
                } else {
                    let at = rng.gen_range(0..events.len());
                    let alien = Event::new(name, Lifecycle::None, events[at].timestamp);
                    events.insert(at + 1, alien);
                }
            },
            NoiseKind::DoubledEvent => {
                if events.is_empty() {
                    return None;
                }
                let at = rng.gen_range(0..events.len());
                let copy = events[at].clone();
                events.insert(at + 1, copy);
            },
            NoiseKind::MissingEpisode => {
                if events.is_empty() {
                    return None;
                }
                let first = rng.gen_range(0..events.len());
                let count = rng.gen_range(1..=size.min(events.len() - first));
                events.drain(first..first + count);
            },
            NoiseKind::MissingHead => {
                if events.is_empty() {
                    return None;
                }
                let count = rng.gen_range(1..=size.min(events.len()));
                events.drain(..count);
            },
            NoiseKind::MissingTail => {
                if events.is_empty() {
                    return None;
                }
                let count = rng.gen_range(1..=size.min(events.len()));
                events.truncate(events.len() - count);
            },
            NoiseKind::PerturbedOrder => {
                if events.len() < 2 {
                    return None;
                }
                let i = rng.gen_range(0..events.len());
                let mut j = rng.gen_range(0..events.len() - 1);
                if j >= i {
                    j += 1;
                }
                events.swap(i, j);
            },
            NoiseKind::IntegerData | NoiseKind::StringData | NoiseKind::ActivityName => return None,
        }
        debug!(?kind, "trace noise applied");
        Some(kind)
    }
}
