//! Per-case value functions attached to tasks and data objects.
//!
//! Scripts are opaque strategies `case id -> value`. The simulator may call them from several
//! worker threads at once and more than once per case, so every implementation must be pure: the
//! same case id always yields the same value. The built-in scripts achieve this by seeding a
//! private [`StdRng`] from a stable hash of the case id and their own parameters.

use std::fmt::Debug;
use std::hash::{
    Hash,
    Hasher,
};

use rand::rngs::StdRng;
use rand::{
    Rng,
    SeedableRng,
};
use rand_distr::{
    Distribution,
    Normal,
};

use crate::errors::ScriptError;

/// Seconds a task waits before handing over to its successor when no script says otherwise.
pub const DEFAULT_TIME_AFTER: i64 = 3600;

/// Produces an integer value for a case.
pub trait IntegerScript: Debug + Send + Sync {
    /// Value for `case_id`.
    fn evaluate(&self, case_id: &str) -> Result<i64, ScriptError>;
}

/// Produces a string value for a case.
pub trait StringScript: Debug + Send + Sync {
    /// Value for `case_id`.
    fn evaluate(&self, case_id: &str) -> Result<String, ScriptError>;
}

/// Timing of a task for a case, in seconds.
pub trait ActivityScript: Debug + Send + Sync {
    /// How long the task lasts. Zero means the task is instantaneous.
    fn duration(&self, case_id: &str) -> Result<i64, ScriptError>;

    /// How long the case idles after the task completes.
    fn time_after(&self, case_id: &str) -> Result<i64, ScriptError>;
}

/// Adapter turning a closure into an [`IntegerScript`] or [`StringScript`].
pub struct FnScript<F> {
    /// Name reported in errors.
    name: String,
    /// The wrapped closure.
    f: F,
}

impl<F> FnScript<F> {
    /// Wrap `f` under `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Debug for FnScript<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnScript").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<F> IntegerScript for FnScript<F>
where
    F: Fn(&str) -> Result<i64, ScriptError> + Send + Sync,
{
    fn evaluate(&self, case_id: &str) -> Result<i64, ScriptError> {
        (self.f)(case_id)
    }
}

impl<F> StringScript for FnScript<F>
where
    F: Fn(&str) -> Result<String, ScriptError> + Send + Sync,
{
    fn evaluate(&self, case_id: &str) -> Result<String, ScriptError> {
        (self.f)(case_id)
    }
}

/// [`Hasher`] feeding a BLAKE3 digest. Integers are written little-endian so the digest does
/// not depend on the platform or on the standard library's hashing algorithm.
struct SeedHasher(blake3::Hasher);

impl SeedHasher {
    /// Empty digest.
    fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    /// Full digest, usable as an rng seed.
    fn into_seed(self) -> [u8; 32] {
        *self.0.finalize().as_bytes()
    }
}

impl Hasher for SeedHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn write_u16(&mut self, n: u16) {
        self.write(&n.to_le_bytes());
    }

    fn write_u32(&mut self, n: u32) {
        self.write(&n.to_le_bytes());
    }

    fn write_u64(&mut self, n: u64) {
        self.write(&n.to_le_bytes());
    }

    fn write_u128(&mut self, n: u128) {
        self.write(&n.to_le_bytes());
    }

    fn write_usize(&mut self, n: usize) {
        self.write_u64(n as u64);
    }

    fn finish(&self) -> u64 {
        let digest = self.0.finalize();
        let mut head = [0; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

/// Deterministic rng for a `(case id, salt)` pair, seeded from a BLAKE3 digest of both.
#[must_use]
pub fn case_rng(case_id: &str, salt: impl Hash) -> StdRng {
    let mut hasher = SeedHasher::new();
    case_id.hash(&mut hasher);
    salt.hash(&mut hasher);
    StdRng::from_seed(hasher.into_seed())
}

/// Uniform integer in `[min, max]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformIntegerScript {
    /// Smallest value, inclusive.
    pub min: i64,
    /// Largest value, inclusive.
    pub max: i64,
}

impl IntegerScript for UniformIntegerScript {
    fn evaluate(&self, case_id: &str) -> Result<i64, ScriptError> {
        if self.min > self.max {
            return Err(ScriptError::invalid(
                "uniform_integer",
                case_id,
                format!("empty range [{}, {}]", self.min, self.max),
            ));
        }
        Ok(case_rng(case_id, (self.min, self.max)).gen_range(self.min..=self.max))
    }
}

/// One of a fixed set of strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceStringScript {
    /// Candidates, picked uniformly.
    pub values: Vec<String>,
}

impl StringScript for ChoiceStringScript {
    fn evaluate(&self, case_id: &str) -> Result<String, ScriptError> {
        if self.values.is_empty() {
            return Err(ScriptError::invalid("choice_string", case_id, "no values to choose from"));
        }
        let idx = case_rng(case_id, &self.values).gen_range(0..self.values.len());
        Ok(self.values[idx].clone())
    }
}

/// Constant timing, mostly useful in tests and hand-built processes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedTiming {
    /// Seconds the task lasts.
    pub duration: i64,
    /// Seconds the case idles afterwards.
    pub time_after: i64,
}

impl ActivityScript for FixedTiming {
    fn duration(&self, _case_id: &str) -> Result<i64, ScriptError> {
        Ok(self.duration)
    }

    fn time_after(&self, _case_id: &str) -> Result<i64, ScriptError> {
        Ok(self.time_after)
    }
}

/// Normally distributed duration (truncated at zero) followed by a fixed wait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalDurationScript {
    /// Mean duration in seconds.
    pub mean: f64,
    /// Standard deviation in seconds.
    pub std_dev: f64,
    /// Seconds the case idles afterwards.
    pub time_after: i64,
}

impl ActivityScript for NormalDurationScript {
    fn duration(&self, case_id: &str) -> Result<i64, ScriptError> {
        let normal = Normal::new(self.mean, self.std_dev)
            .map_err(|e| ScriptError::invalid("normal_duration", case_id, e.to_string()))?;
        let mut rng = case_rng(case_id, (self.mean.to_bits(), self.std_dev.to_bits()));
        #[allow(clippy::cast_possible_truncation)]
        let seconds = normal.sample(&mut rng).round().max(0.0) as i64;
        Ok(seconds)
    }

    fn time_after(&self, _case_id: &str) -> Result<i64, ScriptError> {
        Ok(self.time_after)
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;

    #[rstest]
    #[case("case_0")]
    #[case("case_17")]
    fn test_uniform_integer_is_stable_per_case(#[case] case_id: &str) {
        let script = UniformIntegerScript { min: -5, max: 5 };
        let first = script.evaluate(case_id).unwrap();
        assert_eq!(first, script.evaluate(case_id).unwrap());
        assert_ge!(first, -5);
        assert_le!(first, 5);
    }

    #[rstest]
    fn test_case_rng_depends_on_case_and_salt() {
        let draw = |case_id: &str, salt: u64| case_rng(case_id, salt).gen::<u64>();
        assert_eq!(draw("case_1", 7), draw("case_1", 7));
        assert_ne!(draw("case_1", 7), draw("case_2", 7));
        assert_ne!(draw("case_1", 7), draw("case_1", 8));
    }

    #[rstest]
    fn test_uniform_integer_empty_range() {
        let script = UniformIntegerScript { min: 3, max: 2 };
        assert!(matches!(script.evaluate("case_1"), Err(ScriptError::InvalidScript { .. })));
    }

    #[rstest]
    fn test_choice_string_no_values() {
        let script = ChoiceStringScript { values: vec![] };
        assert_err!(script.evaluate("case_1"));
    }

    #[rstest]
    fn test_normal_duration_never_negative() {
        let script = NormalDurationScript { mean: 1.0, std_dev: 50.0, time_after: 0 };
        for i in 0..200 {
            assert_ge!(script.duration(&format!("case_{i}")).unwrap(), 0);
        }
    }

    #[rstest]
    fn test_fn_script_propagates_errors() {
        let script = FnScript::new("always_fails", |case: &str| -> Result<i64, ScriptError> {
            Err(ScriptError::invalid("always_fails", case, "boom"))
        });
        let err = IntegerScript::evaluate(&script, "case_3").unwrap_err();
        assert_eq!(err.to_string(), "script `always_fails` failed for case `case_3`: boom");
    }
}
