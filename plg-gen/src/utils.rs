//! Small helpers shared by the generator and the simulator.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Bijective base-26 rendering of `n >= 1`: 1 -> `A`, 26 -> `Z`, 27 -> `AA`.
#[must_use]
pub fn alphabetic_label(mut n: usize) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        #[allow(clippy::cast_possible_truncation)]
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Rng for the `index`-th case: reproducible when a base seed is given, fresh entropy otherwise.
#[must_use]
pub fn trace_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_entropy(),
    }
}
