//! Seeded Fisher-Yates shuffle.
//!
//! The permutation is a pure function of the seed and the input length, so
//! any observer holding the VRF output can recompute it.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Uniform draw from `[0, bound)` without modulo bias.
fn below(rng: &mut ChaCha20Rng, bound: u64) -> u64 {
    let zone = u64::MAX - (u64::MAX % bound);
    loop {
        let v = rng.next_u64();
        if v < zone {
            return v % bound;
        }
    }
}

/// Index permutation of length `n` for `seed`.
#[must_use]
pub fn permutation(n: usize, seed: &[u8; 32]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha20Rng::from_seed(*seed);
    for i in (1..n).rev() {
        let j = below(&mut rng, i as u64 + 1);
        #[allow(clippy::cast_possible_truncation)]
        idx.swap(i, j as usize);
    }
    idx
}

/// Permute `items` by [`permutation`].
#[must_use]
pub fn shuffled<T>(items: Vec<T>, seed: &[u8; 32]) -> Vec<T> {
    let order = permutation(items.len(), seed);
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}
