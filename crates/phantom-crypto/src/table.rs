//! Bounded discrete-log recovery by baby-step/giant-step.
//!
//! The table stores `j·G` for `j < step` where `step = 2^ceil(bits/2)`.
//! A lookup walks at most `step` giant steps, so decrypting anything in
//! `[0, 2^bits)` costs `O(2^(bits/2))` group operations.

use std::collections::HashMap;
use std::fmt;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;

use crate::elgamal::EncodingDomain;
use crate::error::{CryptoError, Result};
use crate::group::G;

pub struct DecryptionTable {
    domain: EncodingDomain,
    step: u64,
    baby: HashMap<[u8; 32], u64>,
    giant: RistrettoPoint,
}

impl DecryptionTable {
    #[must_use]
    pub fn new(domain: EncodingDomain) -> Self {
        let step = 1u64 << domain.bits().div_ceil(2);
        let mut baby = HashMap::with_capacity(usize::try_from(step).unwrap_or(0));
        let mut acc = RistrettoPoint::identity();
        for j in 0..step {
            baby.insert(acc.compress().to_bytes(), j);
            acc += G;
        }
        Self {
            domain,
            step,
            baby,
            giant: Scalar::from(step) * G,
        }
    }

    #[must_use]
    pub const fn domain(&self) -> EncodingDomain {
        self.domain
    }

    /// Recover `m` from `m·G` for `m` in the table's domain.
    pub fn lookup(&self, point: &RistrettoPoint) -> Result<u64> {
        let mut gamma = *point;
        for i in 0..self.step {
            if let Some(&j) = self.baby.get(gamma.compress().as_bytes()) {
                let value = i * self.step + j;
                if value <= self.domain.max_value() {
                    return Ok(value);
                }
                break;
            }
            gamma -= self.giant;
        }
        Err(CryptoError::DecryptionRangeExceeded)
    }

    /// Recover a signed `m` with `|m|` in the table's domain. Used for the
    /// homomorphic differences behind encrypted comparisons.
    pub fn lookup_signed(&self, point: &RistrettoPoint) -> Result<i64> {
        match self.lookup(point) {
            Ok(v) => Ok(to_signed(v)),
            Err(CryptoError::DecryptionRangeExceeded) => {
                self.lookup(&-point).map(|v| -to_signed(v))
            }
            Err(e) => Err(e),
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn to_signed(v: u64) -> i64 {
    // Domains top out at 48 bits.
    v as i64
}

impl fmt::Debug for DecryptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionTable")
            .field("bits", &self.domain.bits())
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::encode;

    fn table(bits: u32) -> DecryptionTable {
        DecryptionTable::new(EncodingDomain::new(bits).unwrap())
    }

    #[test]
    fn recovers_whole_small_domain() {
        let t = table(8);
        for v in 0..=255 {
            assert_eq!(t.lookup(&encode(v)).unwrap(), v);
        }
    }

    #[test]
    fn odd_bit_width() {
        let t = table(9);
        assert_eq!(t.lookup(&encode(511)).unwrap(), 511);
        assert_eq!(t.lookup(&encode(512)), Err(CryptoError::DecryptionRangeExceeded));
    }

    #[test]
    fn out_of_range_is_an_error() {
        let t = table(10);
        assert_eq!(t.lookup(&encode(5000)), Err(CryptoError::DecryptionRangeExceeded));
    }

    #[test]
    fn signed_lookup() {
        let t = table(10);
        assert_eq!(t.lookup_signed(&encode(17)).unwrap(), 17);
        assert_eq!(t.lookup_signed(&-encode(17)).unwrap(), -17);
        assert_eq!(t.lookup_signed(&RistrettoPoint::identity()).unwrap(), 0);
    }
}
