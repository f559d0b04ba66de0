//! Pedersen commitments `v·G + b·H`.

use std::ops::{Add, Sub};

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::group::{G, H};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment(RistrettoPoint);

impl Commitment {
    #[must_use]
    pub fn new(value: u64, blinding: &Scalar) -> Self {
        Self::from_scalars(&Scalar::from(value), blinding)
    }

    /// Commitment to zero with zero blinding; the identity for `+`.
    #[must_use]
    pub fn zero() -> Self {
        Self(RistrettoPoint::identity())
    }

    pub(crate) fn from_scalars(value: &Scalar, blinding: &Scalar) -> Self {
        Self(value * G + blinding * *H)
    }

    #[must_use]
    pub const fn from_point(point: RistrettoPoint) -> Self {
        Self(point)
    }

    #[must_use]
    pub const fn point(&self) -> RistrettoPoint {
        self.0
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    /// Shift the committed value by a public constant.
    #[must_use]
    pub fn offset(&self, delta: i64) -> Self {
        let shift = Scalar::from(delta.unsigned_abs()) * G;
        if delta >= 0 {
            Self(self.0 + shift)
        } else {
            Self(self.0 - shift)
        }
    }
}

impl Add for Commitment {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Commitment {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

/// Value and blinding factor behind a [`Commitment`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Opening {
    value: u64,
    blinding: Scalar,
}

impl Opening {
    #[must_use]
    pub const fn new(value: u64, blinding: Scalar) -> Self {
        Self { value, blinding }
    }

    pub fn random<R: RngCore + CryptoRng>(value: u64, rng: &mut R) -> Self {
        Self {
            value,
            blinding: Scalar::random(rng),
        }
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    #[must_use]
    pub const fn blinding(&self) -> &Scalar {
        &self.blinding
    }

    #[must_use]
    pub fn commitment(&self) -> Commitment {
        Commitment::new(self.value, &self.blinding)
    }

    #[must_use]
    pub fn opens(&self, commitment: &Commitment) -> bool {
        self.commitment() == *commitment
    }
}

impl std::fmt::Debug for Opening {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Opening(..)")
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn homomorphic() {
        let a = Opening::random(30, &mut OsRng);
        let b = Opening::random(12, &mut OsRng);
        let sum = Opening::new(42, a.blinding() + b.blinding());
        assert!(sum.opens(&(a.commitment() + b.commitment())));
        let diff = Opening::new(18, a.blinding() - b.blinding());
        assert!(diff.opens(&(a.commitment() - b.commitment())));
    }

    #[test]
    fn hiding_under_fresh_blinding() {
        let a = Opening::random(5, &mut OsRng);
        let b = Opening::random(5, &mut OsRng);
        assert_ne!(a.commitment(), b.commitment());
        assert!(!a.opens(&b.commitment()));
    }

    #[test]
    fn offset_shifts_value() {
        let a = Opening::random(10, &mut OsRng);
        let shifted = Opening::new(7, *a.blinding());
        assert!(shifted.opens(&a.commitment().offset(-3)));
        let up = Opening::new(13, *a.blinding());
        assert!(up.opens(&a.commitment().offset(3)));
    }
}
