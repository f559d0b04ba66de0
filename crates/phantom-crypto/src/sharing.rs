//! Feldman verifiable secret sharing and a joint (dealerless) key generation.
//!
//! Each of the `n` committee members deals a random degree `t-1` polynomial,
//! broadcasts Feldman commitments to its coefficients and sends `f_d(j)` to
//! member `j`. Member `j` checks every received share against the dealer's
//! commitments and sums them into its key share. The committee public key
//! is the sum of the dealers' constant-term commitments; nobody ever holds
//! the corresponding secret.

use std::collections::BTreeMap;
use std::fmt;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::elgamal::PublicKey;
use crate::error::{CryptoError, ProofKind, Result};
use crate::group::G;

/// `t`-of-`n` parameters. Indices run `1..=n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThresholdParams {
    threshold: u32,
    total: u32,
}

impl ThresholdParams {
    pub fn new(threshold: u32, total: u32) -> Result<Self> {
        if threshold == 0 || threshold > total {
            return Err(CryptoError::InvalidThreshold { threshold, total });
        }
        Ok(Self { threshold, total })
    }

    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index == 0 || index > self.total {
            return Err(CryptoError::InvalidShareIndex(index));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dealing
// ---------------------------------------------------------------------------

/// The broadcast half of a dealing: `C_k = a_k·G` for each coefficient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealingCommitments {
    pub dealer: u32,
    pub coefficients: Vec<RistrettoPoint>,
}

impl DealingCommitments {
    /// `Σ C_k · index^k`, the public image of `f(index)`.
    #[must_use]
    pub fn evaluate(&self, index: u32) -> RistrettoPoint {
        let x = Scalar::from(index);
        let mut power = Scalar::ONE;
        let mut acc = RistrettoPoint::identity();
        for c in &self.coefficients {
            acc += power * c;
            power *= x;
        }
        acc
    }

    #[must_use]
    pub fn verify_share(&self, index: u32, share: &Scalar) -> bool {
        share * G == self.evaluate(index)
    }
}

/// A dealer's polynomial evaluations plus its public commitments.
pub struct Dealing {
    commitments: DealingCommitments,
    shares: BTreeMap<u32, Scalar>,
}

impl Dealing {
    pub fn generate<R: RngCore + CryptoRng>(
        dealer: u32,
        params: &ThresholdParams,
        rng: &mut R,
    ) -> Result<Self> {
        params.check_index(dealer)?;
        let coefficients: Vec<Scalar> = (0..params.threshold)
            .map(|_| Scalar::random(rng))
            .collect();
        Ok(Self::from_polynomial(dealer, params, coefficients))
    }

    fn from_polynomial(dealer: u32, params: &ThresholdParams, mut coefficients: Vec<Scalar>) -> Self {
        let shares = (1..=params.total)
            .map(|j| (j, evaluate_polynomial(&coefficients, j)))
            .collect();
        let commitments = DealingCommitments {
            dealer,
            coefficients: coefficients.iter().map(|a| a * G).collect(),
        };
        coefficients.zeroize();
        Self {
            commitments,
            shares,
        }
    }

    #[must_use]
    pub const fn commitments(&self) -> &DealingCommitments {
        &self.commitments
    }

    pub fn share_for(&self, index: u32) -> Result<Scalar> {
        self.shares
            .get(&index)
            .copied()
            .ok_or(CryptoError::InvalidShareIndex(index))
    }
}

impl Drop for Dealing {
    fn drop(&mut self) {
        for share in self.shares.values_mut() {
            share.zeroize();
        }
    }
}

fn evaluate_polynomial(coefficients: &[Scalar], index: u32) -> Scalar {
    let x = Scalar::from(index);
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, a| acc * x + a)
}

// ---------------------------------------------------------------------------
// Key shares and the committee key
// ---------------------------------------------------------------------------

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    index: u32,
    secret: Scalar,
}

impl KeyShare {
    /// Sum the shares member `index` received, checking each against its
    /// dealer's commitments first.
    pub fn from_dealt_shares(index: u32, received: &[(&DealingCommitments, Scalar)]) -> Result<Self> {
        let mut secret = Scalar::ZERO;
        for (commitments, share) in received {
            if !commitments.verify_share(index, share) {
                return Err(CryptoError::invalid(
                    ProofKind::Share,
                    "dealt share fails Feldman check",
                ));
            }
            secret += share;
        }
        Ok(Self { index, secret })
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// `s_i·G`, published so partial decryptions can be checked.
    #[must_use]
    pub fn verification_key(&self) -> RistrettoPoint {
        self.secret * G
    }

    pub(crate) const fn secret(&self) -> &Scalar {
        &self.secret
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Everything public about a committee: its encryption key and the
/// per-member verification keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeKey {
    params: ThresholdParams,
    public_key: PublicKey,
    verification_keys: BTreeMap<u32, RistrettoPoint>,
}

impl CommitteeKey {
    pub fn from_dealings(params: ThresholdParams, dealings: &[&DealingCommitments]) -> Result<Self> {
        if dealings.is_empty() {
            return Err(CryptoError::InsufficientShares { have: 0, need: 1 });
        }
        for d in dealings {
            params.check_index(d.dealer)?;
            if d.coefficients.len() != params.threshold as usize {
                return Err(CryptoError::invalid(
                    ProofKind::Share,
                    "dealing has wrong polynomial degree",
                ));
            }
        }
        let public_key =
            PublicKey::from_point(dealings.iter().map(|d| d.coefficients[0]).sum::<RistrettoPoint>());
        let verification_keys: BTreeMap<u32, RistrettoPoint> = (1..=params.total)
            .map(|j| (j, dealings.iter().map(|d| d.evaluate(j)).sum::<RistrettoPoint>()))
            .collect();
        Ok(Self {
            params,
            public_key,
            verification_keys,
        })
    }

    #[must_use]
    pub const fn params(&self) -> ThresholdParams {
        self.params
    }

    #[must_use]
    pub const fn public_key(&self) -> PublicKey {
        self.public_key
    }

    #[must_use]
    pub fn verification_key(&self, index: u32) -> Option<&RistrettoPoint> {
        self.verification_keys.get(&index)
    }
}

/// Run the joint key generation for a whole committee in one process.
///
/// Used when provisioning executors: the returned shares are handed to
/// their nodes and dropped locally.
pub fn run_dkg<R: RngCore + CryptoRng>(
    params: ThresholdParams,
    rng: &mut R,
) -> Result<(CommitteeKey, Vec<KeyShare>)> {
    let dealings = (1..=params.total)
        .map(|d| Dealing::generate(d, &params, rng))
        .collect::<Result<Vec<_>>>()?;
    finish_dealings(params, &dealings)
}

fn finish_dealings(
    params: ThresholdParams,
    dealings: &[Dealing],
) -> Result<(CommitteeKey, Vec<KeyShare>)> {
    let public: Vec<&DealingCommitments> = dealings.iter().map(Dealing::commitments).collect();
    let committee = CommitteeKey::from_dealings(params, &public)?;
    let shares = (1..=params.total)
        .map(|j| {
            let received = dealings
                .iter()
                .map(|d| Ok((d.commitments(), d.share_for(j)?)))
                .collect::<Result<Vec<_>>>()?;
            KeyShare::from_dealt_shares(j, &received)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((committee, shares))
}

/// Trusted-dealer split of a known secret. Test fixtures only.
#[cfg(any(test, feature = "test-helpers"))]
pub fn deal_known_secret<R: RngCore + CryptoRng>(
    secret: &Scalar,
    params: ThresholdParams,
    rng: &mut R,
) -> Result<(CommitteeKey, Vec<KeyShare>)> {
    let mut coefficients = vec![*secret];
    coefficients.extend((1..params.threshold).map(|_| Scalar::random(rng)));
    let dealing = Dealing::from_polynomial(1, &params, coefficients);
    finish_dealings(params, std::slice::from_ref(&dealing))
}
