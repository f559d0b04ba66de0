//! Threshold decryption of committee ciphertexts.
//!
//! Member `i` publishes `D_i = s_i·c1` with a DLEQ proof against its
//! verification key `s_i·G`. Any `t` valid shares combine by Lagrange
//! interpolation in the exponent into `sk·c1`, so `m·G = c2 - Σ λ_i·D_i`
//! without the joint secret ever existing.

use curve25519_dalek::ristretto::RistrettoPoint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::dleq::{DleqProof, DleqStatement};
use crate::elgamal::Ciphertext;
use crate::error::{CryptoError, ProofKind, Result};
use crate::group::G;
use crate::lagrange::coefficients_at_zero;
use crate::sharing::{CommitteeKey, KeyShare};
use crate::table::DecryptionTable;

const SHARE_DOMAIN: &[u8] = b"phantom.decryption-share.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDecryption {
    pub index: u32,
    pub share: RistrettoPoint,
    pub proof: DleqProof,
}

impl KeyShare {
    /// Produce this member's share for `ct`. `context` binds the proof to
    /// the operation it was requested for.
    pub fn partial_decrypt<R: RngCore + CryptoRng>(
        &self,
        ct: &Ciphertext,
        context: &[u8],
        rng: &mut R,
    ) -> PartialDecryption {
        let share = self.secret() * ct.c1;
        let statement = DleqStatement {
            base_a: G,
            base_b: ct.c1,
            image_a: self.verification_key(),
            image_b: share,
        };
        PartialDecryption {
            index: self.index(),
            share,
            proof: DleqProof::prove(SHARE_DOMAIN, context, &statement, self.secret(), rng),
        }
    }
}

impl PartialDecryption {
    pub fn verify(
        &self,
        ct: &Ciphertext,
        verification_key: &RistrettoPoint,
        context: &[u8],
    ) -> Result<()> {
        let statement = DleqStatement {
            base_a: G,
            base_b: ct.c1,
            image_a: *verification_key,
            image_b: self.share,
        };
        self.proof
            .verify(SHARE_DOMAIN, context, &statement)
            .map_err(|_| CryptoError::invalid(ProofKind::Share, "share proof does not verify"))
    }

    /// Verify against the committee's published key for `self.index`.
    pub fn verify_for(&self, committee: &CommitteeKey, ct: &Ciphertext, context: &[u8]) -> Result<()> {
        let vk = committee
            .verification_key(self.index)
            .ok_or(CryptoError::InvalidShareIndex(self.index))?;
        self.verify(ct, vk, context)
    }
}

/// Combine exactly `threshold` shares into `m·G`. Shares are taken in
/// ascending index order so every caller combines the same subset.
pub fn combine(ct: &Ciphertext, shares: &[PartialDecryption], threshold: u32) -> Result<RistrettoPoint> {
    let need = threshold as usize;
    if shares.len() < need {
        return Err(CryptoError::InsufficientShares {
            have: shares.len(),
            need,
        });
    }
    let mut chosen: Vec<&PartialDecryption> = shares.iter().collect();
    chosen.sort_by_key(|s| s.index);
    chosen.truncate(need);

    let indices: Vec<u32> = chosen.iter().map(|s| s.index).collect();
    let lambdas = coefficients_at_zero(&indices)?;
    let sk_c1: RistrettoPoint = chosen
        .iter()
        .zip(&lambdas)
        .map(|(s, l)| l * s.share)
        .sum();
    Ok(ct.c2 - sk_c1)
}

/// [`combine`] followed by a bounded discrete-log lookup.
pub fn combine_and_decode(
    ct: &Ciphertext,
    shares: &[PartialDecryption],
    threshold: u32,
    table: &DecryptionTable,
) -> Result<u64> {
    table.lookup(&combine(ct, shares, threshold)?)
}
