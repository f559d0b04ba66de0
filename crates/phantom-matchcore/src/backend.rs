//! Comparison backends.
//!
//! The matcher never sees a plaintext. Each pairing decision asks a
//! [`ProofBackend`] to compare two ciphertexts and hand back an attestation
//! that anyone holding the committee's public keys can check later. The
//! attestation carries the outcome and a [`SignProof`]; no recorded share
//! opens the compared difference.

use async_trait::async_trait;
use phantom_crypto::{
    Ciphertext, CommitteeKey, ComparisonMask, DecryptionTable, EncodingDomain, PartialDecryption,
    ProofKind, SignProof,
};
use phantom_types::{ComparisonAttestation, PhantomError, Result};
use rand::rngs::OsRng;

/// Compares encrypted values.
#[async_trait]
pub trait ProofBackend: Send + Sync {
    /// Compare the plaintexts behind `left` and `right`.
    async fn compare(
        &self,
        context: &[u8],
        left: &Ciphertext,
        right: &Ciphertext,
    ) -> Result<ComparisonAttestation>;

    /// Checks the attestations this backend produces.
    fn verifier(&self) -> &ComparisonVerifier;
}

/// Checks comparison attestations against public committee keys.
#[derive(Debug, Clone)]
pub struct ComparisonVerifier {
    committee: CommitteeKey,
    domain: EncodingDomain,
}

impl ComparisonVerifier {
    /// `domain` is the encoding domain of order prices and amounts.
    #[must_use]
    pub const fn new(committee: CommitteeKey, domain: EncodingDomain) -> Self {
        Self { committee, domain }
    }

    #[must_use]
    pub const fn committee(&self) -> &CommitteeKey {
        &self.committee
    }

    #[must_use]
    pub const fn domain(&self) -> EncodingDomain {
        self.domain
    }

    /// Check that `attestation` proves its outcome for `left` against `right`.
    ///
    /// # Errors
    /// `InvalidProof` if any part of the sign proof fails.
    pub fn verify(
        &self,
        context: &[u8],
        left: &Ciphertext,
        right: &Ciphertext,
        attestation: &ComparisonAttestation,
    ) -> Result<()> {
        let difference = *left - *right;
        attestation
            .proof
            .verify(
                &self.committee,
                context,
                &difference,
                attestation.outcome.into(),
                &self.domain,
            )
            .map_err(|err| PhantomError::InvalidProof {
                kind: ProofKind::Comparison,
                reason: format!("comparison claims {:?}: {err}", attestation.outcome),
            })
    }

    /// Finish a comparison from `t` shares of `mask.apply(pk, left - right)`.
    ///
    /// Only the holder of `mask` can call this; the result reveals the
    /// outcome alone.
    ///
    /// # Errors
    /// `InvalidProof` for a bad share, `DecryptionRangeExceeded` or
    /// `Encoding` if the difference is outside the domain.
    pub fn attest(
        &self,
        context: &[u8],
        difference: &Ciphertext,
        mask: &ComparisonMask,
        partials: Vec<PartialDecryption>,
        table: &DecryptionTable,
    ) -> Result<ComparisonAttestation> {
        let (ordering, proof) = SignProof::prove(
            &self.committee,
            context,
            difference,
            mask,
            partials,
            &self.domain,
            table,
            &mut OsRng,
        )?;
        Ok(ComparisonAttestation {
            outcome: ordering.into(),
            proof,
        })
    }
}
