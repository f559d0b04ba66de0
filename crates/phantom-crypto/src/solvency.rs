//! Proofs that tie an encrypted order to committed, bounded plaintexts.
//!
//! [`EqualityProof`] shows an ElGamal ciphertext and a Pedersen commitment
//! hide the same value. [`BoundedValueProof`] adds an interval proof on top,
//! and [`SolvencyProof`] further shows the committed amount does not exceed
//! the trader's committed balance. A verifier learns none of the values.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::commitment::{Commitment, Opening};
use crate::elgamal::{Ciphertext, EncodingDomain, EncryptionWitness, PublicKey};
use crate::error::{CryptoError, ProofKind, Result};
use crate::group::{G, H, TranscriptProtocol};
use crate::range_proof::{IntervalProof, RangeProof};

/// Bit width of the `balance - amount` headroom proof.
pub const HEADROOM_BITS: u32 = 48;

// ---------------------------------------------------------------------------
// Ciphertext / commitment equality
// ---------------------------------------------------------------------------

/// Sigma proof over `c1 = r·G`, `c2 = a·G + r·PK`, `C = a·G + ρ·H`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualityProof {
    t1: RistrettoPoint,
    t2: RistrettoPoint,
    t3: RistrettoPoint,
    z_value: Scalar,
    z_nonce: Scalar,
    z_blinding: Scalar,
}

impl EqualityProof {
    pub fn prove<R: RngCore + CryptoRng>(
        context: &[u8],
        pk: &PublicKey,
        ct: &Ciphertext,
        commitment: &Commitment,
        witness: &EncryptionWitness,
        blinding: &Scalar,
        rng: &mut R,
    ) -> Self {
        let k_value = Scalar::random(rng);
        let k_nonce = Scalar::random(rng);
        let k_blinding = Scalar::random(rng);

        let t1 = k_nonce * G;
        let t2 = k_value * G + k_nonce * pk.point();
        let t3 = k_value * G + k_blinding * *H;
        let c = equality_challenge(context, pk, ct, commitment, &t1, &t2, &t3);

        Self {
            t1,
            t2,
            t3,
            z_value: k_value + c * Scalar::from(witness.value()),
            z_nonce: k_nonce + c * witness.nonce(),
            z_blinding: k_blinding + c * blinding,
        }
    }

    pub fn verify(
        &self,
        context: &[u8],
        pk: &PublicKey,
        ct: &Ciphertext,
        commitment: &Commitment,
    ) -> Result<()> {
        let c = equality_challenge(context, pk, ct, commitment, &self.t1, &self.t2, &self.t3);
        let ok = self.z_nonce * G == self.t1 + c * ct.c1
            && self.z_value * G + self.z_nonce * pk.point() == self.t2 + c * ct.c2
            && self.z_value * G + self.z_blinding * *H == self.t3 + c * commitment.point();
        if ok {
            Ok(())
        } else {
            Err(CryptoError::invalid(
                ProofKind::Equality,
                "ciphertext and commitment disagree",
            ))
        }
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        for p in [&self.t1, &self.t2, &self.t3] {
            out.extend_from_slice(p.compress().as_bytes());
        }
        for s in [&self.z_value, &self.z_nonce, &self.z_blinding] {
            out.extend_from_slice(s.as_bytes());
        }
    }
}

fn equality_challenge(
    context: &[u8],
    pk: &PublicKey,
    ct: &Ciphertext,
    commitment: &Commitment,
    t1: &RistrettoPoint,
    t2: &RistrettoPoint,
    t3: &RistrettoPoint,
) -> Scalar {
    let mut t = Transcript::new(b"phantom.equality.v1");
    t.append_message(b"ctx", context);
    t.append_point(b"PK", &pk.point());
    t.append_point(b"c1", &ct.c1);
    t.append_point(b"c2", &ct.c2);
    t.append_point(b"C", &commitment.point());
    t.append_point(b"T1", t1);
    t.append_point(b"T2", t2);
    t.append_point(b"T3", t3);
    t.challenge_scalar(b"c")
}

// ---------------------------------------------------------------------------
// Bounded ciphertext
// ---------------------------------------------------------------------------

/// Shows a ciphertext encrypts a value in `[min, max]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedValueProof {
    pub commitment: Commitment,
    pub range: IntervalProof,
    pub consistency: EqualityProof,
}

impl BoundedValueProof {
    pub fn prove<R: RngCore + CryptoRng>(
        context: &[u8],
        pk: &PublicKey,
        ct: &Ciphertext,
        witness: &EncryptionWitness,
        min: u64,
        max: u64,
        rng: &mut R,
    ) -> Result<Self> {
        let opening = Opening::random(witness.value(), rng);
        let commitment = opening.commitment();
        Ok(Self {
            commitment,
            range: IntervalProof::prove(context, witness.value(), opening.blinding(), min, max, rng)?,
            consistency: EqualityProof::prove(
                context,
                pk,
                ct,
                &commitment,
                witness,
                opening.blinding(),
                rng,
            ),
        })
    }

    pub fn verify(
        &self,
        context: &[u8],
        pk: &PublicKey,
        ct: &Ciphertext,
        min: u64,
        max: u64,
    ) -> Result<()> {
        self.range.verify(context, &self.commitment, min, max)?;
        self.consistency.verify(context, pk, ct, &self.commitment)
    }
}

// ---------------------------------------------------------------------------
// Solvency
// ---------------------------------------------------------------------------

/// Public inputs a solvency proof is bound to. Changing any of them
/// invalidates the proof, so a proof cannot be lifted onto another order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolvencyContext {
    pub public_key: PublicKey,
    pub trader: [u8; 32],
    pub nonce: u64,
}

impl SolvencyContext {
    fn tagged(&self, tag: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 32 + 8 + tag.len());
        out.extend_from_slice(&self.public_key.to_bytes());
        out.extend_from_slice(&self.trader);
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(tag);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvencyRangeProof {
    /// Committed amount lies in `[1, domain max]`.
    pub amount: IntervalProof,
    /// `balance - amount` is non-negative.
    pub headroom: RangeProof,
    /// The order ciphertext encrypts the committed amount.
    pub consistency: EqualityProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvencyProof {
    pub amount_commitment: Commitment,
    pub balance_commitment: Commitment,
    pub range_proof: SolvencyRangeProof,
    pub audit_token: [u8; 32],
}

impl SolvencyProof {
    pub fn prove<R: RngCore + CryptoRng>(
        ctx: &SolvencyContext,
        encrypted_amount: &Ciphertext,
        amount: &EncryptionWitness,
        balance: &Opening,
        domain: &EncodingDomain,
        rng: &mut R,
    ) -> Result<Self> {
        let value = amount.value();
        if value == 0 {
            return Err(CryptoError::Unprovable("zero amount"));
        }
        let headroom = balance
            .value()
            .checked_sub(value)
            .ok_or(CryptoError::Unprovable("amount exceeds balance"))?;

        let amount_opening = Opening::random(value, rng);
        let amount_commitment = amount_opening.commitment();
        let balance_commitment = balance.commitment();

        let range_proof = SolvencyRangeProof {
            amount: IntervalProof::prove(
                &ctx.tagged(b"amount"),
                value,
                amount_opening.blinding(),
                1,
                domain.max_value(),
                rng,
            )?,
            headroom: RangeProof::prove(
                &ctx.tagged(b"headroom"),
                headroom,
                &(balance.blinding() - amount_opening.blinding()),
                HEADROOM_BITS,
                rng,
            )?,
            consistency: EqualityProof::prove(
                &ctx.tagged(b"consistency"),
                &ctx.public_key,
                encrypted_amount,
                &amount_commitment,
                amount,
                amount_opening.blinding(),
                rng,
            ),
        };

        let audit_token = audit_token(
            ctx,
            encrypted_amount,
            &amount_commitment,
            &balance_commitment,
            &range_proof,
        );
        Ok(Self {
            amount_commitment,
            balance_commitment,
            range_proof,
            audit_token,
        })
    }

    /// Full check against the balance commitment the verifier trusts.
    pub fn verify(
        &self,
        ctx: &SolvencyContext,
        encrypted_amount: &Ciphertext,
        expected_balance: &Commitment,
        domain: &EncodingDomain,
    ) -> Result<()> {
        if self.balance_commitment != *expected_balance {
            return Err(CryptoError::invalid(
                ProofKind::Solvency,
                "balance commitment does not match record",
            ));
        }
        let expected_token = audit_token(
            ctx,
            encrypted_amount,
            &self.amount_commitment,
            &self.balance_commitment,
            &self.range_proof,
        );
        if expected_token != self.audit_token {
            return Err(CryptoError::invalid(ProofKind::Solvency, "audit token mismatch"));
        }

        let rp = &self.range_proof;
        rp.amount.verify(
            &ctx.tagged(b"amount"),
            &self.amount_commitment,
            1,
            domain.max_value(),
        )?;
        rp.headroom.verify(
            &ctx.tagged(b"headroom"),
            &(self.balance_commitment - self.amount_commitment),
            HEADROOM_BITS,
        )?;
        rp.consistency.verify(
            &ctx.tagged(b"consistency"),
            &ctx.public_key,
            encrypted_amount,
            &self.amount_commitment,
        )
    }
}

/// Boolean form of [`SolvencyProof::verify`].
#[must_use]
pub fn verify_solvency(
    proof: &SolvencyProof,
    ctx: &SolvencyContext,
    encrypted_amount: &Ciphertext,
    expected_balance: &Commitment,
    domain: &EncodingDomain,
) -> bool {
    proof
        .verify(ctx, encrypted_amount, expected_balance, domain)
        .is_ok()
}

fn audit_token(
    ctx: &SolvencyContext,
    encrypted_amount: &Ciphertext,
    amount_commitment: &Commitment,
    balance_commitment: &Commitment,
    proof: &SolvencyRangeProof,
) -> [u8; 32] {
    let mut proof_bytes = Vec::new();
    proof.amount.write_bytes(&mut proof_bytes);
    proof.headroom.write_bytes(&mut proof_bytes);
    proof.consistency.write_bytes(&mut proof_bytes);

    let mut hasher = Sha256::new();
    hasher.update(b"phantom:solvency:audit:v1:");
    hasher.update(ctx.trader);
    hasher.update(ctx.nonce.to_be_bytes());
    hasher.update(encrypted_amount.to_bytes());
    hasher.update(amount_commitment.to_bytes());
    hasher.update(balance_commitment.to_bytes());
    hasher.update(&proof_bytes);
    hasher.finalize().into()
}
