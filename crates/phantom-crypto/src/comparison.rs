//! Sign-only comparisons of encrypted values.
//!
//! To compare `a` and `b` the prover adds a fresh `Enc(m)` of its own to the
//! encrypted difference `Enc(d)`, `d = a - b`, and has the committee
//! threshold-decrypt only that masked ciphertext. The published shares open
//! to `(d + m)·G`, which is uniform to anyone without `m`. The prover then
//! commits to `u` (`d - 1` when positive, `-d - 1` when negative), proves `u`
//! is in range and links the commitment to the masked opening, so a
//! verifier learns the sign of `d` and nothing else.

use std::cmp::Ordering;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::commitment::Commitment;
use crate::elgamal::{Ciphertext, EncodingDomain, PublicKey};
use crate::error::{CryptoError, ProofKind, Result};
use crate::group::{G, H, TranscriptProtocol};
use crate::range_proof::RangeProof;
use crate::sharing::CommitteeKey;
use crate::table::DecryptionTable;
use crate::threshold::{PartialDecryption, combine};

/// The prover's secret mask. Whoever holds it can unmask the opened
/// difference, so it never leaves the prover.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ComparisonMask {
    value: Scalar,
    nonce: Scalar,
}

impl ComparisonMask {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            value: Scalar::random(rng),
            nonce: Scalar::random(rng),
        }
    }

    /// `difference + (s·G, m·G + s·PK)`: the ciphertext executors decrypt.
    #[must_use]
    pub fn apply(&self, pk: &PublicKey, difference: &Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: difference.c1 + self.nonce * G,
            c2: difference.c2 + self.value * G + self.nonce * pk.point(),
        }
    }
}

impl std::fmt::Debug for ComparisonMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ComparisonMask(..)")
    }
}

/// Evidence that `Enc(d)` has a given sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignProof {
    /// The masked difference the shares were produced for.
    pub masked: Ciphertext,
    /// `t` DLEQ-proved shares of `masked`.
    pub partials: Vec<PartialDecryption>,
    /// Commitment to `u`; the identity when `d = 0`.
    pub commitment: Commitment,
    link: LinkProof,
    /// Absent exactly when `d = 0`.
    range: Option<RangeProof>,
}

impl SignProof {
    /// Prove the sign of the plaintext behind `difference`.
    ///
    /// `partials` must be shares of `mask.apply(pk, difference)` bound to
    /// `context`. `table` must cover `domain`.
    ///
    /// # Errors
    /// - `InvalidProof` if a share does not verify
    /// - `InsufficientShares` with fewer than `t` shares
    /// - `DecryptionRangeExceeded` if `|d|` is outside the table
    /// - `ValueOutOfDomain` if `|d|` is outside `domain`
    #[allow(clippy::too_many_arguments)]
    pub fn prove<R: RngCore + CryptoRng>(
        committee: &CommitteeKey,
        context: &[u8],
        difference: &Ciphertext,
        mask: &ComparisonMask,
        partials: Vec<PartialDecryption>,
        domain: &EncodingDomain,
        table: &DecryptionTable,
        rng: &mut R,
    ) -> Result<(Ordering, Self)> {
        let pk = committee.public_key();
        let masked = mask.apply(&pk, difference);
        for partial in &partials {
            partial.verify_for(committee, &masked, context)?;
        }
        let opened = combine(&masked, &partials, committee.params().threshold())?;
        let d = table.lookup_signed(&(opened - mask.value * G))?;
        let magnitude = d.unsigned_abs();
        domain.check(magnitude)?;

        let outcome = d.cmp(&0);
        let (blinding, commitment, range) = if outcome == Ordering::Equal {
            (Scalar::ZERO, Commitment::zero(), None)
        } else {
            let u = magnitude - 1;
            let blinding = Scalar::random(rng);
            let range = RangeProof::prove(&range_context(context), u, &blinding, domain.bits(), rng)?;
            (blinding, Commitment::new(u, &blinding), Some(range))
        };
        // T = m·G - ρ·H for a positive difference, m·G + ρ·H otherwise.
        let link_blinding = if outcome == Ordering::Greater {
            -blinding
        } else {
            blinding
        };

        let statement = Statement::new(difference, &masked, opened, &commitment, outcome);
        let link = LinkProof::prove(context, &pk, &statement, mask, &link_blinding, rng);
        Ok((
            outcome,
            Self {
                masked,
                partials,
                commitment,
                link,
                range,
            },
        ))
    }

    /// Check that the plaintext behind `difference` compares to zero as
    /// `outcome`, using only public committee keys.
    ///
    /// # Errors
    /// `InvalidProof`, `InsufficientShares` or `DuplicateShareIndex`.
    pub fn verify(
        &self,
        committee: &CommitteeKey,
        context: &[u8],
        difference: &Ciphertext,
        outcome: Ordering,
        domain: &EncodingDomain,
    ) -> Result<()> {
        for partial in &self.partials {
            partial.verify_for(committee, &self.masked, context)?;
        }
        let opened = combine(&self.masked, &self.partials, committee.params().threshold())?;

        match (outcome, &self.range) {
            (Ordering::Equal, None) => {
                if self.commitment != Commitment::zero() {
                    return Err(CryptoError::invalid(
                        ProofKind::Comparison,
                        "equality carries a commitment",
                    ));
                }
            }
            (Ordering::Less | Ordering::Greater, Some(range)) => {
                range.verify(&range_context(context), &self.commitment, domain.bits())?;
            }
            _ => {
                return Err(CryptoError::invalid(
                    ProofKind::Comparison,
                    "range proof does not match the outcome",
                ));
            }
        }

        let statement = Statement::new(difference, &self.masked, opened, &self.commitment, outcome);
        self.link.verify(context, &committee.public_key(), &statement)
    }

    /// Canonical bytes for hashing into a transcript.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.partials.len() * 100 + 300);
        out.extend_from_slice(&self.masked.to_bytes());
        for p in &self.partials {
            out.extend_from_slice(&p.index.to_le_bytes());
            out.extend_from_slice(p.share.compress().as_bytes());
            out.extend_from_slice(&p.proof.to_bytes());
        }
        out.extend_from_slice(&self.commitment.to_bytes());
        self.link.write_bytes(&mut out);
        match &self.range {
            Some(range) => {
                out.push(1);
                range.write_bytes(&mut out);
            }
            None => out.push(0),
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Link between the masked opening and the commitment
// ---------------------------------------------------------------------------

/// The three points the link proof speaks about, plus what the challenge
/// must bind.
struct Statement {
    /// `masked.c1 - difference.c1 = s·G`
    a1: RistrettoPoint,
    /// `masked.c2 - difference.c2 = m·G + s·PK`
    a2: RistrettoPoint,
    /// `m·G ± ρ·H`, derived from the opening and the commitment
    t: RistrettoPoint,
    difference: Ciphertext,
    masked: Ciphertext,
    opened: RistrettoPoint,
    commitment: Commitment,
    outcome: Ordering,
}

impl Statement {
    fn new(
        difference: &Ciphertext,
        masked: &Ciphertext,
        opened: RistrettoPoint,
        commitment: &Commitment,
        outcome: Ordering,
    ) -> Self {
        let c = commitment.point();
        // opened = (d + m)·G. Positive: d = u + 1. Negative: d = -u - 1.
        let t = match outcome {
            Ordering::Greater => opened - G - c,
            Ordering::Equal => opened - c,
            Ordering::Less => opened + G + c,
        };
        Self {
            a1: masked.c1 - difference.c1,
            a2: masked.c2 - difference.c2,
            t,
            difference: *difference,
            masked: *masked,
            opened,
            commitment: *commitment,
            outcome,
        }
    }
}

/// Sigma proof of `(m, s, ρ')` with `a1 = s·G`, `a2 = m·G + s·PK` and
/// `t = m·G + ρ'·H`. The shared `m` ties the commitment to the mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LinkProof {
    r1: RistrettoPoint,
    r2: RistrettoPoint,
    r3: RistrettoPoint,
    z_value: Scalar,
    z_nonce: Scalar,
    z_blinding: Scalar,
}

impl LinkProof {
    fn prove<R: RngCore + CryptoRng>(
        context: &[u8],
        pk: &PublicKey,
        st: &Statement,
        mask: &ComparisonMask,
        blinding: &Scalar,
        rng: &mut R,
    ) -> Self {
        let k_value = Scalar::random(rng);
        let k_nonce = Scalar::random(rng);
        let k_blinding = Scalar::random(rng);

        let r1 = k_nonce * G;
        let r2 = k_value * G + k_nonce * pk.point();
        let r3 = k_value * G + k_blinding * *H;
        let c = link_challenge(context, pk, st, &r1, &r2, &r3);

        Self {
            r1,
            r2,
            r3,
            z_value: k_value + c * mask.value,
            z_nonce: k_nonce + c * mask.nonce,
            z_blinding: k_blinding + c * blinding,
        }
    }

    fn verify(&self, context: &[u8], pk: &PublicKey, st: &Statement) -> Result<()> {
        let c = link_challenge(context, pk, st, &self.r1, &self.r2, &self.r3);
        let ok = self.z_nonce * G == self.r1 + c * st.a1
            && self.z_value * G + self.z_nonce * pk.point() == self.r2 + c * st.a2
            && self.z_value * G + self.z_blinding * *H == self.r3 + c * st.t;
        if ok {
            Ok(())
        } else {
            Err(CryptoError::invalid(
                ProofKind::Comparison,
                "commitment is not linked to the masked opening",
            ))
        }
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        for p in [&self.r1, &self.r2, &self.r3] {
            out.extend_from_slice(p.compress().as_bytes());
        }
        for s in [&self.z_value, &self.z_nonce, &self.z_blinding] {
            out.extend_from_slice(s.as_bytes());
        }
    }
}

const fn outcome_tag(outcome: Ordering) -> u64 {
    match outcome {
        Ordering::Less => 0,
        Ordering::Equal => 1,
        Ordering::Greater => 2,
    }
}

fn link_challenge(
    context: &[u8],
    pk: &PublicKey,
    st: &Statement,
    r1: &RistrettoPoint,
    r2: &RistrettoPoint,
    r3: &RistrettoPoint,
) -> Scalar {
    let mut t = Transcript::new(b"phantom.comparison.v1");
    t.append_message(b"ctx", context);
    t.append_point(b"PK", &pk.point());
    t.append_u64(b"outcome", outcome_tag(st.outcome));
    t.append_point(b"d1", &st.difference.c1);
    t.append_point(b"d2", &st.difference.c2);
    t.append_point(b"m1", &st.masked.c1);
    t.append_point(b"m2", &st.masked.c2);
    t.append_point(b"M", &st.opened);
    t.append_point(b"C", &st.commitment.point());
    t.append_point(b"R1", r1);
    t.append_point(b"R2", r2);
    t.append_point(b"R3", r3);
    t.challenge_scalar(b"c")
}

fn range_context(context: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(context.len() + 6);
    out.extend_from_slice(context);
    out.extend_from_slice(b"/range");
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::rngs::OsRng;

    use super::*;
    use crate::sharing::{KeyShare, ThresholdParams, run_dkg};

    struct Setup {
        committee: CommitteeKey,
        shares: Vec<KeyShare>,
        domain: EncodingDomain,
        table: DecryptionTable,
    }

    fn setup() -> Setup {
        let (committee, shares) = run_dkg(ThresholdParams::new(2, 3).unwrap(), &mut OsRng).unwrap();
        let domain = EncodingDomain::new(12).unwrap();
        Setup {
            committee,
            shares,
            domain,
            table: DecryptionTable::new(domain),
        }
    }

    impl Setup {
        fn enc(&self, v: u64) -> Ciphertext {
            self.committee
                .public_key()
                .encrypt(v, &self.domain, &mut OsRng)
                .unwrap()
        }

        fn prove(&self, ctx: &[u8], difference: &Ciphertext) -> (Ordering, SignProof) {
            let mask = ComparisonMask::random(&mut OsRng);
            let masked = mask.apply(&self.committee.public_key(), difference);
            let partials = self.shares[1..]
                .iter()
                .map(|s| s.partial_decrypt(&masked, ctx, &mut OsRng))
                .collect();
            SignProof::prove(
                &self.committee,
                ctx,
                difference,
                &mask,
                partials,
                &self.domain,
                &self.table,
                &mut OsRng,
            )
            .unwrap()
        }
    }

    #[test]
    fn outcome_follows_plaintexts() {
        let s = setup();
        for (a, b, want) in [
            (100, 98, Ordering::Greater),
            (99, 100, Ordering::Less),
            (101, 101, Ordering::Equal),
            (0, 4095, Ordering::Less),
            (4095, 0, Ordering::Greater),
        ] {
            let difference = s.enc(a) - s.enc(b);
            let (outcome, proof) = s.prove(b"ctx", &difference);
            assert_eq!(outcome, want, "{a} vs {b}");
            proof
                .verify(&s.committee, b"ctx", &difference, outcome, &s.domain)
                .unwrap();
        }
    }

    #[test]
    fn published_shares_do_not_open_the_difference() {
        let s = setup();
        let difference = s.enc(100) - s.enc(98);
        let (_, proof) = s.prove(b"ctx", &difference);

        let opened = combine(&proof.masked, &proof.partials, 2).unwrap();
        assert!(s.table.lookup_signed(&opened).is_err());
        let unmasked = combine(&difference, &proof.partials, 2).unwrap();
        assert!(s.table.lookup_signed(&unmasked).is_err());
        assert!(proof.partials[0]
            .verify_for(&s.committee, &difference, b"ctx")
            .is_err());
    }

    #[test]
    fn claimed_outcome_must_match() {
        let s = setup();
        let difference = s.enc(5) - s.enc(3);
        let (_, proof) = s.prove(b"ctx", &difference);
        for wrong in [Ordering::Less, Ordering::Equal] {
            assert!(proof
                .verify(&s.committee, b"ctx", &difference, wrong, &s.domain)
                .is_err());
        }

        let equal = s.enc(7) - s.enc(7);
        let (_, proof) = s.prove(b"ctx", &equal);
        assert!(proof
            .verify(&s.committee, b"ctx", &equal, Ordering::Greater, &s.domain)
            .is_err());
    }

    #[test]
    fn proof_is_bound_to_its_context_and_operands() {
        let s = setup();
        let difference = s.enc(5) - s.enc(3);
        let (outcome, proof) = s.prove(b"step-1", &difference);
        assert!(proof
            .verify(&s.committee, b"step-2", &difference, outcome, &s.domain)
            .is_err());

        let other = s.enc(5) - s.enc(3);
        assert!(proof
            .verify(&s.committee, b"step-1", &other, outcome, &s.domain)
            .is_err());
    }

    #[test]
    fn commitment_from_another_comparison_rejected() {
        let s = setup();
        let first = s.enc(9) - s.enc(2);
        let second = s.enc(3) - s.enc(2);
        let (outcome, mut proof) = s.prove(b"ctx", &first);
        let (_, donor) = s.prove(b"ctx", &second);
        proof.commitment = donor.commitment;
        proof.range = donor.range;
        assert!(proof
            .verify(&s.committee, b"ctx", &first, outcome, &s.domain)
            .is_err());
    }

    #[test]
    fn too_few_shares_rejected() {
        let s = setup();
        let difference = s.enc(5) - s.enc(3);
        let (outcome, mut proof) = s.prove(b"ctx", &difference);
        proof.partials.truncate(1);
        assert!(matches!(
            proof.verify(&s.committee, b"ctx", &difference, outcome, &s.domain),
            Err(CryptoError::InsufficientShares { have: 1, need: 2 })
        ));
    }

    #[test]
    fn proof_survives_serialization() {
        let s = setup();
        let difference = s.enc(40) - s.enc(41);
        let (outcome, proof) = s.prove(b"wire", &difference);
        let json = serde_json::to_string(&proof).unwrap();
        let back: SignProof = serde_json::from_str(&json).unwrap();
        assert_eq!(back, proof);
        assert_eq!(back.to_bytes(), proof.to_bytes());
        back.verify(&s.committee, b"wire", &difference, outcome, &s.domain)
            .unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn outcome_is_the_integer_ordering(a in 0u64..4096, b in 0u64..4096) {
            let s = setup();
            let difference = s.enc(a) - s.enc(b);
            let (outcome, proof) = s.prove(b"p", &difference);
            prop_assert_eq!(outcome, a.cmp(&b));
            prop_assert!(proof.verify(&s.committee, b"p", &difference, outcome, &s.domain).is_ok());
        }
    }
}
