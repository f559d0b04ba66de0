//! Range proofs over Pedersen commitments by bit decomposition.
//!
//! The prover commits to each bit `b_i` as `C_i = b_i·G + r_i·H`, chooses the
//! `r_i` so that `Σ 2^i·C_i` equals the target commitment, and shows each
//! `C_i` opens to 0 or 1 with a Cramer-Damgård-Schoenmakers OR proof. Proof
//! size is linear in the bit width, which is fine for the sub-50-bit values
//! an order carries.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::error::{CryptoError, ProofKind, Result};
use crate::group::{self, G, H, TranscriptProtocol};

const MAX_RANGE_BITS: u32 = 63;

/// OR proof that a bit commitment opens to 0 or to 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitProof {
    a0: RistrettoPoint,
    a1: RistrettoPoint,
    c0: Scalar,
    z0: Scalar,
    z1: Scalar,
}

impl BitProof {
    fn prove<R: RngCore + CryptoRng>(
        t: &mut Transcript,
        commitment: &RistrettoPoint,
        bit: bool,
        blinding: &Scalar,
        rng: &mut R,
    ) -> Self {
        let p0 = *commitment;
        let p1 = commitment - G;
        let k = Scalar::random(rng);
        let c_sim = Scalar::random(rng);
        let z_sim = Scalar::random(rng);

        if bit {
            // Simulate branch 0, prove branch 1.
            let a0 = z_sim * *H - c_sim * p0;
            let a1 = k * *H;
            let c = Self::challenge(t, &a0, &a1);
            let c1 = c - c_sim;
            Self {
                a0,
                a1,
                c0: c_sim,
                z0: z_sim,
                z1: k + c1 * blinding,
            }
        } else {
            let a0 = k * *H;
            let a1 = z_sim * *H - c_sim * p1;
            let c = Self::challenge(t, &a0, &a1);
            let c0 = c - c_sim;
            Self {
                a0,
                a1,
                c0,
                z0: k + c0 * blinding,
                z1: z_sim,
            }
        }
    }

    fn verify(&self, t: &mut Transcript, commitment: &RistrettoPoint) -> bool {
        let p0 = *commitment;
        let p1 = commitment - G;
        let c = Self::challenge(t, &self.a0, &self.a1);
        let c1 = c - self.c0;
        self.z0 * *H == self.a0 + self.c0 * p0 && self.z1 * *H == self.a1 + c1 * p1
    }

    fn challenge(t: &mut Transcript, a0: &RistrettoPoint, a1: &RistrettoPoint) -> Scalar {
        t.append_point(b"A0", a0);
        t.append_point(b"A1", a1);
        t.challenge_scalar(b"c")
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.a0.compress().as_bytes());
        out.extend_from_slice(self.a1.compress().as_bytes());
        out.extend_from_slice(self.c0.as_bytes());
        out.extend_from_slice(self.z0.as_bytes());
        out.extend_from_slice(self.z1.as_bytes());
    }
}

/// Proof that a commitment opens to a value in `[0, 2^bits)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeProof {
    bit_commitments: Vec<RistrettoPoint>,
    bit_proofs: Vec<BitProof>,
}

impl RangeProof {
    pub fn prove<R: RngCore + CryptoRng>(
        context: &[u8],
        value: u64,
        blinding: &Scalar,
        bits: u32,
        rng: &mut R,
    ) -> Result<Self> {
        check_bits(bits)?;
        if value >> bits != 0 {
            return Err(CryptoError::Unprovable("value exceeds range"));
        }

        let commitment = Commitment::new(value, blinding);
        let mut t = transcript(context, bits, &commitment);

        // Pick all but the top blinding at random, then solve for the top one
        // so the weighted bit commitments sum to the target.
        let two = Scalar::from(2u64);
        let mut blindings = Vec::with_capacity(bits as usize);
        let mut weighted = Scalar::ZERO;
        let mut weight = Scalar::ONE;
        for _ in 0..bits - 1 {
            let r = Scalar::random(rng);
            weighted += weight * r;
            weight *= two;
            blindings.push(r);
        }
        blindings.push((blinding - weighted) * weight.invert());

        let mut bit_commitments = Vec::with_capacity(bits as usize);
        let mut bit_proofs = Vec::with_capacity(bits as usize);
        for (i, r) in blindings.iter().enumerate() {
            let bit = (value >> i) & 1 == 1;
            let c_i = if bit { G + r * *H } else { r * *H };
            t.append_point(b"Ci", &c_i);
            bit_proofs.push(BitProof::prove(&mut t, &c_i, bit, r, rng));
            bit_commitments.push(c_i);
        }

        Ok(Self {
            bit_commitments,
            bit_proofs,
        })
    }

    pub fn verify(&self, context: &[u8], commitment: &Commitment, bits: u32) -> Result<()> {
        check_bits(bits)?;
        if self.bit_commitments.len() != bits as usize || self.bit_proofs.len() != bits as usize {
            return Err(CryptoError::invalid(ProofKind::Range, "bit count mismatch"));
        }

        let two = Scalar::from(2u64);
        let mut weight = Scalar::ONE;
        let mut recombined = RistrettoPoint::identity();
        for c_i in &self.bit_commitments {
            recombined += weight * c_i;
            weight *= two;
        }
        if recombined != commitment.point() {
            return Err(CryptoError::invalid(
                ProofKind::Range,
                "bit commitments do not recombine",
            ));
        }

        let mut t = transcript(context, bits, commitment);
        for (c_i, proof) in self.bit_commitments.iter().zip(&self.bit_proofs) {
            t.append_point(b"Ci", c_i);
            if !proof.verify(&mut t, c_i) {
                return Err(CryptoError::invalid(ProofKind::Range, "bit proof failed"));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn bits(&self) -> usize {
        self.bit_commitments.len()
    }

    pub(crate) fn write_bytes(&self, out: &mut Vec<u8>) {
        for (c_i, proof) in self.bit_commitments.iter().zip(&self.bit_proofs) {
            out.extend_from_slice(c_i.compress().as_bytes());
            proof.write_bytes(out);
        }
    }
}

/// Proof that a commitment opens to a value in `[min, max]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalProof {
    lower: RangeProof,
    upper: RangeProof,
}

impl IntervalProof {
    pub fn prove<R: RngCore + CryptoRng>(
        context: &[u8],
        value: u64,
        blinding: &Scalar,
        min: u64,
        max: u64,
        rng: &mut R,
    ) -> Result<Self> {
        if min > max || value < min || value > max {
            return Err(CryptoError::Unprovable("value outside interval"));
        }
        let bits = span_bits(min, max);
        Ok(Self {
            lower: RangeProof::prove(&tagged(context, b"lo"), value - min, blinding, bits, rng)?,
            upper: RangeProof::prove(&tagged(context, b"hi"), max - value, &-blinding, bits, rng)?,
        })
    }

    pub fn verify(&self, context: &[u8], commitment: &Commitment, min: u64, max: u64) -> Result<()> {
        if min > max {
            return Err(CryptoError::invalid(ProofKind::Range, "empty interval"));
        }
        let bits = span_bits(min, max);
        let above_min = Commitment::from_point(commitment.point() - group::encode(min));
        let below_max = Commitment::from_point(group::encode(max) - commitment.point());
        self.lower.verify(&tagged(context, b"lo"), &above_min, bits)?;
        self.upper.verify(&tagged(context, b"hi"), &below_max, bits)
    }

    pub(crate) fn write_bytes(&self, out: &mut Vec<u8>) {
        self.lower.write_bytes(out);
        self.upper.write_bytes(out);
    }
}

fn span_bits(min: u64, max: u64) -> u32 {
    (64 - (max - min).leading_zeros()).max(1)
}

fn check_bits(bits: u32) -> Result<()> {
    if bits == 0 || bits > MAX_RANGE_BITS {
        return Err(CryptoError::UnsupportedDomain { bits });
    }
    Ok(())
}

fn tagged(context: &[u8], tag: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(context.len() + tag.len() + 1);
    out.extend_from_slice(context);
    out.push(b'/');
    out.extend_from_slice(tag);
    out
}

fn transcript(context: &[u8], bits: u32, commitment: &Commitment) -> Transcript {
    let mut t = Transcript::new(b"phantom.range.v1");
    t.append_message(b"ctx", context);
    t.append_u64(b"n", u64::from(bits));
    t.append_point(b"C", &commitment.point());
    t
}
