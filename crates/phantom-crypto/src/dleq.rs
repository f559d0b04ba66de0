//! Chaum-Pedersen proofs of discrete-log equality.
//!
//! Proves knowledge of `x` with `X = x·A` and `Y = x·B` without revealing
//! `x`. Partial decryptions use it to show `D_i = s_i·c1` under the same
//! share as the published verification key; the VRF uses it to bind `Γ` to
//! the evaluator's public key.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, ProofKind, Result};
use crate::group::TranscriptProtocol;

/// The four points a DLEQ statement is about.
#[derive(Debug, Clone, Copy)]
pub struct DleqStatement {
    pub base_a: RistrettoPoint,
    pub base_b: RistrettoPoint,
    pub image_a: RistrettoPoint,
    pub image_b: RistrettoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DleqProof {
    pub challenge: Scalar,
    pub response: Scalar,
}

impl DleqProof {
    pub fn prove<R: RngCore + CryptoRng>(
        domain: &'static [u8],
        context: &[u8],
        statement: &DleqStatement,
        secret: &Scalar,
        rng: &mut R,
    ) -> Self {
        Self::prove_with_nonce(domain, context, statement, secret, Scalar::random(rng))
    }

    /// Caller provides the commitment nonce. It must never repeat for a
    /// given secret across distinct statements.
    pub(crate) fn prove_with_nonce(
        domain: &'static [u8],
        context: &[u8],
        statement: &DleqStatement,
        secret: &Scalar,
        nonce: Scalar,
    ) -> Self {
        let r_a = nonce * statement.base_a;
        let r_b = nonce * statement.base_b;
        let challenge = challenge(domain, context, statement, &r_a, &r_b);
        Self {
            challenge,
            response: nonce + challenge * secret,
        }
    }

    pub fn verify(
        &self,
        domain: &'static [u8],
        context: &[u8],
        statement: &DleqStatement,
    ) -> Result<()> {
        let r_a = self.response * statement.base_a - self.challenge * statement.image_a;
        let r_b = self.response * statement.base_b - self.challenge * statement.image_b;
        if challenge(domain, context, statement, &r_a, &r_b) == self.challenge {
            Ok(())
        } else {
            Err(CryptoError::invalid(ProofKind::Dleq, "challenge mismatch"))
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.challenge.as_bytes());
        out[32..].copy_from_slice(self.response.as_bytes());
        out
    }
}

fn challenge(
    domain: &'static [u8],
    context: &[u8],
    st: &DleqStatement,
    r_a: &RistrettoPoint,
    r_b: &RistrettoPoint,
) -> Scalar {
    let mut t = Transcript::new(domain);
    t.append_message(b"ctx", context);
    t.append_point(b"A", &st.base_a);
    t.append_point(b"B", &st.base_b);
    t.append_point(b"X", &st.image_a);
    t.append_point(b"Y", &st.image_b);
    t.append_point(b"Ra", r_a);
    t.append_point(b"Rb", r_b);
    t.challenge_scalar(b"c")
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;
    use crate::group::{G, H};

    const DOMAIN: &[u8] = b"phantom.test.dleq";

    fn statement(x: &Scalar) -> DleqStatement {
        DleqStatement {
            base_a: G,
            base_b: *H,
            image_a: x * G,
            image_b: x * *H,
        }
    }

    #[test]
    fn honest_proof_verifies() {
        let x = Scalar::random(&mut OsRng);
        let st = statement(&x);
        let proof = DleqProof::prove(DOMAIN, b"ctx", &st, &x, &mut OsRng);
        assert!(proof.verify(DOMAIN, b"ctx", &st).is_ok());
    }

    #[test]
    fn context_is_bound() {
        let x = Scalar::random(&mut OsRng);
        let st = statement(&x);
        let proof = DleqProof::prove(DOMAIN, b"round-1", &st, &x, &mut OsRng);
        assert!(proof.verify(DOMAIN, b"round-2", &st).is_err());
    }

    #[test]
    fn unequal_logs_fail() {
        let x = Scalar::random(&mut OsRng);
        let mut st = statement(&x);
        st.image_b = Scalar::random(&mut OsRng) * *H;
        let proof = DleqProof::prove(DOMAIN, b"", &st, &x, &mut OsRng);
        assert!(proof.verify(DOMAIN, b"", &st).is_err());
    }
}
