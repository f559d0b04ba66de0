//! ECVRF-style verifiable random function on ristretto255.
//!
//! `Γ = x·H(pk, α)` with a DLEQ proof that `log_G(Y) = log_H(Γ)`. The output
//! is `SHA-512(Γ)` truncated to 32 bytes. The proof nonce is derived from
//! the secret and the input point, so evaluation is fully deterministic.

use std::fmt;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::dleq::{DleqProof, DleqStatement};
use crate::error::{CryptoError, ProofKind, Result};
use crate::group::G;

const VRF_DOMAIN: &[u8] = b"phantom.vrf.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VrfOutput(pub [u8; 32]);

impl VrfOutput {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Independent sub-seed for a labelled use of the same output.
    #[must_use]
    pub fn derive(&self, label: &[u8]) -> [u8; 32] {
        let mut h = Sha512::new();
        h.update(b"phantom:vrf:derive:v1:");
        h.update(label);
        h.update(self.0);
        truncate(&h.finalize())
    }
}

impl fmt::Display for VrfOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfPublicKey(RistrettoPoint);

impl VrfPublicKey {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    /// Check `proof` for input `alpha` and return the output it certifies.
    pub fn verify(&self, alpha: &[u8], proof: &VrfProof) -> Result<VrfOutput> {
        let h = hash_to_curve(self, alpha);
        let statement = DleqStatement {
            base_a: G,
            base_b: h,
            image_a: self.0,
            image_b: proof.gamma,
        };
        proof
            .dleq
            .verify(VRF_DOMAIN, alpha, &statement)
            .map_err(|_| CryptoError::invalid(ProofKind::Vrf, "gamma not bound to key"))?;
        Ok(output_from_gamma(&proof.gamma))
    }

    /// Verify and additionally require a specific output.
    pub fn verify_output(&self, alpha: &[u8], output: &VrfOutput, proof: &VrfProof) -> Result<()> {
        if self.verify(alpha, proof)? == *output {
            Ok(())
        } else {
            Err(CryptoError::invalid(ProofKind::Vrf, "output does not match proof"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfProof {
    pub gamma: RistrettoPoint,
    pub dleq: DleqProof,
}

impl VrfProof {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut out = [0u8; 96];
        out[..32].copy_from_slice(self.gamma.compress().as_bytes());
        out[32..].copy_from_slice(&self.dleq.to_bytes());
        out
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VrfKeypair {
    secret: Scalar,
    #[zeroize(skip)]
    public: VrfPublicKey,
}

impl VrfKeypair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_secret(Scalar::random(rng))
    }

    #[must_use]
    pub fn from_secret(secret: Scalar) -> Self {
        Self {
            public: VrfPublicKey(secret * G),
            secret,
        }
    }

    #[must_use]
    pub const fn public(&self) -> VrfPublicKey {
        self.public
    }

    #[must_use]
    pub fn evaluate(&self, alpha: &[u8]) -> (VrfOutput, VrfProof) {
        let h = hash_to_curve(&self.public, alpha);
        let gamma = self.secret * h;

        let mut nonce_hash = Sha512::new();
        nonce_hash.update(b"phantom:vrf:nonce:v1:");
        nonce_hash.update(self.secret.as_bytes());
        nonce_hash.update(h.compress().as_bytes());
        let nonce = Scalar::from_hash(nonce_hash);

        let statement = DleqStatement {
            base_a: G,
            base_b: h,
            image_a: self.public.0,
            image_b: gamma,
        };
        let dleq = DleqProof::prove_with_nonce(VRF_DOMAIN, alpha, &statement, &self.secret, nonce);
        (output_from_gamma(&gamma), VrfProof { gamma, dleq })
    }
}

impl fmt::Debug for VrfKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VrfKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn hash_to_curve(pk: &VrfPublicKey, alpha: &[u8]) -> RistrettoPoint {
    let mut h = Sha512::new();
    h.update(b"phantom:vrf:h2c:v1:");
    h.update(pk.to_bytes());
    h.update(alpha);
    RistrettoPoint::from_hash(h)
}

fn output_from_gamma(gamma: &RistrettoPoint) -> VrfOutput {
    let mut h = Sha512::new();
    h.update(b"phantom:vrf:output:v1:");
    h.update(gamma.compress().as_bytes());
    VrfOutput(truncate(&h.finalize()))
}

fn truncate(wide: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&wide[..32]);
    out
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        let kp = VrfKeypair::generate(&mut OsRng);
        let (o1, p1) = kp.evaluate(b"ETH/USDC:7");
        let (o2, p2) = kp.evaluate(b"ETH/USDC:7");
        assert_eq!(o1, o2);
        assert_eq!(p1, p2);
        let (o3, _) = kp.evaluate(b"ETH/USDC:8");
        assert_ne!(o1, o3);
    }

    #[test]
    fn verifies_and_rejects() {
        let kp = VrfKeypair::generate(&mut OsRng);
        let (out, proof) = kp.evaluate(b"alpha");
        assert_eq!(kp.public().verify(b"alpha", &proof).unwrap(), out);
        kp.public().verify_output(b"alpha", &out, &proof).unwrap();

        assert!(kp.public().verify(b"beta", &proof).is_err());
        let other = VrfKeypair::generate(&mut OsRng);
        assert!(other.public().verify(b"alpha", &proof).is_err());
        assert!(kp
            .public()
            .verify_output(b"alpha", &VrfOutput([0; 32]), &proof)
            .is_err());
    }

    #[test]
    fn derived_seeds_differ() {
        let out = VrfOutput([9; 32]);
        assert_ne!(out.derive(b"buy"), out.derive(b"sell"));
        assert_eq!(out.derive(b"buy"), out.derive(b"buy"));
    }
}
