//! Fixed generators and Fiat-Shamir helpers shared by every proof.

use std::sync::LazyLock;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use sha2::Sha512;

use crate::error::{CryptoError, Result};

/// Encoding generator `G`. Plaintexts live in its exponent.
pub const G: RistrettoPoint = RISTRETTO_BASEPOINT_POINT;

/// Pedersen blinding generator `H`, with no known discrete log relative to `G`.
pub static H: LazyLock<RistrettoPoint> =
    LazyLock::new(|| RistrettoPoint::hash_from_bytes::<Sha512>(b"phantom-pool:pedersen:H:v1"));

/// `v·G` for a small plaintext.
#[inline]
pub fn encode(value: u64) -> RistrettoPoint {
    Scalar::from(value) * G
}

pub fn decompress(bytes: &[u8; 32]) -> Result<RistrettoPoint> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or(CryptoError::MalformedPoint)
}

/// Merlin transcript extension, in the style of the dalek proof crates.
pub(crate) trait TranscriptProtocol {
    fn append_point(&mut self, label: &'static [u8], point: &RistrettoPoint);
    fn append_scalar(&mut self, label: &'static [u8], scalar: &Scalar);
    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar;
}

impl TranscriptProtocol for Transcript {
    fn append_point(&mut self, label: &'static [u8], point: &RistrettoPoint) {
        self.append_message(label, point.compress().as_bytes());
    }

    fn append_scalar(&mut self, label: &'static [u8], scalar: &Scalar) {
        self.append_message(label, scalar.as_bytes());
    }

    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar {
        let mut wide = [0u8; 64];
        self.challenge_bytes(label, &mut wide);
        Scalar::from_bytes_mod_order_wide(&wide)
    }
}
