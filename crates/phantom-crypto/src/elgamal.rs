//! Additively homomorphic ElGamal in the exponent.
//!
//! A plaintext `m` is encoded as `m·G`, encrypted as `(r·G, m·G + r·PK)`.
//! Componentwise addition of ciphertexts adds plaintexts, which is all the
//! matching engine needs to subtract fills and accumulate volume without
//! ever seeing a number. Recovering `m` from `m·G` is a bounded discrete-log
//! lookup, so every plaintext must stay inside an [`EncodingDomain`].

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};
use crate::group::{self, G};
use crate::table::DecryptionTable;

/// Default plaintext width for prices and amounts.
pub const DEFAULT_ENCODING_BITS: u32 = 24;
pub const MIN_ENCODING_BITS: u32 = 8;
pub const MAX_ENCODING_BITS: u32 = 48;

// ---------------------------------------------------------------------------
// Encoding domain
// ---------------------------------------------------------------------------

/// Plaintexts admitted for encryption: `[0, 2^bits)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodingDomain {
    bits: u32,
}

impl EncodingDomain {
    pub fn new(bits: u32) -> Result<Self> {
        if (MIN_ENCODING_BITS..=MAX_ENCODING_BITS).contains(&bits) {
            Ok(Self { bits })
        } else {
            Err(CryptoError::UnsupportedDomain { bits })
        }
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    #[must_use]
    pub const fn max_value(&self) -> u64 {
        (1u64 << self.bits) - 1
    }

    pub fn check(&self, value: u64) -> Result<()> {
        if value > self.max_value() {
            return Err(CryptoError::ValueOutOfDomain {
                value,
                max: self.max_value(),
            });
        }
        Ok(())
    }

    /// The same domain with `extra` bits of headroom, used for sums.
    pub fn widened(&self, extra: u32) -> Result<Self> {
        Self::new(self.bits + extra)
    }
}

impl Default for EncodingDomain {
    fn default() -> Self {
        Self {
            bits: DEFAULT_ENCODING_BITS,
        }
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(RistrettoPoint);

impl PublicKey {
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

    /// Encrypt under a fresh random nonce.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        value: u64,
        domain: &EncodingDomain,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        self.encrypt_with_witness(value, domain, rng).map(|(ct, _)| ct)
    }

    /// Encrypt and keep the witness, which the solvency prover needs.
    pub fn encrypt_with_witness<R: RngCore + CryptoRng>(
        &self,
        value: u64,
        domain: &EncodingDomain,
        rng: &mut R,
    ) -> Result<(Ciphertext, EncryptionWitness)> {
        self.encrypt_with_nonce(value, domain, EncryptionNonce::random(rng))
    }

    /// Encrypt under a caller-supplied nonce. The nonce is consumed so the
    /// same randomness cannot encrypt twice.
    pub fn encrypt_with_nonce(
        &self,
        value: u64,
        domain: &EncodingDomain,
        nonce: EncryptionNonce,
    ) -> Result<(Ciphertext, EncryptionWitness)> {
        domain.check(value)?;
        if nonce.0 == Scalar::ZERO {
            return Err(CryptoError::DegenerateNonce);
        }
        let r = nonce.0;
        let ct = Ciphertext {
            c1: r * G,
            c2: group::encode(value) + r * self.0,
        };
        Ok((ct, EncryptionWitness { value, nonce: r }))
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Scalar);

impl SecretKey {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(Scalar::random(rng))
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0 * G)
    }

    /// `c2 - sk·c1`, i.e. `m·G`.
    #[must_use]
    pub fn decrypt_point(&self, ct: &Ciphertext) -> RistrettoPoint {
        ct.c2 - self.0 * ct.c1
    }

    pub fn decrypt(&self, ct: &Ciphertext, table: &DecryptionTable) -> Result<u64> {
        table.lookup(&self.decrypt_point(ct))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Single-holder ElGamal key pair. Committees never build one of these;
/// see [`crate::sharing`].
#[derive(Debug)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = SecretKey::random(rng);
        let public = secret.public_key();
        Self { secret, public }
    }

    #[must_use]
    pub const fn public(&self) -> PublicKey {
        self.public
    }

    #[must_use]
    pub const fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

// ---------------------------------------------------------------------------
// Nonces and witnesses
// ---------------------------------------------------------------------------

/// Encryption randomness. Deliberately not `Clone`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionNonce(Scalar);

impl EncryptionNonce {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(Scalar::random(rng))
    }

    /// Wrap externally derived randomness.
    #[must_use]
    pub const fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar)
    }
}

/// Plaintext and nonce behind one ciphertext. Only provers hold these.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionWitness {
    value: u64,
    nonce: Scalar,
}

impl EncryptionWitness {
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    #[must_use]
    pub const fn nonce(&self) -> &Scalar {
        &self.nonce
    }
}

impl fmt::Debug for EncryptionWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionWitness(..)")
    }
}

// ---------------------------------------------------------------------------
// Ciphertext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub c1: RistrettoPoint,
    pub c2: RistrettoPoint,
}

impl Ciphertext {
    /// Identity ciphertext, the neutral element for accumulation.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            c1: RistrettoPoint::identity(),
            c2: RistrettoPoint::identity(),
        }
    }

    /// Re-randomize without changing the plaintext.
    #[must_use]
    pub fn rerandomize<R: RngCore + CryptoRng>(&self, pk: &PublicKey, rng: &mut R) -> Self {
        let r = Scalar::random(rng);
        Self {
            c1: self.c1 + r * G,
            c2: self.c2 + r * pk.0,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.c1.compress().as_bytes());
        out[32..].copy_from_slice(self.c2.compress().as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Result<Self> {
        let mut c1 = [0u8; 32];
        let mut c2 = [0u8; 32];
        c1.copy_from_slice(&bytes[..32]);
        c2.copy_from_slice(&bytes[32..]);
        Ok(Self {
            c1: group::decompress(&c1)?,
            c2: group::decompress(&c2)?,
        })
    }
}

impl Add for Ciphertext {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            c1: self.c1 + rhs.c1,
            c2: self.c2 + rhs.c2,
        }
    }
}

impl Sub for Ciphertext {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            c1: self.c1 - rhs.c1,
            c2: self.c2 - rhs.c2,
        }
    }
}

impl Neg for Ciphertext {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            c1: -self.c1,
            c2: -self.c2,
        }
    }
}

impl AddAssign for Ciphertext {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Ciphertext {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Sum for Ciphertext {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Ciphertext> for Ciphertext {
    fn sum<I: Iterator<Item = &'a Ciphertext>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
