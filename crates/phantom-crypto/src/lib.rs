//! # phantom-crypto
//!
//! Group-level primitives for the **Phantom** dark pool. Everything lives on
//! ristretto255 so that ciphertexts, commitments, VRF outputs and threshold
//! key shares share one group and one hashing discipline.
//!
//! - **Encryption**: additively homomorphic ElGamal in the exponent
//!   ([`Ciphertext`], [`PublicKey`], [`EncryptionNonce`]) over a bounded
//!   [`EncodingDomain`], decrypted via a baby-step/giant-step [`DecryptionTable`].
//! - **Commitments and proofs**: Pedersen [`Commitment`]s, bit-decomposition
//!   [`RangeProof`]s, [`BoundedValueProof`] and [`SolvencyProof`].
//! - **Fairness**: an ECVRF-style [`vrf`] and a seeded Fisher-Yates [`shuffle`].
//! - **Threshold**: Feldman DKG ([`sharing`]), Lagrange interpolation and
//!   DLEQ-proved [`PartialDecryption`]s.
//! - **Comparison**: sign-only [`SignProof`]s over a masked difference, so
//!   matching learns an ordering without any difference being opened.
//!
//! No function in this crate ever needs the joint secret key of a committee.

pub mod commitment;
pub mod comparison;
pub mod dleq;
pub mod elgamal;
pub mod error;
pub mod group;
pub mod lagrange;
pub mod range_proof;
pub mod sharing;
pub mod shuffle;
pub mod solvency;
pub mod table;
pub mod threshold;
pub mod vrf;

pub use commitment::{Commitment, Opening};
pub use comparison::{ComparisonMask, SignProof};
pub use dleq::DleqProof;
pub use elgamal::{
    Ciphertext, EncodingDomain, EncryptionNonce, EncryptionWitness, KeyPair, PublicKey, SecretKey,
};
pub use error::{CryptoError, ProofKind, Result};
pub use range_proof::{IntervalProof, RangeProof};
pub use sharing::{CommitteeKey, Dealing, DealingCommitments, KeyShare, ThresholdParams, run_dkg};
pub use solvency::{
    BoundedValueProof, EqualityProof, SolvencyContext, SolvencyProof, SolvencyRangeProof,
    verify_solvency,
};
pub use table::DecryptionTable;
pub use threshold::{PartialDecryption, combine, combine_and_decode};
pub use vrf::{VrfKeypair, VrfOutput, VrfProof, VrfPublicKey};

// Re-exported so downstream crates name group elements without a direct
// curve25519-dalek dependency.
pub use curve25519_dalek::ristretto::RistrettoPoint;
pub use curve25519_dalek::scalar::Scalar;
