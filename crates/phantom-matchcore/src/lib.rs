//! # phantom-matchcore
//!
//! Compute plane of the **Phantom** dark pool: a deterministic matcher over
//! encrypted orders.
//!
//! - **Encrypted only**: prices and amounts are ElGamal ciphertexts; the
//!   matcher adds and subtracts them but never decrypts one
//! - **Attested decisions**: each comparison comes from a [`ProofBackend`]
//!   with an attestation that verifies against public keys alone
//! - **Replayable**: the round records every step, so
//!   [`replay_round`] re-derives it and checks the matching proof
//! - **Conserving**: [`check_conservation`] holds buy fills, sell fills and
//!   the volume aggregate to the same ciphertext
//!
//! ## Usage
//!
//! ```rust,ignore
//! let outcome = match_sealed_round(&sealed, &backend, Utc::now()).await?;
//! check_conservation(&sealed, &outcome)?;
//! replay_round(&sealed, &outcome.round, backend.verifier())?;
//! ```

pub mod backend;
pub mod conservation;
#[cfg(any(test, feature = "test-helpers"))]
pub mod fixtures;
pub mod matcher;
pub mod transcript;

pub use backend::{ComparisonVerifier, ProofBackend};
pub use conservation::check_conservation;
pub use matcher::{MatchOutcome, match_sealed_round};
pub use transcript::{compute_matching_proof, replay_round, verify_matching_proof};
