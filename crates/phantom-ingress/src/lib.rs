//! # phantom-ingress
//!
//! **Security Envelope Plane**: order admission, nonce tracking, per-pair
//! order pools and round sealing.
//!
//! ## Architecture
//!
//! The Security Envelope sits between the submission boundary and MatchCore:
//! 1. **AdmissionVerifier**: hard gate. Checks expiry, the trader's
//!    signature, the price bound proof and the solvency proof against the
//!    trader's balance commitment
//! 2. **NonceRegister**: strictly increasing nonces per trader
//! 3. **OrderPool**: one per side, holds admitted orders until a round
//! 4. **PairPool**: serializes `admit`, `release` and `snapshot_for_round`
//!    for one trading pair
//! 5. **RoundSealer**: derives the VRF seed and shuffles the frozen snapshot
//!    into a `SealedRound`
//!
//! ## Order Flow
//!
//! ```text
//! submission → AdmissionVerifier.verify() → NonceRegister.record() → OrderPool.push()
//!     → PairPool.snapshot_for_round() → RoundSealer.seal() → SealedRound → MatchCore
//! ```
//!
//! No order reaches MatchCore without a verified solvency proof.

pub mod admission;
pub mod balance_source;
pub mod nonce_register;
pub mod order_pool;
pub mod pair_pool;
pub mod round_sealer;

pub use admission::AdmissionVerifier;
pub use balance_source::{BalanceCommitmentSource, InMemoryBalanceSource};
pub use nonce_register::NonceRegister;
pub use order_pool::OrderPool;
pub use pair_pool::{PairPool, PoolSnapshot, PoolStats};
pub use round_sealer::RoundSealer;
