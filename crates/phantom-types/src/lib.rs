//! # phantom-types
//!
//! Shared types, errors, and configuration for the **Phantom** dark pool.
//!
//! Every crate above `phantom-crypto` depends on this one. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`TraderId`], [`RoundId`], [`ThresholdOperationId`], [`ExecutorId`], [`TradingPair`]
//! - **Order model**: [`EncryptedOrder`], [`OrderSubmission`], [`SubmissionReceipt`], [`Side`], [`OrderStatus`]
//! - **Round model**: [`MatchingRound`], [`PairingStep`], [`ComparisonAttestation`], [`RoundStatus`]
//! - **Threshold model**: [`ThresholdOperation`], [`ThresholdStatus`]
//! - **Executors**: [`ExecutorNode`], [`ExecutorStatus`], [`ViolationType`]
//! - **Settlement**: [`SettlementInstruction`]
//! - **Configuration**: [`EngineConfig`], [`PairConfig`] and friends
//! - **Errors**: [`PhantomError`] with `DP_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
#[cfg(any(test, feature = "test-helpers"))]
pub mod fixtures;
pub mod ids;
pub mod order;
pub mod round;
pub mod settlement;
pub mod threshold;

pub use config::*;
pub use error::*;
pub use executor::*;
pub use ids::*;
pub use order::*;
pub use round::*;
pub use settlement::*;
pub use threshold::*;

// Constants are accessed via `phantom_types::constants::FOO`.
