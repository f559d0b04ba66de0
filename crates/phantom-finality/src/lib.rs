//! # phantom-finality
//!
//! **Finality Plane**: everything that happens to a matched round after the
//! compute plane is done with it.
//!
//! ## Architecture
//!
//! A round that crossed opens a `ThresholdOperation` over its encrypted
//! clearing sum and volume. The finality plane:
//! 1. Picks a live quorum of executors from the [`ExecutorRegistry`]
//! 2. Collects signed, DLEQ-proved partial decryptions over an
//!    [`ExecutorTransport`] within a bounded share timeout
//! 3. Rejects and penalizes executors whose shares fail verification
//! 4. Combines `t` valid shares into plaintexts ([`ThresholdCoordinator`])
//! 5. Hands the completed round to settlement exactly once
//!    ([`SettlementHandoff`])
//!
//! Comparisons made while matching take the same path: the coordinator
//! fetches one signed share per executor for each masked difference
//! ([`ThresholdCoordinator::comparison_shares`]).
//!
//! No component here ever holds more than one executor's key share.

pub mod coordinator;
pub mod idempotency;
pub mod registry;
pub mod settlement;
pub mod transport;

pub use coordinator::{DecryptionBackend, ThresholdCoordinator};
pub use idempotency::IdempotencyGuard;
pub use registry::ExecutorRegistry;
pub use settlement::{ChannelSink, SettlementHandoff, SettlementSink, build_instruction};
pub use transport::{
    ComparisonShareRequest, ComparisonShareResponse, ExecutorTransport, LocalExecutor,
    ShareRequest, ShareResponse,
};
