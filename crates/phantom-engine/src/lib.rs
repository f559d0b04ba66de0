//! # phantom-engine
//!
//! Orchestration for the **Phantom** dark pool: ties the Security Envelope
//! (`phantom-ingress`), the compute plane (`phantom-matchcore`) and the
//! finality plane (`phantom-finality`) into rounds.
//!
//! - [`DarkPoolCoordinator`]: owns all engine state, routes submissions and
//!   runs rounds for every pair in parallel
//! - [`PairEngine`]: one pair's round pipeline, from snapshot to settlement
//! - [`RoundScheduler`]: when rounds run ([`ManualScheduler`],
//!   [`IntervalScheduler`])
//! - [`LocalCommittee`]: an in-process executor committee
//! - [`ExecutorComparator`]: encrypted comparisons answered by executor shares
//!
//! ## Round Lifecycle
//!
//! ```text
//! snapshot → seal (VRF shuffle) → match over ciphertexts → conservation + replay
//!     → threshold reveal (only if something crossed) → hand back orders → settle
//!                         └── any failure: round FAILED, orders restored, retried next tick
//! ```

pub mod comparator;
pub mod coordinator;
pub mod local;
pub mod pair_engine;
pub mod scheduler;

pub use comparator::ExecutorComparator;
pub use coordinator::{DarkPoolCoordinator, Services};
pub use local::LocalCommittee;
pub use pair_engine::{PairEngine, RoundReport};
pub use scheduler::{IntervalScheduler, ManualScheduler, ManualTrigger, RoundScheduler};
