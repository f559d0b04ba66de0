//! Where the pool reads trader balance commitments from.
//!
//! The persistence layer owns balances; the core only ever sees the
//! Pedersen commitment to one.

use std::collections::HashMap;

use parking_lot::RwLock;
use phantom_crypto::Commitment;
use phantom_types::TraderId;

/// Read access to the current balance commitment of a trader.
pub trait BalanceCommitmentSource: Send + Sync {
    /// `None` when the trader has no balance on record.
    fn balance_commitment(&self, trader: &TraderId) -> Option<Commitment>;
}

/// Map-backed source for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryBalanceSource {
    commitments: RwLock<HashMap<TraderId, Commitment>>,
}

impl InMemoryBalanceSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) a trader's balance commitment.
    pub fn set(&self, trader: TraderId, commitment: Commitment) {
        self.commitments.write().insert(trader, commitment);
    }

    pub fn remove(&self, trader: &TraderId) -> Option<Commitment> {
        self.commitments.write().remove(trader)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commitments.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commitments.read().is_empty()
    }
}

impl BalanceCommitmentSource for InMemoryBalanceSource {
    fn balance_commitment(&self, trader: &TraderId) -> Option<Commitment> {
        self.commitments.read().get(trader).copied()
    }
}
