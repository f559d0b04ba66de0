//! Threshold operation model.
//!
//! One operation is opened per reveal attempt of a round that crossed. It
//! only references its round by id.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use phantom_crypto::{Ciphertext, PartialDecryption};
use serde::{Deserialize, Serialize};

use crate::{ExecutorId, RoundId, ThresholdOperationId, TradingPair};

/// Lifecycle: `Pending → InProgress (≥ t shares) → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThresholdStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for ThresholdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdOperation {
    pub id: ThresholdOperationId,
    pub matching_round_id: RoundId,
    pub trading_pair: TradingPair,
    /// Ciphertexts to reveal: `[Enc(p_buy + p_sell), Enc(volume)]`.
    pub encrypted_payload: Vec<Ciphertext>,
    pub required_shares: u32,
    pub total_shares: u32,
    /// Verified partial decryptions, one per payload entry, per executor.
    pub shares_received: BTreeMap<ExecutorId, Vec<PartialDecryption>>,
    /// Executors whose submission failed verification.
    pub rejected: BTreeSet<ExecutorId>,
    pub status: ThresholdStatus,
    pub attempt: u32,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl ThresholdOperation {
    #[must_use]
    pub fn open(
        matching_round_id: RoundId,
        trading_pair: TradingPair,
        encrypted_payload: Vec<Ciphertext>,
        required_shares: u32,
        total_shares: u32,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ThresholdOperationId::deterministic(&matching_round_id, attempt),
            matching_round_id,
            trading_pair,
            encrypted_payload,
            required_shares,
            total_shares,
            shares_received: BTreeMap::new(),
            rejected: BTreeSet::new(),
            status: ThresholdStatus::Pending,
            attempt,
            opened_at: now,
            closed_at: None,
        }
    }

    /// Bytes every share proof for this operation is bound to.
    #[must_use]
    pub fn proof_context(&self) -> Vec<u8> {
        Self::context_for(&self.id)
    }

    /// [`ThresholdOperation::proof_context`] for an operation known only by id.
    /// Executors derive the context themselves rather than trusting one sent
    /// to them.
    #[must_use]
    pub fn context_for(id: &ThresholdOperationId) -> Vec<u8> {
        let mut ctx = Vec::with_capacity(24 + 16);
        ctx.extend_from_slice(b"phantom:threshold_op:v1:");
        ctx.extend_from_slice(id.as_bytes());
        ctx
    }

    /// Record an already verified submission. Returns the number of valid
    /// shares held afterwards. Reaching `t` moves the operation to
    /// `InProgress`.
    pub fn record_share(&mut self, executor: ExecutorId, partials: Vec<PartialDecryption>) -> usize {
        if self.is_closed() {
            return self.shares_received.len();
        }
        self.shares_received.insert(executor, partials);
        if self.has_quorum() {
            self.status = ThresholdStatus::InProgress;
        }
        self.shares_received.len()
    }

    pub fn reject(&mut self, executor: ExecutorId) {
        self.rejected.insert(executor);
    }

    #[must_use]
    pub fn has_quorum(&self) -> bool {
        self.shares_received.len() >= self.required_shares as usize
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.status, ThresholdStatus::Completed | ThresholdStatus::Failed)
    }

    /// Shares for payload entry `slot`, one per executor.
    #[must_use]
    pub fn shares_for_slot(&self, slot: usize) -> Vec<PartialDecryption> {
        self.shares_received
            .values()
            .filter_map(|p| p.get(slot).cloned())
            .collect()
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = ThresholdStatus::Completed;
        self.closed_at = Some(now);
    }

    pub fn fail(&mut self, now: DateTime<Utc>) {
        self.status = ThresholdStatus::Failed;
        self.closed_at = Some(now);
    }
}
