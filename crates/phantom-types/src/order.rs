//! Order types for the Phantom dark pool.
//!
//! An order arrives as an [`OrderSubmission`] whose amount and price are
//! ElGamal ciphertexts under the committee key. Only after its signature,
//! price bound and solvency proof verify does the pool turn it into an
//! [`EncryptedOrder`]. Nothing in this module ever sees a plaintext.

use chrono::{DateTime, Utc};
use ed25519_dalek::Signature;
use phantom_crypto::{BoundedValueProof, Ciphertext, SolvencyProof};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{OrderId, TraderId, TradingPair};

/// Which side of the pool this order rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Buy => 0,
            Self::Sell => 1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order: `Pending → Matched | Cancelled | Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Matched,
    Cancelled,
    Expired,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Matched => write!(f, "MATCHED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Submission boundary
// ---------------------------------------------------------------------------

/// What the API layer hands the core for one new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub trading_pair: TradingPair,
    pub side: Side,
    pub trader: TraderId,
    pub encrypted_amount: Ciphertext,
    pub encrypted_price: Ciphertext,
    pub price_proof: BoundedValueProof,
    pub solvency_proof: SolvencyProof,
    /// ed25519 signature by `trader` over [`OrderSubmission::signing_digest`].
    pub signature_proof: Signature,
    pub nonce: u64,
    pub expiry_time: DateTime<Utc>,
}

impl OrderSubmission {
    /// Digest the trader signs. Binds every field except the signature.
    #[must_use]
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"phantom:order:v1:");
        hasher.update(self.trading_pair.symbol().as_bytes());
        hasher.update([self.side.tag()]);
        hasher.update(self.trader.as_bytes());
        hasher.update(self.encrypted_amount.to_bytes());
        hasher.update(self.encrypted_price.to_bytes());
        hasher.update(self.price_proof.commitment.to_bytes());
        hasher.update(self.solvency_proof.audit_token);
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.expiry_time.timestamp_millis().to_le_bytes());
        hasher.finalize().into()
    }

    /// Context string the price bound proof is bound to.
    #[must_use]
    pub fn price_proof_context(trader: &TraderId, nonce: u64) -> Vec<u8> {
        let mut ctx = Vec::with_capacity(18 + 32 + 8);
        ctx.extend_from_slice(b"phantom:price:v1:");
        ctx.extend_from_slice(trader.as_bytes());
        ctx.extend_from_slice(&nonce.to_le_bytes());
        ctx
    }
}

/// Returned to the submitter on admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub order_id: OrderId,
    /// Zero-based position within its side of the pool at admission time.
    pub pool_position: usize,
    /// Earliest time the next round of this pair may run.
    pub estimated_match_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EncryptedOrder
// ---------------------------------------------------------------------------

/// An admitted order. Only `status` and the fill bookkeeping ever change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedOrder {
    pub id: OrderId,
    pub trader: TraderId,
    pub trading_pair: TradingPair,
    pub side: Side,
    pub encrypted_amount: Ciphertext,
    pub encrypted_price: Ciphertext,
    pub solvency_proof: SolvencyProof,
    pub nonce: u64,
    pub submitted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: OrderStatus,
    /// Unfilled amount, reduced homomorphically by each fill.
    pub remaining_amount: Ciphertext,
    /// Sum of fills so far.
    pub filled_amount: Ciphertext,
    /// Rounds this order has taken part in, including failed ones.
    pub rounds_participated: u32,
}

impl EncryptedOrder {
    #[must_use]
    pub fn from_submission(submission: OrderSubmission, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            trader: submission.trader,
            trading_pair: submission.trading_pair,
            side: submission.side,
            encrypted_amount: submission.encrypted_amount,
            encrypted_price: submission.encrypted_price,
            solvency_proof: submission.solvency_proof,
            nonce: submission.nonce,
            submitted_at: now,
            expires_at: submission.expiry_time,
            status: OrderStatus::Pending,
            remaining_amount: submission.encrypted_amount,
            filled_amount: Ciphertext::zero(),
            rounds_participated: 0,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Move `fill` from the remainder to the filled total.
    pub fn apply_fill(&mut self, fill: Ciphertext) {
        self.remaining_amount -= fill;
        self.filled_amount += fill;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_display_and_tag() {
        assert_eq!(format!("{}", Side::Buy), "BUY");
        assert_eq!(format!("{}", Side::Sell), "SELL");
        assert_ne!(Side::Buy.tag(), Side::Sell.tag());
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Matched.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }

    #[test]
    fn price_context_binds_nonce() {
        let t = TraderId([1; 32]);
        assert_ne!(
            OrderSubmission::price_proof_context(&t, 1),
            OrderSubmission::price_proof_context(&t, 2)
        );
    }
}
