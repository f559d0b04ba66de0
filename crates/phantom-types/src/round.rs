//! Matching round model.
//!
//! A [`MatchingRound`] records everything an auditor needs to check a round
//! without re-deriving it: the VRF output and proof behind the shuffle, the
//! shuffled ids, every pairing decision with its comparison attestation,
//! and the encrypted clearing-price and volume aggregates.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use phantom_crypto::{Ciphertext, SignProof, VrfOutput, VrfProof};
use serde::{Deserialize, Serialize};

use crate::{EncryptedOrder, OrderId, PhantomError, Result, RoundId, TradingPair};

/// Lifecycle: `Pending → InProgress → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RoundStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn can_move_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::InProgress | Self::Failed)
                | (Self::InProgress, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of comparing two encrypted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
}

impl Comparison {
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Less => 0,
            Self::Equal => 1,
            Self::Greater => 2,
        }
    }

    /// Left operand at least the right one.
    #[must_use]
    pub const fn is_ge(self) -> bool {
        !matches!(self, Self::Less)
    }
}

impl From<Ordering> for Comparison {
    fn from(o: Ordering) -> Self {
        match o {
            Ordering::Less => Self::Less,
            Ordering::Equal => Self::Equal,
            Ordering::Greater => Self::Greater,
        }
    }
}

impl From<Comparison> for Ordering {
    fn from(c: Comparison) -> Self {
        match c {
            Comparison::Less => Self::Less,
            Comparison::Equal => Self::Equal,
            Comparison::Greater => Self::Greater,
        }
    }
}

/// Domain tag every comparison context starts with. Executors refuse to
/// produce comparison shares under any other context.
pub const COMPARISON_CONTEXT_TAG: &[u8] = b"phantom:compare:v1:";

/// Evidence for one comparison: the claimed outcome and a sign proof over
/// the masked difference. It reveals the outcome and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonAttestation {
    pub outcome: Comparison,
    pub proof: SignProof,
}

impl ComparisonAttestation {
    /// Bytes a comparison is bound to: round, step and what is compared.
    #[must_use]
    pub fn context(round: &RoundId, step: usize, label: &[u8]) -> Vec<u8> {
        let mut ctx = Vec::with_capacity(COMPARISON_CONTEXT_TAG.len() + 16 + 8 + label.len());
        ctx.extend_from_slice(COMPARISON_CONTEXT_TAG);
        ctx.extend_from_slice(round.as_bytes());
        ctx.extend_from_slice(&(step as u64).to_le_bytes());
        ctx.extend_from_slice(label);
        ctx
    }
}

/// One decision of the pairing walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingStep {
    pub buy: OrderId,
    pub sell: OrderId,
    /// `buy.price` against `sell.price`.
    pub price_check: ComparisonAttestation,
    /// `buy.remaining` against `sell.remaining`; absent when prices did not cross.
    pub amount_check: Option<ComparisonAttestation>,
    /// Encrypted fill; absent when prices did not cross.
    pub fill: Option<Ciphertext>,
}

impl PairingStep {
    #[must_use]
    pub fn crossed(&self) -> bool {
        self.fill.is_some()
    }
}

/// Plaintext aggregates revealed by the committee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedOutcome {
    pub clearing_price: u64,
    pub matched_volume: u64,
}

// ---------------------------------------------------------------------------
// SealedRound: the immutable input to the matcher
// ---------------------------------------------------------------------------

/// One pair's pool, frozen and shuffled for a round.
///
/// `buys` and `sells` are in VRF-shuffled order. `input_hash` commits to the
/// canonical (id-sorted) order set, so the same snapshot always hashes the
/// same regardless of arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedRound {
    pub trading_pair: TradingPair,
    pub round_number: u64,
    pub vrf_output: VrfOutput,
    pub vrf_proof: VrfProof,
    pub buys: Vec<EncryptedOrder>,
    pub sells: Vec<EncryptedOrder>,
    pub input_hash: [u8; 32],
    pub sealed_at: DateTime<Utc>,
}

impl SealedRound {
    #[must_use]
    pub fn id(&self) -> RoundId {
        RoundId::deterministic(&self.trading_pair, self.round_number)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    /// All orders, buys first, consuming the round.
    pub fn into_orders(self) -> impl Iterator<Item = EncryptedOrder> {
        self.buys.into_iter().chain(self.sells)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingRound {
    pub id: RoundId,
    pub trading_pair: TradingPair,
    pub round_number: u64,
    pub vrf_output: VrfOutput,
    pub vrf_proof: VrfProof,
    pub shuffled_buy_ids: Vec<OrderId>,
    pub shuffled_sell_ids: Vec<OrderId>,
    /// Commitment to the canonical order set the round was sealed over.
    pub input_hash: [u8; 32],
    pub steps: Vec<PairingStep>,
    /// `Enc(p_buy + p_sell)` of the marginal matched pair.
    pub clearing_price_ciphertext: Option<Ciphertext>,
    /// Homomorphic sum of all fills.
    pub matched_volume_ciphertext: Ciphertext,
    /// Filled in once the threshold reveal completes.
    pub revealed: Option<RevealedOutcome>,
    pub matching_proof: [u8; 32],
    pub status: RoundStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl MatchingRound {
    #[must_use]
    pub fn new(
        trading_pair: TradingPair,
        round_number: u64,
        vrf_output: VrfOutput,
        vrf_proof: VrfProof,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RoundId::deterministic(&trading_pair, round_number),
            trading_pair,
            round_number,
            vrf_output,
            vrf_proof,
            shuffled_buy_ids: Vec::new(),
            shuffled_sell_ids: Vec::new(),
            input_hash: [0u8; 32],
            steps: Vec::new(),
            clearing_price_ciphertext: None,
            matched_volume_ciphertext: Ciphertext::zero(),
            revealed: None,
            matching_proof: [0u8; 32],
            status: RoundStatus::Pending,
            started_at,
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Whether any pair crossed, i.e. there is something to reveal.
    #[must_use]
    pub fn has_crossing(&self) -> bool {
        self.clearing_price_ciphertext.is_some()
    }

    #[must_use]
    pub fn matched_volume(&self) -> Option<u64> {
        self.revealed.map(|r| r.matched_volume)
    }

    /// `None` for rounds that matched nothing.
    #[must_use]
    pub fn clearing_price(&self) -> Option<u64> {
        self.revealed
            .filter(|r| r.matched_volume > 0)
            .map(|r| r.clearing_price)
    }

    /// All order ids in shuffled order, buys first.
    pub fn shuffled_order_ids(&self) -> impl Iterator<Item = &OrderId> {
        self.shuffled_buy_ids.iter().chain(&self.shuffled_sell_ids)
    }

    pub fn transition(&mut self, to: RoundStatus) -> Result<()> {
        if !self.status.can_move_to(to) {
            return Err(PhantomError::InvalidRoundTransition {
                round: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn complete(&mut self, revealed: RevealedOutcome, now: DateTime<Utc>) -> Result<()> {
        self.transition(RoundStatus::Completed)?;
        self.revealed = Some(revealed);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(RoundStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use phantom_crypto::VrfKeypair;
    use rand::rngs::OsRng;

    use super::*;

    fn round() -> MatchingRound {
        let (out, proof) = VrfKeypair::generate(&mut OsRng).evaluate(b"alpha");
        MatchingRound::new(TradingPair::new("ETH", "USDC"), 1, out, proof, Utc::now())
    }

    #[test]
    fn lifecycle() {
        let mut r = round();
        assert_eq!(r.status, RoundStatus::Pending);
        r.transition(RoundStatus::InProgress).unwrap();
        r.complete(
            RevealedOutcome {
                clearing_price: 100,
                matched_volume: 9,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(r.matched_volume(), Some(9));
        assert!(r.status.is_terminal());
    }

    #[test]
    fn terminal_rounds_are_immutable() {
        let mut r = round();
        r.transition(RoundStatus::InProgress).unwrap();
        r.fail("threshold timeout", Utc::now()).unwrap();
        assert!(r.transition(RoundStatus::Completed).is_err());
        assert!(r.transition(RoundStatus::InProgress).is_err());
    }

    #[test]
    fn cannot_complete_without_running() {
        let mut r = round();
        let err = r
            .complete(
                RevealedOutcome {
                    clearing_price: 1,
                    matched_volume: 1,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, PhantomError::InvalidRoundTransition { .. }));
    }

    #[test]
    fn comparison_context_separates_steps_and_checks() {
        let id = RoundId::deterministic(&TradingPair::new("ETH", "USDC"), 1);
        let price = ComparisonAttestation::context(&id, 0, b"price");
        assert!(price.starts_with(COMPARISON_CONTEXT_TAG));
        assert_ne!(price, ComparisonAttestation::context(&id, 1, b"price"));
        assert_ne!(price, ComparisonAttestation::context(&id, 0, b"amount"));
    }

    #[test]
    fn comparison_from_ordering() {
        assert_eq!(Comparison::from(3.cmp(&5)), Comparison::Less);
        assert_eq!(Ordering::from(Comparison::Greater), Ordering::Greater);
        assert!(Comparison::Equal.is_ge());
        assert!(Comparison::Greater.is_ge());
        assert!(!Comparison::Less.is_ge());
    }
}
