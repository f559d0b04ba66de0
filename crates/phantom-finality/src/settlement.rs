//! Settlement handoff.
//!
//! A completed round with a non-zero matched volume becomes exactly one
//! [`SettlementInstruction`], handed to whatever moves the funds. The core
//! itself never does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use phantom_types::constants::BPS_DENOMINATOR;
use phantom_types::{
    MatchingRound, PairConfig, PhantomError, Result, RoundStatus, SettlementInstruction,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::idempotency::IdempotencyGuard;

#[async_trait]
pub trait SettlementSink: Send + Sync {
    async fn settle(&self, instruction: SettlementInstruction) -> Result<()>;
}

#[async_trait]
impl<T: SettlementSink + ?Sized> SettlementSink for std::sync::Arc<T> {
    async fn settle(&self, instruction: SettlementInstruction) -> Result<()> {
        (**self).settle(instruction).await
    }
}

/// Forwards instructions into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SettlementInstruction>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SettlementInstruction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SettlementSink for ChannelSink {
    async fn settle(&self, instruction: SettlementInstruction) -> Result<()> {
        self.tx
            .send(instruction)
            .map_err(|_| PhantomError::SettlementFailed {
                reason: "settlement receiver dropped".into(),
            })
    }
}

/// Build the instruction for a completed round.
///
/// # Errors
/// `SettlementFailed` if the round is not completed or carries no revealed
/// outcome.
pub fn build_instruction(
    round: &MatchingRound,
    pair: &PairConfig,
    now: DateTime<Utc>,
) -> Result<SettlementInstruction> {
    let revealed = match (round.status, round.revealed) {
        (RoundStatus::Completed, Some(revealed)) => revealed,
        _ => {
            return Err(PhantomError::SettlementFailed {
                reason: format!("round {} has no revealed outcome", round.id),
            });
        }
    };
    let fee = revealed.matched_volume * u64::from(pair.fee_bps) / BPS_DENOMINATOR;
    Ok(SettlementInstruction {
        matching_round_id: round.id,
        trading_pair: round.trading_pair.clone(),
        round_number: round.round_number,
        clearing_price: revealed.clearing_price,
        matched_volume: revealed.matched_volume,
        fee,
        clearing_price_quote: Decimal::from(revealed.clearing_price) * pair.price_tick,
        matched_volume_base: Decimal::from(revealed.matched_volume) * pair.lot_size,
        matching_proof: round.matching_proof,
        vrf_output: round.vrf_output,
        vrf_proof: round.vrf_proof,
        emitted_at: now,
    })
}

/// Hands each round to the sink at most once.
pub struct SettlementHandoff<S> {
    sink: S,
    guard: Mutex<IdempotencyGuard>,
}

impl<S: SettlementSink> SettlementHandoff<S> {
    #[must_use]
    pub fn new(sink: S, cache_size: usize) -> Self {
        Self {
            sink,
            guard: Mutex::new(IdempotencyGuard::new(cache_size)),
        }
    }

    /// Emit the instruction for `round` if it matched anything. Returns
    /// whether an instruction was sent.
    ///
    /// # Errors
    /// - `AlreadySettled` if the round was handed off before
    /// - `SettlementFailed` if the sink refuses; the round is not marked and
    ///   can be handed off again
    pub async fn hand_off(
        &self,
        round: &MatchingRound,
        pair: &PairConfig,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let instruction = build_instruction(round, pair, now)?;
        if instruction.matched_volume == 0 {
            tracing::debug!(round = %round.id, "nothing matched, no settlement");
            return Ok(false);
        }
        self.guard.lock().mark_settled(round.id)?;

        if let Err(err) = self.sink.settle(instruction).await {
            self.guard.lock().unmark(&round.id);
            tracing::error!(round = %round.id, error = %err, "settlement handoff failed");
            return Err(err);
        }
        tracing::info!(
            round = %round.id,
            pair = %round.trading_pair,
            clearing_price = ?round.clearing_price(),
            volume = ?round.matched_volume(),
            matching_proof = %hex::encode(round.matching_proof),
            "settlement instruction emitted"
        );
        Ok(true)
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S> std::fmt::Debug for SettlementHandoff<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementHandoff")
            .field("remembered", &self.guard.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use phantom_crypto::VrfKeypair;
    use phantom_types::{RevealedOutcome, TradingPair};
    use rand::rngs::OsRng;

    use super::*;

    fn completed(number: u64, price: u64, volume: u64) -> MatchingRound {
        let (out, proof) = VrfKeypair::generate(&mut OsRng).evaluate(b"round");
        let mut round =
            MatchingRound::new(TradingPair::new("ETH", "USDC"), number, out, proof, Utc::now());
        round.transition(RoundStatus::InProgress).unwrap();
        round
            .complete(
                RevealedOutcome {
                    clearing_price: price,
                    matched_volume: volume,
                },
                Utc::now(),
            )
            .unwrap();
        round
    }

    #[test]
    fn instruction_carries_fee_and_units() {
        let round = completed(1, 100, 9_000);
        let ix = build_instruction(&round, &PairConfig::eth_usdc(), Utc::now()).unwrap();
        assert_eq!(ix.clearing_price, 100);
        assert_eq!(ix.matched_volume, 9_000);
        // 30 bps of 9 000 lots.
        assert_eq!(ix.fee, 27);
        assert_eq!(ix.clearing_price_quote, Decimal::new(100, 2));
        assert_eq!(ix.matched_volume_base, Decimal::new(9, 0));
        assert_eq!(ix.vrf_output, round.vrf_output);
    }

    #[test]
    fn unfinished_round_has_no_instruction() {
        let (out, proof) = VrfKeypair::generate(&mut OsRng).evaluate(b"round");
        let round = MatchingRound::new(TradingPair::new("ETH", "USDC"), 1, out, proof, Utc::now());
        assert!(matches!(
            build_instruction(&round, &PairConfig::eth_usdc(), Utc::now()),
            Err(PhantomError::SettlementFailed { .. })
        ));
    }

    #[tokio::test]
    async fn each_round_is_handed_off_once() {
        let (sink, mut rx) = ChannelSink::new();
        let handoff = SettlementHandoff::new(sink, 16);
        let round = completed(4, 100, 9);
        let pair = PairConfig::eth_usdc();

        assert!(handoff.hand_off(&round, &pair, Utc::now()).await.unwrap());
        assert!(matches!(
            handoff.hand_off(&round, &pair, Utc::now()).await,
            Err(PhantomError::AlreadySettled(_))
        ));
        assert_eq!(rx.recv().await.unwrap().matching_round_id, round.id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_round_emits_nothing() {
        let (sink, mut rx) = ChannelSink::new();
        let handoff = SettlementHandoff::new(sink, 16);
        let round = completed(2, 0, 0);
        assert!(!handoff.hand_off(&round, &PairConfig::eth_usdc(), Utc::now()).await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_sink_allows_retry() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let handoff = SettlementHandoff::new(sink, 16);
        let round = completed(3, 100, 9);
        let pair = PairConfig::eth_usdc();
        for _ in 0..2 {
            assert!(matches!(
                handoff.hand_off(&round, &pair, Utc::now()).await,
                Err(PhantomError::SettlementFailed { .. })
            ));
        }
    }
}
