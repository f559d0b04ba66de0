//! One trading pair's round pipeline.
//!
//! ## Round lifecycle
//!
//! 1. Freeze the pool (`snapshot_for_round`) and seal the snapshot
//! 2. Check the seal against the VRF public key
//! 3. Match over ciphertexts, then check conservation and replay the round
//!    against its own matching proof
//! 4. If anything crossed, open a `ThresholdOperation` over
//!    `[Enc(p_buy + p_sell), Enc(volume)]` and reveal it
//! 5. Complete: hand partially filled orders back to the pool, chain the
//!    matching proof into the next seed, emit the settlement instruction
//!
//! Any failure in 2..=4 fails the round and puts every order back exactly
//! as it was taken. Nothing is settled for a failed round.
//!
//! A completed round whose settlement handoff fails stays queued on the
//! engine and is offered to the sink again before the next round starts.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use phantom_finality::{DecryptionBackend, SettlementHandoff, SettlementSink};
use phantom_ingress::{PairPool, RoundSealer};
use phantom_matchcore::{
    MatchOutcome, ProofBackend, check_conservation, match_sealed_round, replay_round,
};
use phantom_types::{
    EncryptedOrder, MatchingRound, OrderId, OrderSubmission, PairConfig, PhantomError, Result,
    RevealedOutcome, RoundId, RoundStatus, SealedRound, SubmissionReceipt, ThresholdConfig,
    ThresholdOperation, TraderId, TradingPair,
};

/// Rounds kept per pair for inspection.
const ROUND_HISTORY: usize = 64;

/// What one round did.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: MatchingRound,
    /// Every threshold operation opened for the round, in attempt order.
    pub operations: Vec<ThresholdOperation>,
    /// Whether a settlement instruction was emitted.
    pub settled: bool,
}

impl RoundReport {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.round.status == RoundStatus::Completed
    }
}

pub struct PairEngine {
    config: PairConfig,
    pool: PairPool,
    sealer: Arc<RoundSealer>,
    prover: Arc<dyn ProofBackend>,
    decryptor: Arc<dyn DecryptionBackend>,
    settlement: Arc<SettlementHandoff<Arc<dyn SettlementSink>>>,
    threshold: ThresholdConfig,
    history: Mutex<VecDeque<RoundReport>>,
    /// Completed rounds the sink has not accepted yet, oldest first.
    unsettled: Mutex<VecDeque<MatchingRound>>,
}

impl PairEngine {
    #[must_use]
    pub fn new(
        config: PairConfig,
        pool: PairPool,
        sealer: Arc<RoundSealer>,
        prover: Arc<dyn ProofBackend>,
        decryptor: Arc<dyn DecryptionBackend>,
        settlement: Arc<SettlementHandoff<Arc<dyn SettlementSink>>>,
        threshold: ThresholdConfig,
    ) -> Self {
        Self {
            config,
            pool,
            sealer,
            prover,
            decryptor,
            settlement,
            threshold,
            history: Mutex::new(VecDeque::with_capacity(ROUND_HISTORY)),
            unsettled: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn pair(&self) -> &TradingPair {
        self.pool.pair()
    }

    #[must_use]
    pub fn config(&self) -> &PairConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &PairPool {
        &self.pool
    }

    /// # Errors
    /// Any admission rejection of [`PairPool::admit`].
    pub fn submit(&self, submission: OrderSubmission, now: DateTime<Utc>) -> Result<SubmissionReceipt> {
        self.pool.admit(submission, now)
    }

    /// # Errors
    /// Any error of [`PairPool::release`].
    pub fn cancel(&self, order_id: &OrderId, trader: &TraderId) -> Result<EncryptedOrder> {
        self.pool.release(order_id, trader)
    }

    /// Run one round to completion or failure.
    ///
    /// A failed round is reported, not returned as an error: its orders are
    /// already back in the pool and the next cycle retries them. Rounds
    /// still waiting for settlement are offered to the sink first.
    ///
    /// # Errors
    /// Only when no round could start (`PoolPaused`, `RoundInFlight`,
    /// `RoundTooSoon`) or the pool refuses the hand-back.
    pub async fn run_round(&self, now: DateTime<Utc>) -> Result<RoundReport> {
        let deferred = !self.unsettled.lock().is_empty();
        if deferred {
            self.retry_settlements(now).await;
        }
        let snapshot = self.pool.snapshot_for_round(&self.sealer, now)?;
        // Stable while the round is in flight.
        let prior_output = self.pool.prior_output();
        let sealed = RoundSealer::seal(snapshot, now);
        let round_number = sealed.round_number;
        tracing::info!(
            pair = %sealed.trading_pair,
            round_number,
            buys = sealed.buys.len(),
            sells = sealed.sells.len(),
            input_hash = %hex::encode(sealed.input_hash),
            "round started"
        );

        let MatchOutcome { mut round, orders } = match self.compute(&sealed, &prior_output, now).await {
            Ok(outcome) => outcome,
            Err(err) => return self.fail_round(sealed, None, Vec::new(), &err, now),
        };

        if !round.has_crossing() {
            round.complete(
                RevealedOutcome {
                    clearing_price: 0,
                    matched_volume: 0,
                },
                now,
            )?;
            self.pool
                .complete_round(round_number, round.matching_proof, orders, 0)?;
            tracing::info!(pair = %round.trading_pair, round_number, "round completed, nothing crossed");
            return Ok(self.record(RoundReport {
                round,
                operations: Vec::new(),
                settled: false,
            }));
        }

        let (revealed, operations) = self.reveal(&round).await;
        let revealed = match revealed {
            Ok(revealed) => revealed,
            Err(err) => return self.fail_round(sealed, Some(round), operations, &err, now),
        };

        round.complete(revealed, now)?;
        self.pool.complete_round(
            round_number,
            round.matching_proof,
            orders,
            revealed.matched_volume,
        )?;
        tracing::info!(
            pair = %round.trading_pair,
            round_number,
            clearing_price = revealed.clearing_price,
            matched_volume = revealed.matched_volume,
            "round completed"
        );

        let settled = self.settle(&round, now).await;
        Ok(self.record(RoundReport {
            round,
            operations,
            settled,
        }))
    }

    /// Offer every queued round to the sink again. Returns how many were
    /// accepted; refused rounds stay queued.
    pub async fn retry_settlements(&self, now: DateTime<Utc>) -> usize {
        let pending: Vec<MatchingRound> = self.unsettled.lock().drain(..).collect();
        let mut accepted = 0;
        for round in pending {
            if self.settle(&round, now).await {
                tracing::info!(round = %round.id, round_number = round.round_number, "deferred settlement emitted");
                self.mark_settled(&round.id);
                accepted += 1;
            }
        }
        accepted
    }

    /// Rounds completed but not yet accepted by the settlement sink.
    #[must_use]
    pub fn unsettled(&self) -> Vec<RoundId> {
        self.unsettled.lock().iter().map(|r| r.id).collect()
    }

    /// Hand `round` to settlement. A refused handoff queues the round.
    async fn settle(&self, round: &MatchingRound, now: DateTime<Utc>) -> bool {
        match self.settlement.hand_off(round, &self.config, now).await {
            Ok(settled) => settled,
            Err(PhantomError::AlreadySettled(id)) => {
                tracing::warn!(round = %id, "round was already handed off");
                false
            }
            Err(err) => {
                tracing::error!(
                    round = %round.id,
                    error = %err,
                    "round completed but not settled, queued for retry"
                );
                self.unsettled.lock().push_back(round.clone());
                false
            }
        }
    }

    fn mark_settled(&self, id: &RoundId) {
        if let Some(report) = self.history.lock().iter_mut().find(|r| &r.round.id == id) {
            report.settled = true;
        }
    }

    /// Seal audit, matching, conservation and replay.
    async fn compute(
        &self,
        sealed: &SealedRound,
        prior_output: &[u8; 32],
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome> {
        RoundSealer::verify_sealed_round(&self.sealer.public_key(), sealed, prior_output)?;
        let outcome = match_sealed_round(sealed, self.prover.as_ref(), now).await?;
        check_conservation(sealed, &outcome)?;
        replay_round(sealed, &outcome.round, self.prover.verifier())?;
        Ok(outcome)
    }

    /// Reveal the clearing sum and volume, retrying retryable failures with
    /// a fresh operation up to `max_reveal_attempts` times.
    async fn reveal(
        &self,
        round: &MatchingRound,
    ) -> (Result<RevealedOutcome>, Vec<ThresholdOperation>) {
        let mut operations = Vec::new();
        let Some(clearing) = round.clearing_price_ciphertext else {
            let err = PhantomError::Internal(format!("round {} crossed without a clearing price", round.id));
            return (Err(err), operations);
        };
        let payload = vec![clearing, round.matched_volume_ciphertext];

        let mut last_err = None;
        for attempt in 0..self.threshold.max_reveal_attempts {
            let mut op = ThresholdOperation::open(
                round.id,
                round.trading_pair.clone(),
                payload.clone(),
                self.threshold.required_shares,
                self.threshold.total_shares,
                attempt,
                Utc::now(),
            );
            tracing::info!(
                operation = %op.id,
                round = %round.id,
                attempt,
                "threshold operation opened"
            );
            let result = self.decryptor.reveal(&mut op).await;
            operations.push(op);
            match result.and_then(|values| decode(&values)) {
                Ok(revealed) => return (Ok(revealed), operations),
                Err(err) => {
                    let retry = err.is_retryable();
                    last_err = Some(err);
                    if !retry {
                        break;
                    }
                }
            }
        }
        let err = last_err
            .unwrap_or_else(|| PhantomError::Internal("no reveal attempt was made".into()));
        (Err(err), operations)
    }

    fn fail_round(
        &self,
        sealed: SealedRound,
        round: Option<MatchingRound>,
        operations: Vec<ThresholdOperation>,
        err: &PhantomError,
        now: DateTime<Utc>,
    ) -> Result<RoundReport> {
        let mut round = round.unwrap_or_else(|| {
            MatchingRound::new(
                sealed.trading_pair.clone(),
                sealed.round_number,
                sealed.vrf_output,
                sealed.vrf_proof,
                now,
            )
        });
        round.input_hash = sealed.input_hash;
        round.fail(err.to_string(), now)?;

        if err.is_security_event() {
            tracing::error!(
                target: "phantom::security",
                round = %round.id,
                reason = err.reason_code(),
                error = %err,
                "round failed verification"
            );
        }
        let round_number = sealed.round_number;
        self.pool.abort_round(round_number, sealed.into_orders().collect())?;
        tracing::warn!(
            pair = %round.trading_pair,
            round_number,
            reason = err.reason_code(),
            retry = err.is_retryable(),
            error = %err,
            "round failed, orders restored"
        );
        Ok(self.record(RoundReport {
            round,
            operations,
            settled: false,
        }))
    }

    fn record(&self, report: RoundReport) -> RoundReport {
        let mut history = self.history.lock();
        if history.len() == ROUND_HISTORY {
            history.pop_front();
        }
        history.push_back(report.clone());
        report
    }

    /// Recent rounds, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<RoundReport> {
        self.history.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn last_round(&self) -> Option<RoundReport> {
        self.history.lock().back().cloned()
    }
}

impl std::fmt::Debug for PairEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairEngine")
            .field("pair", self.pool.pair())
            .field("threshold", &self.threshold)
            .field("unsettled", &self.unsettled.lock().len())
            .finish_non_exhaustive()
    }
}

/// `[p_buy + p_sell, volume]` into the revealed outcome. The clearing price
/// is the floor of the marginal pair's midpoint.
fn decode(values: &[u64]) -> Result<RevealedOutcome> {
    match values {
        [price_sum, volume] => Ok(RevealedOutcome {
            clearing_price: price_sum / 2,
            matched_volume: *volume,
        }),
        _ => Err(PhantomError::ShareCombination {
            reason: format!("expected 2 revealed values, got {}", values.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_halves_price_sum() {
        let r = decode(&[201, 9]).unwrap();
        assert_eq!(r.clearing_price, 100);
        assert_eq!(r.matched_volume, 9);
        assert!(matches!(
            decode(&[201]),
            Err(PhantomError::ShareCombination { .. })
        ));
    }
}
