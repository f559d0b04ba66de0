//! The per-pair order pool aggregate.
//!
//! A [`PairPool`] owns both sides of one trading pair plus the pair's nonce
//! register and round cursor. `admit`, `release`, `snapshot_for_round` and
//! the round hand-back methods all take the same lock, so a snapshot is an
//! atomic cut: an order is either in it or stays in the pool, never both.
//!
//! Proof verification runs before the lock is taken; only the nonce and
//! capacity checks and the insert happen under it.
//!
//! Orders taken by a round are tracked until the round hands them back:
//! `complete_round` returns the partially filled ones, `abort_round`
//! restores every one of them unchanged.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use phantom_crypto::{VrfOutput, VrfProof};
use phantom_types::{
    EncryptedOrder, OrderId, OrderStatus, OrderSubmission, PairConfig, PhantomError, Result, Side,
    SubmissionReceipt, TraderId, TradingPair,
};

use crate::{AdmissionVerifier, NonceRegister, OrderPool, RoundSealer};

/// The atomic cut a round starts from, before sealing.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub trading_pair: TradingPair,
    pub round_number: u64,
    pub vrf_output: VrfOutput,
    pub vrf_proof: VrfProof,
    pub buys: Vec<EncryptedOrder>,
    pub sells: Vec<EncryptedOrder>,
    /// Orders dropped at the cut because they had expired.
    pub expired: Vec<EncryptedOrder>,
}

impl PoolSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }
}

/// Running counters for one pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total_admitted: u64,
    pub total_rejected: u64,
    pub total_cancelled: u64,
    pub total_expired: u64,
    pub total_rounds: u64,
    pub failed_rounds: u64,
    pub total_matched_volume: u64,
}

#[derive(Debug)]
struct InFlight {
    round_number: u64,
    order_ids: HashSet<OrderId>,
}

#[derive(Debug)]
struct PoolState {
    buys: OrderPool,
    sells: OrderPool,
    nonces: NonceRegister,
    paused: bool,
    last_round_number: u64,
    last_round_at: Option<DateTime<Utc>>,
    /// Chained into the next round's VRF input.
    prior_output: [u8; 32],
    in_flight: Option<InFlight>,
    stats: PoolStats,
}

impl PoolState {
    fn side(&self, side: Side) -> &OrderPool {
        match side {
            Side::Buy => &self.buys,
            Side::Sell => &self.sells,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderPool {
        match side {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        }
    }

    /// Return a round's surviving orders and free the slots of the rest.
    fn hand_back(&mut self, orders: impl IntoIterator<Item = EncryptedOrder>) -> Result<()> {
        for order in orders {
            self.side_mut(order.side).restore(order)?;
        }
        self.buys.end_round();
        self.sells.end_round();
        Ok(())
    }

    fn take_in_flight(&mut self, round_number: u64) -> Result<InFlight> {
        match self.in_flight.take() {
            Some(f) if f.round_number == round_number => Ok(f),
            other => {
                let last = other.as_ref().map_or(self.last_round_number, |f| f.round_number);
                self.in_flight = other;
                Err(PhantomError::StaleRound {
                    last,
                    requested: round_number,
                })
            }
        }
    }
}

pub struct PairPool {
    pair: TradingPair,
    verifier: AdmissionVerifier,
    round_interval: Duration,
    min_round_interval: Duration,
    created_at: DateTime<Utc>,
    state: Mutex<PoolState>,
}

impl PairPool {
    #[must_use]
    pub fn new(
        config: &PairConfig,
        verifier: AdmissionVerifier,
        nonce_retention: usize,
        round_interval: Duration,
        min_round_interval: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            pair: config.pair(),
            verifier,
            round_interval,
            min_round_interval,
            created_at: now,
            state: Mutex::new(PoolState {
                buys: OrderPool::new(Side::Buy, config.max_orders_per_side),
                sells: OrderPool::new(Side::Sell, config.max_orders_per_side),
                nonces: NonceRegister::new(nonce_retention),
                paused: false,
                last_round_number: 0,
                last_round_at: None,
                prior_output: [0u8; 32],
                in_flight: None,
                stats: PoolStats::default(),
            }),
        }
    }

    #[must_use]
    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    // -----------------------------------------------------------------------
    // Admission and cancellation
    // -----------------------------------------------------------------------

    /// Admit one order submission.
    ///
    /// # Errors
    /// - `PoolPaused` while the pair is paused
    /// - `DuplicateNonce` if the nonce does not exceed the trader's last one
    /// - any error of [`AdmissionVerifier::verify`]
    /// - `PoolFull` / `NonceRegisterFull` at capacity
    pub fn admit(&self, submission: OrderSubmission, now: DateTime<Utc>) -> Result<SubmissionReceipt> {
        let result = self.try_admit(submission, now);
        if let Err(err) = &result {
            self.state.lock().stats.total_rejected += 1;
            tracing::warn!(pair = %self.pair, reason = err.reason_code(), error = %err, "order rejected");
        }
        result
    }

    fn try_admit(&self, submission: OrderSubmission, now: DateTime<Utc>) -> Result<SubmissionReceipt> {
        {
            let state = self.state.lock();
            if state.paused {
                return Err(PhantomError::PoolPaused(self.pair.clone()));
            }
            state.nonces.check(&submission.trader, submission.nonce)?;
        }

        self.verifier.verify(&self.pair, &submission, now)?;

        let mut state = self.state.lock();
        if state.paused {
            return Err(PhantomError::PoolPaused(self.pair.clone()));
        }
        let side = submission.side;
        state.side_mut(side).ensure_capacity()?;
        state
            .nonces
            .record(submission.trader, submission.nonce, submission.expiry_time, now)?;

        let order = EncryptedOrder::from_submission(submission, now);
        let order_id = order.id;
        let trader = order.trader;
        let pool_position = state.side_mut(side).push(order)?;
        state.stats.total_admitted += 1;
        let estimated_match_time = self.next_round_time(state.last_round_at, now);
        drop(state);

        tracing::info!(
            pair = %self.pair,
            order_id = %order_id,
            trader = %trader,
            side = %side,
            pool_position,
            "order admitted"
        );
        Ok(SubmissionReceipt {
            order_id,
            pool_position,
            estimated_match_time,
        })
    }

    fn next_round_time(&self, last_round_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        let interval = chrono::Duration::from_std(self.round_interval).unwrap_or(chrono::Duration::zero());
        let mut next = last_round_at.unwrap_or(self.created_at) + interval;
        while next < now && !interval.is_zero() {
            next += interval;
        }
        next.max(now)
    }

    /// Cancel a pending order before a round freezes it.
    ///
    /// # Errors
    /// - `OrderNotCancellable` if a round currently holds the order
    /// - `NotOrderOwner` if `trader` did not submit it
    /// - `OrderNotFound` otherwise
    pub fn release(&self, order_id: &OrderId, trader: &TraderId) -> Result<EncryptedOrder> {
        let mut state = self.state.lock();
        if state
            .in_flight
            .as_ref()
            .is_some_and(|f| f.order_ids.contains(order_id))
        {
            return Err(PhantomError::OrderNotCancellable {
                order_id: *order_id,
                status: OrderStatus::Pending,
            });
        }

        let side = [Side::Buy, Side::Sell]
            .into_iter()
            .find(|s| state.side(*s).get(order_id).is_some())
            .ok_or(PhantomError::OrderNotFound(*order_id))?;
        let pool = state.side_mut(side);
        if pool.get(order_id).is_some_and(|o| o.trader != *trader) {
            return Err(PhantomError::NotOrderOwner(*order_id));
        }
        let mut order = pool
            .remove(order_id)
            .ok_or(PhantomError::OrderNotFound(*order_id))?;
        order.status = OrderStatus::Cancelled;
        state.stats.total_cancelled += 1;
        drop(state);

        tracing::info!(pair = %self.pair, order_id = %order_id, "order cancelled");
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Rounds
    // -----------------------------------------------------------------------

    /// Freeze and remove the pool contents for the next round.
    ///
    /// Derives the round's VRF seed from the pair, the next round number and
    /// the previous round's output. Expired orders are dropped at the cut.
    ///
    /// # Errors
    /// - `PoolPaused` while paused
    /// - `RoundInFlight` if the previous round has not been handed back
    /// - `RoundTooSoon` inside the minimum round interval
    pub fn snapshot_for_round(&self, sealer: &RoundSealer, now: DateTime<Utc>) -> Result<PoolSnapshot> {
        let mut state = self.state.lock();
        if state.paused {
            return Err(PhantomError::PoolPaused(self.pair.clone()));
        }
        if state.in_flight.is_some() {
            return Err(PhantomError::RoundInFlight(self.pair.clone()));
        }
        if let Some(last) = state.last_round_at {
            let elapsed = now.signed_duration_since(last).to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.min_round_interval {
                let remaining = self.min_round_interval - elapsed;
                return Err(PhantomError::RoundTooSoon {
                    pair: self.pair.clone(),
                    remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        let round_number = state.last_round_number + 1;
        let (vrf_output, vrf_proof) = sealer.derive_seed(&self.pair, round_number, &state.prior_output);

        let mut expired = state.buys.purge_expired(now);
        expired.extend(state.sells.purge_expired(now));
        let buys = state.buys.take_all(vrf_output);
        let sells = state.sells.take_all(vrf_output);

        state.last_round_number = round_number;
        state.last_round_at = Some(now);
        state.in_flight = Some(InFlight {
            round_number,
            order_ids: buys.iter().chain(&sells).map(|o| o.id).collect(),
        });
        state.stats.total_rounds += 1;
        state.stats.total_expired += expired.len() as u64;
        drop(state);

        tracing::info!(
            pair = %self.pair,
            round_number,
            buys = buys.len(),
            sells = sells.len(),
            expired = expired.len(),
            vrf_output = %vrf_output,
            "pool frozen for round"
        );
        Ok(PoolSnapshot {
            trading_pair: self.pair.clone(),
            round_number,
            vrf_output,
            vrf_proof,
            buys,
            sells,
            expired,
        })
    }

    /// Hand back a completed round. `returning` holds the orders that are
    /// still pending (unfilled or partially filled); fully matched orders
    /// are not returned. `chain_output` seeds the next round's VRF input.
    ///
    /// # Errors
    /// - `StaleRound` if `round_number` is not the round in flight
    /// - `Internal` if a returned order was never part of the round
    pub fn complete_round(
        &self,
        round_number: u64,
        chain_output: [u8; 32],
        returning: Vec<EncryptedOrder>,
        matched_volume: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let in_flight = state.take_in_flight(round_number)?;
        if let Some(stranger) = returning.iter().find(|o| !in_flight.order_ids.contains(&o.id)) {
            let id = stranger.id;
            state.in_flight = Some(in_flight);
            return Err(PhantomError::Internal(format!(
                "order {id} returned to round {round_number} it never joined"
            )));
        }
        let returned = returning.len();
        state.hand_back(returning.into_iter().filter(EncryptedOrder::is_pending))?;
        state.prior_output = chain_output;
        state.stats.total_matched_volume += matched_volume;
        drop(state);

        tracing::info!(pair = %self.pair, round_number, returned, matched_volume, "round handed back");
        Ok(())
    }

    /// Hand back a failed round: every order goes back to the pool as it
    /// was taken. The round number stays consumed, so a retry runs with a
    /// fresh seed.
    ///
    /// # Errors
    /// `StaleRound` if `round_number` is not the round in flight.
    pub fn abort_round(&self, round_number: u64, orders: Vec<EncryptedOrder>) -> Result<()> {
        let mut state = self.state.lock();
        let in_flight = state.take_in_flight(round_number)?;
        let restored = orders.len();
        if restored != in_flight.order_ids.len() {
            tracing::error!(
                pair = %self.pair,
                round_number,
                expected = in_flight.order_ids.len(),
                restored,
                "aborted round returned a different order count"
            );
        }
        state.hand_back(orders)?;
        state.stats.failed_rounds += 1;
        drop(state);

        tracing::warn!(pair = %self.pair, round_number, restored, "round aborted, orders restored");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Operator controls and inspection
    // -----------------------------------------------------------------------

    pub fn pause(&self) {
        self.state.lock().paused = true;
        tracing::warn!(pair = %self.pair, "pool paused");
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        tracing::info!(pair = %self.pair, "pool resumed");
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    #[must_use]
    pub fn round_in_flight(&self) -> Option<u64> {
        self.state.lock().in_flight.as_ref().map(|f| f.round_number)
    }

    #[must_use]
    pub fn last_round_number(&self) -> u64 {
        self.state.lock().last_round_number
    }

    /// Output the next round's VRF input is chained to.
    #[must_use]
    pub fn prior_output(&self) -> [u8; 32] {
        self.state.lock().prior_output
    }

    /// `(buys, sells)` currently resting.
    #[must_use]
    pub fn len(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.buys.len(), state.sells.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.buys.is_empty() && state.sells.is_empty()
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        let state = self.state.lock();
        state.buys.get(order_id).is_some() || state.sells.get(order_id).is_some()
    }

    /// Ids resting on one side, in arrival order.
    #[must_use]
    pub fn order_ids(&self, side: Side) -> Vec<OrderId> {
        self.state.lock().side(side).iter().map(|o| o.id).collect()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }
}

impl std::fmt::Debug for PairPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairPool")
            .field("pair", &self.pair)
            .finish_non_exhaustive()
    }
}
