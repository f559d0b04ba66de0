//! Homomorphic batch matcher.
//!
//! Consumes a [`SealedRound`] and produces a [`MatchingRound`] plus the
//! post-round state of every order. Prices and amounts stay encrypted; the
//! only thing the walk learns is the outcome of each comparison, and each
//! outcome is backed by an attestation recorded in the round.

use chrono::{DateTime, Utc};
use phantom_crypto::Ciphertext;
use phantom_types::{
    Comparison, ComparisonAttestation, EncryptedOrder, MatchingRound, OrderStatus, PairingStep,
    PhantomError, Result, RoundId, RoundStatus, SealedRound, Side,
};

use crate::backend::ProofBackend;
use crate::transcript::compute_matching_proof;

/// Which comparison of a pairing step is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Check {
    /// `buy.price` against `sell.price`.
    Price,
    /// `buy.remaining` against `sell.remaining`.
    Amount,
}

impl Check {
    pub(crate) const fn label(self) -> &'static [u8] {
        match self {
            Self::Price => b"price",
            Self::Amount => b"amount",
        }
    }
}

/// Result of matching one sealed round.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// The round record, `InProgress`, with its matching proof set.
    pub round: MatchingRound,
    /// Every order of the round after its fills, buys first, in shuffled order.
    pub orders: Vec<EncryptedOrder>,
}

impl MatchOutcome {
    /// Orders that still have an unfilled remainder.
    pub fn pending(&self) -> impl Iterator<Item = &EncryptedOrder> {
        self.orders.iter().filter(|o| o.is_pending())
    }

    /// Orders filled completely this round.
    pub fn matched(&self) -> impl Iterator<Item = &EncryptedOrder> {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Matched)
    }
}

/// Match a sealed round.
///
/// ## Algorithm
///
/// 1. Start with pointers `i`, `j` at the head of the shuffled buy and sell lists
/// 2. Compare `buy[i].price` with `sell[j].price`; if the buy bids below the
///    ask, skip the buy for this round (`i += 1`)
/// 3. Otherwise compare the remaining amounts; the smaller remainder is the
///    fill, and both orders are reduced by it homomorphically
/// 4. Advance whichever side was exhausted (both on a tie)
/// 5. The marginal pair is the last one that crossed; the round stores
///    `Enc(p_buy + p_sell)` of it and halves after reveal
///
/// Shuffled position is the only priority. No price-time ordering exists
/// because no price is ever visible. Skipped buys are not revisited, so the
/// matched volume and the marginal pair depend on the permutation: the same
/// book can match different volumes under different VRF seeds.
///
/// # Errors
/// - `MatchingFailed` if the round contains an order that cannot be matched
///   (wrong side, wrong pair, not pending, duplicate id)
/// - Any error of the comparison backend
pub async fn match_sealed_round(
    sealed: &SealedRound,
    backend: &dyn ProofBackend,
    now: DateTime<Utc>,
) -> Result<MatchOutcome> {
    check_inputs(sealed)?;

    let mut walker = Walker::new(sealed);
    while let Some(request) = walker.next_request() {
        let attestation = backend
            .compare(&request.context, &request.left, &request.right)
            .await?;
        walker.apply(attestation);
    }
    let walk = walker.finish();

    let mut round = MatchingRound::new(
        sealed.trading_pair.clone(),
        sealed.round_number,
        sealed.vrf_output,
        sealed.vrf_proof,
        now,
    );
    round.shuffled_buy_ids = sealed.buys.iter().map(|o| o.id).collect();
    round.shuffled_sell_ids = sealed.sells.iter().map(|o| o.id).collect();
    round.input_hash = sealed.input_hash;
    round.steps = walk.steps;
    round.matched_volume_ciphertext = walk.volume;
    round.clearing_price_ciphertext = walk.clearing;
    round.matching_proof = compute_matching_proof(&round);
    round.transition(RoundStatus::InProgress)?;

    let crossings = round.steps.iter().filter(|s| s.crossed()).count();
    tracing::info!(
        round_id = %round.id,
        pair = %round.trading_pair,
        round_number = round.round_number,
        buys = round.shuffled_buy_ids.len(),
        sells = round.shuffled_sell_ids.len(),
        steps = round.steps.len(),
        crossings,
        matching_proof = %hex::encode(round.matching_proof),
        "round matched"
    );

    let mut orders = walk.buys;
    orders.extend(walk.sells);
    Ok(MatchOutcome { round, orders })
}

/// State left behind by a pairing walk.
pub(crate) struct Walk {
    pub buys: Vec<EncryptedOrder>,
    pub sells: Vec<EncryptedOrder>,
    pub steps: Vec<PairingStep>,
    pub volume: Ciphertext,
    pub clearing: Option<Ciphertext>,
}

/// A comparison the walk needs answered before it can move.
pub(crate) struct Request {
    pub check: Check,
    pub context: Vec<u8>,
    pub left: Ciphertext,
    pub right: Ciphertext,
}

/// The two-pointer walk, one comparison at a time.
///
/// Matching answers each [`Request`] with a fresh attestation; replay
/// answers with the recorded one after verifying it. Either way the walk
/// only ever moves on an attested outcome.
pub(crate) struct Walker {
    round_id: RoundId,
    buys: Vec<EncryptedOrder>,
    sells: Vec<EncryptedOrder>,
    steps: Vec<PairingStep>,
    volume: Ciphertext,
    clearing: Option<Ciphertext>,
    i: usize,
    j: usize,
    /// Price check of the current step, held once the prices crossed.
    crossed: Option<ComparisonAttestation>,
}

impl Walker {
    pub(crate) fn new(sealed: &SealedRound) -> Self {
        Self {
            round_id: sealed.id(),
            buys: sealed.buys.clone(),
            sells: sealed.sells.clone(),
            steps: Vec::new(),
            volume: Ciphertext::zero(),
            clearing: None,
            i: 0,
            j: 0,
            crossed: None,
        }
    }

    /// Index of the step being decided.
    pub(crate) fn step_index(&self) -> usize {
        self.steps.len()
    }

    /// The next comparison, or `None` once either side is exhausted.
    pub(crate) fn next_request(&self) -> Option<Request> {
        let (buy, sell) = (self.buys.get(self.i)?, self.sells.get(self.j)?);
        let (check, left, right) = if self.crossed.is_some() {
            (Check::Amount, buy.remaining_amount, sell.remaining_amount)
        } else {
            (Check::Price, buy.encrypted_price, sell.encrypted_price)
        };
        Some(Request {
            check,
            context: ComparisonAttestation::context(&self.round_id, self.step_index(), check.label()),
            left,
            right,
        })
    }

    /// Advance on the answer to the last [`Walker::next_request`].
    pub(crate) fn apply(&mut self, attestation: ComparisonAttestation) {
        let index = self.step_index();
        let (buy_id, sell_id) = (self.buys[self.i].id, self.sells[self.j].id);

        let Some(price_check) = self.crossed.take() else {
            if attestation.outcome.is_ge() {
                self.crossed = Some(attestation);
            } else {
                tracing::debug!(step = index, buy = %buy_id, sell = %sell_id, "prices do not cross");
                self.steps.push(PairingStep {
                    buy: buy_id,
                    sell: sell_id,
                    price_check: attestation,
                    amount_check: None,
                    fill: None,
                });
                self.i += 1;
            }
            return;
        };

        let outcome = attestation.outcome;
        let (buy, sell) = (&self.buys[self.i], &self.sells[self.j]);
        let fill = match outcome {
            Comparison::Greater => sell.remaining_amount,
            Comparison::Less | Comparison::Equal => buy.remaining_amount,
        };
        self.clearing = Some(buy.encrypted_price + sell.encrypted_price);
        self.volume += fill;
        tracing::debug!(
            step = index,
            buy = %buy_id,
            sell = %sell_id,
            amounts = ?outcome,
            "pair crossed"
        );

        self.steps.push(PairingStep {
            buy: buy_id,
            sell: sell_id,
            price_check,
            amount_check: Some(attestation),
            fill: Some(fill),
        });
        self.buys[self.i].apply_fill(fill);
        self.sells[self.j].apply_fill(fill);

        if outcome != Comparison::Greater {
            self.buys[self.i].status = OrderStatus::Matched;
            self.i += 1;
        }
        if outcome != Comparison::Less {
            self.sells[self.j].status = OrderStatus::Matched;
            self.j += 1;
        }
    }

    pub(crate) fn finish(mut self) -> Walk {
        for order in self.buys.iter_mut().chain(self.sells.iter_mut()) {
            order.rounds_participated += 1;
        }
        Walk {
            buys: self.buys,
            sells: self.sells,
            steps: self.steps,
            volume: self.volume,
            clearing: self.clearing,
        }
    }
}

fn check_inputs(sealed: &SealedRound) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(sealed.order_count());
    for (side, orders) in [(Side::Buy, &sealed.buys), (Side::Sell, &sealed.sells)] {
        for order in orders {
            let problem = if order.side != side {
                Some(format!("{} order in the {side} list", order.side))
            } else if order.trading_pair != sealed.trading_pair {
                Some(format!("order for {}", order.trading_pair))
            } else if !order.is_pending() {
                Some(format!("order is {}", order.status))
            } else if !seen.insert(order.id) {
                Some("order appears twice".to_string())
            } else {
                None
            };
            if let Some(problem) = problem {
                return Err(PhantomError::MatchingFailed {
                    reason: format!("{}: {problem}", order.id),
                });
            }
        }
    }
    Ok(())
}
