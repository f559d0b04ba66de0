//! Conservation checks on a matched round.
//!
//! All checks are ciphertext identities. Fills are applied to both sides
//! from the same ciphertext, so an honest walk satisfies them exactly and
//! any drift is a bug or tampering, never rounding.

use std::collections::{HashMap, HashSet};

use phantom_crypto::Ciphertext;
use phantom_types::{EncryptedOrder, OrderId, OrderStatus, PhantomError, Result, SealedRound};

use crate::MatchOutcome;

/// Check a match outcome against the sealed round it came from.
///
/// 1. Every sealed order comes back exactly once, and nothing else does
/// 2. Every step names orders of the right side of this round
/// 3. Σ buy-side fills = Σ sell-side fills = the matched volume ciphertext
/// 4. Per order: `filled + remaining = encrypted_amount`, and `filled` grew
///    by exactly the fills recorded against it
/// 5. A `Matched` order takes part in no step after its last fill
///
/// # Errors
/// `ConservationViolation` naming the first broken rule.
pub fn check_conservation(sealed: &SealedRound, outcome: &MatchOutcome) -> Result<()> {
    let before: HashMap<OrderId, &EncryptedOrder> =
        sealed.buys.iter().chain(&sealed.sells).map(|o| (o.id, o)).collect();
    let buy_ids: HashSet<OrderId> = sealed.buys.iter().map(|o| o.id).collect();
    let sell_ids: HashSet<OrderId> = sealed.sells.iter().map(|o| o.id).collect();

    let mut returned = HashSet::with_capacity(outcome.orders.len());
    for order in &outcome.orders {
        if !before.contains_key(&order.id) {
            return Err(violation(format!("{} was not in the round", order.id)));
        }
        if !returned.insert(order.id) {
            return Err(violation(format!("{} returned twice", order.id)));
        }
    }
    if returned.len() != before.len() {
        return Err(violation(format!(
            "{} of {} orders returned",
            returned.len(),
            before.len()
        )));
    }

    let mut fills: HashMap<OrderId, Ciphertext> = HashMap::new();
    let mut last_fill: HashMap<OrderId, usize> = HashMap::new();
    let mut last_seen: HashMap<OrderId, usize> = HashMap::new();
    let mut buy_total = Ciphertext::zero();
    let mut sell_total = Ciphertext::zero();

    for (index, step) in outcome.round.steps.iter().enumerate() {
        if !buy_ids.contains(&step.buy) || !sell_ids.contains(&step.sell) {
            return Err(violation(format!("step {index} pairs orders outside the round")));
        }
        last_seen.insert(step.buy, index);
        last_seen.insert(step.sell, index);
        if let Some(fill) = step.fill {
            *fills.entry(step.buy).or_insert_with(Ciphertext::zero) += fill;
            *fills.entry(step.sell).or_insert_with(Ciphertext::zero) += fill;
            last_fill.insert(step.buy, index);
            last_fill.insert(step.sell, index);
            buy_total += fill;
            sell_total += fill;
        }
    }

    if buy_total != sell_total {
        return Err(violation("buy-side and sell-side fills differ".to_string()));
    }
    if buy_total != outcome.round.matched_volume_ciphertext {
        return Err(violation("fills do not sum to the matched volume".to_string()));
    }

    for order in &outcome.orders {
        let prior = before[&order.id];
        let filled_here = fills.get(&order.id).copied().unwrap_or_else(Ciphertext::zero);
        if order.filled_amount != prior.filled_amount + filled_here {
            return Err(violation(format!("{} filled total drifted", order.id)));
        }
        if order.filled_amount + order.remaining_amount != order.encrypted_amount {
            return Err(violation(format!("{} filled + remaining != amount", order.id)));
        }
        if order.status == OrderStatus::Matched {
            let Some(&filled_at) = last_fill.get(&order.id) else {
                return Err(violation(format!("{} matched without a fill", order.id)));
            };
            if last_seen.get(&order.id).is_some_and(|&seen| seen > filled_at) {
                return Err(violation(format!("{} used after it was filled", order.id)));
            }
        }
    }
    Ok(())
}

fn violation(reason: String) -> PhantomError {
    tracing::error!(target: "phantom::security", %reason, "conservation violated");
    PhantomError::ConservationViolation { reason }
}
