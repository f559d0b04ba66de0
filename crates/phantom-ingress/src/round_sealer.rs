//! Round sealer: produces the `SealedRound` a matcher consumes.
//!
//! The sealer derives the round's VRF seed from public inputs, sorts the
//! frozen snapshot canonically, commits to it, then shuffles each side with
//! its own sub-seed of the VRF output. Anyone holding the VRF public key
//! can recompute every step with [`RoundSealer::verify_sealed_round`].

use chrono::{DateTime, Utc};
use phantom_crypto::shuffle::{permutation, shuffled};
use phantom_crypto::{ProofKind, VrfKeypair, VrfOutput, VrfProof, VrfPublicKey};
use phantom_types::{EncryptedOrder, PhantomError, Result, SealedRound, Side, TradingPair};
use sha2::{Digest, Sha256};

use crate::PoolSnapshot;

const BUY_LABEL: &[u8] = b"buy";
const SELL_LABEL: &[u8] = b"sell";

pub struct RoundSealer {
    vrf: VrfKeypair,
}

impl RoundSealer {
    #[must_use]
    pub fn new(vrf: VrfKeypair) -> Self {
        Self { vrf }
    }

    #[must_use]
    pub fn public_key(&self) -> VrfPublicKey {
        self.vrf.public()
    }

    /// VRF input `α = pair ‖ round_number ‖ prior_output`.
    #[must_use]
    pub fn round_input(pair: &TradingPair, round_number: u64, prior_output: &[u8; 32]) -> Vec<u8> {
        let symbol = pair.symbol();
        let mut alpha = Vec::with_capacity(21 + symbol.len() + 8 + 32);
        alpha.extend_from_slice(b"phantom:round_seed:v1:");
        alpha.extend_from_slice(symbol.as_bytes());
        alpha.extend_from_slice(&round_number.to_le_bytes());
        alpha.extend_from_slice(prior_output);
        alpha
    }

    /// Seed for one round. Round numbers only grow, so no two rounds of a
    /// pair share a seed.
    #[must_use]
    pub fn derive_seed(
        &self,
        pair: &TradingPair,
        round_number: u64,
        prior_output: &[u8; 32],
    ) -> (VrfOutput, VrfProof) {
        self.vrf
            .evaluate(&Self::round_input(pair, round_number, prior_output))
    }

    /// Seal a frozen snapshot.
    ///
    /// 1. Sort each side by order id (canonical, arrival independent)
    /// 2. Hash the canonical set
    /// 3. Shuffle each side with its sub-seed of the VRF output
    #[must_use]
    pub fn seal(snapshot: PoolSnapshot, now: DateTime<Utc>) -> SealedRound {
        let PoolSnapshot {
            trading_pair,
            round_number,
            vrf_output,
            vrf_proof,
            mut buys,
            mut sells,
            ..
        } = snapshot;

        buys.sort_by_key(|o| o.id);
        sells.sort_by_key(|o| o.id);
        let input_hash =
            compute_input_hash(&trading_pair, round_number, &vrf_output, &buys, &sells);

        SealedRound {
            trading_pair,
            round_number,
            vrf_output,
            vrf_proof,
            buys: shuffled(buys, &vrf_output.derive(side_label(Side::Buy))),
            sells: shuffled(sells, &vrf_output.derive(side_label(Side::Sell))),
            input_hash,
            sealed_at: now,
        }
    }

    /// Positions of one side's shuffle: sealed slot `k` holds the order at
    /// `permutation[k]` of that side sorted by order id.
    #[must_use]
    pub fn side_permutation(vrf_output: &VrfOutput, side: Side, len: usize) -> Vec<usize> {
        permutation(len, &vrf_output.derive(side_label(side)))
    }

    /// Check a sealed round end to end: the VRF proof over the round input,
    /// the input hash, and that both sides are in the order the seed implies.
    ///
    /// # Errors
    /// - `InvalidProof` (VRF) if the proof or output does not verify
    /// - `MatchingProofMismatch` if the hash or either shuffle differs
    pub fn verify_sealed_round(
        public_key: &VrfPublicKey,
        sealed: &SealedRound,
        prior_output: &[u8; 32],
    ) -> Result<()> {
        let alpha = Self::round_input(&sealed.trading_pair, sealed.round_number, prior_output);
        public_key
            .verify_output(&alpha, &sealed.vrf_output, &sealed.vrf_proof)
            .map_err(|_| PhantomError::InvalidProof {
                kind: ProofKind::Vrf,
                reason: format!("round {} seed does not verify", sealed.round_number),
            })?;

        let mut buys = sealed.buys.clone();
        let mut sells = sealed.sells.clone();
        buys.sort_by_key(|o| o.id);
        sells.sort_by_key(|o| o.id);

        let expected = compute_input_hash(
            &sealed.trading_pair,
            sealed.round_number,
            &sealed.vrf_output,
            &buys,
            &sells,
        );
        if expected != sealed.input_hash {
            return Err(PhantomError::MatchingProofMismatch {
                expected: hex::encode(expected),
                actual: hex::encode(sealed.input_hash),
            });
        }

        check_order(Side::Buy, buys, &sealed.buys, &sealed.vrf_output)?;
        check_order(Side::Sell, sells, &sealed.sells, &sealed.vrf_output)
    }
}

impl std::fmt::Debug for RoundSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundSealer")
            .field("public_key", &self.vrf.public())
            .finish_non_exhaustive()
    }
}

const fn side_label(side: Side) -> &'static [u8] {
    match side {
        Side::Buy => BUY_LABEL,
        Side::Sell => SELL_LABEL,
    }
}

fn check_order(
    side: Side,
    canonical: Vec<EncryptedOrder>,
    actual: &[EncryptedOrder],
    vrf_output: &VrfOutput,
) -> Result<()> {
    let expected = shuffled(canonical, &vrf_output.derive(side_label(side)));
    if expected.iter().map(|o| o.id).ne(actual.iter().map(|o| o.id)) {
        return Err(PhantomError::MatchingProofMismatch {
            expected: format!("{side} order implied by seed"),
            actual: format!("{side} order as sealed"),
        });
    }
    Ok(())
}

/// SHA-256 over the canonical order set of a round.
///
/// Commits to pair, round number, VRF output and, per side, each order's
/// id, trader, nonce and ciphertexts.
#[must_use]
pub fn compute_input_hash(
    pair: &TradingPair,
    round_number: u64,
    vrf_output: &VrfOutput,
    buys: &[EncryptedOrder],
    sells: &[EncryptedOrder],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"phantom:sealed_round:v1:");
    hasher.update(pair.symbol().as_bytes());
    hasher.update(round_number.to_le_bytes());
    hasher.update(vrf_output.as_bytes());

    for side in [buys, sells] {
        hasher.update((side.len() as u64).to_le_bytes());
        for order in side {
            hasher.update(order.id.as_bytes());
            hasher.update([order.side.tag()]);
            hasher.update(order.trader.as_bytes());
            hasher.update(order.nonce.to_le_bytes());
            hasher.update(order.encrypted_price.to_bytes());
            hasher.update(order.remaining_amount.to_bytes());
        }
    }
    hasher.finalize().into()
}
