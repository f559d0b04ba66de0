//! Settlement handoff payload.

use chrono::{DateTime, Utc};
use phantom_crypto::{VrfOutput, VrfProof};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{RoundId, TradingPair};

/// Emitted once per completed round with a non-zero volume. The core never
/// moves funds; the collaborator receiving this does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementInstruction {
    pub matching_round_id: RoundId,
    pub trading_pair: TradingPair,
    pub round_number: u64,
    /// Clearing price in price ticks.
    pub clearing_price: u64,
    /// Matched volume in lots.
    pub matched_volume: u64,
    /// `matched_volume × fee_bps / 10 000`, in lots.
    pub fee: u64,
    /// `clearing_price × price_tick`, in quote units.
    pub clearing_price_quote: Decimal,
    /// `matched_volume × lot_size`, in base units.
    pub matched_volume_base: Decimal,
    pub matching_proof: [u8; 32],
    pub vrf_output: VrfOutput,
    pub vrf_proof: VrfProof,
    pub emitted_at: DateTime<Utc>,
}
