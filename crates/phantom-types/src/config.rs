//! Configuration for a Phantom engine and its trading pairs.

use std::path::Path;
use std::time::Duration;

use phantom_crypto::{EncodingDomain, ThresholdParams};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{PhantomError, Result, TradingPair, constants};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cadence at which the scheduler triggers rounds per pair.
    pub round_interval: Duration,
    /// No two rounds of a pair may start closer together than this.
    pub min_round_interval: Duration,
    pub encoding: EncodingConfig,
    pub threshold: ThresholdConfig,
    pub reputation: ReputationConfig,
    pub pool: PoolConfig,
    pub pairs: Vec<PairConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round_interval: Duration::from_millis(constants::DEFAULT_ROUND_INTERVAL_MS),
            min_round_interval: Duration::from_millis(constants::DEFAULT_MIN_ROUND_INTERVAL_MS),
            encoding: EncodingConfig::default(),
            threshold: ThresholdConfig::default(),
            reputation: ReputationConfig::default(),
            pool: PoolConfig::default(),
            pairs: vec![PairConfig::eth_usdc()],
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.round_interval.is_zero() {
            return Err(config_err("round_interval must be non-zero"));
        }
        if self.round_interval < self.min_round_interval {
            return Err(config_err("round_interval is shorter than min_round_interval"));
        }
        self.encoding.validate()?;
        self.threshold.validate()?;
        if self.pairs.is_empty() {
            return Err(config_err("at least one trading pair is required"));
        }
        let capacity = 1usize << self.encoding.reveal_headroom_bits;
        for (i, pair) in self.pairs.iter().enumerate() {
            pair.validate(capacity)?;
            if self.pairs[..i].iter().any(|p| p.pair() == pair.pair()) {
                return Err(config_err(format!("duplicate pair {}", pair.pair())));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn pair(&self, pair: &TradingPair) -> Option<&PairConfig> {
        self.pairs.iter().find(|p| p.pair() == *pair)
    }
}

fn config_err(msg: impl Into<String>) -> PhantomError {
    PhantomError::Configuration(msg.into())
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Width of order prices and amounts.
    pub range_bits: u32,
    /// Extra width for revealed sums.
    pub reveal_headroom_bits: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            range_bits: constants::DEFAULT_RANGE_BITS,
            reveal_headroom_bits: constants::DEFAULT_REVEAL_HEADROOM_BITS,
        }
    }
}

impl EncodingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reveal_headroom_bits == 0 {
            return Err(config_err("reveal_headroom_bits must be at least 1"));
        }
        self.reveal_domain().map(|_| ())
    }

    pub fn domain(&self) -> Result<EncodingDomain> {
        Ok(EncodingDomain::new(self.range_bits)?)
    }

    /// Domain the decryption table must cover.
    pub fn reveal_domain(&self) -> Result<EncodingDomain> {
        Ok(self.domain()?.widened(self.reveal_headroom_bits)?)
    }
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// `t`.
    pub required_shares: u32,
    /// `n`.
    pub total_shares: u32,
    /// Bounded wait for `t` valid shares.
    pub share_timeout: Duration,
    /// Reveal attempts per round before the round fails back to the pool.
    pub max_reveal_attempts: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            required_shares: constants::DEFAULT_REQUIRED_SHARES,
            total_shares: constants::DEFAULT_TOTAL_SHARES,
            share_timeout: Duration::from_millis(constants::DEFAULT_SHARE_TIMEOUT_MS),
            max_reveal_attempts: constants::DEFAULT_MAX_REVEAL_ATTEMPTS,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<()> {
        let (t, n) = (self.required_shares, self.total_shares);
        if t == 0 || t > n {
            return Err(config_err(format!("threshold {t} of {n} is not satisfiable")));
        }
        if n > constants::MAX_EXECUTORS {
            return Err(config_err(format!(
                "at most {} executors are supported, got {n}",
                constants::MAX_EXECUTORS
            )));
        }
        if t < 2 && n != 1 {
            return Err(config_err("threshold of 1 is only allowed for a single-node committee"));
        }
        if self.share_timeout.is_zero() {
            return Err(config_err("share_timeout must be non-zero"));
        }
        if self.max_reveal_attempts == 0 {
            return Err(config_err("max_reveal_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn params(&self) -> Result<ThresholdParams> {
        Ok(ThresholdParams::new(self.required_shares, self.total_shares)?)
    }
}

// ---------------------------------------------------------------------------
// Reputation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    pub initial: u8,
    pub max: u8,
    pub heartbeat_reward: u8,
    pub slash_penalty: u8,
    pub invalid_share_penalty: u8,
    pub missed_share_penalty: u8,
    pub max_slashes: u8,
    pub invalid_shares_before_slash: u32,
    pub heartbeat_timeout: Duration,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            initial: constants::INITIAL_REPUTATION,
            max: constants::MAX_REPUTATION,
            heartbeat_reward: constants::HEARTBEAT_REWARD,
            slash_penalty: constants::SLASH_PENALTY,
            invalid_share_penalty: constants::INVALID_SHARE_PENALTY,
            missed_share_penalty: constants::MISSED_SHARE_PENALTY,
            max_slashes: constants::MAX_SLASHES,
            invalid_shares_before_slash: constants::INVALID_SHARES_BEFORE_SLASH,
            heartbeat_timeout: Duration::from_millis(constants::DEFAULT_HEARTBEAT_TIMEOUT_MS),
        }
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Traders remembered per pair by the nonce register.
    pub nonce_retention: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            nonce_retention: constants::DEFAULT_NONCE_RETENTION,
        }
    }
}

// ---------------------------------------------------------------------------
// Pairs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub base: String,
    pub quote: String,
    pub fee_bps: u16,
    /// Quote units per price tick.
    pub price_tick: Decimal,
    /// Base units per lot.
    pub lot_size: Decimal,
    pub max_orders_per_side: usize,
}

impl PairConfig {
    #[must_use]
    pub fn eth_usdc() -> Self {
        Self {
            base: "ETH".to_string(),
            quote: "USDC".to_string(),
            fee_bps: constants::DEFAULT_FEE_BPS,
            price_tick: Decimal::new(1, 2), // 0.01 USDC
            lot_size: Decimal::new(1, 3),   // 0.001 ETH
            max_orders_per_side: constants::DEFAULT_MAX_ORDERS_PER_SIDE,
        }
    }

    #[must_use]
    pub fn pair(&self) -> TradingPair {
        TradingPair::new(self.base.clone(), self.quote.clone())
    }

    fn validate(&self, capacity_limit: usize) -> Result<()> {
        if self.base.is_empty() || self.quote.is_empty() {
            return Err(config_err("pair assets must be non-empty"));
        }
        if u64::from(self.fee_bps) > constants::BPS_DENOMINATOR {
            return Err(config_err(format!("{}: fee_bps above 100%", self.pair())));
        }
        if self.price_tick <= Decimal::ZERO || self.lot_size <= Decimal::ZERO {
            return Err(config_err(format!("{}: tick and lot must be positive", self.pair())));
        }
        if self.max_orders_per_side == 0 || self.max_orders_per_side > capacity_limit {
            return Err(config_err(format!(
                "{}: max_orders_per_side must be in 1..={capacity_limit}",
                self.pair()
            )));
        }
        Ok(())
    }
}
