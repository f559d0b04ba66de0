//! System-wide constants for the Phantom dark pool.

/// Default cadence of matching rounds per trading pair, in milliseconds.
pub const DEFAULT_ROUND_INTERVAL_MS: u64 = 30_000;

/// Rounds of one pair may never start closer together than this.
pub const DEFAULT_MIN_ROUND_INTERVAL_MS: u64 = 30_000;

/// Default plaintext width (bits) of encrypted prices and amounts.
pub const DEFAULT_RANGE_BITS: u32 = 24;

/// Extra bits of decryption-table range for revealed sums.
pub const DEFAULT_REVEAL_HEADROOM_BITS: u32 = 8;

/// Reference quorum: 3-of-5 executors.
pub const DEFAULT_REQUIRED_SHARES: u32 = 3;
pub const DEFAULT_TOTAL_SHARES: u32 = 5;

/// Hard cap on committee size.
pub const MAX_EXECUTORS: u32 = 5;

/// How long the coordinator waits for `t` valid shares, in milliseconds.
pub const DEFAULT_SHARE_TIMEOUT_MS: u64 = 5_000;

/// Attempts per threshold operation before the round is failed back to the pool.
pub const DEFAULT_MAX_REVEAL_ATTEMPTS: u32 = 1;

/// Executor reputation bounds and adjustments.
pub const INITIAL_REPUTATION: u8 = 100;
pub const MAX_REPUTATION: u8 = 100;
pub const HEARTBEAT_REWARD: u8 = 1;
pub const SLASH_PENALTY: u8 = 20;
pub const INVALID_SHARE_PENALTY: u8 = 5;
pub const MISSED_SHARE_PENALTY: u8 = 2;
pub const MAX_SLASHES: u8 = 3;

/// Invalid shares from one executor before it is slashed.
pub const INVALID_SHARES_BEFORE_SLASH: u32 = 3;

/// Heartbeats older than this mark an executor as not live, in milliseconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 60_000;

/// Traders tracked per pair by the nonce register.
pub const DEFAULT_NONCE_RETENTION: usize = 10_000;

/// Orders per side of a pair. Must not exceed `2^reveal_headroom_bits`.
pub const DEFAULT_MAX_ORDERS_PER_SIDE: usize = 256;

/// Default pair fee in basis points.
pub const DEFAULT_FEE_BPS: u16 = 30;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Settlement idempotency cache size (number of round ids to remember).
pub const SETTLEMENT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;
