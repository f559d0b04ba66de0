//! Error types for the Phantom dark pool.
//!
//! All errors use the `DP_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Encoding errors
//! - 2xx: Proof errors (security events)
//! - 3xx: Admission errors
//! - 4xx: Round errors
//! - 5xx: Threshold / executor errors
//! - 6xx: Settlement errors
//! - 9xx: General / internal errors

use phantom_crypto::{CryptoError, ProofKind};
use thiserror::Error;

use crate::{ExecutorId, OrderId, OrderStatus, RoundId, RoundStatus, Side, ThresholdOperationId, TraderId, TradingPair};

/// Central error enum for all Phantom operations above the crypto layer.
#[derive(Debug, Error)]
pub enum PhantomError {
    // =================================================================
    // Encoding Errors (1xx)
    // =================================================================
    /// A value fell outside the supported plaintext domain.
    #[error("DP_ERR_100: Encoding error: {reason}")]
    Encoding { reason: String },

    /// A decrypted point had no preimage in the table. Admission bounds make
    /// this unreachable, so seeing it means a bug.
    #[error("DP_ERR_101: Decryption range exceeded")]
    DecryptionRangeExceeded,

    // =================================================================
    // Proof Errors (2xx)
    // =================================================================
    #[error("DP_ERR_200: Invalid {kind} proof: {reason}")]
    InvalidProof { kind: ProofKind, reason: String },

    /// The order's ed25519 signature did not verify against the trader key.
    #[error("DP_ERR_201: Order signature verification failed")]
    InvalidSignature,

    /// Replaying a round did not reproduce its matching proof.
    #[error("DP_ERR_202: Matching proof mismatch: expected {expected}, got {actual}")]
    MatchingProofMismatch { expected: String, actual: String },

    /// A prover was asked to prove something false.
    #[error("DP_ERR_203: Statement not provable: {reason}")]
    Unprovable { reason: String },

    // =================================================================
    // Admission Errors (3xx)
    // =================================================================
    #[error("DP_ERR_300: Duplicate nonce {nonce} for {trader}")]
    DuplicateNonce { trader: TraderId, nonce: u64 },

    #[error("DP_ERR_301: Order expired")]
    Expired,

    #[error("DP_ERR_302: {side} pool full ({capacity} orders)")]
    PoolFull { side: Side, capacity: usize },

    #[error("DP_ERR_303: Pool paused for {0}")]
    PoolPaused(TradingPair),

    /// No balance commitment on record for the trader.
    #[error("DP_ERR_304: Unknown trader: {0}")]
    UnknownTrader(TraderId),

    #[error("DP_ERR_305: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("DP_ERR_306: Order {order_id} cannot be cancelled while {status}")]
    OrderNotCancellable { order_id: OrderId, status: OrderStatus },

    #[error("DP_ERR_307: Order for {actual} submitted to {expected}")]
    WrongPair {
        expected: TradingPair,
        actual: TradingPair,
    },

    #[error("DP_ERR_308: Order {0} belongs to another trader")]
    NotOrderOwner(OrderId),

    /// Every remembered trader still has a live order, so none can be evicted.
    #[error("DP_ERR_309: Nonce register full ({capacity} traders)")]
    NonceRegisterFull { capacity: usize },

    // =================================================================
    // Round Errors (4xx)
    // =================================================================
    #[error("DP_ERR_400: Round for {pair} requested {remaining_ms}ms too early")]
    RoundTooSoon { pair: TradingPair, remaining_ms: u64 },

    /// Round numbers only move forward; a seed for an old round is a replay.
    #[error("DP_ERR_401: Stale round number: expected > {last}, got {requested}")]
    StaleRound { last: u64, requested: u64 },

    #[error("DP_ERR_402: A round for {0} is already in flight")]
    RoundInFlight(TradingPair),

    #[error("DP_ERR_403: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    #[error("DP_ERR_404: Unknown trading pair: {0}")]
    UnknownPair(TradingPair),

    #[error("DP_ERR_405: Matching failed: {reason}")]
    MatchingFailed { reason: String },

    #[error("DP_ERR_406: Round {round} cannot move from {from} to {to}")]
    InvalidRoundTransition {
        round: RoundId,
        from: RoundStatus,
        to: RoundStatus,
    },

    // =================================================================
    // Threshold Errors (5xx)
    // =================================================================
    #[error("DP_ERR_500: Threshold timeout on {operation}: {have}/{need} valid shares")]
    ThresholdTimeout {
        operation: ThresholdOperationId,
        have: usize,
        need: usize,
    },

    #[error("DP_ERR_501: Invalid share from {executor}: {reason}")]
    ExecutorInvalidShare { executor: ExecutorId, reason: String },

    #[error("DP_ERR_502: Not enough active executors: {active} active, {need} needed")]
    InsufficientExecutors { active: usize, need: usize },

    #[error("DP_ERR_503: Unknown executor: {0}")]
    UnknownExecutor(ExecutorId),

    #[error("DP_ERR_504: Executor already registered: {0}")]
    ExecutorAlreadyRegistered(ExecutorId),

    #[error("DP_ERR_505: Transport error to {executor}: {reason}")]
    Transport { executor: ExecutorId, reason: String },

    #[error("DP_ERR_506: Share combination failed: {reason}")]
    ShareCombination { reason: String },

    /// Fewer than `t` executors answered a comparison in time.
    #[error("DP_ERR_507: Comparison shares timed out: {have}/{need} valid shares")]
    ComparisonTimeout { have: usize, need: usize },

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    #[error("DP_ERR_600: Round already settled: {0}")]
    AlreadySettled(RoundId),

    #[error("DP_ERR_601: Settlement handoff failed: {reason}")]
    SettlementFailed { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("DP_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("DP_ERR_901: Serialization error: {0}")]
    Serialization(String),

    #[error("DP_ERR_902: Configuration error: {0}")]
    Configuration(String),

    #[error("DP_ERR_903: I/O error: {0}")]
    Io(String),
}

impl PhantomError {
    /// Stable reason code returned to submitters with a rejection.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Encoding { .. } => "ENCODING_ERROR",
            Self::DecryptionRangeExceeded => "DECRYPTION_RANGE_EXCEEDED",
            Self::InvalidProof { .. } | Self::Unprovable { .. } => "INVALID_PROOF",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::MatchingProofMismatch { .. } => "MATCHING_PROOF_MISMATCH",
            Self::DuplicateNonce { .. } => "DUPLICATE_NONCE",
            Self::Expired => "EXPIRED",
            Self::PoolFull { .. } | Self::NonceRegisterFull { .. } => "POOL_FULL",
            Self::PoolPaused(_) => "POOL_PAUSED",
            Self::UnknownTrader(_) => "UNKNOWN_TRADER",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::OrderNotCancellable { .. } => "ORDER_NOT_CANCELLABLE",
            Self::WrongPair { .. } | Self::UnknownPair(_) => "UNKNOWN_PAIR",
            Self::NotOrderOwner(_) => "NOT_ORDER_OWNER",
            Self::RoundTooSoon { .. } => "ROUND_TOO_SOON",
            Self::StaleRound { .. } => "STALE_ROUND",
            Self::RoundInFlight(_) => "ROUND_IN_FLIGHT",
            Self::ConservationViolation { .. } => "CONSERVATION_VIOLATION",
            Self::MatchingFailed { .. } | Self::InvalidRoundTransition { .. } => "MATCHING_FAILED",
            Self::ThresholdTimeout { .. } | Self::ComparisonTimeout { .. } => "THRESHOLD_TIMEOUT",
            Self::ExecutorInvalidShare { .. } => "EXECUTOR_INVALID_SHARE",
            Self::InsufficientExecutors { .. } => "INSUFFICIENT_EXECUTORS",
            Self::UnknownExecutor(_) | Self::ExecutorAlreadyRegistered(_) => "EXECUTOR_REGISTRY",
            Self::Transport { .. } => "EXECUTOR_TRANSPORT",
            Self::ShareCombination { .. } => "SHARE_COMBINATION",
            Self::AlreadySettled(_) => "ALREADY_SETTLED",
            Self::SettlementFailed { .. } => "SETTLEMENT_FAILED",
            Self::Internal(_) | Self::Serialization(_) | Self::Io(_) => "INTERNAL",
            Self::Configuration(_) => "CONFIGURATION",
        }
    }

    /// Whether the failed step may be attempted again unchanged.
    ///
    /// Proof and encoding failures are deterministic and never retried.
    /// Quorum and timing failures are retried on the next cycle.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ThresholdTimeout { .. }
                | Self::ComparisonTimeout { .. }
                | Self::InsufficientExecutors { .. }
                | Self::Transport { .. }
                | Self::RoundTooSoon { .. }
                | Self::RoundInFlight(_)
                | Self::PoolFull { .. }
                | Self::NonceRegisterFull { .. }
                | Self::SettlementFailed { .. }
        )
    }

    /// Failures that must be logged on the `phantom::security` target.
    #[must_use]
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::InvalidProof { .. }
                | Self::InvalidSignature
                | Self::MatchingProofMismatch { .. }
                | Self::ExecutorInvalidShare { .. }
                | Self::ConservationViolation { .. }
                | Self::DecryptionRangeExceeded
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, PhantomError>;

impl From<CryptoError> for PhantomError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::ValueOutOfDomain { .. }
            | CryptoError::UnsupportedDomain { .. }
            | CryptoError::DegenerateNonce
            | CryptoError::MalformedPoint => Self::Encoding {
                reason: err.to_string(),
            },
            CryptoError::DecryptionRangeExceeded => Self::DecryptionRangeExceeded,
            CryptoError::InvalidProof { kind, reason } => Self::InvalidProof {
                kind,
                reason: reason.to_string(),
            },
            CryptoError::Unprovable(reason) => Self::Unprovable {
                reason: reason.to_string(),
            },
            CryptoError::InsufficientShares { .. }
            | CryptoError::DuplicateShareIndex(_)
            | CryptoError::InvalidShareIndex(_)
            | CryptoError::InvalidThreshold { .. } => Self::ShareCombination {
                reason: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for PhantomError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PhantomError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
