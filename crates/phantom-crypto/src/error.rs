//! Errors raised by the cryptographic layer.
//!
//! These carry no numeric codes of their own; `phantom-types` folds them into
//! the `DP_ERR_1xx`/`DP_ERR_2xx` ranges when they cross into engine code.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which proof family rejected its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofKind {
    Range,
    Equality,
    Solvency,
    Dleq,
    Vrf,
    Share,
    Comparison,
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range => write!(f, "range"),
            Self::Equality => write!(f, "equality"),
            Self::Solvency => write!(f, "solvency"),
            Self::Dleq => write!(f, "dleq"),
            Self::Vrf => write!(f, "vrf"),
            Self::Share => write!(f, "decryption-share"),
            Self::Comparison => write!(f, "comparison"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Plaintext falls outside `[0, 2^bits)`.
    #[error("value {value} outside encoding domain [0, {max}]")]
    ValueOutOfDomain { value: u64, max: u64 },

    /// Encoding domain width is unusable.
    #[error("encoding domain of {bits} bits is not supported")]
    UnsupportedDomain { bits: u32 },

    /// An all-zero encryption nonce would publish the plaintext point.
    #[error("degenerate encryption nonce")]
    DegenerateNonce,

    /// Discrete-log lookup did not land in the table.
    #[error("decrypted point lies outside the decryption table range")]
    DecryptionRangeExceeded,

    #[error("{kind} proof rejected: {reason}")]
    InvalidProof {
        kind: ProofKind,
        reason: &'static str,
    },

    /// The prover's witness does not satisfy the statement.
    #[error("statement not provable: {0}")]
    Unprovable(&'static str),

    #[error("insufficient decryption shares: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },

    #[error("duplicate share index {0}")]
    DuplicateShareIndex(u32),

    #[error("invalid share index {0}")]
    InvalidShareIndex(u32),

    #[error("invalid threshold {threshold} of {total}")]
    InvalidThreshold { threshold: u32, total: u32 },

    /// Byte string does not decode to a group element.
    #[error("malformed group element")]
    MalformedPoint,
}

impl CryptoError {
    pub(crate) fn invalid(kind: ProofKind, reason: &'static str) -> Self {
        Self::InvalidProof { kind, reason }
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
