//! Executor node registry entries.
//!
//! Reputation starts at 100, gains a point per heartbeat, and loses points
//! for invalid or missing shares and for slashable violations. A node is
//! deactivated after [`ReputationConfig::max_slashes`] slashes or when its
//! reputation reaches zero.

use std::fmt;

use chrono::{DateTime, Utc};
use phantom_crypto::RistrettoPoint;
use serde::{Deserialize, Serialize};

use crate::{ExecutorId, ReputationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutorStatus {
    Active,
    Inactive,
}

impl fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Inactive => write!(f, "INACTIVE"),
        }
    }
}

/// Slashable executor misbehaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationType {
    InvalidDecryption,
    MissedHeartbeat,
    DoubleSpending,
    MaliciousMatching,
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDecryption => write!(f, "INVALID_DECRYPTION"),
            Self::MissedHeartbeat => write!(f, "MISSED_HEARTBEAT"),
            Self::DoubleSpending => write!(f, "DOUBLE_SPENDING"),
            Self::MaliciousMatching => write!(f, "MALICIOUS_MATCHING"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorNode {
    pub id: ExecutorId,
    /// `s_i·G`, against which partial decryptions are verified.
    pub public_key_share: RistrettoPoint,
    /// ed25519 key the executor signs share responses with.
    pub signing_key: [u8; 32],
    pub reputation_score: u8,
    pub last_heartbeat: DateTime<Utc>,
    pub status: ExecutorStatus,
    pub slash_count: u8,
    pub invalid_shares: u32,
}

impl ExecutorNode {
    #[must_use]
    pub fn new(
        id: ExecutorId,
        public_key_share: RistrettoPoint,
        signing_key: [u8; 32],
        cfg: &ReputationConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            public_key_share,
            signing_key,
            reputation_score: cfg.initial,
            last_heartbeat: now,
            status: ExecutorStatus::Active,
            slash_count: 0,
            invalid_shares: 0,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ExecutorStatus::Active
    }

    /// Active and heard from within the heartbeat timeout.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>, cfg: &ReputationConfig) -> bool {
        let timeout = chrono::Duration::from_std(cfg.heartbeat_timeout).unwrap_or(chrono::Duration::MAX);
        self.is_active() && now.signed_duration_since(self.last_heartbeat) <= timeout
    }

    pub fn heartbeat(&mut self, now: DateTime<Utc>, cfg: &ReputationConfig) {
        self.last_heartbeat = now;
        self.reputation_score = self
            .reputation_score
            .saturating_add(cfg.heartbeat_reward)
            .min(cfg.max);
    }

    /// Lower reputation; deactivates at zero. Returns whether the node was
    /// deactivated by this call.
    pub fn penalize(&mut self, amount: u8) -> bool {
        self.reputation_score = self.reputation_score.saturating_sub(amount);
        self.deactivate_if(self.reputation_score == 0)
    }

    /// Apply a slash. Returns whether the node was deactivated by this call.
    pub fn slash(&mut self, _violation: ViolationType, cfg: &ReputationConfig) -> bool {
        self.slash_count = self.slash_count.saturating_add(1);
        let dropped = self.penalize(cfg.slash_penalty);
        dropped || self.deactivate_if(self.slash_count >= cfg.max_slashes)
    }

    /// Count an invalid share; slashes every `invalid_shares_before_slash`-th one.
    pub fn record_invalid_share(&mut self, cfg: &ReputationConfig) -> bool {
        self.invalid_shares += 1;
        let dropped = self.penalize(cfg.invalid_share_penalty);
        if cfg.invalid_shares_before_slash > 0
            && self.invalid_shares % cfg.invalid_shares_before_slash == 0
        {
            return self.slash(ViolationType::InvalidDecryption, cfg) || dropped;
        }
        dropped
    }

    fn deactivate_if(&mut self, cond: bool) -> bool {
        if cond && self.is_active() {
            self.status = ExecutorStatus::Inactive;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use phantom_crypto::group::G;

    use super::*;

    fn node() -> (ExecutorNode, ReputationConfig) {
        let cfg = ReputationConfig::default();
        (ExecutorNode::new(ExecutorId(1), G, [0; 32], &cfg, Utc::now()), cfg)
    }

    #[test]
    fn heartbeat_caps_reputation() {
        let (mut n, cfg) = node();
        n.penalize(10);
        assert_eq!(n.reputation_score, 90);
        for _ in 0..20 {
            n.heartbeat(Utc::now(), &cfg);
        }
        assert_eq!(n.reputation_score, cfg.max);
    }

    #[test]
    fn third_slash_deactivates() {
        let (mut n, cfg) = node();
        assert!(!n.slash(ViolationType::DoubleSpending, &cfg));
        assert!(!n.slash(ViolationType::MissedHeartbeat, &cfg));
        assert!(n.is_active());
        assert!(n.slash(ViolationType::MaliciousMatching, &cfg));
        assert!(!n.is_active());
        assert_eq!(n.reputation_score, 40);
    }

    #[test]
    fn repeated_invalid_shares_slash() {
        let (mut n, cfg) = node();
        for _ in 0..cfg.invalid_shares_before_slash {
            n.record_invalid_share(&cfg);
        }
        assert_eq!(n.slash_count, 1);
        assert_eq!(
            n.reputation_score,
            100 - 3 * cfg.invalid_share_penalty - cfg.slash_penalty
        );
    }

    #[test]
    fn liveness_follows_heartbeats() {
        let (mut n, cfg) = node();
        let later = n.last_heartbeat + chrono::Duration::seconds(120);
        assert!(!n.is_live(later, &cfg));
        n.heartbeat(later, &cfg);
        assert!(n.is_live(later, &cfg));
    }
}
