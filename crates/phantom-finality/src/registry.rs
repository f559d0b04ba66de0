//! Executor registry.
//!
//! Owns the [`ExecutorNode`] entries of one committee: who may serve shares,
//! their verification keys, liveness and reputation. Quorum calls go to live
//! executors in descending reputation order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use phantom_crypto::CommitteeKey;
use phantom_types::{
    ExecutorId, ExecutorNode, PhantomError, ReputationConfig, Result, ViolationType,
};

pub struct ExecutorRegistry {
    committee: CommitteeKey,
    config: ReputationConfig,
    nodes: BTreeMap<ExecutorId, ExecutorNode>,
}

impl ExecutorRegistry {
    #[must_use]
    pub fn new(committee: CommitteeKey, config: ReputationConfig) -> Self {
        Self {
            committee,
            config,
            nodes: BTreeMap::new(),
        }
    }

    /// Register executor `id`. Its share verification key is taken from the
    /// committee key, never from the executor itself.
    ///
    /// # Errors
    /// - `UnknownExecutor` if `id` is not a committee index `1..=n`
    /// - `ExecutorAlreadyRegistered` if `id` is taken
    pub fn register(
        &mut self,
        id: ExecutorId,
        signing_key: [u8; 32],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let vk = *self
            .committee
            .verification_key(id.index())
            .ok_or(PhantomError::UnknownExecutor(id))?;
        if self.nodes.contains_key(&id) {
            return Err(PhantomError::ExecutorAlreadyRegistered(id));
        }
        self.nodes
            .insert(id, ExecutorNode::new(id, vk, signing_key, &self.config, now));
        tracing::info!(executor = %id, "executor registered");
        Ok(())
    }

    /// # Errors
    /// `UnknownExecutor` if `id` is not registered.
    pub fn heartbeat(&mut self, id: ExecutorId, now: DateTime<Utc>) -> Result<()> {
        let cfg = &self.config;
        self.nodes
            .get_mut(&id)
            .ok_or(PhantomError::UnknownExecutor(id))?
            .heartbeat(now, cfg);
        Ok(())
    }

    /// Live executors, highest reputation first, ties by index.
    #[must_use]
    pub fn quorum(&self, now: DateTime<Utc>) -> Vec<ExecutorId> {
        let mut live: Vec<&ExecutorNode> = self
            .nodes
            .values()
            .filter(|n| n.is_live(now, &self.config))
            .collect();
        live.sort_by(|a, b| {
            b.reputation_score
                .cmp(&a.reputation_score)
                .then(a.id.cmp(&b.id))
        });
        live.into_iter().map(|n| n.id).collect()
    }

    /// Count an invalid share against `id`.
    pub fn record_invalid_share(&mut self, id: ExecutorId) {
        let cfg = &self.config;
        if let Some(node) = self.nodes.get_mut(&id) {
            let dropped = node.record_invalid_share(cfg);
            tracing::warn!(
                target: "phantom::security",
                executor = %id,
                invalid_shares = node.invalid_shares,
                reputation = node.reputation_score,
                deactivated = dropped,
                "invalid decryption share"
            );
        }
    }

    /// Penalize `id` for not answering a share request in time.
    pub fn record_missed_share(&mut self, id: ExecutorId) {
        let penalty = self.config.missed_share_penalty;
        if let Some(node) = self.nodes.get_mut(&id) {
            let dropped = node.penalize(penalty);
            tracing::warn!(
                executor = %id,
                reputation = node.reputation_score,
                deactivated = dropped,
                "share request missed"
            );
        }
    }

    /// # Errors
    /// `UnknownExecutor` if `id` is not registered.
    pub fn slash(&mut self, id: ExecutorId, violation: ViolationType) -> Result<bool> {
        let cfg = &self.config;
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(PhantomError::UnknownExecutor(id))?;
        let dropped = node.slash(violation, cfg);
        tracing::warn!(
            target: "phantom::security",
            executor = %id,
            %violation,
            slashes = node.slash_count,
            reputation = node.reputation_score,
            deactivated = dropped,
            "executor slashed"
        );
        Ok(dropped)
    }

    #[must_use]
    pub fn get(&self, id: ExecutorId) -> Option<&ExecutorNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ExecutorNode> {
        self.nodes.values()
    }

    #[must_use]
    pub fn committee(&self) -> &CommitteeKey {
        &self.committee
    }

    #[must_use]
    pub fn config(&self) -> &ReputationConfig {
        &self.config
    }

    #[must_use]
    pub fn live_count(&self, now: DateTime<Utc>) -> usize {
        self.nodes
            .values()
            .filter(|n| n.is_live(now, &self.config))
            .count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("params", &self.committee.params())
            .field("registered", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use phantom_crypto::{ThresholdParams, run_dkg};
    use rand::rngs::OsRng;

    use super::*;

    fn registry() -> ExecutorRegistry {
        let (committee, _) = run_dkg(ThresholdParams::new(3, 5).unwrap(), &mut OsRng).unwrap();
        let mut reg = ExecutorRegistry::new(committee, ReputationConfig::default());
        for i in 1..=5 {
            reg.register(ExecutorId(i), [i as u8; 32], Utc::now()).unwrap();
        }
        reg
    }

    #[test]
    fn registration_is_bounded_by_committee() {
        let mut reg = registry();
        assert!(matches!(
            reg.register(ExecutorId(6), [0; 32], Utc::now()),
            Err(PhantomError::UnknownExecutor(_))
        ));
        assert!(matches!(
            reg.register(ExecutorId(0), [0; 32], Utc::now()),
            Err(PhantomError::UnknownExecutor(_))
        ));
        assert!(matches!(
            reg.register(ExecutorId(2), [0; 32], Utc::now()),
            Err(PhantomError::ExecutorAlreadyRegistered(_))
        ));
        assert_eq!(reg.len(), 5);
    }

    #[test]
    fn verification_key_comes_from_committee() {
        let reg = registry();
        let node = reg.get(ExecutorId(3)).unwrap();
        assert_eq!(
            Some(&node.public_key_share),
            reg.committee().verification_key(3)
        );
    }

    #[test]
    fn quorum_prefers_reputation() {
        let mut reg = registry();
        reg.record_invalid_share(ExecutorId(1));
        reg.record_missed_share(ExecutorId(2));
        let q = reg.quorum(Utc::now());
        assert_eq!(
            q,
            vec![
                ExecutorId(3),
                ExecutorId(4),
                ExecutorId(5),
                ExecutorId(2),
                ExecutorId(1)
            ]
        );
    }

    #[test]
    fn stale_heartbeats_leave_quorum() {
        let mut reg = registry();
        let later = Utc::now() + chrono::Duration::seconds(120);
        reg.heartbeat(ExecutorId(4), later).unwrap();
        assert_eq!(reg.quorum(later), vec![ExecutorId(4)]);
        assert_eq!(reg.live_count(later), 1);
    }

    #[test]
    fn slashed_out_executor_leaves_quorum() {
        let mut reg = registry();
        for v in [
            ViolationType::MissedHeartbeat,
            ViolationType::DoubleSpending,
            ViolationType::MaliciousMatching,
        ] {
            reg.slash(ExecutorId(5), v).unwrap();
        }
        assert!(!reg.quorum(Utc::now()).contains(&ExecutorId(5)));
        assert!(reg.slash(ExecutorId(9), ViolationType::MissedHeartbeat).is_err());
    }
}
