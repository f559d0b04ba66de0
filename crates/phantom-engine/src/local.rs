//! A whole executor committee in one process.
//!
//! Runs the DKG, registers one [`LocalExecutor`] per share and wires the
//! threshold coordinator and comparator to them. Shares live only inside
//! the executors; the comparator reaches them through the coordinator like
//! any reveal. The node binary and the scenario tests start from this; a
//! deployment with remote executors builds the same parts from its own
//! transports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use phantom_crypto::{CommitteeKey, DecryptionTable, KeyShare, run_dkg};
use phantom_finality::{
    ExecutorRegistry, ExecutorTransport, LocalExecutor, SettlementSink, ThresholdCoordinator,
};
use phantom_ingress::BalanceCommitmentSource;
use phantom_matchcore::ComparisonVerifier;
use phantom_types::{EngineConfig, ExecutorId, Result};
use rand::rngs::OsRng;

use crate::Services;
use crate::comparator::ExecutorComparator;

pub struct LocalCommittee {
    pub key: CommitteeKey,
    pub registry: Arc<Mutex<ExecutorRegistry>>,
    pub coordinator: Arc<ThresholdCoordinator>,
    pub prover: Arc<ExecutorComparator>,
}

impl LocalCommittee {
    /// # Errors
    /// `Configuration` for invalid threshold or encoding parameters.
    pub fn generate(config: &EngineConfig, now: DateTime<Utc>) -> Result<Self> {
        Self::generate_with(config, now, |executor| {
            Arc::new(executor) as Arc<dyn ExecutorTransport>
        })
    }

    /// Like [`LocalCommittee::generate`], with `connect` choosing the
    /// transport each executor is reached through.
    ///
    /// # Errors
    /// `Configuration` for invalid threshold or encoding parameters.
    pub fn generate_with<F>(config: &EngineConfig, now: DateTime<Utc>, mut connect: F) -> Result<Self>
    where
        F: FnMut(LocalExecutor) -> Arc<dyn ExecutorTransport>,
    {
        let params = config.threshold.params()?;
        let (key, shares) = run_dkg(params, &mut OsRng)?;
        let shares: Vec<Arc<KeyShare>> = shares.into_iter().map(Arc::new).collect();
        let table = Arc::new(DecryptionTable::new(config.encoding.reveal_domain()?));

        let mut registry = ExecutorRegistry::new(key.clone(), config.reputation.clone());
        let mut transports = Vec::with_capacity(shares.len());
        for share in &shares {
            let executor = LocalExecutor::new(Arc::clone(share), SigningKey::generate(&mut OsRng));
            registry.register(executor.executor(), executor.signing_key(), now)?;
            transports.push(connect(executor));
        }
        let registry = Arc::new(Mutex::new(registry));

        let mut coordinator = ThresholdCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&table),
            config.threshold.share_timeout,
        );
        for transport in transports {
            coordinator.connect(transport)?;
        }

        let coordinator = Arc::new(coordinator);
        let prover = ExecutorComparator::new(
            ComparisonVerifier::new(key.clone(), config.encoding.domain()?),
            Arc::clone(&coordinator),
            table,
        );

        tracing::info!(
            threshold = params.threshold(),
            total = params.total(),
            "local committee ready"
        );
        Ok(Self {
            key,
            registry,
            coordinator,
            prover: Arc::new(prover),
        })
    }

    #[must_use]
    pub fn services(
        &self,
        settlement: Arc<dyn SettlementSink>,
        balances: Arc<dyn BalanceCommitmentSource>,
    ) -> Services {
        Services {
            prover: self.prover.clone(),
            decryptor: self.coordinator.clone(),
            settlement,
            balances,
        }
    }

    /// Heartbeat every registered executor.
    pub fn heartbeat_all(&self, now: DateTime<Utc>) {
        let mut registry = self.registry.lock();
        let ids: Vec<ExecutorId> = registry.nodes().map(|n| n.id).collect();
        for id in ids {
            // Ids come from the registry itself.
            let _ = registry.heartbeat(id, now);
        }
    }
}

impl std::fmt::Debug for LocalCommittee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCommittee")
            .field("params", &self.key.params())
            .finish_non_exhaustive()
    }
}
