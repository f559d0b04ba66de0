//! The top-level dark pool coordinator.
//!
//! Owns every piece of state the engine has: one [`PairEngine`] per
//! configured pair, the executor registry and the shared settlement
//! handoff. Nothing is process-global; two coordinators in one process are
//! fully independent.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use phantom_crypto::{CommitteeKey, VrfKeypair, VrfPublicKey};
use phantom_finality::{DecryptionBackend, ExecutorRegistry, SettlementHandoff, SettlementSink};
use phantom_ingress::{AdmissionVerifier, BalanceCommitmentSource, PairPool, RoundSealer};
use phantom_matchcore::ProofBackend;
use phantom_types::constants::SETTLEMENT_IDEMPOTENCY_CACHE_SIZE;
use phantom_types::{
    EncryptedOrder, EngineConfig, ExecutorId, OrderId, OrderSubmission, PhantomError, Result,
    SubmissionReceipt, TraderId, TradingPair,
};
use tokio::task::JoinSet;

use crate::pair_engine::{PairEngine, RoundReport};
use crate::scheduler::RoundScheduler;

/// The capabilities a coordinator is built from, chosen at construction.
#[derive(Clone)]
pub struct Services {
    pub prover: Arc<dyn ProofBackend>,
    pub decryptor: Arc<dyn DecryptionBackend>,
    pub settlement: Arc<dyn SettlementSink>,
    pub balances: Arc<dyn BalanceCommitmentSource>,
}

pub struct DarkPoolCoordinator {
    config: EngineConfig,
    vrf_public_key: VrfPublicKey,
    registry: Arc<Mutex<ExecutorRegistry>>,
    pairs: BTreeMap<TradingPair, Arc<PairEngine>>,
}

impl DarkPoolCoordinator {
    /// # Errors
    /// `Configuration` if the config is invalid or the committee does not
    /// match its threshold parameters.
    pub fn new(
        config: EngineConfig,
        committee: &CommitteeKey,
        registry: Arc<Mutex<ExecutorRegistry>>,
        services: Services,
        vrf: VrfKeypair,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        config.validate()?;
        if committee.params() != config.threshold.params()? {
            return Err(PhantomError::Configuration(format!(
                "committee is {:?}, configuration expects {}-of-{}",
                committee.params(),
                config.threshold.required_shares,
                config.threshold.total_shares
            )));
        }

        let domain = config.encoding.domain()?;
        let sealer = Arc::new(RoundSealer::new(vrf));
        let settlement = Arc::new(SettlementHandoff::new(
            Arc::clone(&services.settlement),
            SETTLEMENT_IDEMPOTENCY_CACHE_SIZE,
        ));

        let mut pairs = BTreeMap::new();
        for pair_config in &config.pairs {
            let verifier = AdmissionVerifier::new(
                committee.public_key(),
                domain,
                Arc::clone(&services.balances),
            );
            let pool = PairPool::new(
                pair_config,
                verifier,
                config.pool.nonce_retention,
                config.round_interval,
                config.min_round_interval,
                now,
            );
            let engine = PairEngine::new(
                pair_config.clone(),
                pool,
                Arc::clone(&sealer),
                Arc::clone(&services.prover),
                Arc::clone(&services.decryptor),
                Arc::clone(&settlement),
                config.threshold.clone(),
            );
            pairs.insert(pair_config.pair(), Arc::new(engine));
        }

        tracing::info!(
            pairs = pairs.len(),
            threshold = config.threshold.required_shares,
            executors = config.threshold.total_shares,
            range_bits = config.encoding.range_bits,
            "dark pool coordinator started"
        );
        Ok(Self {
            vrf_public_key: sealer.public_key(),
            config,
            registry,
            pairs,
        })
    }

    // -----------------------------------------------------------------------
    // Order boundary
    // -----------------------------------------------------------------------

    /// # Errors
    /// `UnknownPair`, or any admission rejection of the pair's pool.
    pub fn submit_order(
        &self,
        submission: OrderSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt> {
        self.engine(&submission.trading_pair)?.submit(submission, now)
    }

    /// # Errors
    /// `UnknownPair`, or any error of [`PairEngine::cancel`].
    pub fn cancel_order(
        &self,
        pair: &TradingPair,
        order_id: &OrderId,
        trader: &TraderId,
    ) -> Result<EncryptedOrder> {
        self.engine(pair)?.cancel(order_id, trader)
    }

    // -----------------------------------------------------------------------
    // Rounds
    // -----------------------------------------------------------------------

    /// # Errors
    /// `UnknownPair`, or any error of [`PairEngine::run_round`].
    pub async fn run_round(&self, pair: &TradingPair, now: DateTime<Utc>) -> Result<RoundReport> {
        self.engine(pair)?.run_round(now).await
    }

    /// One round for every pair, all pairs in parallel. Results come back
    /// in pair order.
    pub async fn run_all_rounds(&self, now: DateTime<Utc>) -> Vec<(TradingPair, Result<RoundReport>)> {
        let mut tasks = JoinSet::new();
        for (pair, engine) in &self.pairs {
            let pair = pair.clone();
            let engine = Arc::clone(engine);
            tasks.spawn(async move {
                let result = engine.run_round(now).await;
                (pair, result)
            });
        }
        let mut results = Vec::with_capacity(self.pairs.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => tracing::error!(error = %err, "round task aborted"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Run every pair on each tick until the scheduler shuts down.
    pub async fn drive<S: RoundScheduler>(&self, mut scheduler: S) {
        while let Some(now) = scheduler.next_tick().await {
            for (pair, result) in self.run_all_rounds(now).await {
                match result {
                    Ok(report) if report.is_completed() => tracing::debug!(
                        pair = %pair,
                        round_number = report.round.round_number,
                        settled = report.settled,
                        "tick handled"
                    ),
                    Ok(report) => tracing::info!(
                        pair = %pair,
                        round_number = report.round.round_number,
                        reason = report.round.failure_reason.as_deref().unwrap_or(""),
                        "round will be retried"
                    ),
                    Err(
                        err @ (PhantomError::PoolPaused(_)
                        | PhantomError::RoundTooSoon { .. }
                        | PhantomError::RoundInFlight(_)),
                    ) => tracing::debug!(pair = %pair, reason = err.reason_code(), "round skipped"),
                    Err(err) => tracing::error!(pair = %pair, error = %err, "round could not run"),
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    // -----------------------------------------------------------------------
    // Operator controls and inspection
    // -----------------------------------------------------------------------

    /// # Errors
    /// `UnknownPair`.
    pub fn pause(&self, pair: &TradingPair) -> Result<()> {
        self.engine(pair)?.pool().pause();
        Ok(())
    }

    /// # Errors
    /// `UnknownPair`.
    pub fn resume(&self, pair: &TradingPair) -> Result<()> {
        self.engine(pair)?.pool().resume();
        Ok(())
    }

    /// Liveness signal from the external heartbeat feed.
    ///
    /// # Errors
    /// `UnknownExecutor` if the executor is not registered.
    pub fn heartbeat(&self, executor: ExecutorId, now: DateTime<Utc>) -> Result<()> {
        self.registry.lock().heartbeat(executor, now)
    }

    /// # Errors
    /// `UnknownPair` if the pair is not configured.
    pub fn engine(&self, pair: &TradingPair) -> Result<&Arc<PairEngine>> {
        self.pairs
            .get(pair)
            .ok_or_else(|| PhantomError::UnknownPair(pair.clone()))
    }

    pub fn pairs(&self) -> impl Iterator<Item = &TradingPair> {
        self.pairs.keys()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Mutex<ExecutorRegistry>> {
        &self.registry
    }

    /// Key every round seed verifies against.
    #[must_use]
    pub fn vrf_public_key(&self) -> VrfPublicKey {
        self.vrf_public_key
    }
}

impl std::fmt::Debug for DarkPoolCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DarkPoolCoordinator")
            .field("pairs", &self.pairs.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
