//! Whole rounds through the coordinator: admission, sealed matching,
//! threshold reveal and settlement, against honest and failing committees.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use phantom_crypto::{Ciphertext, VrfKeypair};
use phantom_engine::{DarkPoolCoordinator, LocalCommittee, ManualScheduler, PairEngine};
use phantom_finality::transport::faulty::SilentExecutor;
use phantom_finality::{
    ChannelSink, ComparisonShareRequest, ComparisonShareResponse, ExecutorTransport,
    LocalExecutor, SettlementSink, ShareRequest, ShareResponse,
};
use phantom_ingress::{InMemoryBalanceSource, RoundSealer};
use phantom_types::fixtures::{OrderFixture, TraderFixture};
use phantom_types::{
    EngineConfig, ExecutorId, MatchingRound, OrderId, PairConfig, PhantomError, Result,
    RoundStatus, SettlementInstruction, Side, ThresholdStatus, TradingPair,
};
use rand::rngs::OsRng;
use tokio::sync::mpsc::UnboundedReceiver;

const BUYS: [(u64, u64); 3] = [(5, 100), (3, 101), (2, 99)];
const SELLS: [(u64, u64); 2] = [(4, 100), (6, 98)];

fn eth() -> TradingPair {
    TradingPair::new("ETH", "USDC")
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.encoding.range_bits = 12;
    config.min_round_interval = Duration::ZERO;
    config.threshold.share_timeout = Duration::from_millis(300);
    config
}

fn honest(executor: LocalExecutor) -> Arc<dyn ExecutorTransport> {
    Arc::new(executor)
}

/// Fails at the transport layer while `online` is false.
struct Gated {
    inner: LocalExecutor,
    online: Arc<AtomicBool>,
}

#[async_trait]
impl ExecutorTransport for Gated {
    fn executor(&self) -> ExecutorId {
        self.inner.executor()
    }

    async fn request_share(&self, request: ShareRequest) -> Result<ShareResponse> {
        self.check_link()?;
        Ok(self.inner.respond(&request))
    }

    async fn request_comparison_share(
        &self,
        request: ComparisonShareRequest,
    ) -> Result<ComparisonShareResponse> {
        self.check_link()?;
        self.inner.respond_comparison(&request)
    }
}

impl Gated {
    fn check_link(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PhantomError::Transport {
                executor: self.inner.executor(),
                reason: "link down".into(),
            })
        }
    }
}

/// Answers comparisons, never answers reveal requests.
struct SilentOnReveal(LocalExecutor);

#[async_trait]
impl ExecutorTransport for SilentOnReveal {
    fn executor(&self) -> ExecutorId {
        self.0.executor()
    }

    async fn request_share(&self, _request: ShareRequest) -> Result<ShareResponse> {
        std::future::pending::<()>().await;
        Err(PhantomError::Internal("unreachable".into()))
    }

    async fn request_comparison_share(
        &self,
        request: ComparisonShareRequest,
    ) -> Result<ComparisonShareResponse> {
        self.0.respond_comparison(&request)
    }
}

/// A channel sink that refuses its first `failures` instructions.
struct FlakySink {
    inner: ChannelSink,
    failures: AtomicUsize,
}

#[async_trait]
impl SettlementSink for FlakySink {
    async fn settle(&self, instruction: SettlementInstruction) -> Result<()> {
        let refuse = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(PhantomError::SettlementFailed {
                reason: "ledger unavailable".into(),
            });
        }
        self.inner.settle(instruction).await
    }
}

struct Harness {
    coordinator: DarkPoolCoordinator,
    committee: LocalCommittee,
    balances: Arc<InMemoryBalanceSource>,
    settlements: UnboundedReceiver<SettlementInstruction>,
    config: EngineConfig,
    /// Plaintext `(amount, price)` of every admitted order.
    book: HashMap<OrderId, (u64, u64)>,
}

impl Harness {
    fn new() -> Self {
        Self::with(test_config(), honest)
    }

    fn with<F>(config: EngineConfig, connect: F) -> Self
    where
        F: FnMut(LocalExecutor) -> Arc<dyn ExecutorTransport>,
    {
        Self::build(config, connect, VrfKeypair::generate(&mut OsRng), 0)
    }

    /// `sink_failures` settlement instructions are refused before the sink
    /// starts accepting.
    fn build<F>(config: EngineConfig, connect: F, vrf: VrfKeypair, sink_failures: usize) -> Self
    where
        F: FnMut(LocalExecutor) -> Arc<dyn ExecutorTransport>,
    {
        let now = Utc::now();
        let committee = LocalCommittee::generate_with(&config, now, connect).unwrap();
        let (inner, settlements) = ChannelSink::new();
        let sink = FlakySink {
            inner,
            failures: AtomicUsize::new(sink_failures),
        };
        let balances = Arc::new(InMemoryBalanceSource::new());
        let coordinator = DarkPoolCoordinator::new(
            config.clone(),
            &committee.key,
            Arc::clone(&committee.registry),
            committee.services(Arc::new(sink), balances.clone()),
            vrf,
            now,
        )
        .unwrap();
        Self {
            coordinator,
            committee,
            balances,
            settlements,
            config,
            book: HashMap::new(),
        }
    }

    fn engine(&self, pair: &TradingPair) -> &Arc<PairEngine> {
        self.coordinator.engine(pair).unwrap()
    }

    fn submit_on(&mut self, pair: &TradingPair, side: Side, amount: u64, price: u64) -> Result<OrderId> {
        let trader = TraderFixture::new(amount * 4);
        self.balances.set(trader.id(), trader.balance_commitment());
        let order = match side {
            Side::Buy => OrderFixture::buy(amount, price, 1),
            Side::Sell => OrderFixture::sell(amount, price, 1),
        }
        .for_pair(pair.clone());
        let submission = trader
            .submit(
                &order,
                &self.committee.key.public_key(),
                &self.config.encoding.domain().unwrap(),
            )
            .unwrap();
        let receipt = self.coordinator.submit_order(submission, Utc::now())?;
        self.book.insert(receipt.order_id, (amount, price));
        Ok(receipt.order_id)
    }

    fn submit(&mut self, side: Side, amount: u64, price: u64) -> Result<OrderId> {
        self.submit_on(&eth(), side, amount, price)
    }

    fn submit_reference_book(&mut self, pair: &TradingPair) -> Vec<OrderId> {
        let mut ids = Vec::new();
        for (amount, price) in BUYS {
            ids.push(self.submit_on(pair, Side::Buy, amount, price).unwrap());
        }
        for (amount, price) in SELLS {
            ids.push(self.submit_on(pair, Side::Sell, amount, price).unwrap());
        }
        ids
    }

    /// The reference book with each side submitted in id order.
    async fn submit_reference_book_in_id_order(&mut self, pair: &TradingPair) {
        for (side, book) in [(Side::Buy, &BUYS[..]), (Side::Sell, &SELLS[..])] {
            for &(amount, price) in book {
                // Order ids are UUIDv7: a new millisecond sorts after the last.
                tokio::time::sleep(Duration::from_millis(2)).await;
                self.submit_on(pair, side, amount, price).unwrap();
            }
        }
    }

    /// The pairing walk over the round's shuffled order, on plaintexts.
    /// Only valid while every order in the round is still unfilled.
    fn expected_walk(&self, round: &MatchingRound) -> (u64, Option<u64>) {
        let buys: Vec<(u64, u64)> = round.shuffled_buy_ids.iter().map(|id| self.book[id]).collect();
        let sells: Vec<(u64, u64)> = round.shuffled_sell_ids.iter().map(|id| self.book[id]).collect();
        plaintext_walk(&buys, &sells)
    }

    fn pooled(&self, pair: &TradingPair) -> HashSet<OrderId> {
        let pool = self.engine(pair).pool();
        pool.order_ids(Side::Buy)
            .into_iter()
            .chain(pool.order_ids(Side::Sell))
            .collect()
    }
}

/// A VRF key whose round-1 seed for ETH/USDC shuffles id-sorted sides into
/// exactly `buys` and `sells`.
fn key_shuffling_to(buys: &[usize], sells: &[usize]) -> VrfKeypair {
    let alpha = RoundSealer::round_input(&eth(), 1, &[0u8; 32]);
    loop {
        let vrf = VrfKeypair::generate(&mut OsRng);
        let (output, _) = vrf.evaluate(&alpha);
        if RoundSealer::side_permutation(&output, Side::Buy, buys.len()) == buys
            && RoundSealer::side_permutation(&output, Side::Sell, sells.len()) == sells
        {
            return vrf;
        }
    }
}

/// Returns `(volume, marginal price sum)`.
fn plaintext_walk(buys: &[(u64, u64)], sells: &[(u64, u64)]) -> (u64, Option<u64>) {
    let mut buys = buys.to_vec();
    let mut sells = sells.to_vec();
    let (mut i, mut j, mut volume, mut clearing) = (0, 0, 0, None);
    while i < buys.len() && j < sells.len() {
        if buys[i].1 < sells[j].1 {
            i += 1;
            continue;
        }
        let fill = buys[i].0.min(sells[j].0);
        volume += fill;
        clearing = Some(buys[i].1 + sells[j].1);
        buys[i].0 -= fill;
        sells[j].0 -= fill;
        if buys[i].0 == 0 {
            i += 1;
        }
        if sells[j].0 == 0 {
            j += 1;
        }
    }
    (volume, clearing)
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overstated_balance_is_rejected_at_admission() {
    let h = Harness::new();
    let trader = TraderFixture::new(2);
    h.balances.set(trader.id(), trader.balance_commitment());
    let submission = trader
        .submit(
            &OrderFixture::buy(9, 100, 1).claiming_balance(50),
            &h.committee.key.public_key(),
            &h.config.encoding.domain().unwrap(),
        )
        .unwrap();

    let err = h.coordinator.submit_order(submission, Utc::now()).unwrap_err();
    assert!(matches!(err, PhantomError::InvalidProof { .. }));
    assert!(err.is_security_event());
    assert_eq!(h.engine(&eth()).pool().len(), (0, 0));
    assert_eq!(h.engine(&eth()).pool().stats().total_rejected, 1);
}

#[tokio::test]
async fn unknown_pair_is_rejected_everywhere() {
    let mut h = Harness::new();
    let doge = TradingPair::new("DOGE", "USDC");
    assert!(matches!(
        h.coordinator.run_round(&doge, Utc::now()).await,
        Err(PhantomError::UnknownPair(_))
    ));
    assert!(matches!(h.coordinator.pause(&doge), Err(PhantomError::UnknownPair(_))));
    assert!(matches!(
        h.submit_on(&doge, Side::Buy, 5, 100),
        Err(PhantomError::UnknownPair(_))
    ));
}

#[tokio::test]
async fn committee_must_match_threshold_config() {
    let mut small = test_config();
    small.threshold.required_shares = 2;
    small.threshold.total_shares = 3;
    let committee = LocalCommittee::generate(&small, Utc::now()).unwrap();
    let (sink, _rx) = ChannelSink::new();

    let err = DarkPoolCoordinator::new(
        test_config(),
        &committee.key,
        Arc::clone(&committee.registry),
        committee.services(Arc::new(sink), Arc::new(InMemoryBalanceSource::new())),
        VrfKeypair::generate(&mut OsRng),
        Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(err, PhantomError::Configuration(_)));
}

#[tokio::test]
async fn cancelled_order_never_reaches_a_round() {
    let h = Harness::new();
    let trader = TraderFixture::new(40);
    h.balances.set(trader.id(), trader.balance_commitment());
    let submission = trader
        .submit(
            &OrderFixture::sell(5, 100, 1),
            &h.committee.key.public_key(),
            &h.config.encoding.domain().unwrap(),
        )
        .unwrap();
    let receipt = h.coordinator.submit_order(submission, Utc::now()).unwrap();

    let stranger = TraderFixture::new(40).id();
    assert!(matches!(
        h.coordinator.cancel_order(&eth(), &receipt.order_id, &stranger),
        Err(PhantomError::NotOrderOwner(_))
    ));
    let cancelled = h
        .coordinator
        .cancel_order(&eth(), &receipt.order_id, &trader.id())
        .unwrap();
    assert_eq!(cancelled.id, receipt.order_id);

    let report = h.coordinator.run_round(&eth(), Utc::now()).await.unwrap();
    assert!(report.round.shuffled_order_ids().next().is_none());
    assert!(matches!(
        h.coordinator.cancel_order(&eth(), &receipt.order_id, &trader.id()),
        Err(PhantomError::OrderNotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Completed rounds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reference_book_reveals_the_walk_and_settles() {
    let mut h = Harness::new();
    h.submit_reference_book(&eth());

    let report = h.coordinator.run_round(&eth(), Utc::now()).await.unwrap();
    assert!(report.is_completed());
    assert_eq!(report.round.round_number, 1);
    assert_eq!(report.operations.len(), 1);
    assert_eq!(report.operations[0].status, ThresholdStatus::Completed);

    // The buy at 101 crosses every sell, so something always matches.
    let (volume, price_sum) = h.expected_walk(&report.round);
    assert!(volume > 0);
    assert_eq!(report.round.matched_volume(), Some(volume));
    assert_eq!(report.round.clearing_price(), price_sum.map(|sum| sum / 2));

    // Anyone holding the VRF key can check the seed.
    let alpha = RoundSealer::round_input(&eth(), 1, &[0u8; 32]);
    h.coordinator
        .vrf_public_key()
        .verify_output(&alpha, &report.round.vrf_output, &report.round.vrf_proof)
        .unwrap();

    assert!(report.settled);
    let ix = h.settlements.try_recv().unwrap();
    assert_eq!(ix.matching_round_id, report.round.id);
    assert_eq!(ix.matched_volume, volume);
    assert_eq!(ix.matching_proof, report.round.matching_proof);
    assert!(h.settlements.try_recv().is_err());

    // At least one order was exhausted by the first fill.
    let (buys, sells) = h.engine(&eth()).pool().len();
    assert!(buys + sells < BUYS.len() + SELLS.len());
    assert_eq!(h.engine(&eth()).pool().prior_output(), report.round.matching_proof);
    assert_eq!(h.engine(&eth()).pool().stats().total_matched_volume, volume);
}

#[tokio::test]
async fn favourable_shuffle_matches_nine_at_one_hundred() {
    // Buys 5@100, 2@99, 3@101 against sells 6@98, 4@100.
    let vrf = key_shuffling_to(&[0, 2, 1], &[1, 0]);
    let mut h = Harness::build(test_config(), honest, vrf, 0);
    h.submit_reference_book_in_id_order(&eth()).await;

    let report = h.coordinator.run_round(&eth(), Utc::now()).await.unwrap();
    let buys: Vec<(u64, u64)> = report.round.shuffled_buy_ids.iter().map(|id| h.book[id]).collect();
    let sells: Vec<(u64, u64)> = report.round.shuffled_sell_ids.iter().map(|id| h.book[id]).collect();
    assert_eq!(buys, vec![(5, 100), (2, 99), (3, 101)]);
    assert_eq!(sells, vec![(6, 98), (4, 100)]);

    assert!(report.is_completed());
    assert_eq!(report.round.matched_volume(), Some(9));
    assert_eq!(report.round.clearing_price(), Some(100));
    assert_eq!(h.settlements.try_recv().unwrap().matched_volume, 9);
    // 2@99 and 4@100 each keep one lot.
    assert_eq!(h.engine(&eth()).pool().len(), (1, 1));
}

#[tokio::test]
async fn zero_crossing_round_opens_no_operation() {
    let mut h = Harness::new();
    let buy = h.submit(Side::Buy, 5, 90).unwrap();
    let sell = h.submit(Side::Sell, 5, 100).unwrap();

    let report = h.coordinator.run_round(&eth(), Utc::now()).await.unwrap();
    assert!(report.is_completed());
    assert!(report.operations.is_empty());
    assert!(!report.settled);
    assert_eq!(report.round.matched_volume(), Some(0));
    assert!(h.settlements.try_recv().is_err());
    assert_eq!(h.pooled(&eth()), HashSet::from([buy, sell]));
}

#[tokio::test]
async fn no_order_matches_twice() {
    let mut h = Harness::new();
    let first_ids: HashSet<OrderId> = h.submit_reference_book(&eth()).into_iter().collect();
    let t0 = Utc::now();
    let first = h.coordinator.run_round(&eth(), t0).await.unwrap();
    assert!(first.is_completed());

    let survivors = h.pooled(&eth());
    let consumed: HashSet<OrderId> = first_ids.difference(&survivors).copied().collect();
    assert!(!consumed.is_empty());

    h.submit(Side::Buy, 4, 102).unwrap();
    h.submit(Side::Sell, 3, 97).unwrap();
    let second = h
        .coordinator
        .run_round(&eth(), t0 + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert!(second.is_completed());
    assert_eq!(second.round.round_number, 2);

    let in_second: HashSet<OrderId> = second.round.shuffled_order_ids().copied().collect();
    assert!(in_second.is_disjoint(&consumed));
    assert!(survivors.is_subset(&in_second));
    assert_ne!(second.round.vrf_output, first.round.vrf_output);
}

#[tokio::test]
async fn manual_scheduler_drives_every_pair() {
    let btc = TradingPair::new("BTC", "USDC");
    let mut config = test_config();
    config.pairs.push(PairConfig {
        base: "BTC".into(),
        quote: "USDC".into(),
        ..PairConfig::eth_usdc()
    });
    let mut h = Harness::with(config, honest);
    h.submit_reference_book(&eth());
    h.submit_on(&btc, Side::Buy, 7, 300).unwrap();
    h.submit_on(&btc, Side::Sell, 7, 290).unwrap();

    let (scheduler, trigger) = ManualScheduler::new();
    assert!(trigger.fire(Utc::now()));
    drop(trigger);
    h.coordinator.drive(scheduler).await;

    for pair in [&eth(), &btc] {
        let last = h.engine(pair).last_round().unwrap();
        assert!(last.is_completed(), "{pair}");
        assert!(last.settled, "{pair}");
    }
    let btc_round = h.engine(&btc).last_round().unwrap();
    assert_eq!(btc_round.round.matched_volume(), Some(7));
    assert_eq!(btc_round.round.clearing_price(), Some(295));

    let mut settled = HashSet::new();
    while let Ok(ix) = h.settlements.try_recv() {
        settled.insert(ix.trading_pair);
    }
    assert_eq!(settled, HashSet::from([eth(), btc]));
}

#[tokio::test]
async fn paused_pair_skips_rounds_and_admission() {
    let mut h = Harness::new();
    h.coordinator.pause(&eth()).unwrap();
    assert!(h.engine(&eth()).pool().is_paused());

    assert!(matches!(
        h.submit(Side::Buy, 5, 100),
        Err(PhantomError::PoolPaused(_))
    ));
    assert!(matches!(
        h.coordinator.run_round(&eth(), Utc::now()).await,
        Err(PhantomError::PoolPaused(_))
    ));
    assert!(h.engine(&eth()).history().is_empty());

    h.coordinator.resume(&eth()).unwrap();
    h.submit(Side::Buy, 5, 100).unwrap();
    let report = h.coordinator.run_round(&eth(), Utc::now()).await.unwrap();
    assert!(report.is_completed());
}

// ---------------------------------------------------------------------------
// Failed rounds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_majority_fails_round_and_restores_orders() {
    let mut h = Harness::with(test_config(), |executor| {
        if executor.executor().0 >= 3 {
            Arc::new(SilentOnReveal(executor)) as Arc<dyn ExecutorTransport>
        } else {
            Arc::new(executor)
        }
    });
    let ids: HashSet<OrderId> = h.submit_reference_book(&eth()).into_iter().collect();

    let report = h.coordinator.run_round(&eth(), Utc::now()).await.unwrap();
    assert_eq!(report.round.status, RoundStatus::Failed);
    assert!(report.round.revealed.is_none());
    assert!(report
        .round
        .failure_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("DP_ERR_500")));
    assert_eq!(report.operations.len(), 1);
    assert_eq!(report.operations[0].status, ThresholdStatus::Failed);
    assert_eq!(report.operations[0].shares_received.len(), 2);
    assert!(!report.settled);
    assert!(h.settlements.try_recv().is_err());

    {
        let registry = h.committee.registry.lock();
        for i in 3..=5 {
            assert_eq!(registry.get(ExecutorId(i)).unwrap().reputation_score, 98);
        }
        assert_eq!(registry.get(ExecutorId(1)).unwrap().reputation_score, 100);
    }

    // The next round sees the same orders, untouched.
    assert_eq!(h.pooled(&eth()), ids);
    assert_eq!(h.engine(&eth()).pool().stats().failed_rounds, 1);
    let snapshot = h
        .engine(&eth())
        .pool()
        .snapshot_for_round(&RoundSealer::new(VrfKeypair::generate(&mut OsRng)), Utc::now())
        .unwrap();
    assert_eq!(snapshot.round_number, 2);
    for order in snapshot.buys.iter().chain(&snapshot.sells) {
        assert!(order.is_pending());
        assert_eq!(order.remaining_amount, order.encrypted_amount);
        assert_eq!(order.filled_amount, Ciphertext::zero());
    }
}

#[tokio::test]
async fn silent_majority_during_matching_fails_round() {
    let mut h = Harness::with(test_config(), |executor| {
        if executor.executor().0 >= 3 {
            Arc::new(SilentExecutor(executor.executor())) as Arc<dyn ExecutorTransport>
        } else {
            Arc::new(executor)
        }
    });
    let ids: HashSet<OrderId> = h.submit_reference_book(&eth()).into_iter().collect();

    let report = h.coordinator.run_round(&eth(), Utc::now()).await.unwrap();
    assert_eq!(report.round.status, RoundStatus::Failed);
    assert!(report
        .round
        .failure_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("DP_ERR_507")));
    // Matching never finished, so nothing was opened for reveal.
    assert!(report.operations.is_empty());
    assert!(report.round.steps.is_empty());
    assert!(!report.settled);

    {
        let registry = h.committee.registry.lock();
        for i in 3..=5 {
            assert_eq!(registry.get(ExecutorId(i)).unwrap().reputation_score, 98);
        }
        assert_eq!(registry.get(ExecutorId(2)).unwrap().reputation_score, 100);
    }
    assert_eq!(h.pooled(&eth()), ids);
    assert_eq!(h.engine(&eth()).pool().stats().failed_rounds, 1);
}

#[tokio::test]
async fn refused_settlement_is_offered_again_next_round() {
    let mut h = Harness::build(test_config(), honest, VrfKeypair::generate(&mut OsRng), 1);
    h.submit_reference_book(&eth());
    let t0 = Utc::now();

    let first = h.coordinator.run_round(&eth(), t0).await.unwrap();
    assert!(first.is_completed());
    assert!(!first.settled);
    assert!(h.settlements.try_recv().is_err());
    assert_eq!(h.engine(&eth()).unsettled(), vec![first.round.id]);

    let second = h
        .coordinator
        .run_round(&eth(), t0 + chrono::Duration::seconds(1))
        .await
        .unwrap();
    let ix = h.settlements.try_recv().unwrap();
    assert_eq!(ix.matching_round_id, first.round.id);
    assert_eq!(ix.matched_volume, first.round.matched_volume().unwrap());
    assert!(h.engine(&eth()).unsettled().is_empty());
    assert!(h.engine(&eth()).history()[0].settled);

    if second.settled {
        assert_eq!(h.settlements.try_recv().unwrap().matching_round_id, second.round.id);
    }
    assert!(h.settlements.try_recv().is_err());
}

#[tokio::test]
async fn failed_round_is_retried_with_fresh_seed() {
    let online = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&online);
    let mut h = Harness::with(test_config(), move |executor| {
        if executor.executor().0 == 1 {
            Arc::new(executor) as Arc<dyn ExecutorTransport>
        } else {
            Arc::new(Gated {
                inner: executor,
                online: Arc::clone(&gate),
            })
        }
    });
    h.submit_reference_book(&eth());
    let t0 = Utc::now();

    let failed = h.coordinator.run_round(&eth(), t0).await.unwrap();
    assert_eq!(failed.round.status, RoundStatus::Failed);

    online.store(true, Ordering::SeqCst);
    let retried = h
        .coordinator
        .run_round(&eth(), t0 + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert!(retried.is_completed());
    assert_eq!(retried.round.round_number, 2);
    assert_ne!(retried.round.vrf_output, failed.round.vrf_output);

    // Restored orders still carry their original amounts.
    let (volume, _) = h.expected_walk(&retried.round);
    assert_eq!(retried.round.matched_volume(), Some(volume));
    assert!(retried.settled);
    assert_eq!(h.settlements.try_recv().unwrap().round_number, 2);

    let history = h.engine(&eth()).history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].round.status, RoundStatus::Failed);
}
