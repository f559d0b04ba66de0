//! End-to-end matching over encrypted books, checked against a plaintext
//! model of the same walk.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use phantom_crypto::{
    Ciphertext, CommitteeKey, ComparisonMask, DecryptionTable, EncodingDomain, KeyShare,
    ThresholdParams, VrfKeypair, combine_and_decode, run_dkg,
};
use phantom_matchcore::{
    ComparisonVerifier, ProofBackend, check_conservation, match_sealed_round, replay_round,
};
use phantom_types::fixtures::{OrderFixture, TraderFixture};
use phantom_types::{ComparisonAttestation, EncryptedOrder, Result, SealedRound, TradingPair};
use rand::rngs::OsRng;

struct TestCommittee {
    key: CommitteeKey,
    shares: Vec<Arc<KeyShare>>,
    domain: EncodingDomain,
    table: Arc<DecryptionTable>,
}

impl TestCommittee {
    fn generate(t: u32, n: u32) -> Self {
        let (key, shares) = run_dkg(ThresholdParams::new(t, n).unwrap(), &mut OsRng).unwrap();
        let domain = EncodingDomain::new(12).unwrap();
        Self {
            key,
            shares: shares.into_iter().map(Arc::new).collect(),
            domain,
            table: Arc::new(DecryptionTable::new(domain.widened(4).unwrap())),
        }
    }

    fn backend(&self) -> ShareHolder<'_> {
        ShareHolder {
            committee: self,
            verifier: self.verifier(),
        }
    }

    fn verifier(&self) -> ComparisonVerifier {
        ComparisonVerifier::new(self.key.clone(), self.domain)
    }

    fn order(&self, fixture: &OrderFixture) -> EncryptedOrder {
        let trader = TraderFixture::new(fixture.amount * 4);
        let sub = trader
            .submit(fixture, &self.key.public_key(), &self.domain)
            .unwrap();
        EncryptedOrder::from_submission(sub, Utc::now())
    }

    fn decrypt(&self, ct: &Ciphertext) -> u64 {
        let t = self.key.params().threshold();
        let partials: Vec<_> = self.shares[1..=t as usize]
            .iter()
            .map(|s| s.partial_decrypt(ct, b"scenario", &mut OsRng))
            .collect();
        combine_and_decode(ct, &partials, t, &self.table).unwrap()
    }

    fn sealed_in_order(&self, buys: &[(u64, u64)], sells: &[(u64, u64)]) -> SealedRound {
        let (vrf_output, vrf_proof) = VrfKeypair::generate(&mut OsRng).evaluate(b"scenario");
        SealedRound {
            trading_pair: TradingPair::new("ETH", "USDC"),
            round_number: 1,
            vrf_output,
            vrf_proof,
            buys: buys
                .iter()
                .map(|&(a, p)| self.order(&OrderFixture::buy(a, p, 1)))
                .collect(),
            sells: sells
                .iter()
                .map(|&(a, p)| self.order(&OrderFixture::sell(a, p, 1)))
                .collect(),
            input_hash: [7; 32],
            sealed_at: Utc::now(),
        }
    }
}

/// Answers comparisons with the last `t` shares of the committee.
struct ShareHolder<'a> {
    committee: &'a TestCommittee,
    verifier: ComparisonVerifier,
}

#[async_trait]
impl ProofBackend for ShareHolder<'_> {
    async fn compare(
        &self,
        context: &[u8],
        left: &Ciphertext,
        right: &Ciphertext,
    ) -> Result<ComparisonAttestation> {
        let difference = *left - *right;
        let mask = ComparisonMask::random(&mut OsRng);
        let masked = mask.apply(&self.committee.key.public_key(), &difference);
        let t = self.committee.key.params().threshold() as usize;
        let partials = self.committee.shares[self.committee.shares.len() - t..]
            .iter()
            .map(|s| s.partial_decrypt(&masked, context, &mut OsRng))
            .collect();
        self.verifier
            .attest(context, &difference, &mask, partials, &self.committee.table)
    }

    fn verifier(&self) -> &ComparisonVerifier {
        &self.verifier
    }
}

/// The pairing walk on plaintexts. Returns (volume, marginal price sum).
fn plaintext_walk(buys: &[(u64, u64)], sells: &[(u64, u64)]) -> (u64, Option<u64>) {
    let mut buys: Vec<(u64, u64)> = buys.to_vec();
    let mut sells: Vec<(u64, u64)> = sells.to_vec();
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

async fn check_book(c: &TestCommittee, buys: &[(u64, u64)], sells: &[(u64, u64)]) {
    let sealed = c.sealed_in_order(buys, sells);
    let backend = c.backend();
    let outcome = match_sealed_round(&sealed, &backend, Utc::now())
        .await
        .unwrap();

    check_conservation(&sealed, &outcome).unwrap();
    replay_round(&sealed, &outcome.round, &c.verifier()).unwrap();
    replay_round(&sealed, &outcome.round, backend.verifier()).unwrap();

    let (volume, clearing) = plaintext_walk(buys, sells);
    assert_eq!(
        c.decrypt(&outcome.round.matched_volume_ciphertext),
        volume,
        "book {buys:?} / {sells:?}"
    );
    assert_eq!(
        outcome.round.clearing_price_ciphertext.map(|ct| c.decrypt(&ct)),
        clearing
    );

    // Buy-side and sell-side fills agree order by order with the walk.
    let bought: u64 = outcome.orders[..buys.len()]
        .iter()
        .map(|o| c.decrypt(&o.filled_amount))
        .sum();
    let sold: u64 = outcome.orders[buys.len()..]
        .iter()
        .map(|o| c.decrypt(&o.filled_amount))
        .sum();
    assert_eq!(bought, volume);
    assert_eq!(sold, volume);
}

#[tokio::test]
async fn reference_book_in_every_buy_order() {
    let c = TestCommittee::generate(3, 5);
    let sells = [(4, 100), (6, 98)];
    for buys in [
        [(5, 100), (3, 101), (2, 99)],
        [(2, 99), (5, 100), (3, 101)],
        [(3, 101), (2, 99), (5, 100)],
        [(5, 100), (2, 99), (3, 101)],
    ] {
        check_book(&c, &buys, &sells).await;
        let mut reversed = sells;
        reversed.reverse();
        check_book(&c, &buys, &reversed).await;
    }
}

#[tokio::test]
async fn reference_book_in_favourable_order_matches_nine() {
    let c = TestCommittee::generate(3, 5);
    let buys = [(5, 100), (2, 99), (3, 101)];
    let sells = [(6, 98), (4, 100)];
    assert_eq!(plaintext_walk(&buys, &sells), (9, Some(201)));
    check_book(&c, &buys, &sells).await;
}

#[tokio::test]
async fn many_small_orders_against_one_large() {
    let c = TestCommittee::generate(2, 3);
    let buys: Vec<(u64, u64)> = (1..=6).map(|k| (k, 200 + k)).collect();
    check_book(&c, &buys, &[(30, 150)]).await;
}

#[tokio::test]
async fn extreme_prices_stay_in_table_range() {
    let c = TestCommittee::generate(2, 3);
    let max = c.domain.max_value();
    check_book(&c, &[(1, max), (7, 1)], &[(3, 1), (2, max)]).await;
}
