//! Test fixtures: an in-process committee with orders under its key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use phantom_crypto::{
    Ciphertext, CommitteeKey, ComparisonMask, DecryptionTable, EncodingDomain, KeyShare,
    ThresholdParams, VrfKeypair, combine_and_decode, run_dkg,
};
use phantom_types::fixtures::{OrderFixture, TraderFixture};
use phantom_types::{ComparisonAttestation, EncryptedOrder, Result, SealedRound, Side, TradingPair};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::{ComparisonVerifier, ProofBackend};

/// Answers comparisons with key shares held in this process.
///
/// Tests only: a prover holding `t` shares can decrypt anything.
pub struct CoLocatedProofBackend {
    verifier: ComparisonVerifier,
    shares: Vec<Arc<KeyShare>>,
    table: Arc<DecryptionTable>,
}

impl CoLocatedProofBackend {
    #[must_use]
    pub fn new(
        verifier: ComparisonVerifier,
        shares: Vec<Arc<KeyShare>>,
        table: Arc<DecryptionTable>,
    ) -> Self {
        Self {
            verifier,
            shares,
            table,
        }
    }
}

#[async_trait]
impl ProofBackend for CoLocatedProofBackend {
    async fn compare(
        &self,
        context: &[u8],
        left: &Ciphertext,
        right: &Ciphertext,
    ) -> Result<ComparisonAttestation> {
        let difference = *left - *right;
        let mask = ComparisonMask::random(&mut OsRng);
        let masked = mask.apply(&self.verifier.committee().public_key(), &difference);
        let t = self.verifier.committee().params().threshold() as usize;
        let partials = self
            .shares
            .iter()
            .take(t)
            .map(|s| s.partial_decrypt(&masked, context, &mut OsRng))
            .collect();
        self.verifier
            .attest(context, &difference, &mask, partials, &self.table)
    }

    fn verifier(&self) -> &ComparisonVerifier {
        &self.verifier
    }
}

/// A `t`-of-`n` committee with every share held locally.
///
/// Orders use a 12-bit domain; the table covers 4 bits of headroom above it.
pub struct TestCommittee {
    pub key: CommitteeKey,
    pub shares: Vec<Arc<KeyShare>>,
    pub domain: EncodingDomain,
    pub table: Arc<DecryptionTable>,
}

impl TestCommittee {
    #[must_use]
    pub fn generate(t: u32, n: u32) -> Self {
        let params = ThresholdParams::new(t, n).expect("valid threshold");
        let (key, shares) = run_dkg(params, &mut OsRng).expect("dkg succeeds");
        let domain = EncodingDomain::new(12).expect("12-bit domain");
        let table = DecryptionTable::new(domain.widened(4).expect("16-bit domain"));
        Self {
            key,
            shares: shares.into_iter().map(Arc::new).collect(),
            domain,
            table: Arc::new(table),
        }
    }

    #[must_use]
    pub fn backend(&self) -> CoLocatedProofBackend {
        CoLocatedProofBackend::new(self.verifier(), self.shares.clone(), self.table.clone())
    }

    /// Public keys only.
    #[must_use]
    pub fn verifier(&self) -> ComparisonVerifier {
        ComparisonVerifier::new(self.key.clone(), self.domain)
    }

    /// An admitted-looking order with known plaintexts.
    #[must_use]
    pub fn order(&self, side: Side, amount: u64, price: u64) -> EncryptedOrder {
        let trader = TraderFixture::new(amount.max(1) * 4);
        let order = match side {
            Side::Buy => OrderFixture::buy(amount, price, 1),
            Side::Sell => OrderFixture::sell(amount, price, 1),
        };
        let submission = trader
            .submit(&order, &self.key.public_key(), &self.domain)
            .expect("fixture order is provable");
        EncryptedOrder::from_submission(submission, Utc::now())
    }

    /// Threshold-decrypt with the first `t` shares.
    #[must_use]
    pub fn decrypt(&self, ct: &Ciphertext) -> u64 {
        let t = self.key.params().threshold();
        let partials: Vec<_> = self
            .shares
            .iter()
            .take(t as usize)
            .map(|s| s.partial_decrypt(ct, b"fixture", &mut OsRng))
            .collect();
        combine_and_decode(ct, &partials, t, &self.table).expect("plaintext in table range")
    }

    /// A sealed ETH/USDC round with sides in exactly the given
    /// `(amount, price)` order, skipping the shuffle.
    #[must_use]
    pub fn sealed_in_order(
        &self,
        round_number: u64,
        buys: &[(u64, u64)],
        sells: &[(u64, u64)],
    ) -> SealedRound {
        let pair = TradingPair::new("ETH", "USDC");
        let (vrf_output, vrf_proof) =
            VrfKeypair::generate(&mut OsRng).evaluate(&round_number.to_le_bytes());
        let buys: Vec<_> = buys.iter().map(|&(a, p)| self.order(Side::Buy, a, p)).collect();
        let sells: Vec<_> = sells.iter().map(|&(a, p)| self.order(Side::Sell, a, p)).collect();

        let mut h = Sha256::new();
        for o in buys.iter().chain(&sells) {
            h.update(o.id.as_bytes());
        }
        SealedRound {
            trading_pair: pair,
            round_number,
            vrf_output,
            vrf_proof,
            buys,
            sells,
            input_hash: h.finalize().into(),
            sealed_at: Utc::now(),
        }
    }
}
