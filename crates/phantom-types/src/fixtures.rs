//! Test fixtures: traders that build fully proved, signed submissions.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey};
use phantom_crypto::{
    BoundedValueProof, Commitment, EncodingDomain, Opening, PublicKey, SolvencyContext,
    SolvencyProof,
};
use rand::rngs::OsRng;

use crate::{EncryptedOrder, OrderSubmission, Result, Side, TraderId, TradingPair};

/// A trader with a signing key and a committed balance.
pub struct TraderFixture {
    signing: SigningKey,
    balance: Opening,
}

impl TraderFixture {
    #[must_use]
    pub fn new(balance: u64) -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            balance: Opening::random(balance, &mut OsRng),
        }
    }

    #[must_use]
    pub fn id(&self) -> TraderId {
        TraderId(self.signing.verifying_key().to_bytes())
    }

    /// What the balance source should report for this trader.
    #[must_use]
    pub fn balance_commitment(&self) -> Commitment {
        self.balance.commitment()
    }

    pub fn submit(
        &self,
        order: &OrderFixture,
        pk: &PublicKey,
        domain: &EncodingDomain,
    ) -> Result<OrderSubmission> {
        let trader = self.id();
        let (encrypted_amount, amount_witness) =
            pk.encrypt_with_witness(order.amount, domain, &mut OsRng)?;
        let (encrypted_price, price_witness) =
            pk.encrypt_with_witness(order.price, domain, &mut OsRng)?;

        let price_proof = BoundedValueProof::prove(
            &OrderSubmission::price_proof_context(&trader, order.nonce),
            pk,
            &encrypted_price,
            &price_witness,
            1,
            domain.max_value(),
            &mut OsRng,
        )?;

        let balance = match order.claimed_balance {
            Some(claimed) => Opening::random(claimed, &mut OsRng),
            None => self.balance.clone(),
        };
        let ctx = SolvencyContext {
            public_key: *pk,
            trader: trader.0,
            nonce: order.nonce,
        };
        let solvency_proof = SolvencyProof::prove(
            &ctx,
            &encrypted_amount,
            &amount_witness,
            &balance,
            domain,
            &mut OsRng,
        )?;

        let mut submission = OrderSubmission {
            trading_pair: order.pair.clone(),
            side: order.side,
            trader,
            encrypted_amount,
            encrypted_price,
            price_proof,
            solvency_proof,
            signature_proof: Signature::from_bytes(&[0u8; 64]),
            nonce: order.nonce,
            expiry_time: order.expiry,
        };
        submission.signature_proof = self.signing.sign(&submission.signing_digest());
        Ok(submission)
    }
}

/// Plaintext description of an order to build.
#[derive(Debug, Clone)]
pub struct OrderFixture {
    pub pair: TradingPair,
    pub side: Side,
    pub amount: u64,
    pub price: u64,
    pub nonce: u64,
    pub expiry: DateTime<Utc>,
    /// Prove solvency against this balance instead of the trader's real one.
    pub claimed_balance: Option<u64>,
}

impl OrderFixture {
    #[must_use]
    pub fn buy(amount: u64, price: u64, nonce: u64) -> Self {
        Self::new(Side::Buy, amount, price, nonce)
    }

    #[must_use]
    pub fn sell(amount: u64, price: u64, nonce: u64) -> Self {
        Self::new(Side::Sell, amount, price, nonce)
    }

    fn new(side: Side, amount: u64, price: u64, nonce: u64) -> Self {
        Self {
            pair: TradingPair::new("ETH", "USDC"),
            side,
            amount,
            price,
            nonce,
            expiry: Utc::now() + Duration::hours(1),
            claimed_balance: None,
        }
    }

    #[must_use]
    pub fn for_pair(mut self, pair: TradingPair) -> Self {
        self.pair = pair;
        self
    }

    #[must_use]
    pub fn expiring_at(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = expiry;
        self
    }

    #[must_use]
    pub fn claiming_balance(mut self, balance: u64) -> Self {
        self.claimed_balance = Some(balance);
        self
    }
}

impl EncryptedOrder {
    /// A fully proved order under a throwaway committee key, for tests that
    /// only move orders around and never decrypt them.
    #[must_use]
    pub fn dummy(side: Side, amount: u64, price: u64) -> Self {
        let keys = phantom_crypto::KeyPair::generate(&mut OsRng);
        let domain = EncodingDomain::new(12).expect("12-bit domain is supported");
        let trader = TraderFixture::new(amount.max(1) * 4);
        let order = OrderFixture::new(side, amount, price, 1);
        let submission = trader
            .submit(&order, &keys.public(), &domain)
            .expect("fixture order is provable");
        Self::from_submission(submission, Utc::now())
    }
}
