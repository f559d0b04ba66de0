//! Stateless admission checks for one order submission.
//!
//! Every check here is deterministic given its inputs, so a failure is
//! final: the submission is rejected, never queued. Proof and signature
//! failures are logged on the `phantom::security` target.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use phantom_crypto::{EncodingDomain, PublicKey, SolvencyContext};
use phantom_types::{OrderSubmission, PhantomError, Result, TradingPair};

use crate::BalanceCommitmentSource;

/// Verifies submissions against the committee key and the balance source.
#[derive(Clone)]
pub struct AdmissionVerifier {
    public_key: PublicKey,
    domain: EncodingDomain,
    balances: Arc<dyn BalanceCommitmentSource>,
}

impl AdmissionVerifier {
    #[must_use]
    pub fn new(
        public_key: PublicKey,
        domain: EncodingDomain,
        balances: Arc<dyn BalanceCommitmentSource>,
    ) -> Self {
        Self {
            public_key,
            domain,
            balances,
        }
    }

    /// Run every admission check, cheapest first.
    ///
    /// # Errors
    /// - `WrongPair` if the order is addressed to another pair
    /// - `Expired` if `expiry_time` is not in the future
    /// - `InvalidSignature` if the trader's signature does not verify
    /// - `InvalidProof` if the price bound or solvency proof fails
    /// - `UnknownTrader` if there is no balance commitment for the trader
    pub fn verify(
        &self,
        pair: &TradingPair,
        submission: &OrderSubmission,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if submission.trading_pair != *pair {
            return Err(PhantomError::WrongPair {
                expected: pair.clone(),
                actual: submission.trading_pair.clone(),
            });
        }
        if submission.expiry_time <= now {
            return Err(PhantomError::Expired);
        }

        self.verify_signature(submission)
            .and_then(|()| self.verify_price_bound(submission))
            .and_then(|()| self.verify_solvency(submission))
            .inspect_err(|err| {
                if err.is_security_event() {
                    tracing::warn!(
                        target: "phantom::security",
                        trader = %submission.trader,
                        nonce = submission.nonce,
                        pair = %pair,
                        error = %err,
                        "order rejected"
                    );
                }
            })
    }

    fn verify_signature(&self, submission: &OrderSubmission) -> Result<()> {
        let key = VerifyingKey::from_bytes(submission.trader.as_bytes())
            .map_err(|_| PhantomError::InvalidSignature)?;
        key.verify_strict(&submission.signing_digest(), &submission.signature_proof)
            .map_err(|_| PhantomError::InvalidSignature)
    }

    fn verify_price_bound(&self, submission: &OrderSubmission) -> Result<()> {
        let context = OrderSubmission::price_proof_context(&submission.trader, submission.nonce);
        submission.price_proof.verify(
            &context,
            &self.public_key,
            &submission.encrypted_price,
            1,
            self.domain.max_value(),
        )?;
        Ok(())
    }

    fn verify_solvency(&self, submission: &OrderSubmission) -> Result<()> {
        let balance = self
            .balances
            .balance_commitment(&submission.trader)
            .ok_or(PhantomError::UnknownTrader(submission.trader))?;
        let ctx = SolvencyContext {
            public_key: self.public_key,
            trader: submission.trader.0,
            nonce: submission.nonce,
        };
        submission
            .solvency_proof
            .verify(&ctx, &submission.encrypted_amount, &balance, &self.domain)?;
        Ok(())
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    #[must_use]
    pub fn domain(&self) -> EncodingDomain {
        self.domain
    }
}

impl std::fmt::Debug for AdmissionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionVerifier")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use phantom_crypto::{KeyPair, ProofKind};
    use phantom_types::fixtures::{OrderFixture, TraderFixture};
    use rand::rngs::OsRng;

    use super::*;
    use crate::InMemoryBalanceSource;

    struct Setup {
        keys: KeyPair,
        domain: EncodingDomain,
        balances: Arc<InMemoryBalanceSource>,
        verifier: AdmissionVerifier,
        pair: TradingPair,
    }

    fn setup() -> Setup {
        let keys = KeyPair::generate(&mut OsRng);
        let domain = EncodingDomain::new(12).unwrap();
        let balances = Arc::new(InMemoryBalanceSource::new());
        let verifier = AdmissionVerifier::new(keys.public(), domain, balances.clone());
        Setup {
            keys,
            domain,
            balances,
            verifier,
            pair: TradingPair::new("ETH", "USDC"),
        }
    }

    fn funded(s: &Setup, balance: u64) -> TraderFixture {
        let trader = TraderFixture::new(balance);
        s.balances.set(trader.id(), trader.balance_commitment());
        trader
    }

    #[test]
    fn valid_submission_passes() {
        let s = setup();
        let trader = funded(&s, 100);
        let sub = trader
            .submit(&OrderFixture::buy(5, 100, 1), &s.keys.public(), &s.domain)
            .unwrap();
        s.verifier.verify(&s.pair, &sub, Utc::now()).unwrap();
    }

    #[test]
    fn insufficient_balance_is_invalid_proof() {
        let s = setup();
        let trader = funded(&s, 3);
        // The trader proves against a fabricated balance of 50.
        let sub = trader
            .submit(
                &OrderFixture::buy(20, 100, 1).claiming_balance(50),
                &s.keys.public(),
                &s.domain,
            )
            .unwrap();
        let err = s.verifier.verify(&s.pair, &sub, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            PhantomError::InvalidProof {
                kind: ProofKind::Solvency,
                ..
            }
        ));
        assert_eq!(err.reason_code(), "INVALID_PROOF");
    }

    #[test]
    fn expired_submission_rejected() {
        let s = setup();
        let trader = funded(&s, 100);
        let order = OrderFixture::sell(5, 100, 1).expiring_at(Utc::now() - Duration::seconds(1));
        let sub = trader.submit(&order, &s.keys.public(), &s.domain).unwrap();
        assert!(matches!(
            s.verifier.verify(&s.pair, &sub, Utc::now()),
            Err(PhantomError::Expired)
        ));
    }

    #[test]
    fn tampered_submission_fails_signature() {
        let s = setup();
        let trader = funded(&s, 100);
        let mut sub = trader
            .submit(&OrderFixture::buy(5, 100, 1), &s.keys.public(), &s.domain)
            .unwrap();
        sub.expiry_time += Duration::minutes(1);
        assert!(matches!(
            s.verifier.verify(&s.pair, &sub, Utc::now()),
            Err(PhantomError::InvalidSignature)
        ));
    }

    #[test]
    fn unknown_trader_rejected() {
        let s = setup();
        let trader = TraderFixture::new(100);
        let sub = trader
            .submit(&OrderFixture::buy(5, 100, 1), &s.keys.public(), &s.domain)
            .unwrap();
        assert!(matches!(
            s.verifier.verify(&s.pair, &sub, Utc::now()),
            Err(PhantomError::UnknownTrader(_))
        ));
    }

    #[test]
    fn wrong_pair_rejected() {
        let s = setup();
        let trader = funded(&s, 100);
        let order = OrderFixture::buy(5, 100, 1).for_pair(TradingPair::new("BTC", "USDC"));
        let sub = trader.submit(&order, &s.keys.public(), &s.domain).unwrap();
        assert!(matches!(
            s.verifier.verify(&s.pair, &sub, Utc::now()),
            Err(PhantomError::WrongPair { .. })
        ));
    }

    #[test]
    fn proofs_under_another_key_rejected() {
        let s = setup();
        let trader = funded(&s, 100);
        let other = KeyPair::generate(&mut OsRng);
        let sub = trader
            .submit(&OrderFixture::buy(5, 100, 1), &other.public(), &s.domain)
            .unwrap();
        let err = s.verifier.verify(&s.pair, &sub, Utc::now()).unwrap_err();
        assert!(matches!(err, PhantomError::InvalidProof { .. }));
        assert!(err.is_security_event());
    }
}
