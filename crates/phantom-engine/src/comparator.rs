//! Comparisons answered by the executor committee.
//!
//! For each comparison the comparator masks the difference under a fresh
//! random shift, asks the executors for shares of the masked ciphertext
//! through the [`ThresholdCoordinator`], and turns `t` verified shares into
//! a sign proof. It holds no key share: every share behind an attestation
//! was issued, signed and logged by an executor under a comparison context.

use std::sync::Arc;

use async_trait::async_trait;
use phantom_crypto::{Ciphertext, ComparisonMask, DecryptionTable};
use phantom_finality::{ComparisonShareRequest, ThresholdCoordinator};
use phantom_matchcore::{ComparisonVerifier, ProofBackend};
use phantom_types::{COMPARISON_CONTEXT_TAG, ComparisonAttestation, PhantomError, Result};
use rand::rngs::OsRng;

pub struct ExecutorComparator {
    verifier: ComparisonVerifier,
    coordinator: Arc<ThresholdCoordinator>,
    table: Arc<DecryptionTable>,
}

impl ExecutorComparator {
    /// `table` must cover the verifier's domain.
    #[must_use]
    pub fn new(
        verifier: ComparisonVerifier,
        coordinator: Arc<ThresholdCoordinator>,
        table: Arc<DecryptionTable>,
    ) -> Self {
        Self {
            verifier,
            coordinator,
            table,
        }
    }
}

#[async_trait]
impl ProofBackend for ExecutorComparator {
    async fn compare(
        &self,
        context: &[u8],
        left: &Ciphertext,
        right: &Ciphertext,
    ) -> Result<ComparisonAttestation> {
        if !context.starts_with(COMPARISON_CONTEXT_TAG) {
            return Err(PhantomError::Internal(
                "comparison context without comparison tag".into(),
            ));
        }
        let difference = *left - *right;
        let mask = ComparisonMask::random(&mut OsRng);
        let request = ComparisonShareRequest {
            context: context.to_vec(),
            masked: mask.apply(&self.verifier.committee().public_key(), &difference),
        };
        let partials = self.coordinator.comparison_shares(&request).await?;
        let attestation = self
            .verifier
            .attest(context, &difference, &mask, partials, &self.table)?;
        tracing::trace!(
            context = %hex::encode(context),
            outcome = ?attestation.outcome,
            "comparison attested"
        );
        Ok(attestation)
    }

    fn verifier(&self) -> &ComparisonVerifier {
        &self.verifier
    }
}

impl std::fmt::Debug for ExecutorComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorComparator")
            .field("params", &self.verifier.committee().params())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use phantom_types::{Comparison, EngineConfig, RoundId, TradingPair};

    use super::*;
    use crate::LocalCommittee;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.threshold.required_shares = 2;
        config.threshold.total_shares = 3;
        config.encoding.range_bits = 12;
        config
    }

    #[tokio::test]
    async fn comparison_verifies_with_public_keys_only() {
        let config = config();
        let committee = LocalCommittee::generate(&config, Utc::now()).unwrap();
        let domain = config.encoding.domain().unwrap();
        let pk = committee.key.public_key();
        let left = pk.encrypt(120, &domain, &mut OsRng).unwrap();
        let right = pk.encrypt(95, &domain, &mut OsRng).unwrap();
        let round = RoundId::deterministic(&TradingPair::new("ETH", "USDC"), 1);
        let context = ComparisonAttestation::context(&round, 0, b"price");

        let att = committee.prover.compare(&context, &left, &right).await.unwrap();
        assert_eq!(att.outcome, Comparison::Greater);
        let verifier = ComparisonVerifier::new(committee.key.clone(), domain);
        verifier.verify(&context, &left, &right, &att).unwrap();
        assert!(verifier.verify(&context, &right, &left, &att).is_err());

        let att = committee.prover.compare(&context, &right, &left).await.unwrap();
        assert_eq!(att.outcome, Comparison::Less);
        let att = committee.prover.compare(&context, &left, &left).await.unwrap();
        assert_eq!(att.outcome, Comparison::Equal);
    }

    #[tokio::test]
    async fn untagged_context_is_refused() {
        let committee = LocalCommittee::generate(&config(), Utc::now()).unwrap();
        let ct = Ciphertext::zero();
        assert!(matches!(
            committee.prover.compare(b"reveal", &ct, &ct).await,
            Err(PhantomError::Internal(_))
        ));
    }
}
