//! Matching proof: a digest over everything a round decided, and the
//! replay that checks it.
//!
//! [`compute_matching_proof`] is a pure function of the round record, so
//! two verifiers always agree on it. [`replay_round`] goes further: it
//! re-walks the sealed input using the recorded attestations, verifying
//! each one, and requires the walk to land on the recorded steps,
//! aggregates and digest.

use phantom_types::{
    ComparisonAttestation, MatchingRound, PairingStep, PhantomError, Result, SealedRound,
};
use sha2::{Digest, Sha256};

use crate::backend::ComparisonVerifier;
use crate::matcher::{Check, Walker};

/// SHA-256 over the round record.
///
/// Covers round id, pair, round number, VRF output, input hash, both
/// shuffled id lists, every step (ids, attestations, fill) and the two
/// aggregate ciphertexts. The `matching_proof` field itself, status and
/// timestamps are excluded.
#[must_use]
pub fn compute_matching_proof(round: &MatchingRound) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"phantom:matching_proof:v1:");
    hasher.update(round.id.as_bytes());
    hasher.update(round.trading_pair.symbol().as_bytes());
    hasher.update(round.round_number.to_le_bytes());
    hasher.update(round.vrf_output.as_bytes());
    hasher.update(round.input_hash);

    for ids in [&round.shuffled_buy_ids, &round.shuffled_sell_ids] {
        hasher.update((ids.len() as u64).to_le_bytes());
        for id in ids {
            hasher.update(id.as_bytes());
        }
    }

    hasher.update((round.steps.len() as u64).to_le_bytes());
    for step in &round.steps {
        hash_step(&mut hasher, step);
    }

    match &round.clearing_price_ciphertext {
        Some(ct) => {
            hasher.update([1u8]);
            hasher.update(ct.to_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(round.matched_volume_ciphertext.to_bytes());
    hasher.finalize().into()
}

fn hash_step(hasher: &mut Sha256, step: &PairingStep) {
    hasher.update(step.buy.as_bytes());
    hasher.update(step.sell.as_bytes());
    hash_attestation(hasher, &step.price_check);
    match &step.amount_check {
        Some(att) => {
            hasher.update([1u8]);
            hash_attestation(hasher, att);
        }
        None => hasher.update([0u8]),
    }
    match &step.fill {
        Some(fill) => {
            hasher.update([1u8]);
            hasher.update(fill.to_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn hash_attestation(hasher: &mut Sha256, att: &ComparisonAttestation) {
    hasher.update([att.outcome.tag()]);
    let proof = att.proof.to_bytes();
    hasher.update((proof.len() as u64).to_le_bytes());
    hasher.update(proof);
}

/// Recompute the digest of `round` and compare it with the stored one.
///
/// # Errors
/// `MatchingProofMismatch` if the record was altered after it was sealed.
pub fn verify_matching_proof(round: &MatchingRound) -> Result<()> {
    let expected = compute_matching_proof(round);
    if expected != round.matching_proof {
        return Err(mismatch(&expected, &round.matching_proof));
    }
    Ok(())
}

/// Check `round` against the sealed input it claims to come from.
///
/// Every recorded attestation is verified with `verifier` and used to drive
/// the walk. The round is accepted only if the replayed walk produces the
/// same steps, fills, aggregates and digest.
///
/// # Errors
/// - `InvalidProof` if an attestation does not verify
/// - `MatchingProofMismatch` if anything recomputed differs from the record
pub fn replay_round(
    sealed: &SealedRound,
    round: &MatchingRound,
    verifier: &ComparisonVerifier,
) -> Result<()> {
    check_header(sealed, round)?;

    let mut walker = Walker::new(sealed);
    while let Some(request) = walker.next_request() {
        let cursor = walker.step_index();
        let step = round.steps.get(cursor).ok_or_else(|| PhantomError::MatchingProofMismatch {
            expected: format!("step {cursor}"),
            actual: format!("{} steps recorded", round.steps.len()),
        })?;
        let recorded = match request.check {
            Check::Price => &step.price_check,
            Check::Amount => step.amount_check.as_ref().ok_or_else(|| {
                PhantomError::MatchingProofMismatch {
                    expected: format!("amount check at step {cursor}"),
                    actual: "none recorded".to_string(),
                }
            })?,
        };
        verifier.verify(&request.context, &request.left, &request.right, recorded)?;
        walker.apply(recorded.clone());
    }
    let replayed = walker.finish();

    if replayed.steps != round.steps {
        return Err(PhantomError::MatchingProofMismatch {
            expected: format!("{} replayed steps", replayed.steps.len()),
            actual: format!("{} recorded steps", round.steps.len()),
        });
    }
    if replayed.volume != round.matched_volume_ciphertext {
        return Err(ciphertext_mismatch("matched volume"));
    }
    if replayed.clearing != round.clearing_price_ciphertext {
        return Err(ciphertext_mismatch("clearing price"));
    }
    verify_matching_proof(round)
}

fn check_header(sealed: &SealedRound, round: &MatchingRound) -> Result<()> {
    let fields = [
        ("round id", round.id == sealed.id()),
        ("trading pair", round.trading_pair == sealed.trading_pair),
        ("round number", round.round_number == sealed.round_number),
        ("vrf output", round.vrf_output == sealed.vrf_output),
        ("input hash", round.input_hash == sealed.input_hash),
        (
            "shuffled buys",
            round.shuffled_buy_ids.iter().eq(sealed.buys.iter().map(|o| &o.id)),
        ),
        (
            "shuffled sells",
            round.shuffled_sell_ids.iter().eq(sealed.sells.iter().map(|o| &o.id)),
        ),
    ];
    match fields.iter().find(|(_, ok)| !ok) {
        Some((field, _)) => Err(PhantomError::MatchingProofMismatch {
            expected: format!("{field} of sealed round {}", sealed.round_number),
            actual: format!("{field} of round record {}", round.round_number),
        }),
        None => Ok(()),
    }
}

fn ciphertext_mismatch(what: &str) -> PhantomError {
    PhantomError::MatchingProofMismatch {
        expected: format!("replayed {what} ciphertext"),
        actual: format!("recorded {what} ciphertext"),
    }
}

fn mismatch(expected: &[u8; 32], actual: &[u8; 32]) -> PhantomError {
    PhantomError::MatchingProofMismatch {
        expected: hex::encode(expected),
        actual: hex::encode(actual),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use phantom_types::Comparison;

    use super::*;
    use crate::fixtures::TestCommittee;
    use crate::{ProofBackend, match_sealed_round};

    async fn matched(c: &TestCommittee) -> (SealedRound, MatchingRound) {
        let sealed = c.sealed_in_order(
            7,
            &[(5, 100), (2, 99), (3, 101)],
            &[(6, 98), (4, 100)],
        );
        let round = match_sealed_round(&sealed, &c.backend(), Utc::now())
            .await
            .unwrap()
            .round;
        (sealed, round)
    }

    #[tokio::test]
    async fn honest_round_replays() {
        let c = TestCommittee::generate(3, 5);
        let (sealed, round) = matched(&c).await;
        verify_matching_proof(&round).unwrap();
        // Replay needs only public keys.
        replay_round(&sealed, &round, &c.verifier()).unwrap();
        replay_round(&sealed, &round, c.backend().verifier()).unwrap();
    }

    #[tokio::test]
    async fn edited_record_breaks_digest() {
        let c = TestCommittee::generate(2, 3);
        let (_, mut round) = matched(&c).await;
        round.shuffled_buy_ids.swap(0, 1);
        assert!(matches!(
            verify_matching_proof(&round),
            Err(PhantomError::MatchingProofMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn flipped_decision_is_caught_even_with_fresh_digest() {
        let c = TestCommittee::generate(2, 3);
        let (sealed, mut round) = matched(&c).await;
        // Pretend the first pair did not cross and re-seal the digest.
        round.steps[0].price_check.outcome = Comparison::Less;
        round.matching_proof = compute_matching_proof(&round);
        verify_matching_proof(&round).unwrap();
        assert!(matches!(
            replay_round(&sealed, &round, &c.verifier()),
            Err(PhantomError::InvalidProof { .. })
        ));
    }

    #[tokio::test]
    async fn swapped_fill_is_caught() {
        let c = TestCommittee::generate(2, 3);
        let (sealed, mut round) = matched(&c).await;
        let other = round.steps[3].fill;
        round.steps[0].fill = other;
        round.matching_proof = compute_matching_proof(&round);
        assert!(matches!(
            replay_round(&sealed, &round, &c.verifier()),
            Err(PhantomError::MatchingProofMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn dropped_step_is_caught() {
        let c = TestCommittee::generate(2, 3);
        let (sealed, mut round) = matched(&c).await;
        round.steps.pop();
        round.matching_proof = compute_matching_proof(&round);
        assert!(replay_round(&sealed, &round, &c.verifier()).is_err());
    }

    #[tokio::test]
    async fn round_from_other_input_is_caught() {
        let c = TestCommittee::generate(2, 3);
        let (_, round) = matched(&c).await;
        let other = c.sealed_in_order(7, &[(5, 100)], &[(6, 98)]);
        assert!(matches!(
            replay_round(&other, &round, &c.verifier()),
            Err(PhantomError::MatchingProofMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn attestation_moved_to_another_step_is_caught() {
        let c = TestCommittee::generate(2, 3);
        let (sealed, mut round) = matched(&c).await;
        // Step 2 does not cross; reuse its price check where step 0 did cross.
        assert!(round.steps[0].crossed() && !round.steps[2].crossed());
        round.steps[0].price_check = round.steps[2].price_check.clone();
        round.matching_proof = compute_matching_proof(&round);
        assert!(matches!(
            replay_round(&sealed, &round, &c.verifier()),
            Err(PhantomError::InvalidProof { .. })
        ));
    }
}
