//! Threshold reveal coordinator.
//!
//! ## Algorithm
//!
//! 1. Take the live quorum from the registry, best reputation first, and
//!    keep the executors a transport is known for. Fewer than `t` fails the
//!    operation immediately.
//! 2. Fan the `{operation id, payload}` request out to all of them at once.
//! 3. Verify every response on arrival: signature, operation binding, share
//!    index, and one DLEQ proof per payload entry against the executor's
//!    verification key. Invalid submissions are rejected and counted against
//!    the executor; they never reach combination.
//! 4. Stop as soon as `t` valid submissions are held, or fail the operation
//!    when the share timeout elapses first.
//! 5. Lagrange-combine each payload entry and decode it through the table.
//!
//! Comparison shares take the same fan-out without an operation record:
//! one masked difference, `t` verified shares returned to the caller, which
//! turns them into a sign proof. Invalid comparison shares are penalized
//! like reveal shares; a failed request only counts as missed when the
//! comparison times out.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use phantom_crypto::{DecryptionTable, PartialDecryption, RistrettoPoint, combine_and_decode};
use phantom_types::{ExecutorId, PhantomError, Result, ThresholdOperation};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::registry::ExecutorRegistry;
use crate::transport::{
    ComparisonShareRequest, ComparisonShareResponse, ExecutorTransport, ShareRequest,
    ShareResponse,
};

/// Turns an open [`ThresholdOperation`] into plaintexts, one per payload
/// entry, or fails it.
#[async_trait]
pub trait DecryptionBackend: Send + Sync {
    async fn reveal(&self, op: &mut ThresholdOperation) -> Result<Vec<u64>>;
}

pub struct ThresholdCoordinator {
    registry: Arc<Mutex<ExecutorRegistry>>,
    transports: HashMap<ExecutorId, Arc<dyn ExecutorTransport>>,
    table: Arc<DecryptionTable>,
    share_timeout: Duration,
}

/// What the coordinator checks a response against.
struct Expected {
    id: ExecutorId,
    verification_key: RistrettoPoint,
    signing_key: [u8; 32],
}

impl ThresholdCoordinator {
    #[must_use]
    pub fn new(
        registry: Arc<Mutex<ExecutorRegistry>>,
        table: Arc<DecryptionTable>,
        share_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            transports: HashMap::new(),
            table,
            share_timeout,
        }
    }

    /// Route share requests for a registered executor through `transport`.
    ///
    /// # Errors
    /// `UnknownExecutor` if the executor is not registered.
    pub fn connect(&mut self, transport: Arc<dyn ExecutorTransport>) -> Result<()> {
        let id = transport.executor();
        if self.registry.lock().get(id).is_none() {
            return Err(PhantomError::UnknownExecutor(id));
        }
        self.transports.insert(id, transport);
        Ok(())
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Mutex<ExecutorRegistry>> {
        &self.registry
    }

    fn candidates(&self) -> Vec<Expected> {
        let registry = self.registry.lock();
        registry
            .quorum(Utc::now())
            .into_iter()
            .filter(|id| self.transports.contains_key(id))
            .filter_map(|id| {
                registry.get(id).map(|node| Expected {
                    id,
                    verification_key: node.public_key_share,
                    signing_key: node.signing_key,
                })
            })
            .collect()
    }

    /// Record a verified response or count the failure against its sender.
    fn absorb(&self, op: &mut ThresholdOperation, expected: &Expected, outcome: Result<ShareResponse>) {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    executor = %expected.id,
                    operation = %op.id,
                    error = %err,
                    "share request failed"
                );
                self.registry.lock().record_missed_share(expected.id);
                return;
            }
        };
        match verify_response(op, expected, &response) {
            Ok(()) => {
                let held = op.record_share(expected.id, response.partial_result);
                tracing::debug!(executor = %expected.id, operation = %op.id, held, "share accepted");
            }
            Err(err) => {
                tracing::warn!(
                    target: "phantom::security",
                    executor = %expected.id,
                    operation = %op.id,
                    error = %err,
                    "share rejected"
                );
                op.reject(expected.id);
                self.registry.lock().record_invalid_share(expected.id);
            }
        }
    }

    /// Collect `t` verified shares of one masked comparison difference.
    ///
    /// # Errors
    /// - `InsufficientExecutors` if fewer than `t` executors are reachable
    /// - `ComparisonTimeout` if `t` valid shares do not arrive within the
    ///   share timeout
    pub async fn comparison_shares(
        &self,
        request: &ComparisonShareRequest,
    ) -> Result<Vec<PartialDecryption>> {
        let need = self.registry.lock().committee().params().threshold() as usize;
        let candidates = self.candidates();
        if candidates.len() < need {
            return Err(PhantomError::InsufficientExecutors {
                active: candidates.len(),
                need,
            });
        }

        let mut tasks = JoinSet::new();
        for (slot, expected) in candidates.iter().enumerate() {
            let Some(transport) = self.transports.get(&expected.id).map(Arc::clone) else {
                continue;
            };
            let request = request.clone();
            tasks.spawn(async move { (slot, transport.request_comparison_share(request).await) });
        }

        let deadline = Instant::now() + self.share_timeout;
        let mut waiting: BTreeSet<usize> = (0..candidates.len()).collect();
        let mut shares = Vec::with_capacity(need);
        while shares.len() < need {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((slot, outcome)))) => {
                    let expected = &candidates[slot];
                    match outcome {
                        Ok(response) => {
                            waiting.remove(&slot);
                            if let Some(partial) = self.accept_comparison(request, expected, response) {
                                shares.push(partial);
                            }
                        }
                        Err(err) => {
                            tracing::warn!(
                                executor = %expected.id,
                                error = %err,
                                "comparison share request failed"
                            );
                        }
                    }
                }
                Ok(Some(Err(err))) => {
                    tracing::error!(error = %err, "comparison share task aborted");
                }
                Ok(None) | Err(_) => break,
            }
        }
        tasks.abort_all();

        if shares.len() < need {
            let have = shares.len();
            {
                let mut registry = self.registry.lock();
                for slot in &waiting {
                    registry.record_missed_share(candidates[*slot].id);
                }
            }
            tracing::error!(
                context = %hex::encode(&request.context),
                have,
                need,
                silent = waiting.len(),
                "comparison shares timed out"
            );
            return Err(PhantomError::ComparisonTimeout { have, need });
        }
        Ok(shares)
    }

    fn accept_comparison(
        &self,
        request: &ComparisonShareRequest,
        expected: &Expected,
        response: ComparisonShareResponse,
    ) -> Option<PartialDecryption> {
        match verify_comparison_response(request, expected, &response) {
            Ok(()) => Some(response.partial),
            Err(err) => {
                tracing::warn!(
                    target: "phantom::security",
                    executor = %expected.id,
                    context = %hex::encode(&request.context),
                    error = %err,
                    "comparison share rejected"
                );
                self.registry.lock().record_invalid_share(expected.id);
                None
            }
        }
    }

    fn combine(&self, op: &ThresholdOperation) -> Result<Vec<u64>> {
        op.encrypted_payload
            .iter()
            .enumerate()
            .map(|(slot, ct)| {
                Ok(combine_and_decode(
                    ct,
                    &op.shares_for_slot(slot),
                    op.required_shares,
                    &self.table,
                )?)
            })
            .collect()
    }
}

#[async_trait]
impl DecryptionBackend for ThresholdCoordinator {
    async fn reveal(&self, op: &mut ThresholdOperation) -> Result<Vec<u64>> {
        if op.is_closed() {
            return Err(PhantomError::Internal(format!(
                "threshold operation {} is already closed",
                op.id
            )));
        }
        let need = op.required_shares as usize;
        let candidates = self.candidates();
        if candidates.len() < need {
            op.fail(Utc::now());
            tracing::error!(
                operation = %op.id,
                active = candidates.len(),
                need,
                "not enough executors for threshold reveal"
            );
            return Err(PhantomError::InsufficientExecutors {
                active: candidates.len(),
                need,
            });
        }

        tracing::info!(
            operation = %op.id,
            round = %op.matching_round_id,
            attempt = op.attempt,
            executors = candidates.len(),
            need,
            "threshold reveal requested"
        );

        let request = ShareRequest::for_operation(op);
        let mut tasks = JoinSet::new();
        for (slot, expected) in candidates.iter().enumerate() {
            let Some(transport) = self.transports.get(&expected.id).map(Arc::clone) else {
                continue;
            };
            let request = request.clone();
            tasks.spawn(async move { (slot, transport.request_share(request).await) });
        }

        let deadline = Instant::now() + self.share_timeout;
        let mut waiting: BTreeSet<usize> = (0..candidates.len()).collect();
        while !op.has_quorum() {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((slot, outcome)))) => {
                    waiting.remove(&slot);
                    self.absorb(op, &candidates[slot], outcome);
                }
                Ok(Some(Err(err))) => {
                    tracing::error!(operation = %op.id, error = %err, "share task aborted");
                }
                Ok(None) | Err(_) => break,
            }
        }
        tasks.abort_all();

        if !op.has_quorum() {
            let have = op.shares_received.len();
            {
                let mut registry = self.registry.lock();
                for slot in &waiting {
                    registry.record_missed_share(candidates[*slot].id);
                }
            }
            op.fail(Utc::now());
            tracing::error!(
                operation = %op.id,
                round = %op.matching_round_id,
                have,
                need,
                rejected = op.rejected.len(),
                silent = waiting.len(),
                "threshold reveal timed out"
            );
            return Err(PhantomError::ThresholdTimeout {
                operation: op.id,
                have,
                need,
            });
        }

        match self.combine(op) {
            Ok(values) => {
                op.complete(Utc::now());
                tracing::info!(operation = %op.id, round = %op.matching_round_id, "threshold reveal complete");
                Ok(values)
            }
            Err(err) => {
                op.fail(Utc::now());
                tracing::error!(operation = %op.id, error = %err, "share combination failed");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ThresholdCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdCoordinator")
            .field("transports", &self.transports.len())
            .field("share_timeout", &self.share_timeout)
            .finish_non_exhaustive()
    }
}

/// Every check a submission must pass before it may be combined.
fn verify_response(
    op: &ThresholdOperation,
    expected: &Expected,
    response: &ShareResponse,
) -> Result<()> {
    let invalid = |reason: String| PhantomError::ExecutorInvalidShare {
        executor: expected.id,
        reason,
    };
    if response.executor != expected.id {
        return Err(invalid(format!("response claims to be {}", response.executor)));
    }
    if response.threshold_operation_id != op.id {
        return Err(invalid("response is for another operation".into()));
    }
    response.verify_signature(&expected.signing_key)?;
    if response.partial_result.len() != op.encrypted_payload.len() {
        return Err(invalid(format!(
            "{} shares for {} payload entries",
            response.partial_result.len(),
            op.encrypted_payload.len()
        )));
    }
    let context = op.proof_context();
    for (partial, ct) in response.partial_result.iter().zip(&op.encrypted_payload) {
        if partial.index != expected.id.index() {
            return Err(invalid(format!("share carries index {}", partial.index)));
        }
        partial
            .verify(ct, &expected.verification_key, &context)
            .map_err(|e| invalid(e.to_string()))?;
    }
    Ok(())
}

fn verify_comparison_response(
    request: &ComparisonShareRequest,
    expected: &Expected,
    response: &ComparisonShareResponse,
) -> Result<()> {
    let invalid = |reason: String| PhantomError::ExecutorInvalidShare {
        executor: expected.id,
        reason,
    };
    if response.executor != expected.id {
        return Err(invalid(format!("response claims to be {}", response.executor)));
    }
    response.verify_signature(&expected.signing_key, request)?;
    if response.partial.index != expected.id.index() {
        return Err(invalid(format!("share carries index {}", response.partial.index)));
    }
    response
        .partial
        .verify(&request.masked, &expected.verification_key, &request.context)
        .map_err(|e| invalid(e.to_string()))
}
