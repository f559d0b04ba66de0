//! Executor transport.
//!
//! The coordinator sends `{threshold_operation_id, encrypted_payload}` and
//! gets back one DLEQ-proved partial decryption per payload entry, signed
//! with the executor's ed25519 key. Comparisons use a second request kind
//! carrying one masked difference under a comparison context. The wire
//! itself is not this crate's concern; [`LocalExecutor`] serves requests
//! in-process.

use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use phantom_crypto::{Ciphertext, KeyShare, PartialDecryption};
use phantom_types::{
    COMPARISON_CONTEXT_TAG, ExecutorId, PhantomError, Result, ThresholdOperation,
    ThresholdOperationId,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRequest {
    pub threshold_operation_id: ThresholdOperationId,
    pub encrypted_payload: Vec<Ciphertext>,
}

impl ShareRequest {
    #[must_use]
    pub fn for_operation(op: &ThresholdOperation) -> Self {
        Self {
            threshold_operation_id: op.id,
            encrypted_payload: op.encrypted_payload.clone(),
        }
    }
}

/// One executor's answer. `partial_result[k]` carries both the share and
/// its proof for `encrypted_payload[k]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareResponse {
    pub executor: ExecutorId,
    pub threshold_operation_id: ThresholdOperationId,
    pub partial_result: Vec<PartialDecryption>,
    pub signature: Signature,
}

impl ShareResponse {
    /// Digest the executor signs.
    #[must_use]
    pub fn signing_digest(
        executor: ExecutorId,
        operation: &ThresholdOperationId,
        partials: &[PartialDecryption],
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"phantom:share_response:v1:");
        hasher.update(executor.index().to_le_bytes());
        hasher.update(operation.as_bytes());
        for p in partials {
            hasher.update(p.index.to_le_bytes());
            hasher.update(p.share.compress().as_bytes());
            hasher.update(p.proof.challenge.as_bytes());
            hasher.update(p.proof.response.as_bytes());
        }
        hasher.finalize().into()
    }

    /// # Errors
    /// `ExecutorInvalidShare` if the key is malformed or the signature fails.
    pub fn verify_signature(&self, signing_key: &[u8; 32]) -> Result<()> {
        let invalid = |reason: &str| PhantomError::ExecutorInvalidShare {
            executor: self.executor,
            reason: reason.to_string(),
        };
        let key = VerifyingKey::from_bytes(signing_key).map_err(|_| invalid("bad signing key"))?;
        let digest =
            Self::signing_digest(self.executor, &self.threshold_operation_id, &self.partial_result);
        key.verify_strict(&digest, &self.signature)
            .map_err(|_| invalid("response signature does not verify"))
    }
}

/// A share request for one masked comparison difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonShareRequest {
    /// Starts with [`COMPARISON_CONTEXT_TAG`].
    pub context: Vec<u8>,
    pub masked: Ciphertext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonShareResponse {
    pub executor: ExecutorId,
    pub partial: PartialDecryption,
    pub signature: Signature,
}

impl ComparisonShareResponse {
    /// Digest the executor signs: the request it answers and the share.
    #[must_use]
    pub fn signing_digest(
        executor: ExecutorId,
        request: &ComparisonShareRequest,
        partial: &PartialDecryption,
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"phantom:comparison_share:v1:");
        hasher.update(executor.index().to_le_bytes());
        hasher.update((request.context.len() as u64).to_le_bytes());
        hasher.update(&request.context);
        hasher.update(request.masked.to_bytes());
        hasher.update(partial.index.to_le_bytes());
        hasher.update(partial.share.compress().as_bytes());
        hasher.update(partial.proof.challenge.as_bytes());
        hasher.update(partial.proof.response.as_bytes());
        hasher.finalize().into()
    }

    /// # Errors
    /// `ExecutorInvalidShare` if the key is malformed or the signature does
    /// not cover `request` and this share.
    pub fn verify_signature(
        &self,
        signing_key: &[u8; 32],
        request: &ComparisonShareRequest,
    ) -> Result<()> {
        let invalid = |reason: &str| PhantomError::ExecutorInvalidShare {
            executor: self.executor,
            reason: reason.to_string(),
        };
        let key = VerifyingKey::from_bytes(signing_key).map_err(|_| invalid("bad signing key"))?;
        let digest = Self::signing_digest(self.executor, request, &self.partial);
        key.verify_strict(&digest, &self.signature)
            .map_err(|_| invalid("comparison share signature does not verify"))
    }
}

/// Reaches one executor node.
#[async_trait]
pub trait ExecutorTransport: Send + Sync {
    fn executor(&self) -> ExecutorId;

    async fn request_share(&self, request: ShareRequest) -> Result<ShareResponse>;

    async fn request_comparison_share(
        &self,
        request: ComparisonShareRequest,
    ) -> Result<ComparisonShareResponse>;
}

// ---------------------------------------------------------------------------
// LocalExecutor
// ---------------------------------------------------------------------------

/// An executor holding its key share in this process.
pub struct LocalExecutor {
    id: ExecutorId,
    share: Arc<KeyShare>,
    signing: SigningKey,
}

impl LocalExecutor {
    #[must_use]
    pub fn new(share: Arc<KeyShare>, signing: SigningKey) -> Self {
        Self {
            id: ExecutorId(share.index()),
            share,
            signing,
        }
    }

    /// Key to register for this executor.
    #[must_use]
    pub fn signing_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Partial decryptions for a request, bound to its operation.
    #[must_use]
    pub fn respond(&self, request: &ShareRequest) -> ShareResponse {
        let context = ThresholdOperation::context_for(&request.threshold_operation_id);
        let partials: Vec<PartialDecryption> = request
            .encrypted_payload
            .iter()
            .map(|ct| self.share.partial_decrypt(ct, &context, &mut OsRng))
            .collect();
        self.sign(request.threshold_operation_id, partials)
    }

    /// A partial decryption of a masked comparison difference.
    ///
    /// # Errors
    /// `Transport` if the context is not a comparison context; reveal
    /// contexts never get a share this way.
    pub fn respond_comparison(
        &self,
        request: &ComparisonShareRequest,
    ) -> Result<ComparisonShareResponse> {
        if !request.context.starts_with(COMPARISON_CONTEXT_TAG) {
            tracing::warn!(
                target: "phantom::security",
                executor = %self.id,
                context = %hex::encode(&request.context),
                "refused comparison share outside a comparison context"
            );
            return Err(PhantomError::Transport {
                executor: self.id,
                reason: "not a comparison context".into(),
            });
        }
        let partial = self
            .share
            .partial_decrypt(&request.masked, &request.context, &mut OsRng);
        tracing::debug!(
            executor = %self.id,
            context = %hex::encode(&request.context),
            "comparison share issued"
        );
        Ok(self.sign_comparison(request, partial))
    }

    fn sign_comparison(
        &self,
        request: &ComparisonShareRequest,
        partial: PartialDecryption,
    ) -> ComparisonShareResponse {
        let digest = ComparisonShareResponse::signing_digest(self.id, request, &partial);
        ComparisonShareResponse {
            executor: self.id,
            partial,
            signature: self.signing.sign(&digest),
        }
    }

    fn sign(&self, operation: ThresholdOperationId, partials: Vec<PartialDecryption>) -> ShareResponse {
        let digest = ShareResponse::signing_digest(self.id, &operation, &partials);
        ShareResponse {
            executor: self.id,
            threshold_operation_id: operation,
            partial_result: partials,
            signature: self.signing.sign(&digest),
        }
    }
}

#[async_trait]
impl ExecutorTransport for LocalExecutor {
    fn executor(&self) -> ExecutorId {
        self.id
    }

    async fn request_share(&self, request: ShareRequest) -> Result<ShareResponse> {
        Ok(self.respond(&request))
    }

    async fn request_comparison_share(
        &self,
        request: ComparisonShareRequest,
    ) -> Result<ComparisonShareResponse> {
        self.respond_comparison(&request)
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Misbehaving executors for tests
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-helpers"))]
pub mod faulty {
    use std::time::Duration;

    use super::*;

    /// Signs a share for the wrong point: the signature verifies, the DLEQ
    /// proof does not.
    pub struct CorruptExecutor(pub LocalExecutor);

    #[async_trait]
    impl ExecutorTransport for CorruptExecutor {
        fn executor(&self) -> ExecutorId {
            self.0.id
        }

        async fn request_share(&self, request: ShareRequest) -> Result<ShareResponse> {
            let mut partials = self.0.respond(&request).partial_result;
            for p in &mut partials {
                p.share += phantom_crypto::group::G;
            }
            Ok(self.0.sign(request.threshold_operation_id, partials))
        }

        async fn request_comparison_share(
            &self,
            request: ComparisonShareRequest,
        ) -> Result<ComparisonShareResponse> {
            let mut partial = self.0.respond_comparison(&request)?.partial;
            partial.share += phantom_crypto::group::G;
            Ok(self.0.sign_comparison(&request, partial))
        }
    }

    /// Never answers.
    pub struct SilentExecutor(pub ExecutorId);

    #[async_trait]
    impl ExecutorTransport for SilentExecutor {
        fn executor(&self) -> ExecutorId {
            self.0
        }

        async fn request_share(&self, _request: ShareRequest) -> Result<ShareResponse> {
            std::future::pending::<()>().await;
            Err(PhantomError::Internal("unreachable".into()))
        }

        async fn request_comparison_share(
            &self,
            _request: ComparisonShareRequest,
        ) -> Result<ComparisonShareResponse> {
            std::future::pending::<()>().await;
            Err(PhantomError::Internal("unreachable".into()))
        }
    }

    /// Answers correctly after a delay.
    pub struct SlowExecutor(pub LocalExecutor, pub Duration);

    #[async_trait]
    impl ExecutorTransport for SlowExecutor {
        fn executor(&self) -> ExecutorId {
            self.0.id
        }

        async fn request_share(&self, request: ShareRequest) -> Result<ShareResponse> {
            tokio::time::sleep(self.1).await;
            Ok(self.0.respond(&request))
        }

        async fn request_comparison_share(
            &self,
            request: ComparisonShareRequest,
        ) -> Result<ComparisonShareResponse> {
            tokio::time::sleep(self.1).await;
            self.0.respond_comparison(&request)
        }
    }

    /// Fails at the transport layer.
    pub struct UnreachableExecutor(pub ExecutorId);

    #[async_trait]
    impl ExecutorTransport for UnreachableExecutor {
        fn executor(&self) -> ExecutorId {
            self.0
        }

        async fn request_share(&self, _request: ShareRequest) -> Result<ShareResponse> {
            Err(PhantomError::Transport {
                executor: self.0,
                reason: "connection refused".into(),
            })
        }

        async fn request_comparison_share(
            &self,
            _request: ComparisonShareRequest,
        ) -> Result<ComparisonShareResponse> {
            Err(PhantomError::Transport {
                executor: self.0,
                reason: "connection refused".into(),
            })
        }
    }
}
