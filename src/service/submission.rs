//! Submission Pipeline
//!
//! Signs, broadcasts and optionally waits for a transaction.
//!
//! Flow per submission:
//! 1. **Built**: lease a key, reserve a nonce, bind a recent block hash.
//! 2. **Signed**: sign locally; no network call.
//! 3. **Broadcast**: send to the node in the requested [`Completion`] mode.
//! 4. **Included / Finalized / Failed**: terminal states.
//!
//! Retries:
//! - Transport errors resend the same signed bytes (same hash, same nonce)
//!   with exponential backoff, up to `max_attempts` sends.
//! - A node timeout while waiting switches to polling transaction status.
//! - A stale nonce or expired block hash rebuilds once with fresh values.
//! - Execution failures are terminal.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::builder::TransactionBuilder;
use crate::account::{KeyLease, KeyPool, NonceTracker};
use crate::config::SubmissionConfig;
use crate::error::{ClientError, ClientResult, RpcError};
use crate::primitives::{AccountId, Action, CryptoHash, SignedTransaction};
use crate::rpc::{FinalExecutionOutcome, LedgerRpc, TxWait};

/// How long a submission waits before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Return the hash once the node accepts the bytes.
    FireAndForget,
    /// Return once the transaction is in a block.
    Included,
    /// Return the full execution outcome.
    #[default]
    Executed,
}

/// Lifecycle of one submission, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Built,
    Signed,
    Broadcast,
    Included,
    Finalized,
    Failed,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionState::Built => "built",
            SubmissionState::Signed => "signed",
            SubmissionState::Broadcast => "broadcast",
            SubmissionState::Included => "included",
            SubmissionState::Finalized => "finalized",
            SubmissionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Successful submission result, shaped by the requested [`Completion`].
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    Broadcast { hash: CryptoHash },
    Included { hash: CryptoHash },
    /// Executed successfully. Failures surface as `ClientError::Execution`.
    Executed {
        hash: CryptoHash,
        outcome: Box<FinalExecutionOutcome>,
    },
}

impl SubmissionOutcome {
    pub fn hash(&self) -> CryptoHash {
        match self {
            SubmissionOutcome::Broadcast { hash }
            | SubmissionOutcome::Included { hash }
            | SubmissionOutcome::Executed { hash, .. } => *hash,
        }
    }

    pub fn state(&self) -> SubmissionState {
        match self {
            SubmissionOutcome::Broadcast { .. } => SubmissionState::Broadcast,
            SubmissionOutcome::Included { .. } => SubmissionState::Included,
            SubmissionOutcome::Executed { .. } => SubmissionState::Finalized,
        }
    }

    pub fn execution_outcome(&self) -> Option<&FinalExecutionOutcome> {
        match self {
            SubmissionOutcome::Executed { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    /// Logs emitted during execution; empty unless executed.
    pub fn logs(&self) -> Vec<&str> {
        self.execution_outcome()
            .map(FinalExecutionOutcome::logs)
            .unwrap_or_default()
    }
}

pub struct SubmissionPipeline {
    rpc: LedgerRpc,
    account_id: AccountId,
    pool: KeyPool,
    nonces: Arc<NonceTracker>,
    builder: Arc<TransactionBuilder>,
    config: SubmissionConfig,
}

impl SubmissionPipeline {
    pub fn new(
        rpc: LedgerRpc,
        account_id: AccountId,
        pool: KeyPool,
        nonces: Arc<NonceTracker>,
        builder: Arc<TransactionBuilder>,
        config: SubmissionConfig,
    ) -> Self {
        Self {
            rpc,
            account_id,
            pool,
            nonces,
            builder,
            config,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }

    fn transition(&self, hash: &CryptoHash, state: SubmissionState) {
        debug!("Transaction {} from {} is {}", hash, self.account_id, state);
    }

    /// Signs and sends `actions` to `receiver_id`.
    ///
    /// # Arguments
    ///
    /// * `receiver_id` - Account the actions apply to
    /// * `actions` - Non-empty ordered action list
    /// * `completion` - How long to wait before returning
    ///
    /// # Returns
    ///
    /// * `Ok(SubmissionOutcome)` - Accepted, included or executed successfully
    /// * `Err(ClientError::Execution)` - Executed, but a receipt failed
    /// * `Err(..)` - Validation, pool, signing or RPC failure
    pub async fn submit(
        &self,
        receiver_id: &AccountId,
        actions: Vec<Action>,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        if actions.is_empty() {
            return Err(ClientError::validation("Transaction has no actions"));
        }
        let mut lease = self.pool.acquire().await?;
        self.submit_with_lease(&mut lease, receiver_id, actions, completion)
            .await
    }

    /// Same as [`SubmissionPipeline::submit`] on an identity the caller already holds.
    pub async fn submit_with_lease(
        &self,
        lease: &mut KeyLease,
        receiver_id: &AccountId,
        actions: Vec<Action>,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        let mut rebuilt = false;
        loop {
            let tx = self
                .builder
                .build(
                    &self.account_id,
                    receiver_id,
                    actions.clone(),
                    lease.identity_mut(),
                    &self.nonces,
                )
                .await?;
            let nonce = tx.nonce;
            let signed = tx.sign(lease.signer().as_ref())?;
            let hash = signed.hash();
            self.transition(&hash, SubmissionState::Built);
            self.transition(&hash, SubmissionState::Signed);

            let (result, ambiguous) = self.broadcast(&signed, completion).await;
            let error = match result {
                Ok(outcome) => return self.finish(outcome),
                Err(e) => e,
            };

            // A lost response may hide a successful send; the node then
            // rejects our own resend as a nonce reuse.
            if ambiguous && matches!(error, RpcError::InvalidNonce { .. }) {
                if let Some(outcome) = self.landed_after_all(&hash, completion).await? {
                    return self.finish(outcome);
                }
            }

            if !error.is_stale_state() || rebuilt {
                self.transition(&hash, SubmissionState::Failed);
                return Err(error.into());
            }
            rebuilt = true;

            match &error {
                RpcError::InvalidNonce { tx_nonce, ak_nonce } => {
                    warn!(
                        "Nonce {} rejected for {} (access key at {}), rebuilding",
                        tx_nonce, self.account_id, ak_nonce
                    );
                    self.nonces.resync(lease.identity_mut(), Some(*ak_nonce)).await?;
                }
                _ => {
                    warn!(
                        "Block hash expired for transaction {} (nonce {}), rebuilding",
                        hash, nonce
                    );
                    self.builder.invalidate_block_hash().await;
                }
            }
        }
    }

    fn finish(&self, outcome: SubmissionOutcome) -> ClientResult<SubmissionOutcome> {
        let hash = outcome.hash();
        if let Some(failure) = outcome.execution_outcome().and_then(|o| o.failure()) {
            self.transition(&hash, SubmissionState::Failed);
            warn!("Transaction {} failed during execution: {}", hash, failure);
            return Err(ClientError::Execution {
                hash: hash.to_string(),
                failure: failure.clone(),
            });
        }
        self.transition(&hash, outcome.state());
        info!("Transaction {} {}", hash, outcome.state());
        Ok(outcome)
    }

    /// Sends the signed bytes, resending them on transport errors.
    ///
    /// The flag is true when some send may have reached the node without us
    /// seeing the answer.
    async fn broadcast(
        &self,
        signed: &SignedTransaction,
        completion: Completion,
    ) -> (Result<SubmissionOutcome, RpcError>, bool) {
        let hash = signed.hash();
        let body = match signed.to_base64() {
            Ok(body) => body,
            Err(e) => return (Err(RpcError::Malformed(e.to_string())), false),
        };

        let mut ambiguous = false;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.transition(&hash, SubmissionState::Broadcast);
            let result = match completion {
                Completion::FireAndForget => self
                    .rpc
                    .broadcast_tx_async(&body)
                    .await
                    .map(|hash| SubmissionOutcome::Broadcast { hash }),
                Completion::Included => self
                    .rpc
                    .send_tx_included(&body)
                    .await
                    .map(|_| SubmissionOutcome::Included { hash }),
                Completion::Executed => {
                    self.rpc
                        .broadcast_tx_commit(&body)
                        .await
                        .map(|outcome| SubmissionOutcome::Executed {
                            hash,
                            outcome: Box::new(outcome),
                        })
                }
            };

            match result {
                Ok(outcome) => return (Ok(outcome), ambiguous),
                Err(RpcError::Timeout) if completion != Completion::FireAndForget => {
                    info!("Node timed out waiting for {}, polling status", hash);
                    return (self.poll_status(&hash, completion).await, true);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    ambiguous = true;
                    let delay = self.backoff(attempt - 1);
                    warn!(
                        "Broadcast of {} failed ({}), resending in {:?} (attempt {}/{})",
                        hash, e, delay, attempt, self.config.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let ambiguous = ambiguous || e.is_transient();
                    return (Err(e), ambiguous);
                }
            }
        }
    }

    /// Polls `tx` until the requested completion is reached.
    async fn poll_status(
        &self,
        hash: &CryptoHash,
        completion: Completion,
    ) -> Result<SubmissionOutcome, RpcError> {
        let interval = Duration::from_millis(self.config.status_poll_interval_ms);
        for poll in 1..=self.config.status_poll_attempts {
            tokio::time::sleep(interval).await;
            match self.rpc.tx_status(hash, &self.account_id, TxWait::None).await {
                Ok(outcome) => {
                    if let Some(done) = Self::reached(*hash, outcome, completion) {
                        return Ok(done);
                    }
                }
                Err(e) if e.is_transient() || e.is_unknown_transaction() => {
                    debug!("Status poll {} for {}: {}", poll, hash, e);
                }
                Err(e) => return Err(e),
            }
        }
        warn!(
            "Transaction {} not {} after {} polls",
            hash,
            match completion {
                Completion::Included => "included",
                _ => "executed",
            },
            self.config.status_poll_attempts
        );
        Err(RpcError::Timeout)
    }

    /// Whether a prior send of `hash` landed even though we saw an error.
    async fn landed_after_all(
        &self,
        hash: &CryptoHash,
        completion: Completion,
    ) -> ClientResult<Option<SubmissionOutcome>> {
        match self.rpc.tx_status(hash, &self.account_id, TxWait::None).await {
            Ok(outcome) if outcome.is_included() => {
                info!("Transaction {} landed despite a lost response", hash);
                if let Some(done) = Self::reached(*hash, outcome, completion) {
                    return Ok(Some(done));
                }
                Ok(Some(self.poll_status(hash, completion).await?))
            }
            Ok(_) => Ok(None),
            Err(e) if e.is_unknown_transaction() || e.is_transient() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn reached(
        hash: CryptoHash,
        outcome: FinalExecutionOutcome,
        completion: Completion,
    ) -> Option<SubmissionOutcome> {
        match completion {
            Completion::FireAndForget => Some(SubmissionOutcome::Broadcast { hash }),
            Completion::Included if outcome.is_included() => Some(SubmissionOutcome::Included { hash }),
            Completion::Executed if outcome.is_executed() => Some(SubmissionOutcome::Executed {
                hash,
                outcome: Box::new(outcome),
            }),
            _ => None,
        }
    }
}
