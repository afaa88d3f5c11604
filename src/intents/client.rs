//! Intents Client
//!
//! Ties an [`Account`] (on-chain calls against the verifying contract) to a
//! [`SolverGateway`] (publication and settlement) and the account's intent
//! signing key.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::builder::{IntentBuilder, IntentSigner};
use super::model::{Commitment, SimulationResult};
use crate::account::Account;
use crate::config::IntentsConfig;
use crate::dapps::FtClient;
use crate::error::{ClientError, ClientResult};
use crate::primitives::{AccountId, Balance, Gas, PublicKey, TGAS};
use crate::service::{Completion, SubmissionOutcome};
use crate::solver_client::SolverGateway;

/// Gas for `execute_intents`; batches can touch many token contracts.
pub const EXECUTE_INTENTS_GAS: Gas = 300 * TGAS;

pub struct IntentsClient {
    account: Arc<Account>,
    gateway: Arc<SolverGateway>,
    signer: IntentSigner,
}

impl IntentsClient {
    /// Signs intents with the account's primary pool key.
    ///
    /// # Returns
    ///
    /// * `Ok(IntentsClient)` - Ready to sign and publish
    /// * `Err(ClientError::Validation)` - The account has no keys, or the verifying contract id is invalid
    pub fn new(
        account: Arc<Account>,
        gateway: Arc<SolverGateway>,
        config: &IntentsConfig,
    ) -> ClientResult<Self> {
        let key = account
            .pool()
            .primary_signer()
            .ok_or_else(|| ClientError::validation("Account has no signing keys"))?;
        let signer = IntentSigner::new(account.account_id().clone(), key, config)?;
        Ok(Self::with_signer(account, gateway, signer))
    }

    /// Uses a dedicated intent key instead of a pool key.
    pub fn with_signer(account: Arc<Account>, gateway: Arc<SolverGateway>, signer: IntentSigner) -> Self {
        Self {
            account,
            gateway,
            signer,
        }
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    pub fn gateway(&self) -> &Arc<SolverGateway> {
        &self.gateway
    }

    pub fn signer(&self) -> &IntentSigner {
        &self.signer
    }

    pub fn verifying_contract(&self) -> &AccountId {
        self.signer.verifying_contract()
    }

    /// Starts an empty batch.
    pub fn intent(&self) -> IntentBuilder {
        IntentBuilder::new()
    }

    pub fn sign(&self, builder: &IntentBuilder) -> ClientResult<Commitment> {
        builder.sign(&self.signer)
    }

    // ========================================================================
    // SOLVER NETWORK
    // ========================================================================

    pub async fn publish(&self, commitment: &Commitment, quote_hashes: &[String]) -> ClientResult<String> {
        self.gateway.publish(commitment, quote_hashes).await
    }

    pub async fn publish_many(
        &self,
        commitments: &[Commitment],
        quote_hashes: &[String],
    ) -> ClientResult<Vec<String>> {
        self.gateway.publish_many(commitments, quote_hashes).await
    }

    /// Signs and publishes; returns the intent hash.
    pub async fn submit(&self, builder: &IntentBuilder, quote_hashes: &[String]) -> ClientResult<String> {
        let commitment = self.sign(builder)?;
        self.publish(&commitment, quote_hashes).await
    }

    /// Signs, publishes and waits for settlement.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(tx_hash))` - Settled within the configured timeout
    /// * `Ok(None)` - Published but not settled (yet)
    pub async fn submit_and_wait(
        &self,
        builder: &IntentBuilder,
        quote_hashes: &[String],
    ) -> ClientResult<Option<String>> {
        let intent_hash = self.submit(builder, quote_hashes).await?;
        Ok(self.wait_for_settlement(&intent_hash).await)
    }

    /// Solver-side dry run. Fails with `ClientError::Simulation` when the
    /// batch would not execute.
    pub async fn simulate(&self, commitment: &Commitment) -> ClientResult<SimulationResult> {
        self.gateway.simulate(commitment).await
    }

    pub async fn wait_for_settlement(&self, intent_hash: &str) -> Option<String> {
        self.gateway
            .poll_settlement(intent_hash, self.gateway.settlement_timeout())
            .await
    }

    // ========================================================================
    // VERIFYING CONTRACT
    // ========================================================================

    /// Dry run through the contract's `simulate_intents` view.
    pub async fn simulate_on_chain(&self, commitments: &[Commitment]) -> ClientResult<SimulationResult> {
        let signed = commitments
            .iter()
            .map(Commitment::to_json)
            .collect::<ClientResult<Vec<_>>>()?;
        let result = self
            .account
            .view_function(self.verifying_contract(), "simulate_intents", &json!({ "signed": signed }))
            .await;
        let view = match result {
            Ok(view) => view,
            Err(ClientError::ViewFunction(message)) => {
                warn!("On-chain simulation failed: {}", message);
                return Err(ClientError::Simulation {
                    payload: Value::String(message.clone()),
                    message,
                });
            }
            Err(e) => return Err(e),
        };
        let simulation: SimulationResult = view.json()?;
        if let Some(message) = &simulation.error_msg {
            return Err(ClientError::Simulation {
                message: message.clone(),
                payload: serde_json::to_value(&simulation)?,
            });
        }
        Ok(simulation)
    }

    /// Whether `nonce` was already consumed by this account's intents.
    pub async fn is_nonce_used(&self, nonce: &str) -> ClientResult<bool> {
        self.account
            .view_function(
                self.verifying_contract(),
                "is_nonce_used",
                &json!({ "nonce": nonce, "account_id": self.account.account_id() }),
            )
            .await?
            .json()
    }

    /// Executes commitments directly on the verifying contract, bypassing
    /// the solver network. This account pays the gas.
    pub async fn execute_on_chain(
        &self,
        commitments: &[Commitment],
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        if commitments.is_empty() {
            return Err(ClientError::validation("No commitments to execute"));
        }
        let signed = commitments
            .iter()
            .map(Commitment::to_json)
            .collect::<ClientResult<Vec<_>>>()?;
        self.account
            .function_call(
                self.verifying_contract(),
                "execute_intents",
                &json!({ "signed": signed }),
                Some(EXECUTE_INTENTS_GAS),
                0,
                completion,
            )
            .await
    }

    /// Authorizes `public_key` to sign intents for this account.
    pub async fn add_intent_public_key(
        &self,
        public_key: PublicKey,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        self.account
            .function_call(
                self.verifying_contract(),
                "add_public_key",
                &json!({ "public_key": public_key }),
                None,
                1,
                completion,
            )
            .await
    }

    pub async fn remove_intent_public_key(
        &self,
        public_key: PublicKey,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        self.account
            .function_call(
                self.verifying_contract(),
                "remove_public_key",
                &json!({ "public_key": public_key }),
                None,
                1,
                completion,
            )
            .await
    }

    /// Moves `amount` of a NEP-141 token into this account's intents balance,
    /// registering storage on the token first when needed.
    pub async fn deposit_ft(
        &self,
        token: &AccountId,
        amount: Balance,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        let ft = FtClient::new(self.account.clone());
        if ft.ensure_storage(token, self.verifying_contract()).await? {
            info!("Registered {} storage on {}", self.verifying_contract(), token);
        }
        ft.transfer_call(token, self.verifying_contract(), amount, "", completion)
            .await
    }

    /// Moves a NEP-171 token into this account's intents balance.
    pub async fn deposit_nft(
        &self,
        contract_id: &AccountId,
        token_id: &str,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        info!("Depositing NFT {} from {}", token_id, contract_id);
        self.account
            .function_call(
                contract_id,
                "nft_transfer_call",
                &json!({
                    "receiver_id": self.verifying_contract(),
                    "token_id": token_id,
                    "msg": "",
                }),
                Some(EXECUTE_INTENTS_GAS),
                1,
                completion,
            )
            .await
    }
}

impl IntentBuilder {
    /// Signs this batch with the client's key and publishes it.
    pub async fn submit(&self, client: &IntentsClient, quote_hashes: &[String]) -> ClientResult<String> {
        client.submit(self, quote_hashes).await
    }
}
