//! Account
//!
//! One ledger account with its pool of signing keys. Composes the key pool,
//! nonce tracker, transaction builder and submission pipeline, and exposes
//! the write and read operations callers use directly.

pub mod key_pool;
pub mod nonce;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

pub use key_pool::{KeyLease, KeyPool, NonceState, SigningIdentity};
pub use nonce::NonceTracker;

use crate::config::{ClientConfig, SubmissionConfig};
use crate::crypto::Signer;
use crate::error::{ClientError, ClientResult, RpcError};
use crate::primitives::{
    AccountId, Action, Balance, DelegateAction, Gas, GlobalContractIdentifier, PublicKey,
    SignedDelegateAction,
};
use crate::rpc::{
    AccessKeyList, AccessKeyView, AccountView, JsonRpcClient, LedgerRpc, ViewFunctionResult,
};
use crate::service::{Completion, SubmissionOutcome, SubmissionPipeline, TransactionBuilder};

pub struct Account {
    account_id: AccountId,
    rpc: LedgerRpc,
    pool: KeyPool,
    nonces: Arc<NonceTracker>,
    builder: Arc<TransactionBuilder>,
    pipeline: SubmissionPipeline,
    config: SubmissionConfig,
}

impl Account {
    /// Creates an account client.
    ///
    /// # Arguments
    ///
    /// * `account_id` - The account that signs and pays
    /// * `signers` - Keys registered on the account; may be empty for read-only use
    /// * `rpc` - Ledger RPC shared with other components
    /// * `config` - Submission policy
    pub fn new(
        account_id: AccountId,
        signers: Vec<Arc<dyn Signer>>,
        rpc: LedgerRpc,
        config: SubmissionConfig,
    ) -> Self {
        let pool = KeyPool::new(signers);
        let nonces = Arc::new(NonceTracker::new(rpc.clone(), account_id.clone()));
        let builder = Arc::new(TransactionBuilder::new(
            rpc.clone(),
            Duration::from_millis(config.block_hash_ttl_ms),
        ));
        let pipeline = SubmissionPipeline::new(
            rpc.clone(),
            account_id.clone(),
            pool.clone(),
            nonces.clone(),
            builder.clone(),
            config.clone(),
        );
        info!(
            "Account {} ready with {} signing key(s)",
            account_id,
            pool.len()
        );
        Self {
            account_id,
            rpc,
            pool,
            nonces,
            builder,
            pipeline,
            config,
        }
    }

    /// Builds the RPC transport, account id and keys from configuration.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let transport = JsonRpcClient::new(&config.network).context("Failed to create RPC client")?;
        let account_id = config.account_id()?;
        let signers = config.load_signers()?;
        Ok(Self::new(
            account_id,
            signers,
            LedgerRpc::new(Arc::new(transport)),
            config.submission.clone(),
        ))
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn rpc(&self) -> &LedgerRpc {
        &self.rpc
    }

    pub fn pool(&self) -> &KeyPool {
        &self.pool
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Registers another local key for this account (already added on chain).
    pub fn add_signing_key(&self, signer: Arc<dyn Signer>) -> ClientResult<bool> {
        self.pool.add_identity(signer)
    }

    /// Closes the key pool; in-flight submissions finish, new ones fail.
    pub fn shutdown(&self) {
        self.pool.close();
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Signs and submits an arbitrary action list.
    pub async fn sign_and_submit_tx(
        &self,
        receiver_id: &AccountId,
        actions: Vec<Action>,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        self.pipeline.submit(receiver_id, actions, completion).await
    }

    pub async fn send_money(
        &self,
        receiver_id: &AccountId,
        amount: Balance,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        if amount == 0 {
            return Err(ClientError::validation("Transfer amount must be positive"));
        }
        self.sign_and_submit_tx(receiver_id, vec![Action::transfer(amount)], completion)
            .await
    }

    /// Calls a contract method with JSON arguments.
    ///
    /// `gas` falls back to the configured default.
    pub async fn function_call(
        &self,
        contract_id: &AccountId,
        method_name: &str,
        args: &Value,
        gas: Option<Gas>,
        deposit: Balance,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        let action = Action::function_call(
            method_name,
            args,
            gas.unwrap_or(self.config.default_gas),
            deposit,
        )?;
        self.sign_and_submit_tx(contract_id, vec![action], completion)
            .await
    }

    /// Creates a sub-account funded with `initial_balance` and owned by `public_key`.
    pub async fn create_account(
        &self,
        new_account_id: &AccountId,
        public_key: PublicKey,
        initial_balance: Balance,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        let actions = vec![
            Action::create_account(),
            Action::transfer(initial_balance),
            Action::add_full_access_key(public_key),
        ];
        self.sign_and_submit_tx(new_account_id, actions, completion)
            .await
    }

    /// Adds a function-call access key restricted to `receiver_id`.
    pub async fn add_public_key(
        &self,
        public_key: PublicKey,
        receiver_id: &AccountId,
        method_names: Vec<String>,
        allowance: Option<Balance>,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        let action =
            Action::add_function_call_key(public_key, receiver_id.clone(), method_names, allowance);
        self.sign_and_submit_tx(&self.account_id, vec![action], completion)
            .await
    }

    pub async fn add_full_access_public_key(
        &self,
        public_key: PublicKey,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        self.sign_and_submit_tx(
            &self.account_id,
            vec![Action::add_full_access_key(public_key)],
            completion,
        )
        .await
    }

    /// Deletes an access key. A local key with the same public key leaves the
    /// pool once the deletion succeeds.
    pub async fn delete_public_key(
        &self,
        public_key: PublicKey,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        let outcome = self
            .sign_and_submit_tx(&self.account_id, vec![Action::delete_key(public_key)], completion)
            .await?;
        if self.pool.retire(&public_key) {
            info!("Key {} deleted on chain, removed from pool", public_key);
        }
        Ok(outcome)
    }

    pub async fn deploy_contract(
        &self,
        code: Vec<u8>,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        self.sign_and_submit_tx(&self.account_id, vec![Action::deploy_contract(code)], completion)
            .await
    }

    /// Stakes with the account's own validator key.
    pub async fn stake(
        &self,
        public_key: PublicKey,
        amount: Balance,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        self.sign_and_submit_tx(
            &self.account_id,
            vec![Action::stake(amount, public_key)],
            completion,
        )
        .await
    }

    /// Points this account's code at a globally deployed contract.
    pub async fn use_global_contract(
        &self,
        identifier: GlobalContractIdentifier,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        self.sign_and_submit_tx(
            &self.account_id,
            vec![Action::use_global_contract(identifier)],
            completion,
        )
        .await
    }

    // ========================================================================
    // DELEGATE ACTIONS
    // ========================================================================

    /// Prepares a delegate action for a relayer to submit.
    ///
    /// Reserves a nonce on one of this account's keys and sets
    /// `max_block_height` to the latest final height plus
    /// `delegate_ttl_blocks`.
    pub async fn create_delegate_action(
        &self,
        receiver_id: &AccountId,
        actions: Vec<Action>,
    ) -> ClientResult<DelegateAction> {
        if actions.is_empty() {
            return Err(ClientError::validation("Delegate action has no actions"));
        }
        let mut lease = self.pool.acquire().await?;
        let block = self.builder.recent_block().await?;
        let nonce = self.nonces.next(lease.identity_mut()).await?;
        DelegateAction::new(
            self.account_id.clone(),
            receiver_id.clone(),
            actions,
            nonce,
            block.height + self.config.delegate_ttl_blocks,
            lease.public_key(),
        )
    }

    /// Signs with the pool key named in the delegate action.
    pub fn sign_delegate_action(&self, action: DelegateAction) -> ClientResult<SignedDelegateAction> {
        if action.sender_id != self.account_id {
            return Err(ClientError::validation(format!(
                "Delegate action sender {} is not {}",
                action.sender_id, self.account_id
            )));
        }
        let signer = self.pool.signer_for(&action.public_key).ok_or_else(|| {
            ClientError::Signing(format!("No local key {}", action.public_key))
        })?;
        action.sign(signer.as_ref())
    }

    /// Relays someone else's signed delegate action, paying its gas.
    pub async fn call_delegate_transaction(
        &self,
        signed: SignedDelegateAction,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        if !signed.verify() {
            return Err(ClientError::Signing(
                "Delegate action signature does not verify".to_string(),
            ));
        }
        let receiver_id = signed.delegate_action.sender_id.clone();
        self.sign_and_submit_tx(&receiver_id, vec![Action::Delegate(signed)], completion)
            .await
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Read-only contract call with JSON arguments.
    pub async fn view_function(
        &self,
        contract_id: &AccountId,
        method_name: &str,
        args: &Value,
    ) -> ClientResult<ViewFunctionResult> {
        self.rpc
            .call_function(contract_id, method_name, args)
            .await
            .map_err(|e| match e {
                RpcError::Handler { name, data } => {
                    ClientError::ViewFunction(format!("{}.{} failed ({}): {}", contract_id, method_name, name, data))
                }
                other => other.into(),
            })
    }

    /// Access key of this account; defaults to the pool's primary key.
    pub async fn get_access_key(&self, public_key: Option<&PublicKey>) -> ClientResult<AccessKeyView> {
        let public_key = match public_key {
            Some(pk) => *pk,
            None => self
                .pool
                .primary_signer()
                .map(|s| s.public_key())
                .ok_or_else(|| ClientError::validation("Account has no signing keys"))?,
        };
        Ok(self.rpc.view_access_key(&self.account_id, &public_key).await?)
    }

    pub async fn get_access_key_list(&self, account_id: Option<&AccountId>) -> ClientResult<AccessKeyList> {
        let account_id = account_id.unwrap_or(&self.account_id);
        Ok(self.rpc.view_access_key_list(account_id).await?)
    }

    /// Liquid balance in yocto units.
    pub async fn get_balance(&self, account_id: Option<&AccountId>) -> ClientResult<Balance> {
        Ok(self.fetch_state(account_id).await?.amount)
    }

    pub async fn fetch_state(&self, account_id: Option<&AccountId>) -> ClientResult<AccountView> {
        let account_id = account_id.unwrap_or(&self.account_id);
        Ok(self.rpc.view_account(account_id).await?)
    }
}
