//! Fungible token (NEP-141) client

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::account::Account;
use crate::error::{ClientError, ClientResult};
use crate::primitives::{dec_format, AccountId, Balance, Gas, TGAS};
use crate::service::{Completion, SubmissionOutcome};

/// Deposit required by `ft_transfer` / `ft_transfer_call`.
pub const ONE_YOCTO: Balance = 1;

/// Storage registration cost on most NEP-141 contracts.
pub const STORAGE_DEPOSIT: Balance = 1_250_000_000_000_000_000_000;

const TRANSFER_CALL_GAS: Gas = 100 * TGAS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtMetadata {
    pub spec: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    pub decimals: u8,
}

/// NEP-145 storage balance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageBalance {
    #[serde(with = "dec_format")]
    pub total: Balance,
    #[serde(with = "dec_format")]
    pub available: Balance,
}

/// Token calls made on behalf of one account.
pub struct FtClient {
    account: Arc<Account>,
}

impl FtClient {
    pub fn new(account: Arc<Account>) -> Self {
        Self { account }
    }

    /// Token balance; defaults to the client's own account.
    pub async fn balance_of(&self, token: &AccountId, owner: Option<&AccountId>) -> ClientResult<Balance> {
        let owner = owner.unwrap_or(self.account.account_id());
        let raw: String = self
            .account
            .view_function(token, "ft_balance_of", &json!({ "account_id": owner }))
            .await?
            .json()?;
        raw.parse()
            .map_err(|_| ClientError::ViewFunction(format!("Invalid ft_balance_of result '{}'", raw)))
    }

    pub async fn metadata(&self, token: &AccountId) -> ClientResult<FtMetadata> {
        self.account
            .view_function(token, "ft_metadata", &json!({}))
            .await?
            .json()
    }

    pub async fn transfer(
        &self,
        token: &AccountId,
        receiver_id: &AccountId,
        amount: Balance,
        memo: Option<&str>,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        if amount == 0 {
            return Err(ClientError::validation("Token amount must be positive"));
        }
        let args = json!({
            "receiver_id": receiver_id,
            "amount": amount.to_string(),
            "memo": memo,
        });
        self.account
            .function_call(token, "ft_transfer", &args, None, ONE_YOCTO, completion)
            .await
    }

    /// Transfers and calls `ft_on_transfer` on the receiver with `msg`.
    pub async fn transfer_call(
        &self,
        token: &AccountId,
        receiver_id: &AccountId,
        amount: Balance,
        msg: &str,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        if amount == 0 {
            return Err(ClientError::validation("Token amount must be positive"));
        }
        let args = json!({
            "receiver_id": receiver_id,
            "amount": amount.to_string(),
            "msg": msg,
        });
        self.account
            .function_call(
                token,
                "ft_transfer_call",
                &args,
                Some(TRANSFER_CALL_GAS),
                ONE_YOCTO,
                completion,
            )
            .await
    }

    /// `None` when the account is not registered with the token.
    pub async fn storage_balance_of(
        &self,
        token: &AccountId,
        account_id: &AccountId,
    ) -> ClientResult<Option<StorageBalance>> {
        self.account
            .view_function(token, "storage_balance_of", &json!({ "account_id": account_id }))
            .await?
            .json()
    }

    /// Registers `account_id` with the token, paying `amount`
    /// (defaults to [`STORAGE_DEPOSIT`]).
    pub async fn storage_deposit(
        &self,
        token: &AccountId,
        account_id: &AccountId,
        amount: Option<Balance>,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        self.account
            .function_call(
                token,
                "storage_deposit",
                &json!({ "account_id": account_id }),
                None,
                amount.unwrap_or(STORAGE_DEPOSIT),
                completion,
            )
            .await
    }

    /// Registers `account_id` only if it has no storage balance yet.
    ///
    /// Returns whether a deposit was made.
    pub async fn ensure_storage(&self, token: &AccountId, account_id: &AccountId) -> ClientResult<bool> {
        if self.storage_balance_of(token, account_id).await?.is_some() {
            return Ok(false);
        }
        info!("Registering {} with token {}", account_id, token);
        self.storage_deposit(token, account_id, None, Completion::Executed)
            .await?;
        Ok(true)
    }
}
