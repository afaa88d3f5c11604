//! Staking pool client
//!
//! Talks to a standard staking pool contract on behalf of one account.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::account::Account;
use crate::error::{ClientError, ClientResult};
use crate::primitives::{AccountId, Balance, Gas, TGAS};
use crate::service::{Completion, SubmissionOutcome};

const STAKING_GAS: Gas = 125 * TGAS;

pub struct StakingClient {
    account: Arc<Account>,
    pool_id: AccountId,
}

impl StakingClient {
    pub fn new(account: Arc<Account>, pool_id: AccountId) -> Self {
        Self { account, pool_id }
    }

    pub fn pool_id(&self) -> &AccountId {
        &self.pool_id
    }

    async fn balance_view(&self, method: &str, owner: Option<&AccountId>) -> ClientResult<Balance> {
        let owner = owner.unwrap_or(self.account.account_id());
        let raw: String = self
            .account
            .view_function(&self.pool_id, method, &json!({ "account_id": owner }))
            .await?
            .json()?;
        raw.parse()
            .map_err(|_| ClientError::ViewFunction(format!("Invalid {} result '{}'", method, raw)))
    }

    pub async fn staked_balance(&self, owner: Option<&AccountId>) -> ClientResult<Balance> {
        self.balance_view("get_account_staked_balance", owner).await
    }

    pub async fn unstaked_balance(&self, owner: Option<&AccountId>) -> ClientResult<Balance> {
        self.balance_view("get_account_unstaked_balance", owner).await
    }

    /// Deposits `amount` and stakes it in one call.
    pub async fn deposit_and_stake(
        &self,
        amount: Balance,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        if amount == 0 {
            return Err(ClientError::validation("Stake amount must be positive"));
        }
        info!("Staking {} with {}", amount, self.pool_id);
        self.account
            .function_call(
                &self.pool_id,
                "deposit_and_stake",
                &json!({}),
                Some(STAKING_GAS),
                amount,
                completion,
            )
            .await
    }

    /// Unstakes `amount`; funds become withdrawable after the unbonding period.
    pub async fn unstake(&self, amount: Balance, completion: Completion) -> ClientResult<SubmissionOutcome> {
        if amount == 0 {
            return Err(ClientError::validation("Unstake amount must be positive"));
        }
        self.account
            .function_call(
                &self.pool_id,
                "unstake",
                &json!({ "amount": amount.to_string() }),
                Some(STAKING_GAS),
                0,
                completion,
            )
            .await
    }

    pub async fn withdraw_all(&self, completion: Completion) -> ClientResult<SubmissionOutcome> {
        self.account
            .function_call(
                &self.pool_id,
                "withdraw_all",
                &json!({}),
                Some(STAKING_GAS),
                0,
                completion,
            )
            .await
    }
}
