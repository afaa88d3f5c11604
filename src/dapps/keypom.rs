//! Keypom linkdrop client
//!
//! Drops are created by the funding account. A linkdrop is claimed by the
//! drop's own key, which signs as the Keypom contract account.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::account::Account;
use crate::error::{ClientError, ClientResult};
use crate::primitives::{dec_format, AccountId, Balance, Gas, PublicKey, TGAS};
use crate::service::{Completion, SubmissionOutcome};

pub const KEYPOM_CONTRACT: &str = "keypom.near";
const CREATE_DROP_GAS: Gas = 100 * TGAS;
const CLAIM_GAS: Gas = 100 * TGAS;

// ============================================================================
// MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPermission {
    Claim,
    CreateAccountAndClaim,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTimeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropUsageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<DropPermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_deposit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_delete_drop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_withdraw: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_per_key: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DropTimeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<DropUsageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_account_id: Option<AccountId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lazy_register: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtDropData {
    pub contract_id: AccountId,
    pub sender_id: AccountId,
    #[serde(with = "dec_format")]
    pub balance_per_use: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftDropData {
    pub sender_id: AccountId,
    pub contract_id: AccountId,
}

/// One call made on claim. The `*_field` entries name args Keypom fills in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodData {
    pub receiver_id: AccountId,
    pub method_name: String,
    pub args: String,
    #[serde(with = "dec_format")]
    pub attached_deposit: Balance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_id_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id_field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FcConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_gas: Option<Gas>,
}

/// Function-call drop: per key use, either a list of calls or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FcData {
    pub methods: Vec<Option<Vec<MethodData>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<FcConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordForUse {
    pub pw: String,
    pub key_use: u32,
}

/// Arguments of `create_drop`. At most one of `simple`, `ft`, `nft`, `fc` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDrop {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_keys: Option<Vec<PublicKey>>,
    #[serde(with = "dec_format")]
    pub deposit_per_use: Balance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DropConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple: Option<SimpleData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ft: Option<FtDropData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft: Option<NftDropData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fc: Option<FcData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwords_per_use: Option<Vec<Option<Vec<PasswordForUse>>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwords_per_key: Option<Vec<Option<String>>>,
}

impl CreateDrop {
    fn check(&self) -> ClientResult<()> {
        let kinds = [
            self.simple.is_some(),
            self.ft.is_some(),
            self.nft.is_some(),
            self.fc.is_some(),
        ];
        if kinds.iter().filter(|set| **set).count() > 1 {
            return Err(ClientError::validation(
                "A drop is one of simple, ft, nft or fc",
            ));
        }
        if let (Some(keys), Some(passwords)) = (&self.public_keys, &self.passwords_per_key) {
            if keys.len() != passwords.len() {
                return Err(ClientError::validation(
                    "passwords_per_key needs one entry per public key",
                ));
            }
        }
        Ok(())
    }
}

/// `get_key_information` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyInfo {
    pub drop_id: String,
    pub pk: PublicKey,
    pub cur_key_use: u32,
    pub remaining_uses: u32,
    pub last_used: u64,
    #[serde(with = "dec_format")]
    pub allowance: Balance,
    pub key_id: u64,
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct KeypomClient {
    account: Arc<Account>,
    contract_id: AccountId,
}

impl KeypomClient {
    pub fn new(account: Arc<Account>, contract_id: AccountId) -> Self {
        Self {
            account,
            contract_id,
        }
    }

    pub fn contract_id(&self) -> &AccountId {
        &self.contract_id
    }

    /// Creates a drop funded with `deposit` and returns its id, if the
    /// contract reported one.
    pub async fn create_drop(&self, drop: &CreateDrop, deposit: Balance) -> ClientResult<Option<String>> {
        drop.check()?;
        info!(
            "Creating drop on {} with {} keys",
            self.contract_id,
            drop.public_keys.as_ref().map_or(0, Vec::len)
        );
        let outcome = self
            .account
            .function_call(
                &self.contract_id,
                "create_drop",
                &serde_json::to_value(drop)?,
                Some(CREATE_DROP_GAS),
                deposit,
                Completion::Executed,
            )
            .await?;
        drop_id_from(&outcome)
    }

    /// Claims a linkdrop into `account_id`. `drop_account` must hold the
    /// linkdrop key and sign as the Keypom contract.
    pub async fn claim(
        &self,
        drop_account: &Account,
        account_id: &AccountId,
        password: Option<&str>,
        completion: Completion,
    ) -> ClientResult<SubmissionOutcome> {
        if drop_account.account_id() != &self.contract_id {
            return Err(ClientError::validation(format!(
                "Linkdrop keys sign as {}, not {}",
                self.contract_id,
                drop_account.account_id()
            )));
        }
        let mut args = json!({ "account_id": account_id });
        if let Some(password) = password {
            args["password"] = password.into();
        }
        drop_account
            .function_call(&self.contract_id, "claim", &args, Some(CLAIM_GAS), 0, completion)
            .await
    }

    /// `None` when the key is not part of any drop.
    pub async fn get_key_information(&self, key: &PublicKey) -> ClientResult<Option<KeyInfo>> {
        self.account
            .view_function(&self.contract_id, "get_key_information", &json!({ "key": key }))
            .await?
            .json()
    }

    /// Number of unclaimed keys per drop, for drops owned by `owner`.
    pub async fn get_drop_supply(&self, owner: Option<&AccountId>) -> ClientResult<u64> {
        let owner = owner.unwrap_or(self.account.account_id());
        self.account
            .view_function(
                &self.contract_id,
                "get_drop_supply_for_owner",
                &json!({ "account_id": owner }),
            )
            .await?
            .json()
    }
}

fn drop_id_from(outcome: &SubmissionOutcome) -> ClientResult<Option<String>> {
    let value = outcome
        .execution_outcome()
        .and_then(|o| o.success_value())
        .unwrap_or_default();
    if value.is_empty() {
        return Ok(None);
    }
    // Keypom returns the id as a JSON string or number.
    match serde_json::from_slice::<serde_json::Value>(&value)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(id) => Ok(Some(id)),
        other => Ok(Some(other.to_string())),
    }
}
