//! Typed RPC response views

use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;
use crate::primitives::{dec_format, Balance, BlockHeight, CryptoHash, Nonce, PublicKey};

// ============================================================================
// ACCESS KEYS AND ACCOUNTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyView {
    pub nonce: Nonce,
    /// `"FullAccess"` or `{"FunctionCall": {...}}`
    pub permission: Value,
    #[serde(default)]
    pub block_height: BlockHeight,
    #[serde(default)]
    pub block_hash: Option<CryptoHash>,
}

impl AccessKeyView {
    pub fn is_full_access(&self) -> bool {
        self.permission.as_str() == Some("FullAccess")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyInfo {
    pub public_key: PublicKey,
    pub access_key: AccessKeyView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyList {
    pub keys: Vec<AccessKeyInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    #[serde(with = "dec_format")]
    pub amount: Balance,
    #[serde(with = "dec_format")]
    pub locked: Balance,
    pub code_hash: String,
    pub storage_usage: u64,
    #[serde(default)]
    pub block_height: BlockHeight,
}

// ============================================================================
// BLOCKS AND NODE STATUS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeaderView {
    pub height: BlockHeight,
    pub hash: CryptoHash,
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockView {
    pub header: BlockHeaderView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncInfo {
    pub latest_block_hash: CryptoHash,
    pub latest_block_height: BlockHeight,
    #[serde(default)]
    pub syncing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeVersion {
    pub version: String,
    #[serde(default)]
    pub build: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusView {
    pub chain_id: String,
    pub sync_info: SyncInfo,
    pub version: NodeVersion,
}

// ============================================================================
// EXECUTION OUTCOMES
// ============================================================================

/// Overall transaction status as reported by the node.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub enum FinalExecutionStatus {
    #[default]
    NotStarted,
    Started,
    /// Remote diagnostic, e.g. `{"ActionError": {...}}`
    Failure(Value),
    /// Base64 return value of the last receipt
    SuccessValue(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionOutcome {
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub receipt_ids: Vec<CryptoHash>,
    #[serde(default)]
    pub gas_burnt: u64,
    #[serde(default)]
    pub executor_id: String,
    #[serde(default)]
    pub status: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionOutcomeWithId {
    pub id: CryptoHash,
    pub outcome: ExecutionOutcome,
}

/// Result of `broadcast_tx_commit`, `send_tx` and `tx`.
///
/// Fields beyond `final_execution_status` are absent when the node answers
/// before execution (for example `wait_until = INCLUDED`).
#[derive(Debug, Clone, Deserialize)]
pub struct FinalExecutionOutcome {
    /// NONE, INCLUDED, INCLUDED_FINAL, EXECUTED_OPTIMISTIC, EXECUTED, FINAL
    #[serde(default)]
    pub final_execution_status: Option<String>,
    #[serde(default)]
    pub status: FinalExecutionStatus,
    #[serde(default)]
    pub transaction_outcome: Option<ExecutionOutcomeWithId>,
    #[serde(default)]
    pub receipts_outcome: Vec<ExecutionOutcomeWithId>,
}

impl FinalExecutionOutcome {
    /// Execution finished, either way.
    pub fn is_executed(&self) -> bool {
        matches!(
            self.status,
            FinalExecutionStatus::Failure(_) | FinalExecutionStatus::SuccessValue(_)
        )
    }

    /// The transaction made it into a block.
    pub fn is_included(&self) -> bool {
        self.is_executed()
            || self.transaction_outcome.is_some()
            || matches!(
                self.final_execution_status.as_deref(),
                Some(s) if s != "NONE"
            )
    }

    pub fn failure(&self) -> Option<&Value> {
        match &self.status {
            FinalExecutionStatus::Failure(v) => Some(v),
            _ => None,
        }
    }

    /// Decoded return value of a successful execution.
    pub fn success_value(&self) -> Option<Vec<u8>> {
        match &self.status {
            FinalExecutionStatus::SuccessValue(b64) => general_purpose::STANDARD.decode(b64).ok(),
            _ => None,
        }
    }

    /// Logs of the transaction and every receipt, in execution order.
    pub fn logs(&self) -> Vec<&str> {
        self.transaction_outcome
            .iter()
            .chain(self.receipts_outcome.iter())
            .flat_map(|o| o.outcome.logs.iter().map(String::as_str))
            .collect()
    }
}

// ============================================================================
// VIEW FUNCTIONS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ViewFunctionResult {
    pub result: Vec<u8>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub block_height: BlockHeight,
}

impl ViewFunctionResult {
    /// Decode the returned bytes as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.result).map_err(|e| {
            ClientError::ViewFunction(format!(
                "Failed to decode view result as JSON: {} ({})",
                e,
                String::from_utf8_lossy(&self.result)
            ))
        })
    }
}
