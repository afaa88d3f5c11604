//! Typed ledger RPC methods over any [`RpcTransport`].

use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

use super::views::{
    AccessKeyList, AccessKeyView, AccountView, BlockView, FinalExecutionOutcome, StatusView,
    ViewFunctionResult,
};
use super::RpcTransport;
use crate::error::RpcError;
use crate::primitives::{AccountId, CryptoHash, PublicKey};

/// How long `tx` / `send_tx` should block on the node before answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxWait {
    /// Return whatever is known right now.
    None,
    Included,
    ExecutedOptimistic,
    Final,
}

impl TxWait {
    fn as_str(self) -> &'static str {
        match self {
            TxWait::None => "NONE",
            TxWait::Included => "INCLUDED",
            TxWait::ExecutedOptimistic => "EXECUTED_OPTIMISTIC",
            TxWait::Final => "FINAL",
        }
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value)
        .map_err(|e| RpcError::Malformed(format!("Failed to parse {} response: {}", method, e)))
}

/// Typed methods shared by every component that talks to the node.
///
/// Cheap to clone; clones share the underlying transport.
#[derive(Clone)]
pub struct LedgerRpc {
    transport: Arc<dyn RpcTransport>,
}

impl LedgerRpc {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn RpcTransport> {
        &self.transport
    }

    /// Raw call for methods without a typed wrapper.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.transport.call(method, params).await
    }

    async fn query(&self, params: Value) -> Result<Value, RpcError> {
        let result = self.transport.call("query", params).await?;
        // Older nodes report some query failures inside the result.
        if let Some(message) = result.get("error").and_then(Value::as_str) {
            return Err(RpcError::Handler {
                name: "QUERY_ERROR".to_string(),
                data: Value::String(message.to_string()),
            });
        }
        Ok(result)
    }

    pub async fn view_access_key(
        &self,
        account_id: &AccountId,
        public_key: &PublicKey,
    ) -> Result<AccessKeyView, RpcError> {
        let result = self
            .query(json!({
                "request_type": "view_access_key",
                "finality": "optimistic",
                "account_id": account_id,
                "public_key": public_key,
            }))
            .await
            .map_err(|e| match e {
                RpcError::Handler { name, .. } if name == "QUERY_ERROR" => {
                    RpcError::UnknownAccessKey(public_key.to_string())
                }
                other => other,
            })?;
        decode("view_access_key", result)
    }

    pub async fn view_access_key_list(&self, account_id: &AccountId) -> Result<AccessKeyList, RpcError> {
        let result = self
            .query(json!({
                "request_type": "view_access_key_list",
                "finality": "optimistic",
                "account_id": account_id,
            }))
            .await?;
        decode("view_access_key_list", result)
    }

    pub async fn view_account(&self, account_id: &AccountId) -> Result<AccountView, RpcError> {
        let result = self
            .query(json!({
                "request_type": "view_account",
                "finality": "optimistic",
                "account_id": account_id,
            }))
            .await?;
        decode("view_account", result)
    }

    /// Read-only contract call with JSON arguments.
    pub async fn call_function(
        &self,
        contract_id: &AccountId,
        method_name: &str,
        args: &Value,
    ) -> Result<ViewFunctionResult, RpcError> {
        let args = serde_json::to_vec(args)
            .map_err(|e| RpcError::Malformed(format!("Failed to encode view args: {}", e)))?;
        let result = self
            .query(json!({
                "request_type": "call_function",
                "finality": "optimistic",
                "account_id": contract_id,
                "method_name": method_name,
                "args_base64": general_purpose::STANDARD.encode(args),
            }))
            .await?;
        decode("call_function", result)
    }

    pub async fn block_final(&self) -> Result<BlockView, RpcError> {
        let result = self
            .transport
            .call("block", json!({"finality": "final"}))
            .await?;
        decode("block", result)
    }

    /// Returns the transaction hash once the node accepts the bytes.
    pub async fn broadcast_tx_async(&self, signed_tx_base64: &str) -> Result<CryptoHash, RpcError> {
        let result = self
            .transport
            .call("broadcast_tx_async", json!([signed_tx_base64]))
            .await?;
        decode("broadcast_tx_async", result)
    }

    pub async fn broadcast_tx_commit(
        &self,
        signed_tx_base64: &str,
    ) -> Result<FinalExecutionOutcome, RpcError> {
        let result = self
            .transport
            .call("broadcast_tx_commit", json!([signed_tx_base64]))
            .await?;
        decode("broadcast_tx_commit", result)
    }

    /// `send_tx` blocking until the transaction lands in a block.
    pub async fn send_tx_included(
        &self,
        signed_tx_base64: &str,
    ) -> Result<FinalExecutionOutcome, RpcError> {
        let result = self
            .transport
            .call(
                "send_tx",
                json!({
                    "signed_tx_base64": signed_tx_base64,
                    "wait_until": TxWait::Included.as_str(),
                }),
            )
            .await?;
        decode("send_tx", result)
    }

    pub async fn tx_status(
        &self,
        tx_hash: &CryptoHash,
        sender_id: &AccountId,
        wait: TxWait,
    ) -> Result<FinalExecutionOutcome, RpcError> {
        let result = self
            .transport
            .call(
                "tx",
                json!({
                    "tx_hash": tx_hash,
                    "sender_account_id": sender_id,
                    "wait_until": wait.as_str(),
                }),
            )
            .await?;
        decode("tx", result)
    }

    pub async fn status(&self) -> Result<StatusView, RpcError> {
        let result = self.transport.call("status", json!([])).await?;
        decode("status", result)
    }
}
