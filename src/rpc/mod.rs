//! Ledger RPC
//!
//! `RpcTransport` is the narrow seam to the node: one fallible JSON-RPC call.
//! `JsonRpcClient` implements it over HTTP; `LedgerRpc` layers typed
//! methods on top of any transport so tests can swap in an in-process mock.

pub mod client;
pub mod ledger;
pub mod views;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RpcError;

pub use client::{classify_error, JsonRpcClient};
pub use ledger::{LedgerRpc, TxWait};
pub use views::{
    AccessKeyInfo, AccessKeyList, AccessKeyView, AccountView, BlockView, ExecutionOutcome,
    ExecutionOutcomeWithId, FinalExecutionOutcome, FinalExecutionStatus, StatusView,
    ViewFunctionResult,
};

/// A single JSON-RPC call against the ledger node.
///
/// Implementations return the `result` member on success and a classified
/// [`RpcError`] otherwise. Transport-level retries belong here, not in callers.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}
