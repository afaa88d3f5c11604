//! Error types
//!
//! Two layers: `RpcError` classifies what the ledger node (or the HTTP
//! path to it) reported, `ClientError` is what callers of this crate see.

use serde_json::Value;
use thiserror::Error;

/// Errors reported by the JSON-RPC transport or by the node itself.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    /// Connection refused/reset, HTTP timeout, non-200 status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The node gave up waiting; the transaction may still be processed.
    #[error("RPC timeout")]
    Timeout,

    #[error("Invalid nonce: tx nonce {tx_nonce}, access key nonce {ak_nonce}")]
    InvalidNonce { tx_nonce: u64, ak_nonce: u64 },

    #[error("Transaction expired: block hash is too old")]
    ExpiredTransaction,

    #[error("Unknown access key: {0}")]
    UnknownAccessKey(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(Value),

    #[error("RPC handler error {name}: {data}")]
    Handler { name: String, data: Value },

    #[error("Malformed RPC response: {0}")]
    Malformed(String),
}

impl RpcError {
    /// Nonce too low / already used, or the block hash fell out of the window.
    pub fn is_stale_state(&self) -> bool {
        matches!(
            self,
            RpcError::InvalidNonce { .. } | RpcError::ExpiredTransaction
        )
    }

    /// Failures where the request may not have been processed at all.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::Timeout)
    }

    /// The node has no record of the queried transaction (yet).
    pub fn is_unknown_transaction(&self) -> bool {
        matches!(self, RpcError::Handler { name, .. } if name == "UNKNOWN_TRANSACTION")
    }
}

/// Where a failed operation got to before it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// Rejected locally; no network call carried the request.
    NotSent,
    /// The network saw the request and refused it.
    Rejected,
    /// Accepted and executed, but execution failed.
    ExecutionFailed,
}

/// Caller-facing error taxonomy.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key pool is closed")]
    PoolClosed,

    #[error("Signing error: {0}")]
    Signing(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Transaction was included but a receipt failed (panic, balance, permissions).
    #[error("Execution failed for transaction {hash}: {failure}")]
    Execution { hash: String, failure: Value },

    /// Dry-run rejected by the solver. No nonce was consumed.
    #[error("Simulation failed: {message}")]
    Simulation { message: String, payload: Value },

    #[error("Solver rejected request: {0}")]
    SolverRejected(String),

    #[error("Solver API error: {0}")]
    Solver(String),

    #[error("View function error: {0}")]
    ViewFunction(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn reach(&self) -> Reach {
        match self {
            ClientError::Validation(_)
            | ClientError::PoolClosed
            | ClientError::Signing(_)
            | ClientError::Json(_) => Reach::NotSent,
            ClientError::Execution { .. } => Reach::ExecutionFailed,
            _ => Reach::Rejected,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }
}

impl From<near_account_id::ParseAccountError> for ClientError {
    fn from(err: near_account_id::ParseAccountError) -> Self {
        ClientError::Validation(format!("Invalid account id: {}", err))
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
