//! Shared test helpers for omni-client integration tests
//!
//! Constants, config builders and `MockRpc`, an in-process ledger node that
//! implements `RpcTransport` with scripted failures and simulated latency.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use omni_client::account::Account;
use omni_client::config::{ClientConfig, IntentsConfig, SolverApiConfig, SubmissionConfig};
use omni_client::crypto::{sha256, InMemorySigner, Signer};
use omni_client::error::RpcError;
use omni_client::primitives::{AccountId, CryptoHash, PublicKey};
use omni_client::rpc::{LedgerRpc, RpcTransport};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Dummy account that signs and pays
pub const DUMMY_ACCOUNT_ID: &str = "alice.near";

/// Dummy receiver account
pub const DUMMY_RECEIVER_ID: &str = "bob.near";

/// Dummy contract account
pub const DUMMY_CONTRACT_ID: &str = "contract.near";

/// Dummy verifying contract for intents
pub const DUMMY_VERIFYING_CONTRACT: &str = "intents.near";

/// Dummy fungible tokens
pub const DUMMY_TOKEN_WNEAR: &str = "nep141:wrap.near";
pub const DUMMY_TOKEN_USDT: &str = "nep141:usdt.tether-token.near";
pub const DUMMY_TOKEN_USDC: &str = "nep141:usdc.near";
pub const DUMMY_TOKEN_OTHER: &str = "nep141:other.near";

/// Access key nonce reported by the mock node on first sync
pub const DUMMY_REMOTE_NONCE: u64 = 100;

/// Block height reported by the mock node
pub const DUMMY_BLOCK_HEIGHT: u64 = 5_000;

/// Simulated latency of every broadcast
pub const DUMMY_LATENCY: Duration = Duration::from_millis(100);

// ============================================================================
// BUILDERS
// ============================================================================

pub fn account_id(id: &str) -> AccountId {
    id.parse().unwrap()
}

/// Deterministic signer; different `n` give different keys.
pub fn create_signer(n: u8) -> Arc<dyn Signer> {
    Arc::new(InMemorySigner::from_seed([n; 32]))
}

pub fn create_signers(count: u8) -> Vec<Arc<dyn Signer>> {
    (1..=count).map(create_signer).collect()
}

/// Submission policy with short poll intervals.
pub fn create_default_submission_config() -> SubmissionConfig {
    SubmissionConfig {
        max_attempts: 3,
        backoff_base_ms: 500,
        block_hash_ttl_ms: 50_000,
        status_poll_interval_ms: 1_000,
        status_poll_attempts: 5,
        ..SubmissionConfig::default()
    }
}

pub fn create_default_intents_config() -> IntentsConfig {
    IntentsConfig {
        verifying_contract: DUMMY_VERIFYING_CONTRACT.to_string(),
        ..IntentsConfig::default()
    }
}

/// Solver settings pointing at a mock server.
pub fn create_solver_config(base_url: &str) -> SolverApiConfig {
    SolverApiConfig {
        base_url: base_url.to_string(),
        request_timeout_ms: 2_000,
        settlement_poll_interval_ms: 50,
        settlement_timeout_ms: 500,
        ..SolverApiConfig::default()
    }
}

/// Config with one RPC URL and the dummy account.
pub fn create_default_config(rpc_url: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.network.rpc_urls = vec![rpc_url.to_string()];
    config.account.account_id = Some(DUMMY_ACCOUNT_ID.to_string());
    config
}

/// Account over a mock node with `keys` signing identities.
pub fn create_account(mock: &Arc<MockRpc>, keys: u8) -> Account {
    Account::new(
        account_id(DUMMY_ACCOUNT_ID),
        create_signers(keys),
        LedgerRpc::new(mock.clone()),
        create_default_submission_config(),
    )
}

// ============================================================================
// MOCK NODE
// ============================================================================

/// One transaction the mock node received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub method: String,
    pub hash: CryptoHash,
    pub public_key: PublicKey,
    pub nonce: u64,
    pub block_hash: CryptoHash,
    pub signer_id: String,
    pub receiver_id: String,
    /// Method name, JSON args and deposit of the first action, when it is a function call.
    pub function_call: Option<(String, Value, u128)>,
}

fn read_string(bytes: &[u8], offset: &mut usize) -> String {
    let len = u32::from_le_bytes(bytes[*offset..*offset + 4].try_into().unwrap()) as usize;
    let value = String::from_utf8(bytes[*offset + 4..*offset + 4 + len].to_vec()).unwrap();
    *offset += 4 + len;
    value
}

/// Decodes the parts of a borsh signed transaction the tests look at.
///
/// Layout: signer_id (u32 len + bytes), public key (tag + 32), nonce (u64),
/// receiver_id, block hash, actions, then a 65-byte signature.
pub fn decode_broadcast(method: &str, signed_b64: &str) -> Broadcast {
    let bytes = general_purpose::STANDARD.decode(signed_b64).unwrap();
    let tx = &bytes[..bytes.len() - 65];

    let mut offset = 0;
    let signer_id = read_string(tx, &mut offset);
    let mut key = [0u8; 32];
    key.copy_from_slice(&tx[offset + 1..offset + 33]);
    offset += 33;
    let nonce = u64::from_le_bytes(tx[offset..offset + 8].try_into().unwrap());
    offset += 8;
    let receiver_id = read_string(tx, &mut offset);
    let mut block_hash = [0u8; 32];
    block_hash.copy_from_slice(&tx[offset..offset + 32]);
    offset += 32;

    // Actions: u32 count, then the first action's enum tag. 2 is FunctionCall.
    let action_count = u32::from_le_bytes(tx[offset..offset + 4].try_into().unwrap());
    offset += 4;
    let function_call = if action_count > 0 && tx[offset] == 2 {
        offset += 1;
        let method_name = read_string(tx, &mut offset);
        let args_len = u32::from_le_bytes(tx[offset..offset + 4].try_into().unwrap()) as usize;
        let args = serde_json::from_slice(&tx[offset + 4..offset + 4 + args_len]).unwrap_or(Value::Null);
        offset += 4 + args_len + 8;
        let deposit = u128::from_le_bytes(tx[offset..offset + 16].try_into().unwrap());
        Some((method_name, args, deposit))
    } else {
        None
    };

    Broadcast {
        method: method.to_string(),
        hash: sha256(tx),
        public_key: PublicKey(key),
        nonce,
        block_hash: CryptoHash(block_hash),
        signer_id,
        receiver_id,
        function_call,
    }
}

pub fn success_outcome(hash: &CryptoHash) -> Value {
    json!({
        "final_execution_status": "EXECUTED_OPTIMISTIC",
        "status": {"SuccessValue": ""},
        "transaction_outcome": {
            "id": hash.to_string(),
            "outcome": {"logs": [], "executor_id": DUMMY_ACCOUNT_ID}
        },
        "receipts_outcome": [{
            "id": hash.to_string(),
            "outcome": {"logs": ["transfer done"], "executor_id": DUMMY_RECEIVER_ID}
        }]
    })
}

pub fn failure_outcome(hash: &CryptoHash, failure: &Value) -> Value {
    json!({
        "final_execution_status": "EXECUTED_OPTIMISTIC",
        "status": {"Failure": failure},
        "transaction_outcome": {
            "id": hash.to_string(),
            "outcome": {"logs": []}
        },
        "receipts_outcome": []
    })
}

/// In-process ledger node.
///
/// - `query` answers access keys (nonce from `remote_nonce`), accounts and
///   view calls registered with `set_view`.
/// - Broadcast methods sleep `latency`, record the transaction, then fail
///   with the next scripted error or succeed.
/// - `tx` answers with the scripted status or `UNKNOWN_TRANSACTION`.
pub struct MockRpc {
    pub latency: Duration,
    pub remote_nonce: AtomicU64,
    block_fetches: AtomicUsize,
    block_counter: AtomicU64,
    calls: Mutex<Vec<(String, Value)>>,
    broadcasts: Mutex<Vec<Broadcast>>,
    broadcast_errors: Mutex<VecDeque<RpcError>>,
    execution_failure: Mutex<Option<Value>>,
    tx_status: Mutex<Option<Value>>,
    views: Mutex<HashMap<String, Value>>,
    balance: Mutex<String>,
}

impl MockRpc {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            remote_nonce: AtomicU64::new(DUMMY_REMOTE_NONCE),
            block_fetches: AtomicUsize::new(0),
            block_counter: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            broadcast_errors: Mutex::new(VecDeque::new()),
            execution_failure: Mutex::new(None),
            tx_status: Mutex::new(None),
            views: Mutex::new(HashMap::new()),
            balance: Mutex::new("1000000000000000000000000".to_string()),
        })
    }

    /// Next broadcasts fail with these errors, in order.
    pub fn fail_broadcasts(&self, errors: Vec<RpcError>) {
        self.broadcast_errors.lock().unwrap().extend(errors);
    }

    /// Every executed transaction fails with this diagnostic.
    pub fn fail_execution(&self, failure: Value) {
        *self.execution_failure.lock().unwrap() = Some(failure);
    }

    /// `tx` answers with this outcome instead of `UNKNOWN_TRANSACTION`.
    pub fn set_tx_status(&self, outcome: Value) {
        *self.tx_status.lock().unwrap() = Some(outcome);
    }

    /// `call_function` of `method` returns `result` as JSON bytes.
    pub fn set_view(&self, method: &str, result: Value) {
        self.views.lock().unwrap().insert(method.to_string(), result);
    }

    pub fn set_balance(&self, amount: &str) {
        *self.balance.lock().unwrap() = amount.to_string();
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of `method`, in order.
    pub fn calls_of(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p)
            .collect()
    }

    /// Decoded args of every `call_function` query of `method_name`.
    pub fn view_args(&self, method_name: &str) -> Vec<Value> {
        self.calls_of("query")
            .into_iter()
            .filter(|p| p["request_type"] == "call_function" && p["method_name"] == method_name)
            .map(|p| {
                let raw = general_purpose::STANDARD
                    .decode(p["args_base64"].as_str().unwrap())
                    .unwrap();
                serde_json::from_slice(&raw).unwrap()
            })
            .collect()
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    fn query(&self, params: &Value) -> Result<Value, RpcError> {
        match params["request_type"].as_str() {
            Some("view_access_key") => Ok(json!({
                "nonce": self.remote_nonce.load(Ordering::SeqCst),
                "permission": "FullAccess",
                "block_height": DUMMY_BLOCK_HEIGHT,
                "block_hash": sha256(b"block").to_string(),
            })),
            Some("view_access_key_list") => Ok(json!({
                "keys": [{
                    "public_key": create_signer(1).public_key().to_string(),
                    "access_key": {"nonce": 7, "permission": "FullAccess"}
                }]
            })),
            Some("view_account") => Ok(json!({
                "amount": self.balance.lock().unwrap().clone(),
                "locked": "0",
                "code_hash": "11111111111111111111111111111111",
                "storage_usage": 182,
                "block_height": DUMMY_BLOCK_HEIGHT,
            })),
            Some("call_function") => {
                let method = params["method_name"].as_str().unwrap_or_default();
                match self.views.lock().unwrap().get(method) {
                    Some(result) => Ok(json!({
                        "result": serde_json::to_vec(result).unwrap(),
                        "logs": [],
                        "block_height": DUMMY_BLOCK_HEIGHT,
                    })),
                    None => Err(RpcError::Handler {
                        name: "CONTRACT_EXECUTION_ERROR".to_string(),
                        data: json!(format!("MethodNotFound: {}", method)),
                    }),
                }
            }
            other => Err(RpcError::Malformed(format!("unexpected query {:?}", other))),
        }
    }

    async fn broadcast(&self, method: &str, signed_b64: &str) -> Result<Value, RpcError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let tx = decode_broadcast(method, signed_b64);
        self.broadcasts.lock().unwrap().push(tx.clone());

        let scripted = self.broadcast_errors.lock().unwrap().pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }
        let failure = self.execution_failure.lock().unwrap().clone();
        Ok(match method {
            "broadcast_tx_async" => json!(tx.hash.to_string()),
            "send_tx" => json!({"final_execution_status": "INCLUDED"}),
            _ => match failure {
                Some(failure) => failure_outcome(&tx.hash, &failure),
                None => success_outcome(&tx.hash),
            },
        })
    }
}

#[async_trait]
impl RpcTransport for MockRpc {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        match method {
            "query" => self.query(&params),
            "block" => {
                self.block_fetches.fetch_add(1, Ordering::SeqCst);
                // Every fetch sees a new block.
                let n = self.block_counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({
                    "header": {
                        "height": DUMMY_BLOCK_HEIGHT + n,
                        "hash": sha256(&n.to_le_bytes()).to_string(),
                        "timestamp": 0
                    }
                }))
            }
            "broadcast_tx_async" | "broadcast_tx_commit" => {
                let body = params[0].as_str().unwrap_or_default().to_string();
                self.broadcast(method, &body).await
            }
            "send_tx" => {
                let body = params["signed_tx_base64"].as_str().unwrap_or_default().to_string();
                self.broadcast(method, &body).await
            }
            "tx" => {
                let scripted = self.tx_status.lock().unwrap().clone();
                scripted.ok_or_else(|| RpcError::Handler {
                    name: "UNKNOWN_TRANSACTION".to_string(),
                    data: Value::Null,
                })
            }
            "status" => Ok(json!({
                "chain_id": "testnet",
                "sync_info": {
                    "latest_block_hash": sha256(b"block").to_string(),
                    "latest_block_height": DUMMY_BLOCK_HEIGHT,
                    "syncing": false
                },
                "version": {"version": "2.0.0", "build": "test"}
            })),
            other => Err(RpcError::Malformed(format!("unexpected method {}", other))),
        }
    }
}
