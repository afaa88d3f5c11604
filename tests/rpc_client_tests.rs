//! Tests for the JSON-RPC transport and typed ledger methods against a mock node

use omni_client::config::NetworkConfig;
use omni_client::error::RpcError;
use omni_client::rpc::{JsonRpcClient, LedgerRpc, RpcTransport};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{account_id, DUMMY_ACCOUNT_ID, DUMMY_BLOCK_HEIGHT, DUMMY_CONTRACT_ID};

fn network(urls: Vec<String>) -> NetworkConfig {
    NetworkConfig {
        rpc_urls: urls,
        request_timeout_ms: 2_000,
        transport_retries: 0,
        transport_backoff_ms: 10,
        ..NetworkConfig::default()
    }
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0", "id": "dontcare", "result": result
    }))
}

fn rpc_error(status: u16, error: Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "jsonrpc": "2.0", "id": "dontcare", "error": error
    }))
}

// ============================================================================
// TRANSPORT
// ============================================================================

/// What is tested: requests carry the JSON-RPC envelope and return the result member
/// Why: Every ledger method goes through this path
#[tokio::test]
async fn test_call_returns_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({"chain_id": "testnet"})))
        .mount(&server)
        .await;

    let client = JsonRpcClient::new(&network(vec![server.uri()])).unwrap();
    let result = client.call("status", json!([])).await.unwrap();
    assert_eq!(result["chain_id"], "testnet");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], "dontcare");
    assert_eq!(body["method"], "status");
    assert_eq!(body["params"], json!([]));
}

/// What is tested: a transport failure on the first endpoint fails over to the next
/// Why: One unreachable RPC provider must not stop the client
#[tokio::test]
async fn test_failover_to_next_endpoint() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&broken)
        .await;
    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!("done")))
        .mount(&healthy)
        .await;

    let client = JsonRpcClient::new(&network(vec![broken.uri(), healthy.uri()])).unwrap();
    assert_eq!(client.call("status", json!([])).await.unwrap(), json!("done"));
    assert_eq!(broken.received_requests().await.unwrap().len(), 1);
    assert_eq!(healthy.received_requests().await.unwrap().len(), 1);
}

/// What is tested: node errors are not failed over
/// Why: A second node would give the same answer, and resending could duplicate a transaction
#[tokio::test]
async fn test_node_error_not_failed_over() {
    let first = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(
            200,
            json!({"name": "HANDLER_ERROR", "cause": {"name": "UNKNOWN_ACCOUNT",
                   "info": {"requested_account_id": "ghost.near"}}}),
        ))
        .mount(&first)
        .await;
    let second = MockServer::start().await;

    let client = JsonRpcClient::new(&network(vec![first.uri(), second.uri()])).unwrap();
    let err = client.call("query", json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::UnknownAccount(ref a) if a == "ghost.near"));
    assert!(second.received_requests().await.unwrap().is_empty());
}

/// What is tested: exhausted passes return the last transport error
/// Why: Retries are bounded by transport_retries
#[tokio::test]
async fn test_retry_passes_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let mut config = network(vec![server.uri()]);
    config.transport_retries = 2;
    let client = JsonRpcClient::new(&config).unwrap();

    let err = client.call("status", json!([])).await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(ref m) if m.contains("502")));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

/// What is tested: an API key in the URL userinfo is sent as a bearer token
/// Why: Hosted RPC providers authenticate this way
#[tokio::test]
async fn test_bearer_from_userinfo() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer key123"))
        .respond_with(ok(json!("authorized")))
        .mount(&server)
        .await;

    let url = server.uri().replacen("http://", "http://key123@", 1);
    let client = JsonRpcClient::new(&network(vec![url])).unwrap();
    assert_eq!(
        client.call("status", json!([])).await.unwrap(),
        json!("authorized")
    );
}

/// What is tested: configured headers are sent with every request
/// Why: Some providers use a custom API key header
#[tokio::test]
async fn test_custom_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-api-key", "secret"))
        .respond_with(ok(json!(1)))
        .mount(&server)
        .await;

    let mut config = network(vec![server.uri()]);
    config.headers.insert("x-api-key".to_string(), "secret".to_string());
    let client = JsonRpcClient::new(&config).unwrap();
    assert_eq!(client.call("status", json!([])).await.unwrap(), json!(1));
}

/// What is tested: construction fails without endpoints or with an invalid URL
/// Why: Configuration mistakes surface before the first call
#[test]
fn test_new_validates_endpoints() {
    assert!(JsonRpcClient::new(&network(vec![])).is_err());
    assert!(JsonRpcClient::new(&network(vec!["::not a url::".to_string()])).is_err());
}

// ============================================================================
// ERROR CLASSIFICATION OVER HTTP
// ============================================================================

/// What is tested: a stale nonce rejection is classified with both nonces
/// Why: The submission pipeline resyncs from ak_nonce
#[tokio::test]
async fn test_invalid_nonce_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(
            200,
            json!({
                "name": "HANDLER_ERROR",
                "cause": {"name": "INVALID_TRANSACTION", "info": {}},
                "data": {"TxExecutionError": {"InvalidTxError": {"InvalidNonce": {"tx_nonce": 5, "ak_nonce": 9}}}}
            }),
        ))
        .mount(&server)
        .await;

    let client = JsonRpcClient::new(&network(vec![server.uri()])).unwrap();
    let err = client.call("broadcast_tx_commit", json!(["AA=="])).await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidNonce { tx_nonce: 5, ak_nonce: 9 }));
    assert!(err.is_stale_state());
}

/// What is tested: a node timeout delivered with HTTP 408 is classified as Timeout
/// Why: Timeouts switch the pipeline to status polling, not failover
#[tokio::test]
async fn test_timeout_classified_despite_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(
            408,
            json!({"name": "HANDLER_ERROR", "cause": {"name": "TIMEOUT_ERROR", "info": {}}}),
        ))
        .mount(&server)
        .await;

    let client = JsonRpcClient::new(&network(vec![server.uri()])).unwrap();
    let err = client.call("broadcast_tx_commit", json!(["AA=="])).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout));
}

/// What is tested: an expired transaction is classified as ExpiredTransaction
/// Why: Expiry triggers a block hash refresh
#[tokio::test]
async fn test_expired_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(
            200,
            json!({
                "name": "HANDLER_ERROR",
                "cause": {"name": "INVALID_TRANSACTION", "info": {}},
                "data": {"TxExecutionError": {"InvalidTxError": "Expired"}}
            }),
        ))
        .mount(&server)
        .await;

    let client = JsonRpcClient::new(&network(vec![server.uri()])).unwrap();
    let err = client.call("broadcast_tx_commit", json!(["AA=="])).await.unwrap_err();
    assert!(matches!(err, RpcError::ExpiredTransaction));
}

// ============================================================================
// TYPED METHODS
// ============================================================================

/// What is tested: view_account decodes string balances through the HTTP transport
/// Why: End-to-end read path
#[tokio::test]
async fn test_view_account_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({
            "amount": "1000000000000000000000000",
            "locked": "0",
            "code_hash": "11111111111111111111111111111111",
            "storage_usage": 100,
            "block_height": DUMMY_BLOCK_HEIGHT
        })))
        .mount(&server)
        .await;

    let rpc = LedgerRpc::new(Arc::new(
        JsonRpcClient::new(&network(vec![server.uri()])).unwrap(),
    ));
    let view = rpc.view_account(&account_id(DUMMY_ACCOUNT_ID)).await.unwrap();
    assert_eq!(view.amount, 1_000_000_000_000_000_000_000_000);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["method"], "query");
    assert_eq!(body["params"]["request_type"], "view_account");
    assert_eq!(body["params"]["account_id"], DUMMY_ACCOUNT_ID);
}

/// What is tested: call_function sends base64 args and returns raw result bytes
/// Why: View calls carry JSON both ways as bytes
#[tokio::test]
async fn test_call_function_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({
            "result": serde_json::to_vec(&json!({"balance": "42"})).unwrap(),
            "logs": [],
            "block_height": DUMMY_BLOCK_HEIGHT
        })))
        .mount(&server)
        .await;

    let rpc = LedgerRpc::new(Arc::new(
        JsonRpcClient::new(&network(vec![server.uri()])).unwrap(),
    ));
    let result = rpc
        .call_function(
            &account_id(DUMMY_CONTRACT_ID),
            "ft_balance_of",
            &json!({"account_id": DUMMY_ACCOUNT_ID}),
        )
        .await
        .unwrap();
    let value: Value = result.json().unwrap();
    assert_eq!(value["balance"], "42");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["params"]["method_name"], "ft_balance_of");
    // base64 of {"account_id":"alice.near"}
    assert_eq!(
        body["params"]["args_base64"],
        "eyJhY2NvdW50X2lkIjoiYWxpY2UubmVhciJ9"
    );
}
