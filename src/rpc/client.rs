//! JSON-RPC over HTTP
//!
//! Posts `{"jsonrpc":"2.0","id":"dontcare",...}` to the configured endpoints,
//! failing over in order and retrying whole passes on transport errors.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::RpcTransport;
use crate::config::NetworkConfig;
use crate::error::RpcError;

/// JSON-RPC request wrapper
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: &'a Value,
}

/// JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[allow(dead_code)]
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: Url,
    bearer: Option<String>,
}

impl Endpoint {
    /// `https://key@host/...` carries an API key in the userinfo part.
    fn parse(raw: &str) -> Result<Self, RpcError> {
        let mut url = Url::parse(raw)
            .map_err(|e| RpcError::Transport(format!("Invalid RPC URL '{}': {}", raw, e)))?;
        let bearer = if !url.username().is_empty() && url.password().is_none() {
            let key = url.username().to_string();
            url.set_username("")
                .map_err(|_| RpcError::Transport(format!("Invalid RPC URL '{}'", raw)))?;
            Some(key)
        } else {
            None
        };
        Ok(Self { url, bearer })
    }
}

/// HTTP transport for the ledger node
pub struct JsonRpcClient {
    /// HTTP client for JSON-RPC calls
    client: Client,
    /// Endpoints in failover order
    endpoints: Vec<Endpoint>,
    /// Extra passes over the endpoint list after transport failures
    retries: u32,
    backoff: Duration,
}

impl JsonRpcClient {
    /// Creates a new JSON-RPC client
    ///
    /// # Arguments
    ///
    /// * `config` - Network configuration (URLs, timeout, retry policy, headers)
    ///
    /// # Returns
    ///
    /// * `Ok(JsonRpcClient)` - Successfully created client
    /// * `Err(RpcError)` - No endpoints, an invalid URL, or an invalid header
    pub fn new(config: &NetworkConfig) -> Result<Self, RpcError> {
        if config.rpc_urls.is_empty() {
            return Err(RpcError::Transport("No RPC URLs configured".to_string()));
        }
        let endpoints = config
            .rpc_urls
            .iter()
            .map(|u| Endpoint::parse(u))
            .collect::<Result<Vec<_>, _>>()?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RpcError::Transport(format!("Invalid header name '{}': {}", name, e)))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| RpcError::Transport(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .default_headers(headers)
            .no_proxy()
            .build()
            .map_err(|e| RpcError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoints,
            retries: config.transport_retries,
            backoff: Duration::from_millis(config.transport_backoff_ms),
        })
    }

    /// Single request against one endpoint.
    async fn call_endpoint(
        &self,
        endpoint: &Endpoint,
        method: &str,
        params: &Value,
    ) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: "dontcare",
            method,
            params,
        };

        let mut builder = self.client.post(endpoint.url.clone()).json(&request);
        if let Some(key) = &endpoint.bearer {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Transport(format!("Request to {} timed out", endpoint.url))
            } else {
                RpcError::Transport(format!("Failed to send {} request: {}", method, e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to read {} response: {}", method, e)))?;

        // Node errors may arrive with non-2xx codes (e.g. 408 for TIMEOUT_ERROR),
        // so parse the body before looking at the status.
        match serde_json::from_str::<JsonRpcResponse>(&body) {
            Ok(parsed) => {
                if let Some(error) = parsed.error {
                    return Err(classify_error(&error));
                }
                match parsed.result {
                    Some(result) => Ok(result),
                    None if status.is_success() => Err(RpcError::Malformed(format!(
                        "{} response has neither result nor error",
                        method
                    ))),
                    None => Err(RpcError::Transport(format!("HTTP {} from {}", status, endpoint.url))),
                }
            }
            Err(_) if !status.is_success() => {
                Err(RpcError::Transport(format!("HTTP {} from {}", status, endpoint.url)))
            }
            Err(e) => Err(RpcError::Malformed(format!(
                "Failed to parse {} response: {}",
                method, e
            ))),
        }
    }
}

#[async_trait]
impl RpcTransport for JsonRpcClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let mut last_error = RpcError::Transport("No RPC endpoints".to_string());

        for pass in 0..=self.retries {
            if pass > 0 {
                let delay = self.backoff * 2u32.saturating_pow(pass - 1);
                warn!(
                    "RPC {} failed on all endpoints, retrying in {:?} (pass {}/{})",
                    method, delay, pass, self.retries
                );
                tokio::time::sleep(delay).await;
            }

            for endpoint in &self.endpoints {
                match self.call_endpoint(endpoint, method, &params).await {
                    Err(RpcError::Transport(msg)) => {
                        debug!("RPC {} transport error on {}: {}", method, endpoint.url, msg);
                        last_error = RpcError::Transport(msg);
                    }
                    other => return other,
                }
            }
        }

        Err(last_error)
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

/// Depth-first search for an object key anywhere in `value`.
fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

/// Whether `needle` appears as a string or an object key anywhere in `value`.
fn mentions(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s == needle,
        Value::Object(map) => map.contains_key(needle) || map.values().any(|v| mentions(v, needle)),
        Value::Array(items) => items.iter().any(|v| mentions(v, needle)),
        _ => false,
    }
}

/// Maps a JSON-RPC `error` member to an [`RpcError`].
///
/// Handles the structured form (`name` / `cause` / `data`) and falls back to
/// searching the payload for the transaction error variants.
pub fn classify_error(error: &Value) -> RpcError {
    let name = error.get("name").and_then(Value::as_str).unwrap_or("");
    let cause = error
        .get("cause")
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let info = error.get("cause").and_then(|c| c.get("info")).cloned().unwrap_or(Value::Null);

    match cause {
        "TIMEOUT_ERROR" => return RpcError::Timeout,
        "UNKNOWN_ACCESS_KEY" => {
            let key = info
                .get("public_key")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return RpcError::UnknownAccessKey(key);
        }
        "UNKNOWN_ACCOUNT" => {
            let account = info
                .get("requested_account_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return RpcError::UnknownAccount(account);
        }
        _ => {}
    }

    if let Some(nonce) = find_key(error, "InvalidNonce") {
        let tx_nonce = nonce.get("tx_nonce").and_then(Value::as_u64);
        let ak_nonce = nonce.get("ak_nonce").and_then(Value::as_u64);
        if let (Some(tx_nonce), Some(ak_nonce)) = (tx_nonce, ak_nonce) {
            return RpcError::InvalidNonce { tx_nonce, ak_nonce };
        }
    }
    if mentions(error, "Expired") {
        return RpcError::ExpiredTransaction;
    }

    let data = error.get("data").cloned().unwrap_or(Value::Null);
    if cause == "INVALID_TRANSACTION" || find_key(error, "InvalidTxError").is_some() {
        return RpcError::InvalidTransaction(data);
    }
    // Legacy servers report timeouts only in the free-text data field.
    if data.as_str() == Some("Timeout") {
        return RpcError::Timeout;
    }

    let name = if cause.is_empty() { name } else { cause };
    RpcError::Handler {
        name: if name.is_empty() { "UNKNOWN".to_string() } else { name.to_string() },
        data: if data.is_null() { error.clone() } else { data },
    }
}
