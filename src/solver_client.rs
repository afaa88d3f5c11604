//! Solver Gateway
//!
//! HTTP client for the off-chain solver network: quote discovery, intent
//! publication, dry-run simulation and settlement polling.
//!
//! Endpoints (relative to the configured base URL):
//! - `POST /quote`
//! - `POST /publish_intent`, `POST /publish_intents`
//! - `POST /simulate`
//! - `GET /settlement/{intent_hash}`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SolverApiConfig;
use crate::error::{ClientError, ClientResult};
use crate::intents::{Commitment, SimulationResult, TokenId};
use crate::router::{Quote, QuoteAmount, QuoteSource};

// ============================================================================
// WIRE STRUCTURES
// ============================================================================

/// Body of `POST /quote`. Exactly one of the amount fields is set.
#[derive(Debug, Clone, Serialize)]
struct QuoteRequest<'a> {
    defuse_asset_identifier_in: &'a str,
    defuse_asset_identifier_out: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exact_amount_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exact_amount_out: Option<String>,
    min_deadline_ms: u64,
}

/// One solver's answer to a quote request.
#[derive(Debug, Clone, Deserialize)]
pub struct SolverQuote {
    pub quote_hash: String,
    pub amount_in: String,
    pub amount_out: String,
    /// RFC 3339 instant after which the quote hash is void
    #[serde(default)]
    pub expiration_time: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    pub defuse_asset_identifier_in: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    pub defuse_asset_identifier_out: Option<String>,
}

/// Response of both publish endpoints.
#[derive(Debug, Clone, Deserialize)]
struct PublishResponse {
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    intent_hash: Option<String>,
    #[serde(default)]
    intent_hashes: Option<Vec<String>>,
}

/// Settlement state of a published intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementStatus {
    Pending,
    /// Settled on chain by the given transaction.
    Settled { tx_hash: String },
    /// Any other solver status (e.g. `NOT_FOUND_OR_NOT_VALID`).
    Failed { status: String },
}

/// Solver endpoints sometimes wrap bodies as `{"result": ...}`.
fn unwrap_result(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn parse_amount(raw: &str, field: &str) -> ClientResult<u128> {
    raw.parse()
        .map_err(|_| ClientError::Solver(format!("Invalid {} '{}' in quote", field, raw)))
}

// ============================================================================
// GATEWAY
// ============================================================================

/// HTTP client for the solver network.
pub struct SolverGateway {
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client with configured headers and timeout
    client: Client,
    min_deadline_ms: u64,
    poll_interval: Duration,
    settlement_timeout: Duration,
}

impl SolverGateway {
    /// Creates a gateway.
    ///
    /// # Arguments
    ///
    /// * `config` - Base URL, optional auth headers, timeouts
    ///
    /// # Returns
    ///
    /// * `Ok(SolverGateway)` - Client created
    /// * `Err(ClientError::Validation)` - Invalid header or HTTP client setup failure
    pub fn new(config: &SolverApiConfig) -> ClientResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ClientError::validation(format!("Invalid header name '{}': {}", name, e))
            })?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| ClientError::validation(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .default_headers(headers)
            .no_proxy()
            .build()
            .map_err(|e| ClientError::validation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            min_deadline_ms: config.min_deadline_ms,
            poll_interval: Duration::from_millis(config.settlement_poll_interval_ms),
            settlement_timeout: Duration::from_millis(config.settlement_timeout_ms),
        })
    }

    pub fn settlement_timeout(&self) -> Duration {
        self.settlement_timeout
    }

    async fn post(&self, path: &str, body: &Value) -> ClientResult<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Solver(format!("Failed to send POST /{} request: {}", path, e)))?;
        Self::read_body(response, path).await
    }

    async fn get(&self, path: &str) -> ClientResult<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Solver(format!("Failed to send GET /{} request: {}", path, e)))?;
        Self::read_body(response, path).await
    }

    async fn read_body(response: reqwest::Response, path: &str) -> ClientResult<Value> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Solver(format!("Failed to read /{} response: {}", path, e)))?;
        if !status.is_success() {
            return Err(ClientError::Solver(format!(
                "/{} returned HTTP {}: {}",
                path, status, text
            )));
        }
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| ClientError::Solver(format!("Failed to parse /{} response: {}", path, e)))?;
        Ok(unwrap_result(body))
    }

    // ========================================================================
    // QUOTES
    // ========================================================================

    /// All quotes solvers offer for the pair, best first.
    ///
    /// Sells are ordered by `amount_out` descending, buys by `amount_in`
    /// ascending. An empty or `null` answer is an empty list.
    pub async fn quotes(
        &self,
        token_in: &TokenId,
        token_out: &TokenId,
        amount: QuoteAmount,
    ) -> ClientResult<Vec<SolverQuote>> {
        let (exact_amount_in, exact_amount_out) = match amount {
            QuoteAmount::ExactIn(a) => (Some(a.to_string()), None),
            QuoteAmount::ExactOut(a) => (None, Some(a.to_string())),
        };
        let request = QuoteRequest {
            defuse_asset_identifier_in: token_in.as_str(),
            defuse_asset_identifier_out: token_out.as_str(),
            exact_amount_in,
            exact_amount_out,
            min_deadline_ms: self.min_deadline_ms,
        };
        let body = self.post("quote", &serde_json::to_value(&request)?).await?;
        if body.is_null() {
            return Ok(Vec::new());
        }
        let mut quotes: Vec<SolverQuote> = serde_json::from_value(body)
            .map_err(|e| ClientError::Solver(format!("Failed to parse quotes: {}", e)))?;

        let mut keyed = Vec::with_capacity(quotes.len());
        for q in quotes.drain(..) {
            let key = match amount {
                QuoteAmount::ExactIn(_) => parse_amount(&q.amount_out, "amount_out")?,
                QuoteAmount::ExactOut(_) => parse_amount(&q.amount_in, "amount_in")?,
            };
            keyed.push((key, q));
        }
        match amount {
            QuoteAmount::ExactIn(_) => keyed.sort_by(|a, b| b.0.cmp(&a.0)),
            QuoteAmount::ExactOut(_) => keyed.sort_by(|a, b| a.0.cmp(&b.0)),
        }
        Ok(keyed.into_iter().map(|(_, q)| q).collect())
    }

    /// Best quote as a router [`Quote`], or `None` when nobody quotes.
    pub async fn best_quote(
        &self,
        token_in: &TokenId,
        token_out: &TokenId,
        amount: QuoteAmount,
    ) -> ClientResult<Option<Quote>> {
        let quotes = self.quotes(token_in, token_out, amount).await?;
        let Some(best) = quotes.into_iter().next() else {
            debug!("No quotes for {} -> {}", token_in, token_out);
            return Ok(None);
        };
        let expires_at = match &best.expiration_time {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| ClientError::Solver(format!("Invalid expiration_time '{}': {}", raw, e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        Ok(Some(Quote {
            token_in: token_in.clone(),
            token_out: token_out.clone(),
            amount_in: parse_amount(&best.amount_in, "amount_in")?,
            amount_out: parse_amount(&best.amount_out, "amount_out")?,
            quote_hashes: vec![best.quote_hash],
            expires_at,
        }))
    }

    // ========================================================================
    // PUBLICATION
    // ========================================================================

    /// Publishes one commitment.
    ///
    /// # Arguments
    ///
    /// * `commitment` - Signed intent batch
    /// * `quote_hashes` - Quotes the batch redeems (empty for plain transfers)
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Solver-assigned intent hash
    /// * `Err(ClientError::SolverRejected)` - Status other than `OK`, with the solver's reason
    pub async fn publish(&self, commitment: &Commitment, quote_hashes: &[String]) -> ClientResult<String> {
        let body = json!({
            "signed_data": commitment.to_json()?,
            "quote_hashes": quote_hashes,
        });
        let response = self.publish_request("publish_intent", &body).await?;
        let hash = response
            .intent_hash
            .ok_or_else(|| ClientError::Solver("publish_intent response has no intent_hash".to_string()))?;
        info!("Published intent {}", hash);
        Ok(hash)
    }

    /// Publishes several commitments to settle together.
    pub async fn publish_many(
        &self,
        commitments: &[Commitment],
        quote_hashes: &[String],
    ) -> ClientResult<Vec<String>> {
        if commitments.is_empty() {
            return Err(ClientError::validation("No commitments to publish"));
        }
        let signed = commitments
            .iter()
            .map(Commitment::to_json)
            .collect::<ClientResult<Vec<_>>>()?;
        let body = json!({
            "signed_datas": signed,
            "quote_hashes": quote_hashes,
        });
        let response = self.publish_request("publish_intents", &body).await?;
        let hashes = response
            .intent_hashes
            .ok_or_else(|| ClientError::Solver("publish_intents response has no intent_hashes".to_string()))?;
        info!("Published {} intents", hashes.len());
        Ok(hashes)
    }

    async fn publish_request(&self, path: &str, body: &Value) -> ClientResult<PublishResponse> {
        let response: PublishResponse = serde_json::from_value(self.post(path, body).await?)
            .map_err(|e| ClientError::Solver(format!("Failed to parse /{} response: {}", path, e)))?;
        if response.status != "OK" {
            let reason = response.reason.unwrap_or(response.status);
            warn!("Solver rejected /{}: {}", path, reason);
            return Err(ClientError::SolverRejected(reason));
        }
        Ok(response)
    }

    // ========================================================================
    // SIMULATION
    // ========================================================================

    /// Dry-runs a commitment. Touches no chain state and consumes no nonce.
    ///
    /// # Returns
    ///
    /// * `Ok(SimulationResult)` - The batch would execute
    /// * `Err(ClientError::Simulation)` - It would fail; `payload` is the solver's full answer
    pub async fn simulate(&self, commitment: &Commitment) -> ClientResult<SimulationResult> {
        let body = json!({ "signed": [commitment.to_json()?] });
        let payload = self.post("simulate", &body).await?;
        let result: SimulationResult = serde_json::from_value(payload.clone())
            .map_err(|e| ClientError::Solver(format!("Failed to parse /simulate response: {}", e)))?;
        if let Some(message) = result.error_msg {
            warn!("Simulation of {} failed: {}", commitment.hash(), message);
            return Err(ClientError::Simulation { message, payload });
        }
        debug!(
            "Simulation of {} ok, {} intent(s) executed",
            commitment.hash(),
            result.intents_executed.len()
        );
        Ok(result)
    }

    // ========================================================================
    // SETTLEMENT
    // ========================================================================

    pub async fn get_status(&self, intent_hash: &str) -> ClientResult<SettlementStatus> {
        let body = self.get(&format!("settlement/{}", intent_hash)).await?;
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Solver(format!("Settlement response has no status: {}", body)))?;
        Ok(match status {
            "PENDING" => SettlementStatus::Pending,
            "SETTLED" => {
                let tx_hash = body
                    .pointer("/data/hash")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ClientError::Solver("SETTLED response has no data.hash".to_string()))?;
                SettlementStatus::Settled {
                    tx_hash: tx_hash.to_string(),
                }
            }
            other => SettlementStatus::Failed {
                status: other.to_string(),
            },
        })
    }

    /// Polls until the intent settles, fails, or `timeout` elapses.
    ///
    /// # Returns
    ///
    /// * `Some(tx_hash)` - Settled
    /// * `None` - Not settled within `timeout`, or the solver reported a
    ///   failure status; settlement may still happen later in the first case
    ///
    /// A `timeout` too large to represent (e.g. `Duration::MAX`) polls
    /// until a final status arrives.
    pub async fn poll_settlement(&self, intent_hash: &str, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            match self.get_status(intent_hash).await {
                Ok(SettlementStatus::Settled { tx_hash }) => {
                    info!("Intent {} settled in {}", intent_hash, tx_hash);
                    return Some(tx_hash);
                }
                Ok(SettlementStatus::Failed { status }) => {
                    error!("Intent {} not settled: {}", intent_hash, status);
                    return None;
                }
                Ok(SettlementStatus::Pending) => debug!("Intent {} pending", intent_hash),
                Err(e) => warn!("Settlement status of {} unavailable: {}", intent_hash, e),
            }
            let next_poll = tokio::time::Instant::now().checked_add(self.poll_interval);
            if matches!((next_poll, deadline), (Some(next), Some(deadline)) if next > deadline) {
                warn!("Intent {} not settled after {:?}", intent_hash, timeout);
                return None;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl QuoteSource for SolverGateway {
    /// Quote failures and timeouts read as "no quote".
    async fn quote(
        &self,
        token_in: &TokenId,
        token_out: &TokenId,
        amount: QuoteAmount,
    ) -> ClientResult<Option<Quote>> {
        match self.best_quote(token_in, token_out, amount).await {
            Ok(quote) => Ok(quote),
            Err(e) => {
                warn!("Quote {} -> {} unavailable: {}", token_in, token_out, e);
                Ok(None)
            }
        }
    }
}
