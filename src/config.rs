//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the client.
//! Configuration includes RPC endpoints, the signing account, submission
//! retry policy, the solver API and intent/router defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::{InMemorySigner, Signer};
use crate::primitives::{AccountId, Gas, TGAS};

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all client settings.
///
/// Every section is optional in the TOML file and falls back to defaults,
/// so an empty file yields a read-only mainnet client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Ledger RPC endpoints and transport policy
    #[serde(default)]
    pub network: NetworkConfig,
    /// Signing account (required for write operations only)
    #[serde(default)]
    pub account: AccountConfig,
    /// Transaction submission policy
    #[serde(default)]
    pub submission: SubmissionConfig,
    /// Solver network HTTP API
    #[serde(default)]
    pub solver: SolverApiConfig,
    /// Intent signing defaults
    #[serde(default)]
    pub intents: IntentsConfig,
    /// Quote routing
    #[serde(default)]
    pub router: RouterConfig,
}

/// Ledger RPC connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// RPC URLs, tried in order. `https://key@host` sends `key` as a bearer token.
    #[serde(default = "default_rpc_urls")]
    pub rpc_urls: Vec<String>,
    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra passes over the endpoint list after a transport failure
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
    /// Base delay between passes in milliseconds (doubles per pass)
    #[serde(default = "default_transport_backoff_ms")]
    pub transport_backoff_ms: u64,
    /// Extra HTTP headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_urls: default_rpc_urls(),
            request_timeout_ms: default_request_timeout_ms(),
            transport_retries: default_transport_retries(),
            transport_backoff_ms: default_transport_backoff_ms(),
            headers: HashMap::new(),
        }
    }
}

/// The account this client signs for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account id, e.g. "alice.near"
    #[serde(default)]
    pub account_id: Option<String>,
    /// Name of the environment variable holding comma-separated
    /// `ed25519:<base58>` secret keys. Keys never live in the file itself.
    #[serde(default = "default_private_keys_env")]
    pub private_keys_env: String,
}

/// Retry, freshness and polling policy for transaction submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Broadcast attempts per transaction, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff in milliseconds; attempt n waits base * 2^n
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// How long a fetched block hash is reused before refetching
    #[serde(default = "default_block_hash_ttl_ms")]
    pub block_hash_ttl_ms: u64,
    /// Interval between transaction status polls
    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
    /// Number of status polls before giving up
    #[serde(default = "default_status_poll_attempts")]
    pub status_poll_attempts: u32,
    /// Gas attached to function calls when the caller does not specify it
    #[serde(default = "default_gas")]
    pub default_gas: Gas,
    /// Delegate actions expire this many blocks after the latest final block
    #[serde(default = "default_delegate_ttl_blocks")]
    pub delegate_ttl_blocks: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            block_hash_ttl_ms: default_block_hash_ttl_ms(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
            status_poll_attempts: default_status_poll_attempts(),
            default_gas: default_gas(),
            delegate_ttl_blocks: default_delegate_ttl_blocks(),
        }
    }
}

/// Solver network HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverApiConfig {
    /// Base URL (e.g., "https://solver-relay.example.org/rpc")
    #[serde(default = "default_solver_base_url")]
    pub base_url: String,
    /// Extra HTTP headers (e.g., an API key)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_solver_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Minimum quote validity requested from solvers
    #[serde(default = "default_min_deadline_ms")]
    pub min_deadline_ms: u64,
    #[serde(default = "default_settlement_poll_interval_ms")]
    pub settlement_poll_interval_ms: u64,
    #[serde(default = "default_settlement_timeout_ms")]
    pub settlement_timeout_ms: u64,
}

impl Default for SolverApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_solver_base_url(),
            headers: HashMap::new(),
            request_timeout_ms: default_solver_timeout_ms(),
            min_deadline_ms: default_min_deadline_ms(),
            settlement_poll_interval_ms: default_settlement_poll_interval_ms(),
            settlement_timeout_ms: default_settlement_timeout_ms(),
        }
    }
}

/// Intent signing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentsConfig {
    /// Contract that verifies and executes intents
    #[serde(default = "default_verifying_contract")]
    pub verifying_contract: String,
    #[serde(default = "default_deadline_secs")]
    pub default_deadline_secs: u64,
    /// Deadline for batches containing a multi-token withdrawal
    #[serde(default = "default_withdraw_deadline_secs")]
    pub withdraw_deadline_secs: u64,
}

impl Default for IntentsConfig {
    fn default() -> Self {
        Self {
            verifying_contract: default_verifying_contract(),
            default_deadline_secs: default_deadline_secs(),
            withdraw_deadline_secs: default_withdraw_deadline_secs(),
        }
    }
}

/// Quote routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Candidate intermediate assets for two-hop routes
    #[serde(default = "default_intermediate_tokens")]
    pub intermediate_tokens: Vec<String>,
    /// Routes whose output (sell) or input (buy) is below this are discarded.
    /// Decimal string to keep full u128 range in TOML.
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            intermediate_tokens: default_intermediate_tokens(),
            min_liquidity: default_min_liquidity(),
        }
    }
}

fn default_rpc_urls() -> Vec<String> {
    vec!["https://rpc.mainnet.near.org".to_string()]
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_transport_retries() -> u32 {
    2
}

fn default_transport_backoff_ms() -> u64 {
    250
}

fn default_private_keys_env() -> String {
    "OMNI_CLIENT_PRIVATE_KEYS".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_block_hash_ttl_ms() -> u64 {
    50_000
}

fn default_status_poll_interval_ms() -> u64 {
    3_000
}

fn default_status_poll_attempts() -> u32 {
    10
}

fn default_gas() -> Gas {
    200 * TGAS
}

fn default_delegate_ttl_blocks() -> u64 {
    1_000
}

fn default_solver_base_url() -> String {
    "https://solver-relay-v2.chaindefuser.com/rpc".to_string()
}

fn default_solver_timeout_ms() -> u64 {
    2_000
}

fn default_min_deadline_ms() -> u64 {
    10_000
}

fn default_settlement_poll_interval_ms() -> u64 {
    2_000
}

fn default_settlement_timeout_ms() -> u64 {
    20_000
}

fn default_verifying_contract() -> String {
    "intents.near".to_string()
}

fn default_deadline_secs() -> u64 {
    600
}

fn default_withdraw_deadline_secs() -> u64 {
    60
}

fn default_intermediate_tokens() -> Vec<String> {
    vec![
        "nep141:usdt.tether-token.near".to_string(),
        "nep141:wrap.near".to_string(),
    ]
}

fn default_min_liquidity() -> String {
    "1".to_string()
}

// ============================================================================
// LOADING AND VALIDATION
// ============================================================================

impl ClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file. If None, uses OMNI_CLIENT_CONFIG_PATH env var or default.
    ///
    /// # Returns
    ///
    /// * `Ok(ClientConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - File missing, unparseable, or validation failed
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("OMNI_CLIENT_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/omni-client.toml".to_string());

        if !std::path::Path::new(&config_path).exists() {
            anyhow::bail!("Configuration file '{}' not found", config_path);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file at: {}", config_path))?;
        let config: ClientConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file at: {}", config_path))?;
        config.validate()?;
        Ok(config)
    }

    /// Equivalent to `load_from_path(None)`.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks:
    /// - At least one RPC URL is configured
    /// - The account id, when present, is well formed
    /// - Attempts, timeouts and poll intervals are positive
    /// - `min_liquidity` parses as an unsigned integer
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.rpc_urls.is_empty() {
            anyhow::bail!("Configuration error: network.rpc_urls must not be empty");
        }
        for url in &self.network.rpc_urls {
            reqwest::Url::parse(url)
                .map_err(|e| anyhow::anyhow!("Configuration error: invalid RPC URL '{}': {}", url, e))?;
        }
        if self.network.request_timeout_ms == 0 {
            anyhow::bail!("Configuration error: network.request_timeout_ms must be positive");
        }

        if let Some(account_id) = &self.account.account_id {
            AccountId::validate(account_id)
                .map_err(|e| anyhow::anyhow!("Configuration error: invalid account id '{}': {}", account_id, e))?;
        }

        if self.submission.max_attempts == 0 {
            anyhow::bail!("Configuration error: submission.max_attempts must be at least 1");
        }
        if self.submission.status_poll_interval_ms == 0 || self.submission.status_poll_attempts == 0 {
            anyhow::bail!("Configuration error: submission status polling must be positive");
        }

        if self.solver.request_timeout_ms == 0 || self.solver.settlement_poll_interval_ms == 0 {
            anyhow::bail!("Configuration error: solver timeouts must be positive");
        }

        if self.intents.default_deadline_secs == 0 || self.intents.withdraw_deadline_secs == 0 {
            anyhow::bail!("Configuration error: intent deadlines must be positive");
        }

        self.router.min_liquidity()?;
        Ok(())
    }

    /// The configured account id, required for write operations.
    pub fn account_id(&self) -> anyhow::Result<AccountId> {
        let id = self
            .account
            .account_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Configuration error: account.account_id is not set"))?;
        id.parse()
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
    }

    /// Reads signing keys from the environment variable named in
    /// `account.private_keys_env`.
    pub fn load_signers(&self) -> anyhow::Result<Vec<Arc<dyn Signer>>> {
        let raw = std::env::var(&self.account.private_keys_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable {} is not set",
                self.account.private_keys_env
            )
        })?;

        let signers = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                InMemorySigner::from_secret_key(s)
                    .map(|signer| Arc::new(signer) as Arc<dyn Signer>)
                    .map_err(|e| anyhow::anyhow!("{}", e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        if signers.is_empty() {
            anyhow::bail!(
                "Environment variable {} contains no keys",
                self.account.private_keys_env
            );
        }
        Ok(signers)
    }
}

impl RouterConfig {
    pub fn min_liquidity(&self) -> anyhow::Result<u128> {
        self.min_liquidity.parse::<u128>().map_err(|e| {
            anyhow::anyhow!(
                "Configuration error: router.min_liquidity '{}' is not an integer: {}",
                self.min_liquidity,
                e
            )
        })
    }
}
