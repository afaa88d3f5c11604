//! Intent data model
//!
//! Intents, the signed payload layout, commitments and simulation results.
//! Field order of the payload structs is part of the signed bytes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::crypto::{sha256, signing::verify};
use crate::error::ClientError;
use crate::primitives::{AccountId, PublicKey, Signature};

/// Default multi-token contract for `mt_withdraw`.
pub const DEFAULT_MT_TOKEN: &str = "v2_1.omni.hot.tg";

/// Log prefix of structured contract events.
pub const EVENT_JSON_PREFIX: &str = "EVENT_JSON:";

// ============================================================================
// TOKEN IDENTIFIERS
// ============================================================================

/// Asset id. Ids in the `nep141:<contract>`, `nep171:<contract>:<token>` and
/// `nep245:<contract>:<token>` namespaces are checked; anything else is kept
/// as an opaque, whitespace-free label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

const KNOWN_STANDARDS: [&str; 3] = ["nep141", "nep171", "nep245"];

impl TokenId {
    pub fn nep141(contract: &AccountId) -> Self {
        Self(format!("nep141:{}", contract))
    }

    pub fn nep171(contract: &AccountId, token_id: &str) -> Self {
        Self(format!("nep171:{}:{}", contract, token_id))
    }

    pub fn nep245(contract: &AccountId, token_id: &str) -> Self {
        Self(format!("nep245:{}:{}", contract, token_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `nep141`, `nep171` or `nep245`; empty for opaque ids.
    pub fn standard(&self) -> &str {
        match self.0.split_once(':') {
            Some((standard, _)) if KNOWN_STANDARDS.contains(&standard) => standard,
            _ => "",
        }
    }

    /// The token contract account; empty for opaque ids.
    pub fn contract(&self) -> &str {
        if self.standard().is_empty() {
            return "";
        }
        self.0.split(':').nth(1).unwrap_or_default()
    }
}

impl FromStr for TokenId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        let valid = match parts.as_slice() {
            ["nep141", contract] => AccountId::validate(contract).is_ok(),
            ["nep171" | "nep245", contract, token] => {
                AccountId::validate(contract).is_ok() && !token.is_empty()
            }
            [standard, ..] if KNOWN_STANDARDS.contains(standard) => false,
            _ => !s.is_empty() && !s.chars().any(char::is_whitespace),
        };
        if !valid {
            return Err(ClientError::validation(format!("Invalid token id '{}'", s)));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TokenId {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TokenId> for String {
    fn from(value: TokenId) -> Self {
        value.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// INTENTS
// ============================================================================

/// One intent primitive. Amounts are decimal strings on the wire; token diffs
/// carry a sign (negative = give).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    Transfer {
        receiver_id: AccountId,
        tokens: BTreeMap<TokenId, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_gas: Option<String>,
    },
    TokenDiff {
        diff: BTreeMap<TokenId, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        referral: Option<String>,
    },
    MtWithdraw {
        token: String,
        receiver_id: AccountId,
        token_ids: Vec<String>,
        amounts: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    FtWithdraw {
        token: String,
        receiver_id: AccountId,
        amount: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    NftWithdraw {
        token: String,
        token_id: String,
        receiver_id: AccountId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    NativeWithdraw {
        receiver_id: AccountId,
        amount: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
    },
    AddPublicKey {
        public_key: PublicKey,
    },
    AuthCall {
        contract_id: AccountId,
        msg: String,
        #[serde(default = "zero")]
        attached_deposit: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_gas: Option<String>,
    },
}

fn zero() -> String {
    "0".to_string()
}

impl Intent {
    /// Wire name, also the contract's event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::Transfer { .. } => "transfer",
            Intent::TokenDiff { .. } => "token_diff",
            Intent::MtWithdraw { .. } => "mt_withdraw",
            Intent::FtWithdraw { .. } => "ft_withdraw",
            Intent::NftWithdraw { .. } => "nft_withdraw",
            Intent::NativeWithdraw { .. } => "native_withdraw",
            Intent::AddPublicKey { .. } => "add_public_key",
            Intent::AuthCall { .. } => "auth_call",
        }
    }
}

/// NEP-177 token metadata for NFTs minted through an auth call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copies: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_hash: Option<String>,
}

// ============================================================================
// PAYLOAD AND COMMITMENT
// ============================================================================

/// The signed message. Serialized compactly in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentPayload {
    pub signer_id: AccountId,
    /// `%Y-%m-%dT%H:%M:%S.000Z`
    pub deadline: String,
    pub intents: Vec<Intent>,
    /// Base64 of 32 bytes; single use per signer.
    pub nonce: String,
    pub verifying_contract: AccountId,
}

pub const RAW_ED25519_STANDARD: &str = "raw_ed25519";

/// A signed, immutable batch of intents.
///
/// Fields are private: the payload string is exactly what was signed, so
/// nothing may change it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    standard: String,
    payload: String,
    signature: Signature,
    public_key: PublicKey,
}

impl Commitment {
    pub(crate) fn new(payload: String, signature: Signature, public_key: PublicKey) -> Self {
        Self {
            standard: RAW_ED25519_STANDARD.to_string(),
            payload,
            signature,
            public_key,
        }
    }

    pub fn standard(&self) -> &str {
        &self.standard
    }

    /// The exact signed JSON text.
    pub fn payload_json(&self) -> &str {
        &self.payload
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn payload(&self) -> Result<IntentPayload, ClientError> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// base58(sha256(payload)); stable for identical payloads.
    pub fn hash(&self) -> String {
        sha256(self.payload.as_bytes()).to_string()
    }

    pub fn verify(&self) -> bool {
        verify(&self.public_key, self.payload.as_bytes(), &self.signature)
    }

    /// JSON form used by the solver API and `execute_intents`.
    pub fn to_json(&self) -> Result<Value, ClientError> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentExecuted {
    pub intent_hash: String,
    pub account_id: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationState {
    pub fee: u64,
    pub current_salt: String,
}

/// Dry-run result. `error_msg` set means the batch would fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub intents_executed: Vec<IntentExecuted>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub min_deadline: Option<String>,
    #[serde(default)]
    pub state: Option<SimulationState>,
}

impl SimulationResult {
    pub fn success(&self) -> bool {
        self.error_msg.is_none()
    }

    /// Intents reconstructed from `EVENT_JSON:` logs.
    ///
    /// Unknown events are skipped; malformed entries are logged and skipped.
    pub fn logged_intents(&self) -> Vec<Intent> {
        let mut intents = Vec::new();
        for log in &self.logs {
            let Some(body) = log.strip_prefix(EVENT_JSON_PREFIX) else {
                continue;
            };
            let event: Value = match serde_json::from_str(body) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Failed to parse log entry {:.100}: {}", log, e);
                    continue;
                }
            };
            let Some(kind) = event.get("event").and_then(Value::as_str) else {
                continue;
            };
            let Some(items) = event.get("data").and_then(Value::as_array) else {
                continue;
            };
            for item in items {
                let mut object = match item {
                    Value::Object(map) => map.clone(),
                    _ => continue,
                };
                object.retain(|_, v| !v.is_null());
                object.insert("intent".to_string(), Value::String(kind.to_string()));
                match serde_json::from_value::<Intent>(Value::Object(object)) {
                    Ok(intent) => intents.push(intent),
                    // Non-intent events (e.g. dip4 bookkeeping) land here too.
                    Err(e) => warn!("Failed to parse {} intent from log: {}", kind, e),
                }
            }
        }
        intents
    }
}
