//! Intent Builder
//!
//! Accumulates intents by value: every chained call consumes the builder and
//! returns it, so there is no shared mutable state between steps. Signing
//! borrows the builder and produces an owned [`Commitment`]; later changes
//! to the builder cannot reach a commitment already produced.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};

use super::model::{Commitment, Intent, IntentPayload, NftMetadata, TokenId, DEFAULT_MT_TOKEN};
use crate::config::IntentsConfig;
use crate::crypto::{sha256, Signer};
use crate::error::{ClientError, ClientResult};
use crate::primitives::{AccountId, Balance, Gas, PublicKey, TGAS};

pub const DEADLINE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// Suffix of NFT collections that mint and burn through intents.
pub const NFT_COLLECTION_SUFFIX: &str = ".nfts.tg";
const NFT_MINT_GAS: Gas = 100 * TGAS;

/// Formats an instant the way the verifying contract parses deadlines.
pub fn format_deadline(at: DateTime<Utc>) -> String {
    at.format(DEADLINE_FORMAT).to_string()
}

/// Nonce from a seed: base64(sha256(seed)).
pub fn nonce_from_seed(seed: &str) -> String {
    general_purpose::STANDARD.encode(sha256(seed.as_bytes()).as_bytes())
}

pub fn random_nonce() -> String {
    general_purpose::STANDARD.encode(rand::random::<[u8; 32]>())
}

/// Who signs intents, and with which defaults.
#[derive(Clone)]
pub struct IntentSigner {
    signer_id: AccountId,
    signer: Arc<dyn Signer>,
    verifying_contract: AccountId,
    default_deadline: Duration,
    withdraw_deadline: Duration,
}

impl IntentSigner {
    pub fn new(
        signer_id: AccountId,
        signer: Arc<dyn Signer>,
        config: &IntentsConfig,
    ) -> ClientResult<Self> {
        Ok(Self {
            signer_id,
            signer,
            verifying_contract: config.verifying_contract.parse()?,
            default_deadline: Duration::from_secs(config.default_deadline_secs),
            withdraw_deadline: Duration::from_secs(config.withdraw_deadline_secs),
        })
    }

    pub fn signer_id(&self) -> &AccountId {
        &self.signer_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.signer.public_key()
    }

    pub fn verifying_contract(&self) -> &AccountId {
        &self.verifying_contract
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum NonceSpec {
    #[default]
    Random,
    Seed(String),
    Explicit(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum DeadlineSpec {
    /// Per-kind default, the shortest over the batch.
    #[default]
    Default,
    In(Duration),
    At(DateTime<Utc>),
}

fn parse_amount(value: &str) -> Result<i128, String> {
    value
        .trim()
        .parse::<i128>()
        .map_err(|_| format!("Invalid amount '{}'", value))
}

#[derive(Debug, Clone, Default)]
pub struct IntentBuilder {
    intents: Vec<Intent>,
    /// Net token diff from `take` / `give`, folded into one intent at signing.
    net_diff: BTreeMap<TokenId, i128>,
    referral: Option<String>,
    nonce: NonceSpec,
    deadline: DeadlineSpec,
    /// First validation failure; reported by `sign`.
    invalid: Option<String>,
}

impl IntentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(mut self, message: String) -> Self {
        self.invalid.get_or_insert(message);
        self
    }

    /// Appends a fully specified intent.
    pub fn push(mut self, intent: Intent) -> Self {
        self.intents.push(intent);
        self
    }

    /// Transfer tokens inside the verifying contract.
    pub fn transfer(
        self,
        receiver_id: AccountId,
        tokens: impl IntoIterator<Item = (TokenId, Balance)>,
        memo: Option<String>,
    ) -> Self {
        let mut map = BTreeMap::new();
        for (token, amount) in tokens {
            if amount == 0 {
                return self.fail(format!("Transfer amount for {} must be positive", token));
            }
            map.insert(token, amount.to_string());
        }
        if map.is_empty() {
            return self.fail("Transfer has no tokens".to_string());
        }
        self.push(Intent::Transfer {
            receiver_id,
            tokens: map,
            memo,
            msg: None,
            min_gas: None,
        })
    }

    /// Signed token diff; negative amounts are given, positive received.
    pub fn token_diff<K, V>(self, diff: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        for (token, amount) in diff {
            let token: TokenId = match token.as_ref().parse() {
                Ok(t) => t,
                Err(e) => return self.fail(e.to_string()),
            };
            let amount = match parse_amount(amount.as_ref()) {
                Ok(0) => return self.fail(format!("Token diff for {} is zero", token)),
                Ok(a) => a,
                Err(e) => return self.fail(e),
            };
            map.insert(token, amount.to_string());
        }
        if map.is_empty() {
            return self.fail("Token diff is empty".to_string());
        }
        // Referral is filled in from `with_referral` when the batch is read.
        self.push(Intent::TokenDiff {
            diff: map,
            referral: None,
        })
    }

    /// Receive `amount` of `token` (net, combined with `give`).
    pub fn take(self, token: TokenId, amount: Balance) -> Self {
        self.adjust(token, amount, 1)
    }

    /// Give `amount` of `token` (net, combined with `take`).
    pub fn give(self, token: TokenId, amount: Balance) -> Self {
        self.adjust(token, amount, -1)
    }

    fn adjust(mut self, token: TokenId, amount: Balance, sign: i128) -> Self {
        let Ok(amount) = i128::try_from(amount) else {
            return self.fail(format!("Amount for {} is too large", token));
        };
        let current = self.net_diff.get(&token).copied().unwrap_or(0);
        match current.checked_add(sign * amount) {
            Some(v) => {
                self.net_diff.insert(token, v);
                self
            }
            None => self.fail("Token diff overflow".to_string()),
        }
    }

    /// Withdraw multi-token balances to another chain or account.
    pub fn mt_withdraw(
        self,
        receiver_id: AccountId,
        token_ids: Vec<String>,
        amounts: Vec<Balance>,
        msg: Option<String>,
        token: Option<String>,
    ) -> Self {
        if token_ids.is_empty() || token_ids.len() != amounts.len() {
            return self.fail("mt_withdraw needs one amount per token id".to_string());
        }
        if amounts.contains(&0) {
            return self.fail("mt_withdraw amounts must be positive".to_string());
        }
        self.push(Intent::MtWithdraw {
            token: token.unwrap_or_else(|| DEFAULT_MT_TOKEN.to_string()),
            receiver_id,
            token_ids,
            amounts: amounts.iter().map(u128::to_string).collect(),
            memo: None,
            msg,
        })
    }

    pub fn ft_withdraw(
        self,
        token: AccountId,
        receiver_id: AccountId,
        amount: Balance,
        memo: Option<String>,
    ) -> Self {
        if amount == 0 {
            return self.fail("ft_withdraw amount must be positive".to_string());
        }
        self.push(Intent::FtWithdraw {
            token: token.to_string(),
            receiver_id,
            amount: amount.to_string(),
            memo,
            msg: None,
        })
    }

    pub fn nft_withdraw(
        self,
        contract_id: AccountId,
        token_id: impl Into<String>,
        receiver_id: AccountId,
        msg: Option<String>,
    ) -> Self {
        self.push(Intent::NftWithdraw {
            token: contract_id.to_string(),
            token_id: token_id.into(),
            receiver_id,
            memo: None,
            msg,
        })
    }

    pub fn native_withdraw(self, receiver_id: AccountId, amount: Balance, memo: Option<String>) -> Self {
        if amount == 0 {
            return self.fail("native_withdraw amount must be positive".to_string());
        }
        self.push(Intent::NativeWithdraw {
            receiver_id,
            amount: amount.to_string(),
            memo,
        })
    }

    /// Call `on_auth` on `contract_id` with `msg`, authorized by this batch.
    pub fn auth_call(
        self,
        contract_id: AccountId,
        msg: impl Into<String>,
        attached_deposit: Balance,
        min_gas: Option<Gas>,
    ) -> Self {
        self.push(Intent::AuthCall {
            contract_id,
            msg: msg.into(),
            attached_deposit: attached_deposit.to_string(),
            min_gas: min_gas.map(|g| g.to_string()),
        })
    }

    /// Mints `token_id` on an intents NFT collection to `token_owner_id`.
    pub fn mint_nft(
        self,
        contract_id: AccountId,
        token_id: impl Into<String>,
        token_owner_id: AccountId,
        metadata: NftMetadata,
        msg: Option<String>,
    ) -> Self {
        if !contract_id.as_str().ends_with(NFT_COLLECTION_SUFFIX) {
            return self.fail(format!(
                "{} is not an NFT collection ({})",
                contract_id, NFT_COLLECTION_SUFFIX
            ));
        }
        let mut call = serde_json::json!({
            "token_id": token_id.into(),
            "token_owner_id": token_owner_id,
            "token_metadata": metadata,
        });
        if let Some(msg) = msg {
            call["msg"] = msg.into();
        }
        self.auth_call(contract_id, call.to_string(), 0, Some(NFT_MINT_GAS))
    }

    /// Burns an intents NFT by withdrawing it back to its collection.
    /// The collection calls `burn_callback_receiver_id` with `msg` when both are set.
    pub fn burn_nft(
        self,
        contract_id: AccountId,
        token_id: impl Into<String>,
        burn_callback_receiver_id: Option<AccountId>,
        msg: Option<String>,
        memo: Option<String>,
    ) -> Self {
        if !contract_id.as_str().ends_with(NFT_COLLECTION_SUFFIX) {
            return self.fail(format!(
                "{} is not an NFT collection ({})",
                contract_id, NFT_COLLECTION_SUFFIX
            ));
        }
        let msg = match (burn_callback_receiver_id, msg) {
            (Some(receiver), Some(msg)) => Some(
                serde_json::json!({ "burn_callback_receiver_id": receiver, "msg": msg }).to_string(),
            ),
            _ => None,
        };
        self.push(Intent::NftWithdraw {
            token: contract_id.to_string(),
            token_id: token_id.into(),
            receiver_id: contract_id,
            memo: Some(memo.unwrap_or_else(|| "burn".to_string())),
            msg,
        })
    }

    pub fn add_public_key(self, public_key: PublicKey) -> Self {
        self.push(Intent::AddPublicKey { public_key })
    }

    pub fn with_referral(mut self, referral: impl Into<String>) -> Self {
        self.referral = Some(referral.into());
        self
    }

    /// Uses `nonce` as-is. Must be base64 of 32 bytes.
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = NonceSpec::Explicit(nonce.into());
        self
    }

    /// Derives the nonce from `seed`, so the same seed gives the same nonce.
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.nonce = NonceSpec::Seed(seed.into());
        self
    }

    pub fn with_deadline_secs(mut self, seconds: u64) -> Self {
        self.deadline = DeadlineSpec::In(Duration::from_secs(seconds));
        self
    }

    /// Fixed deadline instant; makes the payload reproducible.
    pub fn with_deadline_at(mut self, at: DateTime<Utc>) -> Self {
        self.deadline = DeadlineSpec::At(at);
        self
    }

    /// The intents that would be signed, including the folded net diff.
    pub fn intents(&self) -> Vec<Intent> {
        let mut intents = self.intents.clone();
        if let Some(referral) = &self.referral {
            for intent in &mut intents {
                if let Intent::TokenDiff { referral: slot @ None, .. } = intent {
                    *slot = Some(referral.clone());
                }
            }
        }
        let diff: BTreeMap<TokenId, String> = self
            .net_diff
            .iter()
            .filter(|(_, amount)| **amount != 0)
            .map(|(token, amount)| (token.clone(), amount.to_string()))
            .collect();
        if !diff.is_empty() {
            intents.push(Intent::TokenDiff {
                diff,
                referral: self.referral.clone(),
            });
        }
        intents
    }

    fn resolve_nonce(&self) -> ClientResult<String> {
        match &self.nonce {
            NonceSpec::Random => Ok(random_nonce()),
            NonceSpec::Seed(seed) => Ok(nonce_from_seed(seed)),
            NonceSpec::Explicit(nonce) => {
                let bytes = general_purpose::STANDARD
                    .decode(nonce)
                    .map_err(|e| ClientError::validation(format!("Invalid intent nonce: {}", e)))?;
                if bytes.len() != 32 {
                    return Err(ClientError::validation(format!(
                        "Intent nonce must be 32 bytes, got {}",
                        bytes.len()
                    )));
                }
                Ok(nonce.clone())
            }
        }
    }

    fn resolve_deadline(&self, intents: &[Intent], signer: &IntentSigner) -> ClientResult<String> {
        let after = match self.deadline {
            DeadlineSpec::At(at) => return Ok(format_deadline(at)),
            DeadlineSpec::In(after) => after,
            DeadlineSpec::Default => {
                let has_withdraw = intents.iter().any(|i| matches!(i, Intent::MtWithdraw { .. }));
                if has_withdraw {
                    signer.withdraw_deadline.min(signer.default_deadline)
                } else {
                    signer.default_deadline
                }
            }
        };
        let at = Utc::now()
            .checked_add_signed(to_chrono(after)?)
            .ok_or_else(|| {
                ClientError::validation(format!("Deadline {}s from now is out of range", after.as_secs()))
            })?;
        Ok(format_deadline(at))
    }

    /// Unsigned payload with nonce and deadline fixed.
    pub fn payload(&self, signer: &IntentSigner) -> ClientResult<IntentPayload> {
        if let Some(reason) = &self.invalid {
            return Err(ClientError::validation(reason.clone()));
        }
        let intents = self.intents();
        if intents.is_empty() {
            return Err(ClientError::validation("No intents to sign"));
        }
        Ok(IntentPayload {
            signer_id: signer.signer_id.clone(),
            deadline: self.resolve_deadline(&intents, signer)?,
            intents,
            nonce: self.resolve_nonce()?,
            verifying_contract: signer.verifying_contract.clone(),
        })
    }

    /// Signs the batch as a `raw_ed25519` commitment.
    pub fn sign(&self, signer: &IntentSigner) -> ClientResult<Commitment> {
        sign_payload(&self.payload(signer)?, signer)
    }
}

/// Signs an already assembled payload.
pub fn sign_payload(payload: &IntentPayload, signer: &IntentSigner) -> ClientResult<Commitment> {
    let text = serde_json::to_string(payload)?;
    let signature = signer.signer.sign(text.as_bytes());
    Ok(Commitment::new(text, signature, signer.signer.public_key()))
}

fn to_chrono(duration: Duration) -> ClientResult<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| ClientError::validation(format!("Invalid deadline: {}", e)))
}
