//! Signing capability
//!
//! Everything that produces a signature goes through [`Signer`], so a hardware
//! or remote signer can stand in for the in-memory key used here.

use std::fmt;

use ed25519_dalek::{Signer as _, SigningKey};

use crate::error::ClientError;
use crate::primitives::{PublicKey, Signature};

const ED25519_PREFIX: &str = "ed25519:";

/// Produces ed25519 signatures for a single key.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;

    fn sign(&self, message: &[u8]) -> Signature;
}

/// ed25519 key held in process memory.
pub struct InMemorySigner {
    signing_key: SigningKey,
}

impl InMemorySigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Fresh random key.
    pub fn generate() -> Self {
        Self::from_seed(rand::random::<[u8; 32]>())
    }

    /// Parse a secret key in `ed25519:<base58>` form.
    ///
    /// Accepts both the 32-byte seed and the 64-byte `seed || public key`
    /// encoding that wallets export. For the 64-byte form the trailing public
    /// key must match the seed.
    pub fn from_secret_key(secret: &str) -> Result<Self, ClientError> {
        let body = secret.trim().strip_prefix(ED25519_PREFIX).unwrap_or(secret.trim());
        let bytes = bs58::decode(body)
            .into_vec()
            .map_err(|e| ClientError::Signing(format!("Failed to decode secret key: {}", e)))?;

        let seed: [u8; 32] = match bytes.len() {
            32 | 64 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes[..32]);
                seed
            }
            n => {
                return Err(ClientError::Signing(format!(
                    "Invalid secret key length: expected 32 or 64 bytes, got {}",
                    n
                )))
            }
        };

        let signer = Self::from_seed(seed);
        if bytes.len() == 64 && signer.public_key().as_bytes()[..] != bytes[32..] {
            return Err(ClientError::Signing(
                "Secret key does not match its embedded public key".to_string(),
            ));
        }
        Ok(signer)
    }

    /// Secret key in the 64-byte `ed25519:<base58>` export form.
    pub fn secret_key_string(&self) -> String {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(&self.signing_key.to_bytes());
        bytes.extend_from_slice(self.signing_key.verifying_key().as_bytes());
        format!("{}{}", ED25519_PREFIX, bs58::encode(bytes).into_string())
    }
}

impl Signer for InMemorySigner {
    fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for InMemorySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySigner")
            .field("public_key", &self.public_key().to_string())
            .finish_non_exhaustive()
    }
}

/// Check a signature against a public key.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    key.verify_strict(message, &sig).is_ok()
}
