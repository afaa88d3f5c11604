//! Hash calculation utilities

use sha2::{Digest, Sha256};

use crate::primitives::CryptoHash;

/// Message prefix for delegate actions: `2^30 + 366` (NEP-461).
pub const NEP461_DELEGATE_PREFIX: u32 = (1 << 30) + 366;

pub fn sha256(data: &[u8]) -> CryptoHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    CryptoHash(hasher.finalize().into())
}

/// Hash of a prefixed message body
///
/// The prefix is written as a little-endian u32 ahead of the borsh body, which
/// keeps the signed bytes from ever being a valid transaction.
///
/// # Arguments
///
/// * `prefix` - NEP-461 message discriminant
/// * `body` - Borsh-encoded message
pub fn nep461_prefixed_hash(prefix: u32, body: &[u8]) -> CryptoHash {
    let mut hasher = Sha256::new();
    hasher.update(prefix.to_le_bytes());
    hasher.update(body);
    CryptoHash(hasher.finalize().into())
}
