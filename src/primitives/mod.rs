//! Ledger primitives
//!
//! Account ids, keys, hashes and the borsh wire layout of actions and
//! transactions. Byte layout follows the network's canonical encoding so
//! that hashes and signatures computed here match what the node computes.

pub mod action;
pub mod dec_format;
pub mod transaction;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use borsh::BorshSerialize;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ClientError;

pub use action::{
    AccessKey, AccessKeyPermission, Action, AddKeyAction, CreateAccountAction, DeleteAccountAction,
    DeleteKeyAction, DeployContractAction, DeployGlobalContractAction, FunctionCallAction,
    FunctionCallPermission, GlobalContractDeployMode, GlobalContractIdentifier,
    NonDelegateAction, StakeAction, TransferAction, UseGlobalContractAction,
};
pub use transaction::{DelegateAction, SignedDelegateAction, SignedTransaction, Transaction};

/// Dot-delimited account identifier, e.g. `name.near`. Validated on parse.
pub use near_account_id::{AccountId, ParseAccountError};

/// Amounts are in yocto units of the native token.
pub type Balance = u128;
pub type Gas = u64;
pub type Nonce = u64;
pub type BlockHeight = u64;

/// One tera-gas.
pub const TGAS: Gas = 1_000_000_000_000;

const ED25519_PREFIX: &str = "ed25519:";

// ============================================================================
// KEYS, SIGNATURES, HASHES
// ============================================================================

fn decode_base58_fixed<const N: usize>(s: &str, what: &str) -> Result<[u8; N], ClientError> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| ClientError::validation(format!("Invalid base58 {}: {}", what, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        ClientError::validation(format!(
            "Invalid {} length: expected {} bytes, got {}",
            what,
            N,
            b.len()
        ))
    })
}

/// An ed25519 public key, encoded as `ed25519:<base58>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ED25519_PREFIX, bs58::encode(self.0).into_string())
    }
}

impl FromStr for PublicKey {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(ED25519_PREFIX).unwrap_or(s);
        Ok(Self(decode_base58_fixed::<32>(body, "public key")?))
    }
}

impl BorshSerialize for PublicKey {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        // key type tag: 0 = ed25519
        writer.write_all(&[0u8])?;
        writer.write_all(&self.0)
    }
}

/// An ed25519 signature, encoded as `ed25519:<base58>`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ED25519_PREFIX, bs58::encode(self.0).into_string())
    }
}

impl FromStr for Signature {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(ED25519_PREFIX).unwrap_or(s);
        Ok(Self(decode_base58_fixed::<64>(body, "signature")?))
    }
}

impl BorshSerialize for Signature {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&[0u8])?;
        writer.write_all(&self.0)
    }
}

/// sha256 digest, displayed as base58.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CryptoHash(pub [u8; 32]);

impl CryptoHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CryptoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl FromStr for CryptoHash {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_base58_fixed::<32>(s, "hash")?))
    }
}

impl BorshSerialize for CryptoHash {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.0)
    }
}

macro_rules! serde_via_string {
    ($($ty:ty),*) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    )*};
}

serde_via_string!(PublicKey, Signature, CryptoHash);
