//! Cryptographic operations
//!
//! This module provides the signing capability and the hashing used for
//! transactions, delegate actions and intent commitments.

pub mod hash;
pub mod signing;

// Re-export for convenience
pub use hash::{nep461_prefixed_hash, sha256, NEP461_DELEGATE_PREFIX};
pub use signing::{InMemorySigner, Signer};
