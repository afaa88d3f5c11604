//! Transactions and delegate actions

use base64::{engine::general_purpose, Engine as _};
use borsh::BorshSerialize;

use super::{AccountId, Action, BlockHeight, CryptoHash, Nonce, NonDelegateAction, PublicKey, Signature};
use crate::crypto::{nep461_prefixed_hash, sha256, Signer, NEP461_DELEGATE_PREFIX};
use crate::error::ClientError;

fn encode<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, ClientError> {
    value
        .try_to_vec()
        .map_err(|e| ClientError::Signing(format!("Failed to serialize: {}", e)))
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// Unsigned transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct Transaction {
    pub signer_id: AccountId,
    pub public_key: PublicKey,
    pub nonce: Nonce,
    pub receiver_id: AccountId,
    pub block_hash: CryptoHash,
    pub actions: Vec<Action>,
}

impl Transaction {
    /// Canonical bytes. Identical inputs always give identical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ClientError> {
        encode(self)
    }

    /// sha256 of the canonical bytes; this is the transaction hash and the
    /// message that gets signed.
    pub fn get_hash(&self) -> Result<CryptoHash, ClientError> {
        Ok(sha256(&self.to_bytes()?))
    }

    pub fn sign(self, signer: &dyn Signer) -> Result<SignedTransaction, ClientError> {
        if signer.public_key() != self.public_key {
            return Err(ClientError::Signing(format!(
                "Signer key {} does not match transaction key {}",
                signer.public_key(),
                self.public_key
            )));
        }
        let hash = self.get_hash()?;
        let signature = signer.sign(hash.as_bytes());
        Ok(SignedTransaction {
            transaction: self,
            signature,
            hash,
        })
    }
}

/// Transaction plus signature, ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: Signature,
    hash: CryptoHash,
}

impl SignedTransaction {
    pub fn hash(&self) -> CryptoHash {
        self.hash
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ClientError> {
        encode(self)
    }

    /// Base64 body for the broadcast RPC methods.
    pub fn to_base64(&self) -> Result<String, ClientError> {
        Ok(general_purpose::STANDARD.encode(self.to_bytes()?))
    }
}

impl BorshSerialize for SignedTransaction {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.transaction.serialize(writer)?;
        self.signature.serialize(writer)
    }
}

// ============================================================================
// DELEGATE ACTION
// ============================================================================

/// Actions signed by `sender_id` and relayed by another account that pays gas.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct DelegateAction {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub actions: Vec<NonDelegateAction>,
    pub nonce: Nonce,
    /// Rejected by the network once the chain passes this height.
    pub max_block_height: BlockHeight,
    pub public_key: PublicKey,
}

impl DelegateAction {
    pub fn new(
        sender_id: AccountId,
        receiver_id: AccountId,
        actions: Vec<Action>,
        nonce: Nonce,
        max_block_height: BlockHeight,
        public_key: PublicKey,
    ) -> Result<Self, ClientError> {
        if actions.is_empty() {
            return Err(ClientError::validation("Delegate action has no actions"));
        }
        let actions = actions
            .into_iter()
            .map(NonDelegateAction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            sender_id,
            receiver_id,
            actions,
            nonce,
            max_block_height,
            public_key,
        })
    }

    /// NEP-461 hash: sha256 over the u32 prefix followed by the borsh body.
    pub fn get_nep461_hash(&self) -> Result<CryptoHash, ClientError> {
        Ok(nep461_prefixed_hash(NEP461_DELEGATE_PREFIX, &encode(self)?))
    }

    pub fn sign(self, signer: &dyn Signer) -> Result<SignedDelegateAction, ClientError> {
        if signer.public_key() != self.public_key {
            return Err(ClientError::Signing(format!(
                "Signer key {} does not match delegate key {}",
                signer.public_key(),
                self.public_key
            )));
        }
        let hash = self.get_nep461_hash()?;
        let signature = signer.sign(hash.as_bytes());
        Ok(SignedDelegateAction {
            delegate_action: self,
            signature,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct SignedDelegateAction {
    pub delegate_action: DelegateAction,
    pub signature: Signature,
}

impl SignedDelegateAction {
    /// Signature check against the embedded public key.
    pub fn verify(&self) -> bool {
        match self.delegate_action.get_nep461_hash() {
            Ok(hash) => crate::crypto::signing::verify(
                &self.delegate_action.public_key,
                hash.as_bytes(),
                &self.signature,
            ),
            Err(_) => false,
        }
    }
}
