//! Transaction Builder
//!
//! Binds an action list to a recent block hash and a freshly reserved nonce.
//! Block hashes are cached for `block_hash_ttl_ms`; the network accepts any
//! hash inside its own validity window, so one fetch serves many transactions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::account::{NonceTracker, SigningIdentity};
use crate::error::{ClientError, ClientResult};
use crate::primitives::{AccountId, Action, BlockHeight, CryptoHash, Nonce, PublicKey, Transaction};
use crate::rpc::LedgerRpc;

/// A block hash with the height it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentBlock {
    pub hash: CryptoHash,
    pub height: BlockHeight,
}

#[derive(Debug, Clone, Copy)]
struct CachedBlock {
    block: RecentBlock,
    fetched_at: Instant,
}

pub struct TransactionBuilder {
    rpc: LedgerRpc,
    ttl: Duration,
    cache: Arc<RwLock<Option<CachedBlock>>>,
}

impl TransactionBuilder {
    pub fn new(rpc: LedgerRpc, block_hash_ttl: Duration) -> Self {
        Self {
            rpc,
            ttl: block_hash_ttl,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Assembles a transaction from fully specified inputs. No I/O.
    ///
    /// Identical inputs give byte-identical transactions.
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - Envelope ready for signing
    /// * `Err(ClientError::Validation)` - Empty action list
    pub fn build_with(
        signer_id: &AccountId,
        receiver_id: &AccountId,
        actions: Vec<Action>,
        public_key: PublicKey,
        nonce: Nonce,
        block_hash: CryptoHash,
    ) -> ClientResult<Transaction> {
        if actions.is_empty() {
            return Err(ClientError::validation("Transaction has no actions"));
        }
        Ok(Transaction {
            signer_id: signer_id.clone(),
            public_key,
            nonce,
            receiver_id: receiver_id.clone(),
            block_hash,
            actions,
        })
    }

    /// Builds a transaction for a leased identity.
    ///
    /// Validates first, so an empty action list never costs a network call
    /// or a nonce.
    pub async fn build(
        &self,
        signer_id: &AccountId,
        receiver_id: &AccountId,
        actions: Vec<Action>,
        identity: &mut SigningIdentity,
        nonces: &NonceTracker,
    ) -> ClientResult<Transaction> {
        if actions.is_empty() {
            return Err(ClientError::validation("Transaction has no actions"));
        }
        let block = self.recent_block().await?;
        let nonce = nonces.next(identity).await?;
        debug!(
            "Built transaction {} -> {} nonce {} block {}",
            signer_id, receiver_id, nonce, block.hash
        );
        Self::build_with(
            signer_id,
            receiver_id,
            actions,
            identity.public_key(),
            nonce,
            block.hash,
        )
    }

    /// Cached final block, refetched once older than the TTL.
    pub async fn recent_block(&self) -> ClientResult<RecentBlock> {
        if let Some(cached) = *self.cache.read().await {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.block);
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = *cache {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.block);
            }
        }

        let view = self.rpc.block_final().await?;
        let block = RecentBlock {
            hash: view.header.hash,
            height: view.header.height,
        };
        info!("Refreshed block hash {} at height {}", block.hash, block.height);
        *cache = Some(CachedBlock {
            block,
            fetched_at: Instant::now(),
        });
        Ok(block)
    }

    /// Drops the cached block hash so the next build fetches a fresh one.
    pub async fn invalidate_block_hash(&self) {
        *self.cache.write().await = None;
    }
}
