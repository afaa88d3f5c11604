//! Nonce Tracker
//!
//! Per-key nonce counter. The remote access-key nonce is read lazily on first
//! use and again whenever the node reports the local value as stale. Only
//! the holder of a [`KeyLease`](super::KeyLease) touches an identity's
//! counter, so no locking is needed here.

use tracing::{info, warn};

use super::key_pool::SigningIdentity;
use crate::error::ClientResult;
use crate::primitives::{AccountId, Nonce};
use crate::rpc::LedgerRpc;

pub struct NonceTracker {
    rpc: LedgerRpc,
    account_id: AccountId,
}

impl NonceTracker {
    pub fn new(rpc: LedgerRpc, account_id: AccountId) -> Self {
        Self { rpc, account_id }
    }

    /// Reserves the next nonce for `identity`.
    ///
    /// The first call per identity fetches the access key and starts at
    /// `remote + 1`. A reserved nonce is never handed out again, even if the
    /// transaction carrying it is never broadcast.
    pub async fn next(&self, identity: &mut SigningIdentity) -> ClientResult<Nonce> {
        let nonce = match identity.nonce.next {
            Some(next) => next,
            None => self.fetch_remote(identity).await? + 1,
        };
        identity.nonce.next = Some(nonce + 1);
        Ok(nonce)
    }

    /// Re-reads the remote nonce after a stale-nonce rejection.
    ///
    /// `hint` is the access-key nonce reported in the rejection, if any; the
    /// counter resumes above whichever of the two is higher.
    pub async fn resync(&self, identity: &mut SigningIdentity, hint: Option<Nonce>) -> ClientResult<()> {
        let remote = self.fetch_remote(identity).await?;
        let floor = hint.map_or(remote, |h| h.max(remote));
        let previous = identity.nonce.next;
        identity.nonce.next = Some(floor + 1);
        warn!(
            "Resynced nonce for {} key {}: local next {:?} -> {}",
            self.account_id,
            identity.public_key(),
            previous,
            floor + 1
        );
        Ok(())
    }

    async fn fetch_remote(&self, identity: &mut SigningIdentity) -> ClientResult<Nonce> {
        let view = self
            .rpc
            .view_access_key(&self.account_id, &identity.public_key())
            .await?;
        identity.nonce.last_remote = Some(view.nonce);
        info!(
            "Fetched access key nonce {} for {} key {}",
            view.nonce,
            self.account_id,
            identity.public_key()
        );
        Ok(view.nonce)
    }
}
