//! Signing Key Pool
//!
//! Hands out exclusive leases on the signing identities of one account.
//! Waiters are served in FIFO order by a tokio semaphore with one permit per
//! free identity; a lease returns its identity to the pool when dropped, so
//! cancelling a caller before broadcast frees the key immediately.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::crypto::Signer;
use crate::error::{ClientError, ClientResult};
use crate::primitives::{Nonce, PublicKey};

// ============================================================================
// SIGNING IDENTITY
// ============================================================================

/// Local view of one access key's nonce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NonceState {
    /// Last nonce read from the node for this key.
    pub last_remote: Option<Nonce>,
    /// Next nonce to hand out; `None` until first synced.
    pub next: Option<Nonce>,
}

/// A key pair plus its nonce state. Owned by the pool, lent out via [`KeyLease`].
pub struct SigningIdentity {
    signer: Arc<dyn Signer>,
    public_key: PublicKey,
    pub nonce: NonceState,
}

impl SigningIdentity {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        let public_key = signer.public_key();
        Self {
            signer,
            public_key,
            nonce: NonceState::default(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public_key", &self.public_key.to_string())
            .field("nonce", &self.nonce)
            .finish()
    }
}

// ============================================================================
// POOL
// ============================================================================

struct PoolInner {
    /// One permit per identity sitting in `free`.
    permits: Arc<Semaphore>,
    free: Mutex<VecDeque<SigningIdentity>>,
    /// Keys to drop from rotation the next time they come back.
    retired: Mutex<HashSet<PublicKey>>,
    signers: Mutex<HashMap<PublicKey, Arc<dyn Signer>>>,
    /// First key added; used for off-chain signatures such as intents.
    primary: Mutex<Option<PublicKey>>,
    total: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PoolInner {
    fn give_back(&self, identity: SigningIdentity, permit: OwnedSemaphorePermit) {
        if lock(&self.retired).remove(&identity.public_key) {
            self.drop_identity(identity, permit);
        } else {
            lock(&self.free).push_back(identity);
            drop(permit);
        }
    }

    fn drop_identity(&self, identity: SigningIdentity, permit: OwnedSemaphorePermit) {
        permit.forget();
        lock(&self.signers).remove(&identity.public_key);
        let remaining = self.total.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!(
            "Retired signing key {} ({} remaining)",
            identity.public_key, remaining
        );
        if remaining == 0 {
            // Nothing left to wait for.
            self.permits.close();
        }
    }
}

/// Pool of signing identities for a single account.
///
/// Cheap to clone; clones share the same identities.
#[derive(Clone)]
pub struct KeyPool {
    inner: Arc<PoolInner>,
}

impl Default for KeyPool {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl KeyPool {
    pub fn new(signers: Vec<Arc<dyn Signer>>) -> Self {
        let pool = Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(0)),
                free: Mutex::new(VecDeque::new()),
                retired: Mutex::new(HashSet::new()),
                signers: Mutex::new(HashMap::new()),
                primary: Mutex::new(None),
                total: AtomicUsize::new(0),
            }),
        };
        for signer in signers {
            // Duplicates are skipped; the error carries nothing else.
            let _ = pool.add_identity(signer);
        }
        pool
    }

    /// Adds a key to rotation and wakes one waiter.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Key added
    /// * `Ok(false)` - Key was already in the pool
    /// * `Err(ClientError::PoolClosed)` - Pool has been shut down
    pub fn add_identity(&self, signer: Arc<dyn Signer>) -> ClientResult<bool> {
        if self.is_closed() {
            return Err(ClientError::PoolClosed);
        }
        let public_key = signer.public_key();
        {
            let mut signers = lock(&self.inner.signers);
            if signers.contains_key(&public_key) {
                return Ok(false);
            }
            signers.insert(public_key, signer.clone());
        }
        lock(&self.inner.primary).get_or_insert(public_key);
        lock(&self.inner.free).push_back(SigningIdentity::new(signer));
        self.inner.total.fetch_add(1, Ordering::SeqCst);
        self.inner.permits.add_permits(1);
        debug!("Added signing key {} to pool", public_key);
        Ok(true)
    }

    /// Waits for a free identity and leases it exclusively.
    ///
    /// Fails immediately with `PoolClosed` after [`KeyPool::close`], including
    /// for callers already waiting.
    pub async fn acquire(&self) -> ClientResult<KeyLease> {
        loop {
            if self.len() == 0 && !self.is_closed() {
                return Err(ClientError::validation(
                    "Account has no signing keys; write operations need at least one",
                ));
            }
            let permit = self
                .inner
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ClientError::PoolClosed)?;

            let identity = lock(&self.inner.free).pop_front();
            let Some(identity) = identity else {
                // Permits and free identities move together; a permit without
                // an identity means the pool is being torn down.
                permit.forget();
                return Err(ClientError::PoolClosed);
            };

            if lock(&self.inner.retired).remove(&identity.public_key) {
                self.inner.drop_identity(identity, permit);
                continue;
            }

            return Ok(KeyLease {
                identity: Some(identity),
                permit: Some(permit),
                pool: self.inner.clone(),
            });
        }
    }

    /// Returns a lease early. Same as dropping it.
    pub fn release(&self, lease: KeyLease) {
        drop(lease);
    }

    /// Removes a key from rotation. A leased key leaves when its lease ends.
    pub fn retire(&self, public_key: &PublicKey) -> bool {
        if !lock(&self.inner.signers).contains_key(public_key) {
            return false;
        }
        {
            let mut primary = lock(&self.inner.primary);
            if primary.as_ref() == Some(public_key) {
                *primary = None;
            }
        }
        lock(&self.inner.retired).insert(*public_key);

        // An idle key leaves right away, taking its permit with it.
        if let Ok(permit) = self.inner.permits.clone().try_acquire_owned() {
            let idle = {
                let mut free = lock(&self.inner.free);
                free.iter()
                    .position(|i| i.public_key == *public_key)
                    .and_then(|pos| free.remove(pos))
            };
            match idle {
                Some(identity) => {
                    lock(&self.inner.retired).remove(public_key);
                    self.inner.drop_identity(identity, permit);
                }
                None => drop(permit),
            }
        }
        true
    }

    /// Shuts the pool. Pending and future `acquire` calls fail with `PoolClosed`.
    pub fn close(&self) {
        info!("Closing key pool");
        self.inner.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    /// Number of identities in rotation, leased or not.
    pub fn len(&self) -> usize {
        self.inner.total.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities not currently leased.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn contains(&self, public_key: &PublicKey) -> bool {
        lock(&self.inner.signers).contains_key(public_key)
    }

    /// Signer for a key in this pool, without leasing it.
    ///
    /// Signing itself needs no exclusion; only nonce use does.
    pub fn signer_for(&self, public_key: &PublicKey) -> Option<Arc<dyn Signer>> {
        lock(&self.inner.signers).get(public_key).cloned()
    }

    /// The first key still in rotation, or any key if that one was retired.
    pub fn primary_signer(&self) -> Option<Arc<dyn Signer>> {
        let primary = *lock(&self.inner.primary);
        let signers = lock(&self.inner.signers);
        primary
            .and_then(|pk| signers.get(&pk).cloned())
            .or_else(|| signers.values().next().cloned())
    }

    pub fn public_keys(&self) -> Vec<PublicKey> {
        lock(&self.inner.signers).keys().copied().collect()
    }
}

// ============================================================================
// LEASE
// ============================================================================

/// Exclusive use of one identity. Returned to the pool on drop.
pub struct KeyLease {
    identity: Option<SigningIdentity>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl KeyLease {
    pub fn identity(&self) -> &SigningIdentity {
        // Only `Drop` takes the identity out.
        self.identity.as_ref().unwrap_or_else(|| unreachable!())
    }

    pub fn identity_mut(&mut self) -> &mut SigningIdentity {
        self.identity.as_mut().unwrap_or_else(|| unreachable!())
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity().public_key
    }

    pub fn signer(&self) -> Arc<dyn Signer> {
        self.identity().signer.clone()
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        if let (Some(identity), Some(permit)) = (self.identity.take(), self.permit.take()) {
            self.pool.give_back(identity, permit);
        }
    }
}

impl std::fmt::Debug for KeyLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLease")
            .field("identity", &self.identity)
            .finish()
    }
}
