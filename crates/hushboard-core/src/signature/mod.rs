//! Decryption signature cache.
//!
//! A decryption signature is the wallet-signed permit a recipient presents to
//! the FHE gateway. Obtaining one costs a wallet prompt, so signatures are
//! kept per (contract, user) and reused until they expire or stop covering
//! the requested handles.
//!
//! Entries are encoded as CBOR and kept in a [`SignatureStore`]. An entry that
//! fails to decode is treated as a miss and overwritten by the next mint.

mod store;

use std::{collections::BTreeSet, fmt, future::Future};

use serde::{Deserialize, Serialize};
pub use store::{MemorySignatureStore, SignatureStore};

use crate::{
    env::Environment,
    error::SignatureError,
    permit::DecryptionPermit,
    types::{Address, Handle},
};

/// Seconds in one validity day.
const SECONDS_PER_DAY: u64 = 86_400;

/// Wallet-signed authorization to decrypt a user's ciphertexts on a contract.
///
/// # Invariants
///
/// - Valid only for the exact (`contract`, `user`) pair
/// - Valid only while `now < expires_at()`
/// - An empty `handles` set covers every handle of the contract
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionSignature {
    /// Contract the permit covers.
    pub contract: Address,
    /// Account that signed the permit.
    pub user: Address,
    /// Handles the signature was requested for. Empty means contract-wide.
    pub handles: BTreeSet<Handle>,
    /// Re-encryption public key bound into the permit.
    pub public_key: Vec<u8>,
    /// Re-encryption secret. Never leaves the client.
    pub private_key: Vec<u8>,
    /// 65-byte `r || s || v` wallet signature over the permit digest.
    pub signature: Vec<u8>,
    /// Unix time (seconds) the permit becomes valid.
    pub start_timestamp: u64,
    /// Validity window in days.
    pub duration_days: u64,
}

impl DecryptionSignature {
    /// Unix time (seconds) after which the signature is no longer valid.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp.saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Check if the signature is within its validity window at `now`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.start_timestamp && now < self.expires_at()
    }

    /// Check if the signature covers every handle in `requested`.
    pub fn covers(&self, requested: &[Handle]) -> bool {
        self.handles.is_empty() || requested.iter().all(|h| self.handles.contains(h))
    }

    /// Key this signature is stored under.
    pub fn key(&self) -> SignatureKey {
        SignatureKey { contract: self.contract, user: self.user }
    }

    /// Permit message this signature was produced over.
    pub fn permit(&self) -> DecryptionPermit {
        DecryptionPermit {
            public_key: self.public_key.clone(),
            contract_addresses: vec![*self.contract.as_bytes()],
            start_timestamp: self.start_timestamp,
            duration_days: self.duration_days,
        }
    }
}

impl fmt::Debug for DecryptionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionSignature")
            .field("contract", &self.contract)
            .field("user", &self.user)
            .field("handles", &self.handles.len())
            .field("private_key", &"<redacted>")
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .finish_non_exhaustive()
    }
}

/// Cache key: exactly one signature per (contract, user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureKey {
    /// Contract address.
    pub contract: Address,
    /// Signing account.
    pub user: Address,
}

impl SignatureKey {
    /// Key in the backing store.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.contract, self.user)
    }
}

/// Cache of decryption signatures over a [`SignatureStore`].
///
/// Cheap to clone; clones share the underlying store.
#[derive(Debug, Clone)]
pub struct DecryptionSignatureCache<S, E> {
    store: S,
    env: E,
}

impl<S, E> DecryptionSignatureCache<S, E>
where
    S: SignatureStore,
    E: Environment,
{
    /// Create a cache over `store`, reading the clock from `env`.
    pub fn new(store: S, env: E) -> Self {
        Self { store, env }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Valid cached signature for (`contract`, `user`) covering `handles`.
    ///
    /// `None` on a miss, an expired entry, an entry that does not cover the
    /// requested handles, or an entry that fails to decode.
    pub fn lookup(
        &self,
        contract: Address,
        user: Address,
        handles: &[Handle],
    ) -> Option<DecryptionSignature> {
        let key = SignatureKey { contract, user };
        let storage_key = key.storage_key();

        let bytes = match self.store.get(&storage_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "signature store read failed");
                return None;
            },
        };

        let signature: DecryptionSignature = match ciborium::from_reader(bytes.as_slice()) {
            Ok(signature) => signature,
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "discarding undecodable signature");
                return None;
            },
        };

        if signature.key() != key {
            tracing::warn!(key = %storage_key, "stored signature belongs to another key");
            return None;
        }

        let now = self.env.unix_time();
        if !signature.is_valid_at(now) {
            tracing::debug!(
                key = %storage_key,
                now,
                expires_at = signature.expires_at(),
                "cached signature expired"
            );
            return None;
        }

        if !signature.covers(handles) {
            tracing::debug!(key = %storage_key, "cached signature does not cover the handles");
            return None;
        }

        Some(signature)
    }

    /// Cached signature for (`contract`, `user`), minting a new one on a miss.
    ///
    /// `mint` runs the wallet signing round trip. The minted signature
    /// replaces any previous entry for the key. A store write failure is
    /// logged and the signature is still returned.
    ///
    /// # Errors
    ///
    /// - `SigningRejected` if the user declined the prompt
    /// - `InvalidPermit` if `mint` produced a signature for a different key
    pub async fn get_or_create<F, Fut>(
        &self,
        contract: Address,
        user: Address,
        handles: &[Handle],
        mint: F,
    ) -> Result<DecryptionSignature, SignatureError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DecryptionSignature, SignatureError>>,
    {
        if let Some(signature) = self.lookup(contract, user, handles) {
            tracing::debug!(%contract, %user, "decryption signature cache hit");
            return Ok(signature);
        }

        let signature = mint().await?;
        let key = SignatureKey { contract, user };
        if signature.key() != key {
            return Err(SignatureError::InvalidPermit {
                reason: format!("minted signature is for {}", signature.key().storage_key()),
            });
        }

        self.insert(&signature);
        tracing::info!(
            %contract,
            %user,
            expires_at = signature.expires_at(),
            "minted decryption signature"
        );
        Ok(signature)
    }

    /// Store `signature`, overwriting any entry for its key.
    pub fn insert(&self, signature: &DecryptionSignature) {
        let storage_key = signature.key().storage_key();
        let mut bytes = Vec::new();

        if let Err(e) = ciborium::into_writer(signature, &mut bytes) {
            tracing::warn!(key = %storage_key, error = %e, "failed to encode signature");
            return;
        }

        if let Err(e) = self.store.put(&storage_key, bytes) {
            tracing::warn!(key = %storage_key, error = %e, "signature store write failed");
        }
    }

    /// Drop the entry for (`contract`, `user`).
    pub fn invalidate(&self, contract: Address, user: Address) {
        let storage_key = SignatureKey { contract, user }.storage_key();
        if let Err(e) = self.store.remove(&storage_key) {
            tracing::warn!(key = %storage_key, error = %e, "signature store remove failed");
        }
    }

    /// Drop every cached signature (logout, disconnect).
    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "signature store clear failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    };

    use super::*;

    #[derive(Clone, Default)]
    struct FixedClock(Arc<AtomicU64>);

    impl Environment for FixedClock {
        fn unix_time(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(7);
        }
    }

    const NOW: u64 = 1_700_000_000;

    fn contract() -> Address {
        Address::new([0xc0; 20])
    }

    fn alice() -> Address {
        Address::new([0xa1; 20])
    }

    fn signature_for(user: Address, handles: &[Handle]) -> DecryptionSignature {
        DecryptionSignature {
            contract: contract(),
            user,
            handles: handles.iter().copied().collect(),
            public_key: vec![1; 32],
            private_key: vec![2; 32],
            signature: vec![3; 65],
            start_timestamp: NOW,
            duration_days: 1,
        }
    }

    fn cache() -> (DecryptionSignatureCache<MemorySignatureStore, FixedClock>, FixedClock) {
        let clock = FixedClock(Arc::new(AtomicU64::new(NOW)));
        (DecryptionSignatureCache::new(MemorySignatureStore::new(), clock.clone()), clock)
    }

    #[tokio::test]
    async fn second_request_hits_cache() {
        let (cache, _) = cache();
        let mints = AtomicUsize::new(0);

        for _ in 0..2 {
            let signature = cache
                .get_or_create(contract(), alice(), &[], || async {
                    mints.fetch_add(1, Ordering::SeqCst);
                    Ok(signature_for(alice(), &[]))
                })
                .await
                .unwrap();
            assert_eq!(signature.user, alice());
        }

        assert_eq!(mints.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_reminted() {
        let (cache, clock) = cache();
        cache.insert(&signature_for(alice(), &[]));

        clock.0.store(NOW + SECONDS_PER_DAY, Ordering::SeqCst);
        assert!(cache.lookup(contract(), alice(), &[]).is_none());

        let mut fresh = signature_for(alice(), &[]);
        fresh.start_timestamp = NOW + SECONDS_PER_DAY;
        let got =
            cache.get_or_create(contract(), alice(), &[], || async { Ok(fresh.clone()) }).await;
        assert_eq!(got.unwrap().start_timestamp, NOW + SECONDS_PER_DAY);
    }

    #[test]
    fn narrow_entry_does_not_cover_other_handles() {
        let (cache, _) = cache();
        let h1 = Handle::new([1; 32]);
        let h2 = Handle::new([2; 32]);
        cache.insert(&signature_for(alice(), &[h1]));

        assert!(cache.lookup(contract(), alice(), &[h1]).is_some());
        assert!(cache.lookup(contract(), alice(), &[h1, h2]).is_none());
    }

    #[test]
    fn contract_wide_entry_covers_any_handle() {
        let (cache, _) = cache();
        cache.insert(&signature_for(alice(), &[]));

        assert!(cache.lookup(contract(), alice(), &[Handle::new([9; 32])]).is_some());
    }

    #[test]
    fn entries_are_keyed_by_user() {
        let (cache, _) = cache();
        cache.insert(&signature_for(alice(), &[]));

        assert!(cache.lookup(contract(), Address::new([0xb0; 20]), &[]).is_none());
        assert!(cache.lookup(Address::new([0xc1; 20]), alice(), &[]).is_none());
    }

    #[tokio::test]
    async fn rejection_is_not_cached() {
        let (cache, _) = cache();
        let result = cache
            .get_or_create(contract(), alice(), &[], || async {
                Err(SignatureError::SigningRejected)
            })
            .await;

        assert_eq!(result, Err(SignatureError::SigningRejected));
        assert!(cache.store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn mint_for_wrong_user_is_refused() {
        let (cache, _) = cache();
        let result = cache
            .get_or_create(contract(), alice(), &[], || async {
                Ok(signature_for(Address::new([0xb0; 20]), &[]))
            })
            .await;

        assert!(matches!(result, Err(SignatureError::InvalidPermit { .. })));
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let (cache, _) = cache();
        let key = SignatureKey { contract: contract(), user: alice() };
        cache.store().put(&key.storage_key(), vec![0xff, 0x00, 0x13]).unwrap();

        assert!(cache.lookup(contract(), alice(), &[]).is_none());
    }

    #[test]
    fn clear_empties_store() {
        let (cache, _) = cache();
        cache.insert(&signature_for(alice(), &[]));
        cache.clear();

        assert!(cache.store().is_empty().unwrap());
    }

    #[test]
    fn debug_redacts_private_key() {
        let rendered = format!("{:?}", signature_for(alice(), &[]));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("[2, 2"));
    }
}
