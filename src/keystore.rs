//! In-memory keystore mapping public keys to their private keys
//!
//! Entries expire after a fixed time-to-live and the store holds at most `capacity`
//! keys, evicting the oldest entry when full. Keys are indexed by the public key's
//! fingerprint. Nothing is persisted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::keys::{PrivateKey, PublicKey};

/// Keystore limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyStoreConfig {
    /// Seconds a stored key stays retrievable
    pub ttl_secs: u64,
    /// Maximum number of stored keys; 0 disables the store
    pub capacity: usize,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        KeyStoreConfig {
            ttl_secs: 3600,
            capacity: 1024,
        }
    }
}

struct StoredKey {
    private_key: PrivateKey,
    stored_at: Instant,
}

/// Thread-safe store of private keys
pub struct KeyStore {
    entries: RwLock<HashMap<String, StoredKey>>,
    ttl: Duration,
    capacity: usize,
}

impl KeyStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        KeyStore {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    pub fn from_config(config: &KeyStoreConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.capacity)
    }

    /// Store a private key under its public key
    pub fn insert(&self, private_key: &PrivateKey) {
        if self.capacity == 0 {
            return;
        }

        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        entries.retain(|_, entry| !self.is_expired(entry, now));

        let fingerprint = private_key.public_key().fingerprint();
        if !entries.contains_key(&fingerprint) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(fingerprint = %oldest, "evicting oldest stored key");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            fingerprint,
            StoredKey {
                private_key: private_key.clone(),
                stored_at: now,
            },
        );
    }

    /// Look up the private key for `public_key`, if stored and not expired
    pub fn get(&self, public_key: &PublicKey) -> Option<PrivateKey> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&public_key.fingerprint())
            .filter(|entry| !self.is_expired(entry, Instant::now()))
            .map(|entry| entry.private_key.clone())
    }

    /// Remove the entry for `public_key`, returning whether one existed
    pub fn remove(&self, public_key: &PublicKey) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&public_key.fingerprint()).is_some()
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &StoredKey, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) >= self.ttl
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::from_config(&KeyStoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_and_get() {
        let store = KeyStore::default();
        let keypair = KeyPair::generate(32).unwrap();

        assert!(store.get(&keypair.public_key).is_none());
        store.insert(&keypair.private_key);

        let found = store.get(&keypair.public_key).unwrap();
        assert!(found == keypair.private_key);
        assert_eq!(store.len(), 1);

        assert!(store.remove(&keypair.public_key));
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_entries_are_not_returned() {
        let store = KeyStore::new(Duration::ZERO, 8);
        let keypair = KeyPair::generate(32).unwrap();

        store.insert(&keypair.private_key);
        assert!(store.get(&keypair.public_key).is_none());
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = KeyStore::new(Duration::from_secs(60), 2);
        let keypairs: Vec<_> = (0..3).map(|_| KeyPair::generate(32).unwrap()).collect();

        for keypair in &keypairs {
            store.insert(&keypair.private_key);
            thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(store.len(), 2);
        assert!(store.get(&keypairs[0].public_key).is_none());
        assert!(store.get(&keypairs[1].public_key).is_some());
        assert!(store.get(&keypairs[2].public_key).is_some());
    }

    #[test]
    fn test_zero_capacity_disables_store() {
        let store = KeyStore::new(Duration::from_secs(60), 0);
        let keypair = KeyPair::generate(32).unwrap();
        store.insert(&keypair.private_key);
        assert!(store.get(&keypair.public_key).is_none());
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(KeyStore::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let keypair = KeyPair::generate(32).unwrap();
                    store.insert(&keypair.private_key);
                    store.get(&keypair.public_key).is_some()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(store.len(), 4);
    }
}
