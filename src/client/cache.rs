//! Read-through query cache
//!
//! Entries are plain JSON snapshots of what the backend returned. Nothing is
//! ever patched locally: a successful mutation discards the affected keys and
//! the next read goes back to the backend.
//!
//! Every key carries a generation that invalidation bumps. A read that was
//! already in flight when its key was invalidated still returns its value to
//! the caller but does not store it.

use super::events::{CacheEvent, InvalidationBus};
use super::{ClientError, ClientResult};
use crate::domain::Contract;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::debug;

/// Identity of one cached read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// A single contract
    Contract(String),
    /// Payments recorded against a contract
    ContractPayments(String),
    /// The client's own contracts
    ClientContracts,
    /// The provider's own contracts
    ProviderContracts,
    /// Every contract (admin)
    AllContracts,
    /// Contracts against one listing
    ServiceContracts(String),
    /// A single listing
    Service(String),
    /// Reviews of a listing
    ServiceReviews(String),
    /// The provider's earnings summary
    ProviderEarnings,
    /// The caller's conversations
    Conversations,
    /// Messages of one conversation
    ConversationMessages(String),
}

impl QueryKey {
    /// Keys whose data changes when `contract` changes status
    pub fn contract_scope(contract: &Contract) -> Vec<QueryKey> {
        vec![
            QueryKey::Contract(contract.id.clone()),
            QueryKey::ClientContracts,
            QueryKey::ProviderContracts,
            QueryKey::AllContracts,
            QueryKey::ServiceContracts(contract.service_id.clone()),
            QueryKey::Service(contract.service_id.clone()),
        ]
    }

    /// Keys whose data changes when a payment lands on `contract`
    pub fn payment_scope(contract: &Contract) -> Vec<QueryKey> {
        let mut keys = Self::contract_scope(contract);
        keys.push(QueryKey::ContractPayments(contract.id.clone()));
        keys.push(QueryKey::ProviderEarnings);
        keys
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Contract(id) => write!(f, "contract/{}", id),
            QueryKey::ContractPayments(id) => write!(f, "contract/{}/payments", id),
            QueryKey::ClientContracts => write!(f, "contracts/client"),
            QueryKey::ProviderContracts => write!(f, "contracts/provider"),
            QueryKey::AllContracts => write!(f, "contracts/all"),
            QueryKey::ServiceContracts(id) => write!(f, "service/{}/contracts", id),
            QueryKey::Service(id) => write!(f, "service/{}", id),
            QueryKey::ServiceReviews(id) => write!(f, "service/{}/reviews", id),
            QueryKey::ProviderEarnings => write!(f, "earnings"),
            QueryKey::Conversations => write!(f, "conversations"),
            QueryKey::ConversationMessages(id) => write!(f, "conversation/{}/messages", id),
        }
    }
}

#[derive(Default)]
struct Entries {
    values: HashMap<QueryKey, serde_json::Value>,
    generations: HashMap<QueryKey, u64>,
    /// Bumped by [`QueryCache::clear`]
    epoch: u64,
}

impl Entries {
    fn stamp(&self, key: &QueryKey) -> (u64, u64) {
        (self.epoch, self.generations.get(key).copied().unwrap_or(0))
    }
}

/// Cache of backend reads keyed by [`QueryKey`]
pub struct QueryCache {
    entries: RwLock<Entries>,
    bus: InvalidationBus,
}

impl QueryCache {
    /// Create an empty cache publishing on `bus`
    pub fn new(bus: InvalidationBus) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            bus,
        }
    }

    /// The bus invalidations are published on
    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    /// Cached value for `key`, if any
    pub async fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.entries.read().await;
        entries
            .values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Store a fresh value for `key`
    pub async fn put<T: Serialize>(&self, key: QueryKey, value: &T) -> ClientResult<()> {
        let value = serde_json::to_value(value).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.entries.write().await.values.insert(key, value);
        Ok(())
    }

    /// Cached value for `key`, or the result of `fetch` which is then cached
    ///
    /// A failed fetch caches nothing, and neither does one that overlapped an
    /// invalidation of `key`.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> ClientResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let started = {
            let entries = self.entries.read().await;
            if let Some(hit) = entries
                .values
                .get(&key)
                .and_then(|value| serde_json::from_value(value.clone()).ok())
            {
                debug!("Cache hit: {}", key);
                return Ok(hit);
            }
            entries.stamp(&key)
        };

        debug!("Cache miss: {}", key);
        let value = fetch().await?;
        let json = serde_json::to_value(&value).map_err(|e| ClientError::Decode(e.to_string()))?;

        let mut entries = self.entries.write().await;
        if entries.stamp(&key) == started {
            entries.values.insert(key, json);
        } else {
            debug!("Not caching {}: invalidated while fetching", key);
        }
        Ok(value)
    }

    /// Whether `key` currently has an entry
    pub async fn contains(&self, key: &QueryKey) -> bool {
        self.entries.read().await.values.contains_key(key)
    }

    /// Discard `keys` and announce each on the bus
    pub async fn invalidate(&self, keys: &[QueryKey]) {
        {
            let mut entries = self.entries.write().await;
            for key in keys {
                entries.values.remove(key);
                *entries.generations.entry(key.clone()).or_insert(0) += 1;
            }
        }
        for key in keys {
            self.bus.emit(CacheEvent::Invalidated(key.clone()));
        }
    }

    /// Discard everything
    pub async fn clear(&self) {
        {
            let mut entries = self.entries.write().await;
            entries.values.clear();
            entries.epoch += 1;
        }
        self.bus.emit(CacheEvent::Cleared);
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(InvalidationBus::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_read_through_and_invalidate() {
        let cache = QueryCache::default();
        let mut events = cache.bus().subscribe();
        let calls = AtomicUsize::new(0);
        let key = QueryKey::Contract("c1".to_string());

        for _ in 0..2 {
            let value: Vec<u32> = cache
                .get_or_fetch(key.clone(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&[key.clone()]).await;
        assert!(!cache.contains(&key).await);
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Invalidated(key.clone()));

        let _: Vec<u32> = cache
            .get_or_fetch(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![4])
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = QueryCache::default();
        let key = QueryKey::ProviderEarnings;
        let result: ClientResult<u32> = cache
            .get_or_fetch(key.clone(), || async {
                Err(ClientError::Network("connection refused".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains(&key).await);
    }

    #[tokio::test]
    async fn test_read_overlapping_invalidation_is_not_stored() {
        let cache = std::sync::Arc::new(QueryCache::default());
        let key = QueryKey::Contract("c1".to_string());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<u32>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let reader = tokio::spawn({
            let cache = cache.clone();
            let key = key.clone();
            async move {
                cache
                    .get_or_fetch(key, || async move {
                        let _ = started_tx.send(());
                        Ok(release_rx.await.unwrap_or(0))
                    })
                    .await
            }
        });

        started_rx.await.unwrap();
        cache.invalidate(&[key.clone()]).await;
        release_tx.send(1).unwrap();

        // the caller still gets what it fetched
        assert_eq!(reader.await.unwrap().unwrap(), 1);
        assert!(!cache.contains(&key).await);

        let fresh: u32 = cache
            .get_or_fetch(key.clone(), || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(fresh, 2);
        assert_eq!(cache.get::<u32>(&key).await, Some(2));
    }

    #[tokio::test]
    async fn test_read_overlapping_clear_is_not_stored() {
        let cache = QueryCache::default();
        let key = QueryKey::Conversations;
        let value: u32 = cache
            .get_or_fetch(key.clone(), || async {
                cache.clear().await;
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(!cache.contains(&key).await);
    }

    #[test]
    fn test_payment_scope_covers_contract_scope() {
        let contract = crate::domain::actions::tests::contract_in(
            crate::domain::ContractStatus::Active,
            2,
        );
        let scope = QueryKey::payment_scope(&contract);
        for key in QueryKey::contract_scope(&contract) {
            assert!(scope.contains(&key));
        }
        assert!(scope.contains(&QueryKey::ContractPayments(contract.id.clone())));
    }
}
