//! Storage for authorization codes and refresh tokens.
//!
//! Both stores need one operation above all others: atomic fetch-and-delete.
//! Two concurrent redemptions of the same key must see exactly one record.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::types::{AuthorizationCode, Expiring, RefreshToken};

/// Keyed record storage with single-use semantics.
///
/// Implementations may be backed by an in-memory map, an external cache or a
/// database, as long as `take_if_present` and `take_if` are indivisible.
#[async_trait]
pub trait RecordStore<R>: Send + Sync
where
    R: Expiring + Send + Sync + 'static,
{
    /// Insert or replace the record under `key`.
    async fn put(&self, key: String, record: R);

    /// Remove and return the record under `key`.
    ///
    /// The record is returned even if expired; the caller decides what that means.
    async fn take_if_present(&self, key: &str) -> Option<R>;

    /// Remove and return the record only if it is unexpired and `predicate` accepts it.
    ///
    /// A rejected record stays in place. An expired record is evicted and never returned.
    async fn take_if(&self, key: &str, predicate: &(dyn for<'r> Fn(&'r R) -> bool + Sync)) -> Option<R>;

    /// Drop every expired record. Returns how many were removed.
    async fn purge_expired(&self) -> usize;

    /// Number of records currently held, expired or not.
    async fn len(&self) -> usize;
}

/// Shared handle to an authorization code store.
pub type CodeStore = Arc<dyn RecordStore<AuthorizationCode>>;

/// Shared handle to a refresh token store.
pub type RefreshStore = Arc<dyn RecordStore<RefreshToken>>;

/// In-memory store behind a single write lock.
pub struct MemoryStore<R> {
    records: Arc<RwLock<HashMap<String, R>>>,
}

impl<R> MemoryStore<R> {
    #[must_use]
    pub fn new() -> Self {
        Self { records: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<R> Clone for MemoryStore<R> {
    fn clone(&self) -> Self {
        Self { records: Arc::clone(&self.records) }
    }
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for MemoryStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl<R> RecordStore<R> for MemoryStore<R>
where
    R: Expiring + Send + Sync + 'static,
{
    async fn put(&self, key: String, record: R) {
        self.records.write().await.insert(key, record);
    }

    async fn take_if_present(&self, key: &str) -> Option<R> {
        self.records.write().await.remove(key)
    }

    async fn take_if(&self, key: &str, predicate: &(dyn for<'r> Fn(&'r R) -> bool + Sync)) -> Option<R> {
        let mut records = self.records.write().await;
        let record = records.get(key)?;

        if record.is_expired_at(Utc::now()) {
            records.remove(key);
            return None;
        }
        if !predicate(record) {
            return None;
        }

        records.remove(key)
    }

    async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        let removed = before - records.len();
        if removed > 0 {
            tracing::debug!(count = removed, "Purged expired records");
        }
        removed
    }

    async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Record {
        owner: &'static str,
        expires_at: DateTime<Utc>,
    }

    impl Expiring for Record {
        fn expires_at(&self) -> DateTime<Utc> {
            self.expires_at
        }
    }

    fn live(owner: &'static str) -> Record {
        Record { owner, expires_at: Utc::now() + TimeDelta::minutes(5) }
    }

    fn stale(owner: &'static str) -> Record {
        Record { owner, expires_at: Utc::now() - TimeDelta::seconds(1) }
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = MemoryStore::new();
        store.put("k".into(), live("a")).await;

        let first = store.take_if_present("k").await;
        assert_eq!(first.map(|r| r.owner), Some("a"));
        assert!(store.take_if_present("k").await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_take_if_present_returns_expired_record() {
        let store = MemoryStore::new();
        store.put("k".into(), stale("a")).await;

        let record = store.take_if_present("k").await.unwrap();
        assert!(record.is_expired_at(Utc::now()));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_take_if_leaves_rejected_record() {
        let store = MemoryStore::new();
        store.put("k".into(), live("a")).await;

        assert!(store.take_if("k", &|r: &Record| r.owner == "b").await.is_none());
        assert_eq!(store.len().await, 1);

        assert!(store.take_if("k", &|r: &Record| r.owner == "a").await.is_some());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_take_if_through_shared_handle() {
        let store: Arc<dyn RecordStore<Record>> = Arc::new(MemoryStore::<Record>::new());
        store.put("k".into(), live("a")).await;

        let owner = String::from("a");
        let rejected = std::sync::atomic::AtomicBool::new(false);
        let predicate = |r: &Record| {
            let matches = r.owner == owner;
            rejected.store(!matches, std::sync::atomic::Ordering::Relaxed);
            matches
        };

        let taken = store.take_if("k", &predicate).await;
        assert_eq!(taken.map(|r| r.owner), Some("a"));
        assert!(!rejected.load(std::sync::atomic::Ordering::Relaxed));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_take_if_evicts_expired() {
        let store = MemoryStore::new();
        store.put("k".into(), stale("a")).await;

        assert!(store.take_if("k", &|_: &Record| true).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.put("old1".into(), stale("a")).await;
        store.put("old2".into(), stale("b")).await;
        store.put("new".into(), live("c")).await;

        assert_eq!(store.purge_expired().await, 2);
        assert_eq!(store.len().await, 1);
        assert!(store.take_if_present("new").await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_take_yields_one_winner() {
        let store = MemoryStore::new();
        store.put("k".into(), live("a")).await;

        let attempts = (0..32).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.take_if_present("k").await })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results.into_iter().filter(|r| matches!(r, Ok(Some(_)))).count();
        assert_eq!(winners, 1);
    }
}
