//! Read-through memoization for collaborator calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use crate::error::ClubError;
use crate::models::{ActivityRow, EventKind, Window};
use crate::sources::{AccountDirectory, EventFetcher, RewardFetcher};

/// Operation name plus its rendered argument tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub op: &'static str,
    pub args: String,
}

impl CacheKey {
    pub fn new(op: &'static str, args: impl Into<String>) -> Self {
        Self {
            op,
            args: args.into(),
        }
    }
}

/// Memoizes successful results. Entries older than `ttl` are refetched;
/// `None` keeps them for the life of the process. Concurrent misses on one
/// key share a single fetch.
pub struct MemoCache<V> {
    entries: RwLock<HashMap<CacheKey, (V, Instant)>>,
    in_flight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    ttl: Option<Duration>,
}

impl<V: Clone> MemoCache<V> {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn is_fresh(&self, inserted: Instant) -> bool {
        self.ttl.map_or(true, |ttl| inserted.elapsed() < ttl)
    }

    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, inserted)| self.is_fresh(*inserted))
            .map(|(value, _)| value.clone())
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<V, ClubError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ClubError>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::trace!("cache hit {}({})", key.op, key.args);
            return Ok(value);
        }

        let slot = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.entry(key.clone()).or_default().clone()
        };
        let _guard = slot.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        let mut entries = self.entries.write().await;
        entries.insert(key, (value.clone(), Instant::now()));
        Ok(value)
    }
}

fn window_args(username: &str, window: &Window) -> String {
    format!("{username}:{}-{}", window.start_epoch(), window.stop_epoch())
}

/// Wraps chain collaborators with per-operation caches.
pub struct CachedChain<T: ?Sized> {
    inner: Arc<T>,
    rows: MemoCache<Vec<ActivityRow>>,
    rewards: MemoCache<Decimal>,
    accounts: MemoCache<bool>,
    delegations: MemoCache<Vec<String>>,
}

impl<T: ?Sized> CachedChain<T> {
    /// `history_ttl` covers window-keyed data; `state_ttl` covers data that
    /// follows the live chain (delegations, accounts).
    pub fn new(inner: Arc<T>, history_ttl: Option<Duration>, state_ttl: Duration) -> Self {
        Self {
            inner,
            rows: MemoCache::new(history_ttl),
            rewards: MemoCache::new(history_ttl),
            accounts: MemoCache::new(Some(state_ttl)),
            delegations: MemoCache::new(Some(state_ttl)),
        }
    }
}

#[async_trait::async_trait]
impl<T: EventFetcher + ?Sized> EventFetcher for CachedChain<T> {
    async fn fetch_activity(
        &self,
        username: &str,
        kind: EventKind,
        window: &Window,
    ) -> Result<Vec<ActivityRow>, ClubError> {
        let key = CacheKey::new(kind.op_name(), window_args(username, window));
        self.rows
            .get_or_fetch(key, || self.inner.fetch_activity(username, kind, window))
            .await
    }
}

#[async_trait::async_trait]
impl<T: RewardFetcher + ?Sized> RewardFetcher for CachedChain<T> {
    async fn author_reward_vests(
        &self,
        username: &str,
        window: &Window,
    ) -> Result<Decimal, ClubError> {
        let key = CacheKey::new("author_reward_vests", window_args(username, window));
        self.rewards
            .get_or_fetch(key, || self.inner.author_reward_vests(username, window))
            .await
    }
}

#[async_trait::async_trait]
impl<T: AccountDirectory + ?Sized> AccountDirectory for CachedChain<T> {
    async fn account_exists(&self, username: &str) -> Result<bool, ClubError> {
        let key = CacheKey::new("account_exists", username);
        self.accounts
            .get_or_fetch(key, || self.inner.account_exists(username))
            .await
    }

    async fn delegatees(&self, username: &str) -> Result<Vec<String>, ClubError> {
        let key = CacheKey::new("delegatees", username);
        self.delegations
            .get_or_fetch(key, || self.inner.delegatees(username))
            .await
    }
}
