use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::middleware::error::{AppError, AppResult};

struct CacheEntry {
    value: Value,
    written_at: Instant,
}

enum FetchRole {
    Leader(broadcast::Sender<AppResult<Value>>),
    Follower(broadcast::Receiver<AppResult<Value>>),
}

/// Time-expiring, size-bounded read cache with in-flight request
/// coalescing, sitting in front of the document store.
///
/// The cache is an explicitly constructed instance owned by the
/// composition root ([`crate::middleware::mw_ctx::CtxState`]); every
/// mutating ledger operation invalidates the keys it may have staled.
pub struct ReadCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
    pending: Mutex<HashMap<String, broadcast::Sender<AppResult<Value>>>>,
}

impl ReadCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn entries_lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending_lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<AppResult<Value>>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fresh value at `key`, or None. Expired entries are evicted here.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries_lock();
        match entries.get(key) {
            Some(entry) if entry.written_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key`, stamped with the write time. When the
    /// cache is at capacity and `key` is new, the entry with the oldest
    /// write timestamp is evicted first (approximate LRU: reads do not
    /// refresh the stamp; ties go to the first minimal entry found).
    pub fn set(&self, key: &str, value: Value) {
        let mut entries = self.entries_lock();
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.written_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                written_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self, key: &str) {
        self.entries_lock().remove(key);
        self.pending_lock().remove(key);
    }

    pub fn clear_all(&self) {
        self.entries_lock().clear();
        self.pending_lock().clear();
    }

    pub fn cache_keys(&self) -> Vec<String> {
        self.entries_lock().keys().cloned().collect()
    }

    pub fn is_fetching(&self, key: &str) -> bool {
        self.pending_lock().contains_key(key)
    }

    /// Subscribes to an in-flight fetch for `key`, when one exists.
    pub fn get_pending(&self, key: &str) -> Option<broadcast::Receiver<AppResult<Value>>> {
        self.pending_lock().get(key).map(|tx| tx.subscribe())
    }

    /// Registers an in-flight fetch for `key`. The caller owns the sender
    /// and must publish the settled result and `clear_pending` afterwards;
    /// prefer [`Self::get_or_create_pending`].
    pub fn set_pending(&self, key: &str) -> broadcast::Sender<AppResult<Value>> {
        let (tx, _rx) = broadcast::channel(1);
        self.pending_lock().insert(key.to_string(), tx.clone());
        tx
    }

    pub fn clear_pending(&self, key: &str) {
        self.pending_lock().remove(key);
    }

    /// At most one outstanding fetch per key: when a fetch for `key` is
    /// already in flight the caller awaits its result instead of issuing
    /// a duplicate; otherwise `fetch` runs and its settled result
    /// (success or failure) is published to every waiter, after the
    /// registration is removed.
    pub async fn get_or_create_pending<F>(&self, key: &str, fetch: F) -> AppResult<Value>
    where
        F: Future<Output = AppResult<Value>> + Send,
    {
        let role = {
            let mut pending = self.pending_lock();
            match pending.get(key) {
                Some(tx) => FetchRole::Follower(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    pending.insert(key.to_string(), tx.clone());
                    FetchRole::Leader(tx)
                }
            }
        };
        match role {
            FetchRole::Follower(mut rx) => match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(AppError::Store {
                    source: format!("pending fetch for {key} was dropped"),
                }),
            },
            FetchRole::Leader(tx) => {
                let result = fetch.await;
                self.pending_lock().remove(key);
                let _ = tx.send(result.clone());
                result
            }
        }
    }

    /// Read-through: fresh cached value, or coalesced fetch + populate.
    pub async fn get_or_fetch<F>(&self, key: &str, fetch: F) -> AppResult<Value>
    where
        F: Future<Output = AppResult<Value>> + Send,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = self.get_or_create_pending(key, fetch).await?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Drops every cached entry whose key contains `fragment`.
    pub fn invalidate(&self, fragment: &str) {
        self.entries_lock().retain(|k, _| !k.contains(fragment));
    }

    pub fn invalidate_user(&self, uid: &str) {
        self.invalidate(uid);
    }

    /// Like [`Self::invalidate_user`] but also drops the user's in-flight
    /// fetch registrations.
    pub fn clear_user(&self, uid: &str) {
        self.invalidate(uid);
        self.pending_lock().retain(|k, _| !k.contains(uid));
    }
}

/// Canonical cache keys. Mutating operations invalidate by these.
pub mod keys {
    pub fn user(uid: &str) -> String {
        format!("user_{uid}")
    }

    pub fn wallet(uid: &str) -> String {
        format!("wallet_{uid}")
    }

    pub fn campaign(campaign_id: &str) -> String {
        format!("campaign_{campaign_id}")
    }

    pub fn works(uid: &str) -> String {
        format!("works_{uid}")
    }

    pub fn leaderboard(period: &str) -> String {
        format!("leaderboard_{period}")
    }
}
