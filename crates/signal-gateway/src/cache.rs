//! Per-account resolution caches for groups and identities.
//!
//! Entries expire after a period without access: every hit resets the
//! clock, and a lookup that finds an entry idle for longer than the TTL
//! drops it and loads afresh. Every load also sweeps idle entries of other
//! accounts. Clocks come from `tokio::time`, so tests can
//! drive expiry with a paused runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use signal_core::{Group, Identity};
use signal_events::GroupNameResolver;
use signal_events::classifier::ResolveError;
use signal_rpc::RpcClient;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{GatewayError, Result};

/// Items keyed by a string id, in daemon order, first occurrence wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directory<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Directory<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Directory<T> {
    /// Build from `items`, keeping the first item for each key and dropping
    /// items without one.
    pub fn from_items<F>(items: Vec<T>, key: F) -> Self
    where
        F: Fn(&T) -> Option<&str>,
    {
        let mut dir = Self::default();
        for item in items {
            let Some(k) = key(&item).map(str::to_string) else {
                continue;
            };
            if dir.index.contains_key(&k) {
                continue;
            }
            let _ = dir.index.insert(k, dir.items.len());
            dir.items.push(item);
        }
        dir
    }

    /// Item with key `key`.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).and_then(|&i| self.items.get(i))
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Items in daemon order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Groups of one account keyed by group id.
pub type GroupMap = Directory<Group>;

/// Identities of one account keyed by phone number.
pub type IdentityMap = Directory<Identity>;

impl GroupMap {
    /// Group with id `id_or_title`, else the first group whose title
    /// matches it case-insensitively.
    pub fn resolve(&self, id_or_title: &str) -> Option<&Group> {
        self.get(id_or_title)
            .or_else(|| self.iter().find(|g| g.name_matches(id_or_title)))
    }
}

/// Loads the value cached for one account.
#[async_trait]
pub trait CacheLoader<V>: Send + Sync {
    /// Load the value for `account`.
    async fn load(&self, account: &str) -> Result<V>;
}

struct Entry<V> {
    value: Arc<V>,
    last_access: Instant,
}

/// Account-keyed cache with an idle TTL.
pub struct TtlCache<V> {
    name: &'static str,
    ttl: Duration,
    entries: DashMap<String, Entry<V>>,
    loader: Arc<dyn CacheLoader<V>>,
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<V: Send + Sync + 'static> TtlCache<V> {
    /// Create an empty cache.
    pub fn new(name: &'static str, ttl: Duration, loader: Arc<dyn CacheLoader<V>>) -> Self {
        Self {
            name,
            ttl,
            entries: DashMap::new(),
            loader,
        }
    }

    /// Cached value for `account`, loading it on a miss or after expiry.
    ///
    /// Concurrent misses for the same account may each load; the last
    /// load stored wins. Load failures are not cached.
    pub async fn get(&self, account: &str) -> Result<Arc<V>> {
        if let Some(value) = self.fresh(account) {
            return Ok(value);
        }

        debug!(cache = self.name, account, "cache miss, loading");
        let value = Arc::new(self.loader.load(account).await?);
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_access) <= self.ttl);
        let _ = self.entries.insert(
            account.to_string(),
            Entry {
                value: Arc::clone(&value),
                last_access: now,
            },
        );
        Ok(value)
    }

    fn fresh(&self, account: &str) -> Option<Arc<V>> {
        let now = Instant::now();
        {
            let mut entry = self.entries.get_mut(account)?;
            if now.duration_since(entry.last_access) <= self.ttl {
                entry.last_access = now;
                return Some(Arc::clone(&entry.value));
            }
        }
        self.evict_if_expired(account, now);
        None
    }

    /// Remove `account` only if its entry is still idle past the TTL at
    /// `now`; an entry stored by a concurrent load survives.
    fn evict_if_expired(&self, account: &str, now: Instant) {
        let evicted = self
            .entries
            .remove_if(account, |_, entry| {
                now.duration_since(entry.last_access) > self.ttl
            })
            .is_some();
        if evicted {
            debug!(cache = self.name, account, "cache entry expired");
        }
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Drop the entry for `account`.
    pub fn invalidate(&self, account: &str) {
        let _ = self.entries.remove(account);
    }

    /// Number of cached accounts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Call `method` for `account` and decode a list result; `null` is empty.
async fn list_for_account<T: DeserializeOwned>(
    rpc: &RpcClient,
    method: &'static str,
    account: &str,
) -> Result<Vec<T>> {
    let result = rpc.call(method, json!({ "account": account }), None).await?;
    if result.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(result).map_err(|source| GatewayError::Decode { method, source })
}

/// Loads groups via `listGroups`.
#[derive(Clone, Debug)]
pub struct GroupLoader {
    rpc: RpcClient,
}

impl GroupLoader {
    /// Loader issuing calls through `rpc`.
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl CacheLoader<GroupMap> for GroupLoader {
    async fn load(&self, account: &str) -> Result<GroupMap> {
        let groups: Vec<Group> = list_for_account(&self.rpc, "listGroups", account).await?;
        Ok(Directory::from_items(groups, |g| Some(g.id.as_str())))
    }
}

/// Loads identities via `listIdentities`.
#[derive(Clone, Debug)]
pub struct IdentityLoader {
    rpc: RpcClient,
}

impl IdentityLoader {
    /// Loader issuing calls through `rpc`.
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl CacheLoader<IdentityMap> for IdentityLoader {
    async fn load(&self, account: &str) -> Result<IdentityMap> {
        let identities: Vec<Identity> =
            list_for_account(&self.rpc, "listIdentities", account).await?;
        Ok(Directory::from_items(identities, |i| i.number.as_deref()))
    }
}

/// Group cache.
pub type GroupCache = TtlCache<GroupMap>;

/// Identity cache.
pub type IdentityCache = TtlCache<IdentityMap>;

#[async_trait]
impl GroupNameResolver for GroupCache {
    async fn group_name(
        &self,
        account: &str,
        group_id: &str,
    ) -> std::result::Result<Option<String>, ResolveError> {
        let groups = self.get(account).await?;
        Ok(groups.get(group_id).and_then(|g| g.name.clone()))
    }
}

/// Raw JSON of a list reply, for callers that want the daemon's shape.
pub fn directory_json<T: serde::Serialize>(dir: &Directory<T>) -> Value {
    Value::Array(
        dir.iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect(),
    )
}
