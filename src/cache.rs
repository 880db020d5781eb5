// 🧊 Query cache - reads keyed by table + scope
//
// Entries are fresh for `stale_after`, kept (stale) until `retain_for`, then
// dropped. Invalidation is by key prefix, so invalidating ["unified_contacts"]
// also drops every scoped ["unified_contacts", type, id] entry.

use crate::db::Table;
use crate::entities::ScopeKey;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

// ============================================================================
// QUERY KEY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Unscoped key for a whole table, e.g. ["clients"]
    pub fn table(table: Table) -> Self {
        QueryKey(vec![table.as_str().to_string()])
    }

    /// ["unified_contacts", "client", "<id>"]
    pub fn scoped(table: Table, scope: &ScopeKey) -> Self {
        QueryKey(vec![
            table.as_str().to_string(),
            scope.entity_type.as_str().to_string(),
            scope.entity_id.clone(),
        ])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Served without refetching while younger than this
    pub stale_after: Duration,
    /// Dropped entirely once older than this
    pub retain_for: Duration,
}

impl CacheConfig {
    pub fn from_secs(stale_after: i64, retain_for: i64) -> Self {
        CacheConfig {
            stale_after: Duration::seconds(stale_after),
            retain_for: Duration::seconds(retain_for.max(stale_after)),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        // 5 minutes fresh, 10 minutes retained
        CacheConfig::from_secs(300, 600)
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Fresh(V),
    /// Past `stale_after`, still retained: refetch, fall back to this
    Stale(V),
    Miss,
}

pub struct QueryCache<V> {
    entries: RwLock<HashMap<QueryKey, CacheEntry<V>>>,
    config: CacheConfig,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        QueryCache {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn lookup(&self, key: &QueryKey) -> Lookup<V> {
        self.lookup_at(key, Utc::now())
    }

    pub fn lookup_at(&self, key: &QueryKey, now: DateTime<Utc>) -> Lookup<V> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            None => Lookup::Miss,
            Some(entry) => {
                let age = now - entry.fetched_at;
                if age >= self.config.retain_for {
                    Lookup::Miss
                } else if age >= self.config.stale_after {
                    Lookup::Stale(entry.value.clone())
                } else {
                    Lookup::Fresh(entry.value.clone())
                }
            }
        }
    }

    pub fn store(&self, key: QueryKey, value: V) {
        self.store_at(key, value, Utc::now());
    }

    /// Also sweeps out expired entries, so a stream of distinct keys
    /// cannot grow the map past what the retention window holds
    pub fn store_at(&self, key: QueryKey, value: V, now: DateTime<Utc>) {
        let retain_for = self.config.retain_for;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| now - entry.fetched_at < retain_for);
        entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: now,
            },
        );
    }

    /// Drop every entry whose key starts with `prefix`; returns how many
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        tracing::debug!(key = %prefix, removed, "cache invalidated");
        removed
    }

    /// Drop entries past the retention window
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now())
    }

    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        let retain_for = self.config.retain_for;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| now - entry.fetched_at < retain_for);
        before - entries.len()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
