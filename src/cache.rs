//! Caching infrastructure for performance optimization
//!
//! This module provides a TTL-based registration cache so that message handling
//! does not have to upsert the user row on every incoming update.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// How long a registration mark stays valid before the user row is re-checked
pub const REGISTRATION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Generic cache entry with expiration time
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    /// The cached value
    value: T,
    /// When this entry expires
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of entries
    pub entries: usize,
    /// Number of hits
    pub hits: u64,
    /// Number of misses
    pub misses: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

/// Thread-safe map from Telegram ID to internal user ID with per-entry TTL
pub struct RegistrationCache {
    data: RwLock<HashMap<i64, CacheEntry<i64>>>,
    stats: RwLock<CacheStats>,
    ttl: Duration,
}

impl RegistrationCache {
    /// Create a new registration cache with the default TTL
    pub fn new() -> Self {
        Self::with_ttl(REGISTRATION_TTL)
    }

    /// Create a new registration cache with a custom TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            ttl,
        }
    }

    /// Look up the internal user ID for a Telegram ID
    pub fn get(&self, telegram_id: i64) -> Option<i64> {
        let mut stats = self.stats.write().unwrap();
        let data = self.data.read().unwrap();

        match data.get(&telegram_id) {
            Some(entry) if !entry.is_expired() => {
                stats.hits += 1;
                Some(entry.value)
            }
            Some(_) => {
                // Entry exists but is expired
                stats.misses += 1;
                None
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Mark a Telegram ID as registered
    pub fn insert(&self, telegram_id: i64, user_id: i64) {
        let entry = CacheEntry::new(user_id, self.ttl);
        self.data.write().unwrap().insert(telegram_id, entry);
    }

    /// Drop a registration mark
    pub fn remove(&self, telegram_id: i64) -> Option<i64> {
        self.data
            .write()
            .unwrap()
            .remove(&telegram_id)
            .map(|entry| entry.value)
    }

    /// Clear all expired entries
    pub fn cleanup(&self) {
        let mut data = self.data.write().unwrap();
        let initial_len = data.len();

        data.retain(|_, entry| !entry.is_expired());

        let removed = initial_len - data.len();
        if removed > 0 {
            tracing::debug!("Registration cache cleanup removed {} expired entries", removed);
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().unwrap().clone();
        let data = self.data.read().unwrap();

        stats.entries = data.len();

        let total_requests = stats.hits + stats.misses;
        if total_requests > 0 {
            stats.hit_rate = stats.hits as f64 / total_requests as f64;
        }

        stats
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.data.write().unwrap().clear();
        *self.stats.write().unwrap() = CacheStats::default();
    }
}

impl Default for RegistrationCache {
    fn default() -> Self {
        Self::new()
    }
}
