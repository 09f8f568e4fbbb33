//! In-process TTL auth cache for `device_registry` lookups (`spec.md` §5).
//!
//! Grounded on `acteon_gateway::group_manager::GroupManager`'s
//! `Arc<RwLock<HashMap<..>>>` shape, generalized with a per-entry TTL and
//! LRU-style eviction (`spec.md` §5: "evict oldest 10% when size limit
//! reached"). The key is always the full `(tenant_id, device_id)` pair, so
//! a miss for `(A, X)` can never return data cached for `(B, X)` (`spec.md`
//! §8 invariant 3) -- there is no code path that looks up by `device_id`
//! alone.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use pulse_core::domain::DeviceRegistryEntry;
use pulse_core::types::{DeviceId, TenantId};

#[derive(Clone)]
struct Entry {
    value: DeviceRegistryEntry,
    inserted_at: Instant,
}

/// Tenant-scoped TTL cache of registry rows, shared by every pipeline
/// worker task.
pub struct AuthCache {
    entries: DashMap<(TenantId, DeviceId), Entry>,
    ttl: Duration,
    max_size: usize,
}

impl AuthCache {
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_size,
        }
    }

    /// Look up a cached, still-fresh entry. A key miss or an expired entry
    /// both return `None` -- the caller falls through to the database.
    #[must_use]
    pub fn get(&self, tenant_id: &TenantId, device_id: &DeviceId) -> Option<DeviceRegistryEntry> {
        let key = (tenant_id.clone(), device_id.clone());
        let entry = self.entries.get(&key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert or refresh an entry, evicting the oldest 10% first if the
    /// cache is at capacity.
    pub fn put(&self, tenant_id: &TenantId, device_id: &DeviceId, value: DeviceRegistryEntry) {
        if self.entries.len() >= self.max_size {
            self.evict_oldest_tenth();
        }
        self.entries.insert(
            (tenant_id.clone(), device_id.clone()),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop the cached entry for one device, e.g. after a revocation is
    /// observed so the next message re-checks the registry.
    pub fn invalidate(&self, tenant_id: &TenantId, device_id: &DeviceId) {
        self.entries.remove(&(tenant_id.clone(), device_id.clone()));
    }

    fn evict_oldest_tenth(&self) {
        let evict_count = (self.entries.len() / 10).max(1);
        let mut ages: Vec<((TenantId, DeviceId), Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().inserted_at))
            .collect();
        ages.sort_by_key(|(_, inserted_at)| *inserted_at);
        for (key, _) in ages.into_iter().take(evict_count) {
            self.entries.remove(&key);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::domain::RegistryStatus;

    fn entry(site: &str) -> DeviceRegistryEntry {
        DeviceRegistryEntry {
            tenant_id: TenantId::new("t1"),
            device_id: DeviceId::new("dev-1"),
            site_id: pulse_core::types::SiteId::new(site),
            status: RegistryStatus::Active,
            provision_token_hash: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn hit_after_put() {
        let cache = AuthCache::new(Duration::from_secs(60), 100);
        let t = TenantId::new("t1");
        let d = DeviceId::new("dev-1");
        cache.put(&t, &d, entry("site-1"));
        assert!(cache.get(&t, &d).is_some());
    }

    #[test]
    fn miss_for_other_tenant_same_device_id() {
        // Invariant 3: a miss for (A, X) must never expose (B, X)'s row.
        let cache = AuthCache::new(Duration::from_secs(60), 100);
        let a = TenantId::new("tenant-a");
        let b = TenantId::new("tenant-b");
        let d = DeviceId::new("dev-1");
        cache.put(&a, &d, entry("site-1"));
        assert!(cache.get(&b, &d).is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = AuthCache::new(Duration::from_millis(1), 100);
        let t = TenantId::new("t1");
        let d = DeviceId::new("dev-1");
        cache.put(&t, &d, entry("site-1"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get(&t, &d).is_none());
    }

    #[test]
    fn eviction_keeps_size_bounded() {
        let cache = AuthCache::new(Duration::from_secs(60), 10);
        for i in 0..15 {
            let t = TenantId::new("t1");
            let d = DeviceId::new(format!("dev-{i}"));
            cache.put(&t, &d, entry("site-1"));
        }
        assert!(cache.len() <= 10);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = AuthCache::new(Duration::from_secs(60), 100);
        let t = TenantId::new("t1");
        let d = DeviceId::new("dev-1");
        cache.put(&t, &d, entry("site-1"));
        cache.invalidate(&t, &d);
        assert!(cache.get(&t, &d).is_none());
    }
}
