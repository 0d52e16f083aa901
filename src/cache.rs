//! Bounded, TTL-evicting concurrent caches keyed by transaction id.
//!
//! Keys are normalized (no `0x` prefix, lowercase) so a client cannot miss
//! or split an entry by changing the spelling of a transaction id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::OnceCell;

use crate::proof::DecodedTransaction;
use crate::settlement::SettlementReceipt;

fn cache_key(transaction_id: &str) -> String {
    transaction_id.trim_start_matches("0x").to_ascii_lowercase()
}

struct Timed<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> Timed<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Concurrent map whose entries expire after `ttl` and whose size stays at
/// `capacity` while entries can be evicted.
///
/// At capacity, expired entries are purged first, then the oldest entry is
/// evicted. Entries the `evictable` guard refuses are never dropped, neither
/// by expiry nor by capacity pressure; the map grows past `capacity` instead.
pub struct TtlCache<V> {
    entries: DashMap<String, Timed<V>>,
    capacity: usize,
    ttl: Duration,
    evictable: fn(&V) -> bool,
}

impl<V: Clone> TtlCache<V> {
    /// Creates a cache holding at most `capacity` entries (minimum 1) for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_eviction_guard(capacity, ttl, |_| true)
    }

    /// Like [`TtlCache::new`], but entries for which `evictable` returns false
    /// are kept until the guard allows their removal.
    pub fn with_eviction_guard(capacity: usize, ttl: Duration, evictable: fn(&V) -> bool) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            evictable,
        }
    }

    /// Returns a clone of the live value under `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = {
            let entry = self.entries.get(key)?;
            (!entry.is_expired(self.ttl)).then(|| entry.value.clone())
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| self.is_stale(entry));
        }
        value
    }

    /// Inserts `value` under `key`, making room first if the cache is full.
    pub fn insert(&self, key: String, value: V) {
        self.make_room(&key);
        self.entries.insert(key, Timed::new(value));
    }

    /// Returns the live value under `key`, inserting `make()` if there is none.
    /// Atomic per key: concurrent callers observe the same value.
    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> V) -> V {
        self.make_room(key);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if self.is_stale(occupied.get()) {
                    occupied.insert(Timed::new(make()));
                }
                occupied.get().value.clone()
            }
            Entry::Vacant(vacant) => vacant.insert(Timed::new(make())).value.clone(),
        }
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_stale(entry));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_stale(&self, entry: &Timed<V>) -> bool {
        entry.is_expired(self.ttl) && (self.evictable)(&entry.value)
    }

    fn make_room(&self, key: &str) {
        if self.entries.len() < self.capacity || self.entries.contains_key(key) {
            return;
        }
        self.purge_expired();
        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| (self.evictable)(&entry.value))
                .min_by_key(|entry| entry.inserted_at)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else {
                tracing::debug!(len = self.entries.len(), "Cache over capacity, nothing evictable");
                break;
            };
            self.entries
                .remove_if(&oldest, |_, entry| (self.evictable)(&entry.value));
        }
    }
}

/// Transactions whose proof has already been verified.
///
/// A hit is only returned when the cached transaction was decoded from
/// exactly the bytes being presented now.
pub struct VerifiedCache {
    inner: TtlCache<Arc<DecodedTransaction>>,
}

impl VerifiedCache {
    /// Creates a cache of at most `capacity` transactions, each kept for `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(capacity, ttl),
        }
    }

    /// Returns the verified transaction under `transaction_id` if it was
    /// decoded from exactly `proven_tx`.
    pub fn get(&self, transaction_id: &str, proven_tx: &[u8]) -> Option<Arc<DecodedTransaction>> {
        self.inner
            .get(&cache_key(transaction_id))
            .filter(|decoded| decoded.bytes() == proven_tx)
    }

    /// Records a transaction whose proof verified, keyed by its own id.
    pub fn insert(&self, decoded: Arc<DecodedTransaction>) {
        self.inner.insert(cache_key(decoded.id()), decoded);
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A slot is idle once its submission finished, or when nobody but the
/// cache holds it (a failed submission left it empty).
fn slot_is_idle(slot: &Arc<OnceCell<SettlementReceipt>>) -> bool {
    slot.initialized() || Arc::strong_count(slot) == 1
}

/// Settlement receipts, one exactly-once slot per transaction id.
///
/// A slot whose submission is still running is never evicted, so a
/// duplicate settle always joins the submission already in flight.
pub struct ReceiptCache {
    inner: TtlCache<Arc<OnceCell<SettlementReceipt>>>,
}

impl ReceiptCache {
    /// Creates a cache of at most `capacity` idle receipts, each kept for `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: TtlCache::with_eviction_guard(capacity, ttl, slot_is_idle),
        }
    }

    /// The receipt of a completed settlement, if still retained.
    pub fn get(&self, transaction_id: &str) -> Option<SettlementReceipt> {
        self.inner
            .get(&cache_key(transaction_id))
            .and_then(|slot| slot.get().cloned())
    }

    /// The slot every settle of `transaction_id` initializes or awaits.
    pub fn slot(&self, transaction_id: &str) -> Arc<OnceCell<SettlementReceipt>> {
        self.inner
            .get_or_insert_with(&cache_key(transaction_id), || Arc::new(OnceCell::new()))
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MidenAccountAddress, TransactionReference};

    fn decoded(id: &str, bytes: &[u8]) -> Arc<DecodedTransaction> {
        Arc::new(DecodedTransaction::new(
            id,
            MidenAccountAddress::new([1; 15]),
            vec![],
            bytes.to_vec(),
        ))
    }

    #[test]
    fn test_ttl_expiry() {
        let cache: TtlCache<u32> = TtlCache::new(8, Duration::ZERO);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());

        let cache: TtlCache<u32> = TtlCache::new(8, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache: TtlCache<u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b".to_string(), 2);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c".to_string(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_eviction_guard_keeps_pinned_entries() {
        let cache: TtlCache<u32> = TtlCache::with_eviction_guard(1, Duration::ZERO, |v| *v != 7);
        cache.insert("pinned".to_string(), 7);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_or_insert_with("pinned", || 8), 7);
    }

    #[test]
    fn test_in_flight_receipt_slot_survives_capacity_pressure() {
        let cache = ReceiptCache::new(1, Duration::from_secs(60));
        let in_flight = cache.slot("0x0a");
        let other = cache.slot("0x0b");
        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&in_flight, &cache.slot("0x0a")));
        drop(other);

        // Idle slots are evicted again once the in-flight one is released.
        drop(in_flight);
        let _next = cache.slot("0x0c");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_or_insert_with_keeps_live_value() {
        let cache: TtlCache<u32> = TtlCache::new(4, Duration::from_secs(60));
        assert_eq!(cache.get_or_insert_with("k", || 1), 1);
        assert_eq!(cache.get_or_insert_with("k", || 2), 1);
    }

    #[test]
    fn test_verified_cache_requires_identical_bytes() {
        let cache = VerifiedCache::new(4, Duration::from_secs(60));
        cache.insert(decoded("0xAB", b"proof"));
        assert!(cache.get("ab", b"proof").is_some());
        assert!(cache.get("0xab", b"proof").is_some());
        assert!(cache.get("0xab", b"other").is_none());
        assert!(cache.get("0xac", b"proof").is_none());
    }

    #[tokio::test]
    async fn test_receipt_slot_is_shared() {
        let cache = ReceiptCache::new(4, Duration::from_secs(60));
        assert!(cache.get("0x01").is_none());

        let slot = cache.slot("0x01");
        let receipt = SettlementReceipt {
            transaction_id: "0x01".to_string(),
            reference: TransactionReference::new("0x01"),
        };
        slot.set(receipt.clone()).unwrap();

        assert!(Arc::ptr_eq(&slot, &cache.slot("0X01")));
        assert_eq!(cache.get("01"), Some(receipt));
    }
}
