//! TTL-bounded identity cache.
//!
//! A fixed-width open-addressed table of `(key, value, expiry)` triples.
//! The slot is chosen by a reversible integer mix modulo capacity and a
//! collision simply evicts the previous occupant; there is no chaining.
//! The table sits behind a writer-preferring rwlock that readers must not
//! hold across I/O and must not re-acquire; lookups never upgrade, they
//! report a miss and let the caller resolve outside the lock.

use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(String),
    Miss,
    Expired,
    /// The lock was contended; callers treat this like a miss.
    Busy,
}

#[derive(Debug, Clone)]
struct Bucket {
    key: u64,
    value: String,
    expires_at: Instant,
}

/// Fixed-capacity cache mapping numeric ids to resolved names.
#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    buckets: RwLock<Vec<Option<Bucket>>>,
}

impl TtlCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            buckets: RwLock::new(vec![None; capacity.max(1)]),
        }
    }

    fn slot(&self, key: u64, capacity: usize) -> usize {
        (mix(key) % capacity as u64) as usize
    }

    /// Look the key up without blocking. Expired entries stay in place
    /// until a set overwrites them; the caller sees [`CacheLookup::Expired`]
    /// and re-resolves.
    pub fn get(&self, key: u64) -> CacheLookup {
        let Some(buckets) = self.buckets.try_read() else {
            return CacheLookup::Busy;
        };
        match &buckets[self.slot(key, buckets.len())] {
            Some(bucket) if bucket.key == key => {
                if bucket.expires_at < Instant::now() {
                    CacheLookup::Expired
                } else {
                    CacheLookup::Hit(bucket.value.clone())
                }
            }
            _ => CacheLookup::Miss,
        }
    }

    /// Install a value, evicting whatever occupied the slot. Returns false
    /// when the lock was contended and nothing was written.
    pub fn set(&self, key: u64, value: &str) -> bool {
        let Some(mut buckets) = self.buckets.try_write() else {
            return false;
        };
        let slot = self.slot(key, buckets.len());
        buckets[slot] = Some(Bucket {
            key,
            value: value.to_string(),
            expires_at: Instant::now() + self.ttl,
        });
        true
    }
}

/// Reversible xor-multiply mix; spreads consecutive numeric ids across
/// the table.
fn mix(mut x: u64) -> u64 {
    x = ((x >> 16) ^ x).wrapping_mul(0x45d9f3b);
    x = ((x >> 16) ^ x).wrapping_mul(0x45d9f3b);
    (x >> 16) ^ x
}
