//! The services the verbs assume of their hosting store.
//!
//! The store is an external collaborator that provides keyed hashes,
//! sets, sorted sets with numeric scores, incremental set scan, and key
//! expiration. This trait is that contract, nothing more: transactions
//! and pipelining are client-side concerns and never reach the verbs.

use crate::error::VerbError;

/// What currently lives at a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Missing,
    Hash,
    Set,
    SortedSet,
    Other,
}

/// Store services available to a verb while it runs on the command thread.
/// Implementations are synchronous by construction; a verb must never
/// suspend.
pub trait Store {
    fn key_type(&self, key: &str) -> KeyType;

    /// Fetch named hash fields; absent fields come back as `None`.
    /// Fails with [`VerbError::WrongType`] when the key holds a non-hash.
    fn hash_get(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, VerbError>;

    /// Add a member to a set, creating the set on first insert.
    /// Returns whether the member was newly added.
    fn sadd(&mut self, key: &str, member: &str) -> Result<bool, VerbError>;

    /// All members of a set; an absent key is the empty set.
    fn smembers(&self, key: &str) -> Result<Vec<String>, VerbError>;

    /// One step of an incremental set scan. `count` is a chunk-size hint.
    /// Returns the next cursor (zero when the scan has completed a full
    /// loop) and the members of this chunk.
    fn sscan(&self, key: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>), VerbError>;

    /// Insert or rescore a sorted-set member.
    fn zadd(&mut self, key: &str, score: f64, member: &str) -> Result<bool, VerbError>;

    /// Pop up to `count` members with the lowest scores, lowest first.
    /// Popping the last member removes the key.
    fn zpopmin(&mut self, key: &str, count: usize) -> Result<Vec<(String, f64)>, VerbError>;

    /// Set a key's TTL in seconds. Returns false when the key is absent.
    fn expire(&mut self, key: &str, ttl_secs: u64) -> Result<bool, VerbError>;
}
