//! In-memory store double.
//!
//! Implements [`Store`] over plain maps with per-key expiry driven by a
//! manually advanced clock, so TTL behaviour is testable without
//! sleeping. Sets preserve insertion order, which stands in for the
//! store's scan order. Also exposes the native mutations a client
//! pipeline would issue (`hset`, `sadd`, `expire`) for harnesses that
//! replay whole pipelines against this store.

use std::collections::HashMap;

use crate::error::VerbError;
use crate::store::{KeyType, Store};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    Set(Vec<String>),
    SortedSet(Vec<(String, f64)>),
}

impl Value {
    fn key_type(&self) -> KeyType {
        match self {
            Value::Hash(_) => KeyType::Hash,
            Value::Set(_) => KeyType::Set,
            Value::SortedSet(_) => KeyType::SortedSet,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<u64>,
}

/// A [`Store`] backed by process memory and a manual clock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    now: u64,
    entries: HashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock reading in seconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Advance the clock; keys whose TTL has passed vanish on next access.
    pub fn advance(&mut self, secs: u64) {
        self.now += secs;
    }

    fn live(&self, key: &str) -> Option<&Entry> {
        self.entries
            .get(key)
            .filter(|e| e.expires_at.is_none_or(|at| at > self.now))
    }

    /// Drop the key if its TTL has passed, then hand back a slot to write.
    fn slot(&mut self, key: &str) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|e| e.expires_at.is_some_and(|at| at <= self.now));
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    /// Native hash write, as a client `HSET` would perform it.
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<bool, VerbError> {
        match self.slot(key) {
            None => {
                let mut map = HashMap::new();
                map.insert(field.to_string(), value.to_string());
                self.entries.insert(
                    key.to_string(),
                    Entry { value: Value::Hash(map), expires_at: None },
                );
                Ok(true)
            }
            Some(entry) => match &mut entry.value {
                Value::Hash(map) => Ok(map.insert(field.to_string(), value.to_string()).is_none()),
                _ => Err(VerbError::WrongType),
            },
        }
    }

    /// Remaining members of a sorted set, lowest score first.
    pub fn zrange_all(&self, key: &str) -> Vec<String> {
        match self.live(key).map(|e| &e.value) {
            Some(Value::SortedSet(members)) => {
                let mut sorted = members.clone();
                sort_by_score(&mut sorted);
                sorted.into_iter().map(|(m, _)| m).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Members of a set in insertion order; empty when absent.
    pub fn set_members(&self, key: &str) -> Vec<String> {
        match self.live(key).map(|e| &e.value) {
            Some(Value::Set(members)) => members.clone(),
            _ => Vec::new(),
        }
    }

    /// Remaining TTL of a key, if one is set.
    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.live(key)
            .and_then(|e| e.expires_at)
            .map(|at| at - self.now)
    }

    /// Every live key, for assertions about namespace hygiene.
    pub fn live_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at.is_none_or(|at| at > self.now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

fn sort_by_score(members: &mut [(String, f64)]) {
    members.sort_by(|(am, asc), (bm, bsc)| {
        asc.partial_cmp(bsc)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| am.cmp(bm))
    });
}

impl Store for MemoryStore {
    fn key_type(&self, key: &str) -> KeyType {
        self.live(key).map_or(KeyType::Missing, |e| e.value.key_type())
    }

    fn hash_get(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, VerbError> {
        match self.live(key).map(|e| &e.value) {
            None => Ok(vec![None; fields.len()]),
            Some(Value::Hash(map)) => Ok(fields.iter().map(|f| map.get(*f).cloned()).collect()),
            Some(_) => Err(VerbError::WrongType),
        }
    }

    fn sadd(&mut self, key: &str, member: &str) -> Result<bool, VerbError> {
        match self.slot(key) {
            None => {
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(vec![member.to_string()]),
                        expires_at: None,
                    },
                );
                Ok(true)
            }
            Some(entry) => match &mut entry.value {
                Value::Set(members) => {
                    if members.iter().any(|m| m == member) {
                        Ok(false)
                    } else {
                        members.push(member.to_string());
                        Ok(true)
                    }
                }
                _ => Err(VerbError::WrongType),
            },
        }
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, VerbError> {
        match self.live(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.clone()),
            Some(_) => Err(VerbError::WrongType),
        }
    }

    fn sscan(&self, key: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>), VerbError> {
        let members = match self.live(key).map(|e| &e.value) {
            None => return Ok((0, Vec::new())),
            Some(Value::Set(members)) => members,
            Some(_) => return Err(VerbError::WrongType),
        };
        let start = cursor as usize;
        let chunk: Vec<String> = members.iter().skip(start).take(count.max(1)).cloned().collect();
        let next = start + chunk.len();
        let next_cursor = if next >= members.len() { 0 } else { next as u64 };
        Ok((next_cursor, chunk))
    }

    fn zadd(&mut self, key: &str, score: f64, member: &str) -> Result<bool, VerbError> {
        match self.slot(key) {
            None => {
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::SortedSet(vec![(member.to_string(), score)]),
                        expires_at: None,
                    },
                );
                Ok(true)
            }
            Some(entry) => match &mut entry.value {
                Value::SortedSet(members) => {
                    if let Some(existing) = members.iter_mut().find(|(m, _)| m == member) {
                        existing.1 = score;
                        Ok(false)
                    } else {
                        members.push((member.to_string(), score));
                        Ok(true)
                    }
                }
                _ => Err(VerbError::WrongType),
            },
        }
    }

    fn zpopmin(&mut self, key: &str, count: usize) -> Result<Vec<(String, f64)>, VerbError> {
        let popped = match self.slot(key) {
            None => return Ok(Vec::new()),
            Some(entry) => match &mut entry.value {
                Value::SortedSet(members) => {
                    sort_by_score(members);
                    let n = count.min(members.len());
                    members.drain(..n).collect::<Vec<_>>()
                }
                _ => return Err(VerbError::WrongType),
            },
        };
        // An emptied sorted set ceases to exist, like the real store.
        let emptied = matches!(
            self.entries.get(key).map(|e| &e.value),
            Some(Value::SortedSet(members)) if members.is_empty()
        );
        if emptied {
            self.entries.remove(key);
        }
        Ok(popped)
    }

    fn expire(&mut self, key: &str, ttl_secs: u64) -> Result<bool, VerbError> {
        let now = self.now;
        match self.slot(key) {
            None => Ok(false),
            Some(entry) => {
                entry.expires_at = Some(now + ttl_secs);
                Ok(true)
            }
        }
    }
}
