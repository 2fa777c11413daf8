//! In-process store with lazy TTL expiry

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use super::KeyValueStore;
use crate::error::{FetchError, Result};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Bytes),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Key-value store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

fn wrong_type(key: &str) -> FetchError {
    FetchError::Store(format!("WRONGTYPE operation against key {}", key))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.evict_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Bytes(b) => Ok(Some(b.clone())),
                Value::Set(_) => Err(wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.entries
            .insert(key.to_string(), Entry::new(Value::Bytes(value)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.evict_expired(key);
        Ok(self.entries.remove(key).is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Bytes>,
        value: Bytes,
    ) -> Result<bool> {
        self.evict_expired(key);
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let matches = match (&occupied.get().value, &expected) {
                    (Value::Bytes(current), Some(expected)) => current == expected,
                    (Value::Bytes(_), None) => false,
                    (Value::Set(_), _) => return Err(wrong_type(key)),
                };
                if matches {
                    occupied.insert(Entry::new(Value::Bytes(value)));
                }
                Ok(matches)
            }
            MapEntry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                vacant.insert(Entry::new(Value::Bytes(value)));
                Ok(true)
            }
        }
    }

    async fn s_add(&self, key: &str, member: &str) -> Result<bool> {
        self.evict_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            Value::Bytes(_) => Err(wrong_type(key)),
        }
    }

    async fn s_is_member(&self, key: &str, member: &str) -> Result<bool> {
        self.evict_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.contains(member)),
                Value::Bytes(_) => Err(wrong_type(key)),
            },
            None => Ok(false),
        }
    }

    async fn s_card(&self, key: &str) -> Result<u64> {
        self.evict_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len() as u64),
                Value::Bytes(_) => Err(wrong_type(key)),
            },
            None => Ok(0),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.evict_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
