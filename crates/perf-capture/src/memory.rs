//! Process-local cache backend.

use std::collections::HashMap;

use anyhow::{anyhow, bail};
use parking_lot::Mutex;
use serde_json::Value;

use crate::source::CacheBackend;

/// A [`CacheBackend`] held in a map, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn add(&self, key: &str, value: Value) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    fn delete(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn incr(&self, key: &str, delta: i64) -> anyhow::Result<i64> {
        let mut entries = self.entries.lock();
        let Some(current) = entries.get(key) else {
            bail!("key '{key}' not found");
        };
        let current = current
            .as_i64()
            .ok_or_else(|| anyhow!("value of '{key}' is not an integer"))?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| anyhow!("incrementing '{key}' overflows"))?;
        entries.insert(key.to_string(), Value::from(next));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_does_not_replace() {
        let cache = MemoryCache::new();
        assert!(cache.add("k", Value::from(1)).unwrap());
        assert!(!cache.add("k", Value::from(2)).unwrap());
        assert_eq!(cache.get("k").unwrap(), Some(Value::from(1)));
    }

    #[test]
    fn incr_missing_key_fails() {
        let cache = MemoryCache::new();
        assert!(cache.incr("missing", 1).is_err());
    }

    #[test]
    fn incr_and_delete() {
        let cache = MemoryCache::new();
        cache.set("n", Value::from(5)).unwrap();
        assert_eq!(cache.incr("n", -2).unwrap(), 3);
        assert!(cache.delete("n").unwrap());
        assert!(cache.is_empty());
    }
}
