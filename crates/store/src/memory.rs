use crate::{KeyValueStore, StoreError};

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// An in-process [`KeyValueStore`]. Expirations are honored on read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryStore {
    /// Returns a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.expires_at.is_none_or(|at| at > now))
            .count()
    }

    /// Returns true if the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at.is_some_and(|at| at <= Instant::now()) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let entry = Entry { value, expires_at: ttl.map(|ttl| Instant::now() + ttl) };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), Some(Duration::from_millis(10))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.is_empty());
    }
}
