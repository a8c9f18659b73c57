//! Key-value storage for the blockfeed block keeper.
//!
//! The keeper persists its recent-block window through the [`KeyValueStore`]
//! trait so the service survives restarts. [`RedisStore`] is the production
//! backend; [`MemoryStore`] backs tests and redis-less deployments.

mod error;
pub use error::StoreError;

mod memory;
pub use memory::MemoryStore;

mod redis_store;
pub use redis_store::{RedisConfig, RedisStore};

use std::time::Duration;

/// An object-safe view over a key-value store with per-key expiration.
///
/// Values are opaque bytes; callers own the serialization.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Returns the value stored under `key`, or `None` if the key is absent
    /// or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`. A `ttl` of `None` stores the key without
    /// expiration.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError>;
}
