use crate::{KeyValueStore, StoreError};

use std::time::Duration;

use redis::{aio::ConnectionManager, AsyncCommands};

/// Connection settings for the redis backend.
#[derive(Debug, Clone, Default)]
pub struct RedisConfig {
    /// The `host:port` address of the redis server.
    pub addr: String,
    /// The redis database index.
    pub db: i64,
    /// Optional username for authentication.
    pub username: Option<String>,
    /// Optional password for authentication.
    pub password: Option<String>,
    /// Prefix prepended to every key.
    pub key_prefix: String,
}

impl RedisConfig {
    /// Connects to the configured server and verifies the connection with a
    /// `PING`.
    pub async fn connect(&self) -> Result<ConnectionManager, StoreError> {
        let (host, port) = match self.addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| StoreError::InvalidAddress(self.addr.clone()))?;
                (host.to_string(), port)
            }
            None => (self.addr.clone(), 6379),
        };

        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host, port),
            redis: redis::RedisConnectionInfo {
                db: self.db,
                username: self.username.clone(),
                password: self.password.clone(),
                ..Default::default()
            },
        };

        let client = redis::Client::open(info)?;
        let mut connection = client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;

        Ok(connection)
    }
}

/// A [`KeyValueStore`] backed by redis. Every key is namespaced with the
/// configured prefix.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("key_prefix", &self.key_prefix).finish()
    }
}

impl RedisStore {
    /// Returns a new store over an established connection.
    pub fn new(connection: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self { connection, key_prefix: key_prefix.into() }
    }

    /// Connects to redis and returns the store.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let connection = config.connect().await?;
        Ok(Self::new(connection, config.key_prefix.clone()))
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = connection.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let key = self.key(key);
        match ttl {
            // SET EX has second granularity, round sub-second ttls up.
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1);
                let _: () = connection.set_ex(key, value, seconds).await?;
            }
            None => {
                let _: () = connection.set(key, value).await?;
            }
        }
        Ok(())
    }
}
