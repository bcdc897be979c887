//! Cache provider trait for pluggable key/value backends.

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// Trait for key/value backends (Redis or in-memory).
///
/// All values are serialized as strings (JSON). The provider is responsible
/// for key prefixing and TTL enforcement. TTL introspection follows Redis
/// semantics so the presence store can reason about remaining lifetimes.
#[async_trait]
pub trait CacheProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a value with a TTL, replacing any existing TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Set a value while preserving the key's remaining TTL.
    ///
    /// When the key does not exist the value is written without an expiry;
    /// callers that need one must follow up with [`CacheProvider::expire`].
    async fn set_keep_ttl(&self, key: &str, value: &str) -> AppResult<()>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Remaining TTL in seconds: `-1` when the key has no expiry, `-2` when
    /// the key does not exist.
    async fn ttl(&self, key: &str) -> AppResult<i64>;

    /// Set the TTL on an existing key. Returns `false` when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// Set a value only if the key does not already exist (NX).
    /// Returns `true` if the value was set, `false` if the key already existed.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Return all keys matching a glob pattern (e.g. `"presence:acme:*"`).
    ///
    /// Implementations must use a cursor-based scan; blocking the store on a
    /// full keyspace walk is not acceptable in production.
    async fn scan(&self, pattern: &str) -> AppResult<Vec<String>>;

    /// Publish a payload on a pub/sub channel. Returns the receiver count
    /// when the backend reports one.
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<i64>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Get a typed value by deserializing from JSON.
    async fn get_json<T: serde::de::DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> AppResult<Option<T>>
    where
        Self: Sized,
    {
        match self.get(key).await? {
            Some(value) => {
                let parsed = serde_json::from_str(&value)?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Set a typed value by serializing to JSON.
    async fn set_json<T: serde::Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()>
    where
        Self: Sized,
    {
        let json = serde_json::to_string(value)?;
        self.set(key, &json, ttl).await
    }
}
