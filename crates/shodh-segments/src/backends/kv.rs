//! KV adapter: strings, lists and counters. The system of record for
//! reaction history (vote/hit lists and their counters) when configured.

use async_trait::async_trait;

/// Abstracts over a key-value store with list semantics. Values are
/// opaque strings — callers JSON-encode records before `push`/`set` and
/// decode what they read back.
#[async_trait]
pub trait KvAdapter: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()>;

    async fn del(&self, key: &str) -> anyhow::Result<()>;

    async fn has(&self, key: &str) -> anyhow::Result<bool>;

    /// Append `values` to the list at `key`, creating it if absent.
    async fn push(&self, key: &str, values: &[String]) -> anyhow::Result<()>;

    /// Remove the first occurrence of `value` from the list at `key`.
    async fn pull(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Read the entire list at `key`, in insertion order. Empty if absent.
    async fn array_all(&self, key: &str) -> anyhow::Result<Vec<String>>;

    /// Length of the list at `key`, `0` if absent.
    async fn array_len(&self, key: &str) -> anyhow::Result<i64>;
}
