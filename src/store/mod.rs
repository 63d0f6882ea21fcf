//! Key-value store contract.
//!
//! The persistence collaborator: plain keys, sorted sequences with integer
//! scores, hashes, TTLs, conditional creates and atomic multi-write
//! batches. The ledger, lock manager and work queue are written against
//! this trait; production uses Redis, tests use the in-memory store.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::BridgeError;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// A single mutation inside an atomic multi-write batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set {
        key: String,
        value: String,
    },
    Delete {
        key: String,
    },
    ZAdd {
        key: String,
        member: String,
        score: i64,
    },
    ZRem {
        key: String,
        member: String,
    },
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), BridgeError>;

    /// Create a key with a TTL only if it does not exist. Returns whether
    /// the key was created.
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, BridgeError>;

    async fn delete(&self, key: &str) -> Result<bool, BridgeError>;

    /// Delete a key only when its current value matches. Used for lock
    /// release so a lease that expired and was re-acquired by another
    /// holder is never clobbered.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, BridgeError>;

    async fn exists(&self, key: &str) -> Result<bool, BridgeError>;

    async fn incr(&self, key: &str) -> Result<i64, BridgeError>;

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), BridgeError>;

    async fn zrem(&self, key: &str, member: &str) -> Result<(), BridgeError>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, BridgeError>;

    async fn zcard(&self, key: &str) -> Result<u64, BridgeError>;

    /// Members with scores by rank range, ascending. Negative indices
    /// count from the end, `-1` being the last member.
    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>, BridgeError>;

    /// Members with scores by rank range, descending.
    async fn zrevrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>, BridgeError>;

    /// Members whose score falls in `[min, max]`, ascending.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<(String, i64)>, BridgeError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BridgeError>;

    /// Keys matching a glob pattern (`*` wildcard only).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BridgeError>;

    /// Apply a batch atomically: either every op commits or none becomes
    /// visible.
    async fn multi(&self, ops: Vec<WriteOp>) -> Result<(), BridgeError>;
}
