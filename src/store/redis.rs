//! Redis store implementation.
//!
//! Sorted sequences are ZSETs, multi-write batches are atomic MULTI/EXEC
//! pipelines, conditional create is `SET PX NX`, and compare-and-delete
//! runs as a Lua script so a release never removes a lock another holder
//! re-acquired.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;

use crate::error::BridgeError;
use crate::store::{KvStore, WriteOp};

const DELETE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect and build the shared connection manager (reconnects
    /// transparently, the way the operator's DB pool does).
    pub async fn connect(url: &str) -> Result<Self, BridgeError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError> {
        let mut con = self.connection();
        let value: Option<String> = con.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        let mut con = self.connection();
        let _: () = con.set(key, value).await?;
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, BridgeError> {
        let mut con = self.connection();
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut con)
            .await?;
        Ok(created.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, BridgeError> {
        let mut con = self.connection();
        let removed: i64 = con.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, BridgeError> {
        let mut con = self.connection();
        let removed: i64 = redis::Script::new(DELETE_IF_EQUALS_SCRIPT)
            .key(key)
            .arg(value)
            .invoke_async(&mut con)
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, BridgeError> {
        let mut con = self.connection();
        let exists: bool = con.exists(key).await?;
        Ok(exists)
    }

    async fn incr(&self, key: &str) -> Result<i64, BridgeError> {
        let mut con = self.connection();
        let value: i64 = con.incr(key, 1).await?;
        Ok(value)
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), BridgeError> {
        let mut con = self.connection();
        let _: () = con.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), BridgeError> {
        let mut con = self.connection();
        let _: () = con.zrem(key, member).await?;
        Ok(())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, BridgeError> {
        let mut con = self.connection();
        let score: Option<i64> = con.zscore(key, member).await?;
        Ok(score)
    }

    async fn zcard(&self, key: &str) -> Result<u64, BridgeError> {
        let mut con = self.connection();
        let count: u64 = con.zcard(key).await?;
        Ok(count)
    }

    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>, BridgeError> {
        let mut con = self.connection();
        let members: Vec<(String, i64)> = con.zrange_withscores(key, start, stop).await?;
        Ok(members)
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>, BridgeError> {
        let mut con = self.connection();
        let members: Vec<(String, i64)> = con.zrevrange_withscores(key, start, stop).await?;
        Ok(members)
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<(String, i64)>, BridgeError> {
        let mut con = self.connection();
        let members: Vec<(String, i64)> =
            con.zrangebyscore_withscores(key, min, max).await?;
        Ok(members)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BridgeError> {
        let mut con = self.connection();
        let fields: HashMap<String, String> = con.hgetall(key).await?;
        Ok(fields)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BridgeError> {
        let mut con = self.connection();
        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> = con.scan_match(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn multi(&self, ops: Vec<WriteOp>) -> Result<(), BridgeError> {
        let mut con = self.connection();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                WriteOp::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                WriteOp::Delete { key } => {
                    pipe.del(key).ignore();
                }
                WriteOp::ZAdd { key, member, score } => {
                    pipe.zadd(key, member, *score).ignore();
                }
                WriteOp::ZRem { key, member } => {
                    pipe.zrem(key, member).ignore();
                }
                WriteOp::HSet { key, fields } => {
                    pipe.hset_multiple(key, fields).ignore();
                }
            }
        }
        let _: () = pipe.query_async(&mut con).await?;
        Ok(())
    }
}
