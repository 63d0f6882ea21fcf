//! In-memory store implementation.
//!
//! Single-process stand-in for Redis used by the test suites and local
//! runs. TTLs are checked lazily on access; the whole keyspace sits
//! behind one async mutex, which makes every batch trivially atomic.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::BridgeError;
use crate::store::{KvStore, WriteOp};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    expiries: HashMap<String, Instant>,
    zsets: HashMap<String, BTreeMap<String, i64>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl Inner {
    fn purge_expired(&mut self, key: &str) {
        if let Some(deadline) = self.expiries.get(key) {
            if Instant::now() >= *deadline {
                self.expiries.remove(key);
                self.strings.remove(key);
            }
        }
    }

    /// Members sorted by (score, member), the sorted-sequence order.
    fn sorted_members(&self, key: &str) -> Vec<(String, i64)> {
        let mut members: Vec<(String, i64)> = self
            .zsets
            .get(key)
            .map(|z| z.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        members
    }

    fn apply(&mut self, op: &WriteOp) {
        match op {
            WriteOp::Set { key, value } => {
                self.expiries.remove(key);
                self.strings.insert(key.clone(), value.clone());
            }
            WriteOp::Delete { key } => {
                self.expiries.remove(key);
                self.strings.remove(key);
                self.zsets.remove(key);
                self.hashes.remove(key);
            }
            WriteOp::ZAdd { key, member, score } => {
                self.zsets
                    .entry(key.clone())
                    .or_default()
                    .insert(member.clone(), *score);
            }
            WriteOp::ZRem { key, member } => {
                if let Some(zset) = self.zsets.get_mut(key) {
                    zset.remove(member);
                    if zset.is_empty() {
                        self.zsets.remove(key);
                    }
                }
            }
            WriteOp::HSet { key, fields } => {
                let hash = self.hashes.entry(key.clone()).or_default();
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
            }
        }
    }
}

/// Resolve a redis-style rank range against a collection length.
fn rank_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Match a key against a glob pattern supporting `*` only.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    // pattern ends with '*'
    true
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key);
        Ok(inner.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock().await;
        inner.expiries.remove(key);
        inner.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, BridgeError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key);
        if inner.strings.contains_key(key) {
            return Ok(false);
        }
        inner.strings.insert(key.to_string(), value.to_string());
        inner
            .expiries
            .insert(key.to_string(), Instant::now() + Duration::from_millis(ttl_ms));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, BridgeError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key);
        inner.expiries.remove(key);
        let existed = inner.strings.remove(key).is_some()
            | inner.zsets.remove(key).is_some()
            | inner.hashes.remove(key).is_some();
        Ok(existed)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, BridgeError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key);
        if inner.strings.get(key).map(String::as_str) == Some(value) {
            inner.strings.remove(key);
            inner.expiries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn exists(&self, key: &str) -> Result<bool, BridgeError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key);
        Ok(inner.strings.contains_key(key)
            || inner.zsets.contains_key(key)
            || inner.hashes.contains_key(key))
    }

    async fn incr(&self, key: &str) -> Result<i64, BridgeError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key);
        let current = inner
            .strings
            .get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        inner.strings.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock().await;
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock().await;
        inner.apply(&WriteOp::ZRem {
            key: key.to_string(),
            member: member.to_string(),
        });
        Ok(())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, BridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner.zsets.get(key).and_then(|z| z.get(member).copied()))
    }

    async fn zcard(&self, key: &str) -> Result<u64, BridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner.zsets.get(key).map(|z| z.len() as u64).unwrap_or(0))
    }

    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>, BridgeError> {
        let inner = self.inner.lock().await;
        let members = inner.sorted_members(key);
        Ok(match rank_range(members.len(), start, stop) {
            Some((lo, hi)) => members[lo..=hi].to_vec(),
            None => Vec::new(),
        })
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>, BridgeError> {
        let inner = self.inner.lock().await;
        let mut members = inner.sorted_members(key);
        members.reverse();
        Ok(match rank_range(members.len(), start, stop) {
            Some((lo, hi)) => members[lo..=hi].to_vec(),
            None => Vec::new(),
        })
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<(String, i64)>, BridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sorted_members(key)
            .into_iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .collect())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BridgeError> {
        let mut inner = self.inner.lock().await;
        let expired: Vec<String> = inner
            .expiries
            .iter()
            .filter(|(_, deadline)| Instant::now() >= **deadline)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            inner.expiries.remove(&key);
            inner.strings.remove(&key);
        }
        let mut keys: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.zsets.keys())
            .chain(inner.hashes.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn multi(&self, ops: Vec<WriteOp>) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock().await;
        for op in &ops {
            inner.apply(op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_nx_px_conditional_create() {
        let store = MemoryStore::new();
        assert!(store.set_nx_px("k", "a", 60_000).await.unwrap());
        assert!(!store.set_nx_px("k", "b", 60_000).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        assert!(store.set_nx_px("k", "a", 1).await.unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        // expired key can be re-created
        assert!(store.set_nx_px("k", "b", 60_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_equals() {
        let store = MemoryStore::new();
        store.set("k", "token-1").await.unwrap();
        assert!(!store.delete_if_equals("k", "token-2").await.unwrap());
        assert!(store.delete_if_equals("k", "token-1").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zset_ordering_and_ranges() {
        let store = MemoryStore::new();
        store.zadd("z", "b", 2).await.unwrap();
        store.zadd("z", "a", 1).await.unwrap();
        store.zadd("z", "c", 3).await.unwrap();

        let asc = store.zrange("z", 0, -1).await.unwrap();
        assert_eq!(
            asc,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3)
            ]
        );

        let head = store.zrange("z", 0, 0).await.unwrap();
        assert_eq!(head, vec![("a".to_string(), 1)]);

        let desc = store.zrevrange("z", 0, 1).await.unwrap();
        assert_eq!(desc, vec![("c".to_string(), 3), ("b".to_string(), 2)]);

        let mid = store.zrange_by_score("z", 2, 2).await.unwrap();
        assert_eq!(mid, vec![("b".to_string(), 2)]);

        assert_eq!(store.zscore("z", "b").await.unwrap(), Some(2));
        assert_eq!(store.zcard("z").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_zset_score_tie_breaks_by_member() {
        let store = MemoryStore::new();
        store.zadd("z", "later", 5).await.unwrap();
        store.zadd("z", "early", 5).await.unwrap();
        let members = store.zrange("z", 0, -1).await.unwrap();
        assert_eq!(members[0].0, "early");
    }

    #[tokio::test]
    async fn test_scan_glob() {
        let store = MemoryStore::new();
        store.set("claims:ban_a:0xabc", "1").await.unwrap();
        store.set("claims:ban_b:0xdef", "1").await.unwrap();
        store.set("claims:pending:ban_a:0xabc", "1").await.unwrap();

        let keys = store.scan("claims:ban_a:*").await.unwrap();
        assert_eq!(keys, vec!["claims:ban_a:0xabc".to_string()]);

        let pending = store.scan("claims:pending:*").await.unwrap();
        assert_eq!(pending.len(), 1);

        let all = store.scan("claims:*").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_multi_is_atomic_batch() {
        let store = MemoryStore::new();
        store
            .multi(vec![
                WriteOp::Set {
                    key: "ban-balance:ban_a".into(),
                    value: "500".into(),
                },
                WriteOp::ZAdd {
                    key: "deposits:ban_a".into(),
                    member: "h1".into(),
                    score: 1000,
                },
                WriteOp::HSet {
                    key: "audit:h1".into(),
                    fields: vec![("type".into(), "deposit".into())],
                },
            ])
            .await
            .unwrap();
        assert_eq!(
            store.get("ban-balance:ban_a").await.unwrap(),
            Some("500".to_string())
        );
        assert_eq!(store.zscore("deposits:ban_a", "h1").await.unwrap(), Some(1000));
        assert_eq!(
            store.hgetall("audit:h1").await.unwrap().get("type"),
            Some(&"deposit".to_string())
        );
    }

    #[tokio::test]
    async fn test_incr() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("seq").await.unwrap(), 1);
        assert_eq!(store.incr("seq").await.unwrap(), 2);
    }
}
