//! Distributed lock manager.
//!
//! Advisory locks over the key-value store, one `locks:<resource>` key per
//! resource, each holding a random token with the lease TTL. Acquisition
//! retries a bounded number of times with jitter; release compares the
//! token so an expired lease never deletes a lock re-acquired by another
//! holder.

use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::store::KvStore;

/// Lock acquisition parameters.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Acquisition attempts before giving up with `LockTimeout`.
    pub retry_count: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub retry_jitter: Duration,
    /// Fraction of the TTL reserved for clock drift between processes.
    pub drift_factor: f64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_count: 10,
            retry_delay: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(200),
            drift_factor: 0.01,
        }
    }
}

/// An acquired lease over one or more resources.
///
/// Scoped: callers go through [`LockManager::with_lock`], which releases
/// on every exit path. The TTL bounds the damage if a process dies while
/// holding a lease.
#[derive(Debug)]
pub struct Lease {
    resources: Vec<String>,
    token: String,
    valid_until: Instant,
}

impl Lease {
    pub fn is_valid(&self) -> bool {
        Instant::now() < self.valid_until
    }
}

fn lock_key(resource: &str) -> String {
    format!("locks:{resource}")
}

pub struct LockManager {
    store: Arc<dyn KvStore>,
    config: LockConfig,
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_config(store, LockConfig::default())
    }

    pub fn with_config(store: Arc<dyn KvStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Acquire all resources or none. Bounded retry; fails with
    /// `LockTimeout` naming the contested resources.
    pub async fn acquire(&self, resources: &[&str], ttl: Duration) -> Result<Lease, BridgeError> {
        let ttl_ms = ttl.as_millis() as u64;
        let drift = Duration::from_secs_f64(ttl.as_secs_f64() * self.config.drift_factor);

        for attempt in 0..self.config.retry_count {
            let token = Uuid::new_v4().to_string();
            let started = Instant::now();
            let mut acquired: Vec<String> = Vec::with_capacity(resources.len());
            let mut all_locked = true;

            for resource in resources {
                if self
                    .store
                    .set_nx_px(&lock_key(resource), &token, ttl_ms)
                    .await?
                {
                    acquired.push((*resource).to_string());
                } else {
                    all_locked = false;
                    break;
                }
            }

            if all_locked {
                let elapsed = started.elapsed();
                if elapsed + drift < ttl {
                    return Ok(Lease {
                        resources: resources.iter().map(|r| r.to_string()).collect(),
                        token,
                        valid_until: Instant::now() + (ttl - elapsed - drift),
                    });
                }
                // Took so long the lease is already within the drift
                // window; treat as a failed attempt.
            }

            for resource in &acquired {
                let _ = self
                    .store
                    .delete_if_equals(&lock_key(resource), &token)
                    .await;
            }

            if attempt + 1 < self.config.retry_count {
                let jitter_ms = rand::thread_rng()
                    .gen_range(0..=self.config.retry_jitter.as_millis() as u64);
                tokio::time::sleep(self.config.retry_delay + Duration::from_millis(jitter_ms))
                    .await;
            }
        }

        Err(BridgeError::LockTimeout(resources.join(",")))
    }

    /// Release a lease. Best-effort per resource: a key whose TTL already
    /// expired, or that another holder re-acquired, is left alone.
    pub async fn release(&self, lease: &Lease) -> Result<(), BridgeError> {
        for resource in &lease.resources {
            self.store
                .delete_if_equals(&lock_key(resource), &lease.token)
                .await?;
        }
        Ok(())
    }

    /// Run `f` under a lease over `resources`, releasing on every exit
    /// path and surfacing `f`'s error unchanged.
    pub async fn with_lock<T, F, Fut>(
        &self,
        resources: &[&str],
        ttl: Duration,
        f: F,
    ) -> Result<T, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, BridgeError>>,
    {
        let lease = self.acquire(resources, ttl).await?;
        let result = f().await;
        if let Err(e) = self.release(&lease).await {
            // The TTL reclaims the key; losing the explicit release only
            // delays competitors.
            tracing::warn!(error = %e, resources = ?lease.resources, "Failed to release lock lease");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager(store: Arc<dyn KvStore>) -> LockManager {
        // Short retries so contention tests stay fast.
        LockManager::with_config(
            store,
            LockConfig {
                retry_count: 3,
                retry_delay: Duration::from_millis(5),
                retry_jitter: Duration::from_millis(5),
                drift_factor: 0.01,
            },
        )
    }

    #[test]
    fn test_default_lock_parameters() {
        let config = LockConfig::default();
        assert_eq!(config.retry_count, 10);
        assert_eq!(config.retry_delay, Duration::from_millis(200));
        assert_eq!(config.retry_jitter, Duration::from_millis(200));
        assert!((config.drift_factor - 0.01).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(store.clone());

        let lease = locks
            .acquire(&["balance:ban_a"], Duration::from_secs(1))
            .await
            .unwrap();
        assert!(lease.is_valid());
        assert!(store.exists("locks:balance:ban_a").await.unwrap());

        locks.release(&lease).await.unwrap();
        assert!(!store.exists("locks:balance:ban_a").await.unwrap());
    }

    #[tokio::test]
    async fn test_contended_lock_times_out() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(store.clone());

        let _held = locks
            .acquire(&["balance:ban_a"], Duration::from_secs(5))
            .await
            .unwrap();

        let err = locks
            .acquire(&["balance:ban_a"], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::LockTimeout(_)));
    }

    #[tokio::test]
    async fn test_release_ignores_foreign_token() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(store.clone());

        let lease = locks
            .acquire(&["balance:ban_a"], Duration::from_secs(1))
            .await
            .unwrap();
        // Another holder took over after an expiry.
        store.set("locks:balance:ban_a", "someone-else").await.unwrap();
        locks.release(&lease).await.unwrap();
        assert_eq!(
            store.get("locks:balance:ban_a").await.unwrap(),
            Some("someone-else".to_string())
        );
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(store.clone());

        let result: Result<(), BridgeError> = locks
            .with_lock(&["balance:ban_a"], Duration::from_secs(1), || async {
                Err(BridgeError::DuplicateRequest)
            })
            .await;
        assert!(matches!(result, Err(BridgeError::DuplicateRequest)));
        // Error path still released the lock.
        assert!(!store.exists("locks:balance:ban_a").await.unwrap());
    }

    #[tokio::test]
    async fn test_multi_resource_all_or_nothing() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(store.clone());

        let _held = locks
            .acquire(&["balance:ban_b"], Duration::from_secs(5))
            .await
            .unwrap();

        // Second resource is contested: the first must not stay locked.
        let err = locks
            .acquire(&["balance:ban_a", "balance:ban_b"], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::LockTimeout(_)));
        assert!(!store.exists("locks:balance:ban_a").await.unwrap());
    }
}
