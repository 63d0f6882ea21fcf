//! Per-account durable work queue.
//!
//! Jobs are persisted in the store so a restart resumes where the
//! process died. Each account has its own FIFO sequence scored by
//! ready-time; the dispatcher keeps at most one job of an account in
//! flight, which is what makes "deposit then swap" ordering predictable
//! for a user regardless of lock timing.

use alloy::primitives::U256;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::amounts::parse_units;
use crate::error::BridgeError;
use crate::metrics;
use crate::store::{KvStore, WriteOp};
use crate::types::{JobKind, WithdrawalJob};

const ACCOUNTS_KEY: &str = "queue:accounts";
const SEQ_KEY: &str = "queue:seq";
const DEAD_LETTER_KEY: &str = "queue:dead-letter";

fn job_key(id: &str) -> String {
    format!("queue:job:{id}")
}

fn account_jobs(account: &str) -> String {
    format!("queue:pending:{account}")
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A persisted job envelope.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// Serialization group: the canonical native address.
    pub account: String,
    /// Kind-specific JSON payload.
    pub payload: String,
    /// Operational retry count (lock timeouts, upstream failures).
    pub attempts: u32,
    pub enqueued_at_ms: i64,
}

/// Handles one job; the returned string is the job outcome (transaction
/// hash, receipt id, or empty for a pending withdrawal).
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<String, BridgeError>;
}

/// Backoff policy for operational retries, after which a job is
/// dead-lettered for operator inspection.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial_backoff.as_secs_f64()
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }
}

pub struct OperationQueue {
    store: Arc<dyn KvStore>,
}

impl OperationQueue {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Enqueue a job for an account, optionally delayed. Jobs of one
    /// account run in enqueue order.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        account: &str,
        payload: &str,
        delay: Duration,
    ) -> Result<String, BridgeError> {
        let seq = self.store.incr(SEQ_KEY).await?;
        // Zero-padded sequence prefix keeps FIFO order when two jobs of
        // an account land on the same millisecond (score ties resolve
        // lexically by member).
        let id = format!("{seq:016}-{}", Uuid::new_v4());
        let now = now_ms();
        let ready_at = now + delay.as_millis() as i64;
        self.store
            .multi(vec![
                WriteOp::HSet {
                    key: job_key(&id),
                    fields: vec![
                        ("kind".into(), kind.as_str().into()),
                        ("account".into(), account.to_string()),
                        ("payload".into(), payload.to_string()),
                        ("attempts".into(), "0".into()),
                        ("enqueued_at_ms".into(), now.to_string()),
                    ],
                },
                WriteOp::ZAdd {
                    key: account_jobs(account),
                    member: id.clone(),
                    score: ready_at,
                },
                WriteOp::ZAdd {
                    key: ACCOUNTS_KEY.to_string(),
                    member: account.to_string(),
                    score: now,
                },
            ])
            .await?;
        debug!(job = %id, kind = %kind, account = %account, ready_at, "Job enqueued");
        Ok(id)
    }

    /// Accounts with registered work.
    pub async fn accounts(&self) -> Result<Vec<String>, BridgeError> {
        let members = self.store.zrange(ACCOUNTS_KEY, 0, -1).await?;
        Ok(members.into_iter().map(|(member, _)| member).collect())
    }

    /// Head of an account's FIFO: `(job_id, ready_at_ms)`.
    pub async fn peek(&self, account: &str) -> Result<Option<(String, i64)>, BridgeError> {
        let head = self.store.zrange(&account_jobs(account), 0, 0).await?;
        Ok(head.into_iter().next())
    }

    pub async fn load(&self, id: &str) -> Result<Option<Job>, BridgeError> {
        let fields = self.store.hgetall(&job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let kind = fields
            .get("kind")
            .and_then(|k| JobKind::parse(k))
            .ok_or_else(|| {
                BridgeError::StoreTransaction(format!("job {id} has no valid kind"))
            })?;
        Ok(Some(Job {
            id: id.to_string(),
            kind,
            account: fields.get("account").cloned().unwrap_or_default(),
            payload: fields.get("payload").cloned().unwrap_or_default(),
            attempts: fields
                .get("attempts")
                .and_then(|a| a.parse().ok())
                .unwrap_or(0),
            enqueued_at_ms: fields
                .get("enqueued_at_ms")
                .and_then(|t| t.parse().ok())
                .unwrap_or(0),
        }))
    }

    /// Acknowledge a finished job and drop its payload.
    pub async fn complete(&self, job: &Job) -> Result<(), BridgeError> {
        self.store
            .multi(vec![
                WriteOp::ZRem {
                    key: account_jobs(&job.account),
                    member: job.id.clone(),
                },
                WriteOp::Delete {
                    key: job_key(&job.id),
                },
            ])
            .await?;
        self.unregister_if_idle(&job.account).await
    }

    /// Drop a dangling queue entry whose payload is gone.
    pub async fn drop_entry(&self, account: &str, id: &str) -> Result<(), BridgeError> {
        self.store.zrem(&account_jobs(account), id).await?;
        self.unregister_if_idle(account).await
    }

    pub async fn unregister_if_idle(&self, account: &str) -> Result<(), BridgeError> {
        if self.store.zcard(&account_jobs(account)).await? == 0 {
            self.store.zrem(ACCOUNTS_KEY, account).await?;
        }
        Ok(())
    }

    /// Re-schedule a job after an operational failure.
    pub async fn retry_later(&self, job: &Job, backoff: Duration) -> Result<(), BridgeError> {
        let ready_at = now_ms() + backoff.as_millis() as i64;
        self.store
            .multi(vec![
                WriteOp::HSet {
                    key: job_key(&job.id),
                    fields: vec![("attempts".into(), (job.attempts + 1).to_string())],
                },
                WriteOp::ZAdd {
                    key: account_jobs(&job.account),
                    member: job.id.clone(),
                    score: ready_at,
                },
            ])
            .await
    }

    /// Park a job for operator inspection. The payload is kept.
    pub async fn dead_letter(&self, job: &Job, reason: &str) -> Result<(), BridgeError> {
        self.store
            .multi(vec![
                WriteOp::ZRem {
                    key: account_jobs(&job.account),
                    member: job.id.clone(),
                },
                WriteOp::ZAdd {
                    key: DEAD_LETTER_KEY.to_string(),
                    member: job.id.clone(),
                    score: now_ms(),
                },
                WriteOp::HSet {
                    key: job_key(&job.id),
                    fields: vec![
                        ("error".into(), reason.to_string()),
                        ("failed_at_ms".into(), now_ms().to_string()),
                    ],
                },
            ])
            .await?;
        self.unregister_if_idle(&job.account).await
    }

    /// Summed amount of withdrawals waiting on hot-wallet funds, in base
    /// units. Surfaced on dashboards and the status endpoint.
    pub async fn pending_withdrawal_total(&self) -> Result<U256, BridgeError> {
        let mut total = U256::ZERO;
        for account in self.accounts().await? {
            for (id, _) in self.store.zrange(&account_jobs(&account), 0, -1).await? {
                let Some(job) = self.load(&id).await? else {
                    continue;
                };
                if job.kind != JobKind::NativeWithdrawal {
                    continue;
                }
                let Ok(withdrawal) = serde_json::from_str::<WithdrawalJob>(&job.payload) else {
                    continue;
                };
                if withdrawal.attempt == 0 {
                    continue;
                }
                if let Ok(amount) = parse_units(&withdrawal.amount) {
                    total = total.saturating_add(amount);
                }
            }
        }
        Ok(total)
    }

    /// Jobs waiting across all accounts.
    pub async fn depth(&self) -> Result<u64, BridgeError> {
        let mut depth = 0;
        for account in self.accounts().await? {
            depth += self.store.zcard(&account_jobs(&account)).await?;
        }
        Ok(depth)
    }

    pub async fn dead_letter_count(&self) -> Result<u64, BridgeError> {
        self.store.zcard(DEAD_LETTER_KEY).await
    }
}

/// Dispatches due jobs to the handler, one in-flight job per account.
pub struct QueueWorker {
    queue: Arc<OperationQueue>,
    handler: Arc<dyn JobHandler>,
    retry: RetryPolicy,
    poll_interval: Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<OperationQueue>,
        handler: Arc<dyn JobHandler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            retry: RetryPolicy::default(),
            poll_interval,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Queue worker starting"
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping queue worker");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "Queue dispatch cycle failed");
            }
        }
    }

    async fn tick(&self) -> Result<(), BridgeError> {
        let now = now_ms();
        for account in self.queue.accounts().await? {
            {
                let in_flight = self.in_flight.lock().await;
                if in_flight.contains(&account) {
                    continue;
                }
            }
            let Some((job_id, ready_at)) = self.queue.peek(&account).await? else {
                self.queue.unregister_if_idle(&account).await.ok();
                continue;
            };
            if ready_at > now {
                continue;
            }
            self.in_flight.lock().await.insert(account.clone());
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let retry = self.retry.clone();
            let in_flight = self.in_flight.clone();
            tokio::spawn(async move {
                if let Err(e) = process_one(&queue, handler.as_ref(), &retry, &account, &job_id).await
                {
                    error!(job = %job_id, account = %account, error = %e, "Job bookkeeping failed");
                }
                in_flight.lock().await.remove(&account);
            });
        }

        metrics::set_queue_depth(self.queue.depth().await?);
        metrics::set_dead_letter_count(self.queue.dead_letter_count().await?);
        Ok(())
    }
}

async fn process_one(
    queue: &OperationQueue,
    handler: &dyn JobHandler,
    retry: &RetryPolicy,
    account: &str,
    job_id: &str,
) -> Result<(), BridgeError> {
    let Some(job) = queue.load(job_id).await? else {
        warn!(job = %job_id, account = %account, "Queue entry without payload, dropping");
        return queue.drop_entry(account, job_id).await;
    };

    match handler.handle(&job).await {
        Ok(outcome) => {
            info!(
                job = %job.id,
                kind = %job.kind,
                account = %job.account,
                outcome = %outcome,
                "Job completed"
            );
            metrics::record_job(job.kind.as_str(), "completed");
            queue.complete(&job).await
        }
        Err(BridgeError::WithdrawalPending) => {
            // The successor carries the work from here on.
            info!(job = %job.id, account = %job.account, "Withdrawal superseded by pending retry");
            metrics::record_job(job.kind.as_str(), "superseded");
            queue.complete(&job).await
        }
        Err(e) if e.is_retryable() && job.attempts + 1 < retry.max_attempts => {
            let backoff = retry.backoff_for_attempt(job.attempts);
            warn!(
                job = %job.id,
                kind = %job.kind,
                attempt = job.attempts + 1,
                backoff_ms = backoff.as_millis() as u64,
                error = %e,
                "Job failed, will retry"
            );
            metrics::record_job(job.kind.as_str(), "retried");
            queue.retry_later(&job, backoff).await
        }
        Err(e) => {
            if matches!(e, BridgeError::StoreTransaction(_)) {
                error!(
                    job = %job.id,
                    kind = %job.kind,
                    account = %job.account,
                    error = %e,
                    "Ledger write failed after side effect; manual reconciliation required"
                );
            } else {
                warn!(job = %job.id, kind = %job.kind, error = %e, "Job rejected");
            }
            metrics::record_job(job.kind.as_str(), "failed");
            queue.dead_letter(&job, &e.to_string()).await
        }
    }
}
