//! Error kinds for the bridge core.
//!
//! Validation errors surface synchronously to the caller; operational errors
//! are retried by the work queue; `StoreTransaction` after a chain send is
//! fatal for the job and requires manual reconciliation.

use alloy::primitives::U256;
use thiserror::Error;

/// Errors produced by the ledger, lock manager, queue and job handlers.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("address is being claimed by another wallet")]
    InvalidOwner,

    #[error("address {0} has no claim")]
    NotClaimed(String),

    #[error("address is blacklisted ({0})")]
    Blacklisted(String),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: U256, requested: U256 },

    #[error("duplicate request")]
    DuplicateRequest,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("could not acquire lock on {0}")]
    LockTimeout(String),

    /// Not a failure: the withdrawal was re-enqueued as a pending
    /// withdrawal and the current job is superseded by its successor.
    #[error("withdrawal superseded by a pending retry")]
    WithdrawalPending,

    /// A ledger write failed after an external side effect already
    /// happened. The job must not be replayed.
    #[error("store transaction failure: {0}")]
    StoreTransaction(String),

    #[error("upstream chain call failed: {0}")]
    UpstreamChain(String),

    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Whether the queue should re-enqueue the failed job with backoff.
    ///
    /// `StoreTransaction` is deliberately not retryable: replaying a job
    /// whose chain send already happened would double-spend.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::LockTimeout(_) | BridgeError::UpstreamChain(_) | BridgeError::Store(_)
        )
    }
}
