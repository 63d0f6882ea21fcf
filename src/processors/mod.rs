//! Job handlers for the three queued operation kinds.
//!
//! Each handler re-validates from persisted state (idempotency first),
//! talks to at most one chain collaborator, then commits its ledger
//! mutation. A ledger failure after a chain send maps to
//! `StoreTransaction` so the queue parks the job instead of replaying a
//! side effect.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::clients::{BanNode, EvmClient};
use crate::error::BridgeError;
use crate::ledger::LedgerStore;
use crate::queue::{Job, JobHandler, OperationQueue};
use crate::types::JobKind;

mod swap_to_ban;
mod swap_to_wban;
mod withdrawal;

pub struct Processors {
    pub(crate) ledger: Arc<LedgerStore>,
    pub(crate) queue: Arc<OperationQueue>,
    pub(crate) ban: Arc<dyn BanNode>,
    pub(crate) evm: Arc<dyn EvmClient>,
    /// Operator BAN address withdrawals are paid from.
    pub(crate) hot_wallet: String,
    /// Delay before a pending withdrawal retries.
    pub(crate) pending_withdrawal_delay: Duration,
}

impl Processors {
    pub fn new(
        ledger: Arc<LedgerStore>,
        queue: Arc<OperationQueue>,
        ban: Arc<dyn BanNode>,
        evm: Arc<dyn EvmClient>,
        hot_wallet: &str,
        pending_withdrawal_delay: Duration,
    ) -> Self {
        Self {
            ledger,
            queue,
            ban,
            evm,
            hot_wallet: crate::types::canonical_native(hot_wallet),
            pending_withdrawal_delay,
        }
    }
}

#[async_trait]
impl JobHandler for Processors {
    async fn handle(&self, job: &Job) -> Result<String, BridgeError> {
        match job.kind {
            JobKind::NativeWithdrawal => {
                let payload = serde_json::from_str(&job.payload)?;
                self.process_withdrawal(&payload).await
            }
            JobKind::SwapToWban => {
                let payload = serde_json::from_str(&job.payload)?;
                self.process_swap_to_wban(&payload).await
            }
            JobKind::SwapToBan => {
                let payload = serde_json::from_str(&job.payload)?;
                self.process_swap_to_ban(&payload).await
            }
        }
    }
}
