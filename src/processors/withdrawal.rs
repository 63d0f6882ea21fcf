//! Withdrawal state machine.
//!
//! submitted -> validated -> funded -> sent -> recorded, with the
//! pending-funds detour when the hot wallet cannot cover the amount:
//! the job re-enqueues a delayed successor and supersedes itself.

use alloy::primitives::U256;
use tracing::{info, warn};

use crate::amounts::{format_ban, parse_units};
use crate::error::BridgeError;
use crate::metrics;
use crate::processors::Processors;
use crate::types::{
    canonical_blockchain, canonical_native, withdrawal_message, JobKind, WithdrawalJob,
};

impl Processors {
    pub(crate) async fn process_withdrawal(
        &self,
        request: &WithdrawalJob,
    ) -> Result<String, BridgeError> {
        let native = canonical_native(&request.native_address);
        let blockchain = canonical_blockchain(&request.blockchain_address)?;

        // Idempotency before anything else: the client timestamp is the
        // uniqueness key for withdrawal requests.
        if self
            .ledger
            .contains_withdrawal_request(&native, request.timestamp_ms)
            .await?
        {
            return Err(BridgeError::DuplicateRequest);
        }

        let amount = parse_units(&request.amount)?;

        match &request.signature {
            Some(signature) => {
                let message = withdrawal_message(&format_ban(amount), &native);
                if !self.evm.verify_signature(&blockchain, &message, signature)? {
                    return Err(BridgeError::InvalidSignature);
                }
            }
            None => return Err(BridgeError::InvalidSignature),
        }

        if !self.ledger.is_claimed(&native).await?
            || !self.ledger.has_claim(&native, &blockchain).await?
        {
            return Err(BridgeError::NotClaimed(native));
        }

        if amount.is_zero() {
            return Err(BridgeError::InvalidAmount(request.amount.clone()));
        }

        let balance = self.ledger.balance(&native).await?;
        if balance < amount {
            return Err(BridgeError::InsufficientBalance {
                available: balance,
                requested: amount,
            });
        }

        let hot_balance = self.ban.balance(&self.hot_wallet).await?;
        if hot_balance < amount {
            return self.enqueue_pending_withdrawal(request, &native, hot_balance).await;
        }

        // Node-side idempotent send id, keyed like the ledger record.
        let send_id = format!("{}:{}", native, request.timestamp_ms);
        let hash = self.ban.send(&native, amount, &send_id).await?;

        // Past this point the coins moved: any store failure is fatal
        // for the job and needs operator reconciliation from chain.
        if let Err(e) = self
            .ledger
            .store_withdrawal(&native, amount, request.timestamp_ms, &hash)
            .await
        {
            return Err(BridgeError::StoreTransaction(format!(
                "withdrawal {hash} sent but not recorded: {e}"
            )));
        }

        metrics::record_withdrawal("sent");
        info!(
            native_address = %native,
            amount = %format_ban(amount),
            hash = %hash,
            "Withdrawal sent"
        );
        Ok(hash)
    }

    async fn enqueue_pending_withdrawal(
        &self,
        request: &WithdrawalJob,
        native: &str,
        hot_balance: U256,
    ) -> Result<String, BridgeError> {
        let successor = WithdrawalJob {
            attempt: request.attempt + 1,
            ..request.clone()
        };
        self.queue
            .enqueue(
                JobKind::NativeWithdrawal,
                native,
                &serde_json::to_string(&successor)?,
                self.pending_withdrawal_delay,
            )
            .await?;
        metrics::record_withdrawal("pending");
        warn!(
            native_address = %native,
            requested = %request.amount,
            hot_balance = %hot_balance,
            attempt = successor.attempt,
            "Hot wallet underfunded, withdrawal re-enqueued as pending"
        );

        if request.attempt == 0 {
            // First encounter: the successor replaces this job.
            Err(BridgeError::WithdrawalPending)
        } else {
            // Later encounters resolve with an empty hash so a caller
            // awaiting the original request sees "still pending".
            Ok(String::new())
        }
    }
}
