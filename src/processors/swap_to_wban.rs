//! BAN -> wBAN swap: issue a signed mint receipt against a pre-debited
//! ledger balance. The receipt itself moves nothing on chain, so it is
//! free to re-issue; the debit is the state transition that matters.

use tracing::info;

use crate::amounts::{format_ban, parse_units};
use crate::error::BridgeError;
use crate::metrics;
use crate::processors::Processors;
use crate::types::{canonical_blockchain, canonical_native, swap_message, SwapToWbanJob};

impl Processors {
    pub(crate) async fn process_swap_to_wban(
        &self,
        request: &SwapToWbanJob,
    ) -> Result<String, BridgeError> {
        let native = canonical_native(&request.native_address);
        let blockchain = canonical_blockchain(&request.blockchain_address)?;
        let amount = parse_units(&request.amount)?;

        let message = swap_message(&format_ban(amount), &native);
        if !self
            .evm
            .verify_signature(&blockchain, &message, &request.signature)?
        {
            return Err(BridgeError::InvalidSignature);
        }

        if !self.ledger.has_claim(&native, &blockchain).await? {
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

        let receipt = self.evm.create_mint_receipt(&blockchain, amount).await?;

        self.ledger
            .store_swap_to_wban(
                &native,
                &blockchain,
                amount,
                request.timestamp_ms,
                &receipt.receipt,
                &receipt.uuid,
            )
            .await?;

        metrics::record_swap("ban-to-wban");
        info!(
            native_address = %native,
            blockchain_address = %blockchain,
            amount = %format_ban(amount),
            uuid = %receipt.uuid,
            wban_balance = %receipt.wban_balance,
            "Mint receipt issued"
        );
        Ok(receipt.receipt)
    }
}
