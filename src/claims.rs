//! Claim manager.
//!
//! A claim binds a BAN address to a blockchain address. It starts as a
//! pending record with a 5-minute TTL and becomes permanent when the
//! first deposit from that BAN address reaches the hot wallet. Confirmed
//! claims are never retracted.

use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{Blacklist, EvmClient};
use crate::error::BridgeError;
use crate::ledger::LedgerStore;
use crate::types::{canonical_blockchain, canonical_native, claim_message};

/// Outcome of a claim request. The check ordering is part of the
/// contract: signature, then blacklist, then existing claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Ok,
    AlreadyDone,
    InvalidSignature,
    InvalidOwner,
    Blacklisted,
    Error,
}

impl ClaimOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimOutcome::Ok => "ok",
            ClaimOutcome::AlreadyDone => "already-done",
            ClaimOutcome::InvalidSignature => "invalid-signature",
            ClaimOutcome::InvalidOwner => "invalid-owner",
            ClaimOutcome::Blacklisted => "blacklisted",
            ClaimOutcome::Error => "error",
        }
    }
}

impl fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct ClaimManager {
    ledger: Arc<LedgerStore>,
    evm: Arc<dyn EvmClient>,
    blacklist: Arc<dyn Blacklist>,
}

impl ClaimManager {
    pub fn new(
        ledger: Arc<LedgerStore>,
        evm: Arc<dyn EvmClient>,
        blacklist: Arc<dyn Blacklist>,
    ) -> Self {
        Self {
            ledger,
            evm,
            blacklist,
        }
    }

    /// Handle a claim request from a blockchain wallet.
    pub async fn claim(
        &self,
        native_address: &str,
        blockchain_address: &str,
        signature: &str,
    ) -> ClaimOutcome {
        match self
            .try_claim(native_address, blockchain_address, signature)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    native_address = %native_address,
                    blockchain_address = %blockchain_address,
                    error = %e,
                    "Claim request failed"
                );
                ClaimOutcome::Error
            }
        }
    }

    async fn try_claim(
        &self,
        native_address: &str,
        blockchain_address: &str,
        signature: &str,
    ) -> Result<ClaimOutcome, BridgeError> {
        let native = canonical_native(native_address);
        let blockchain = canonical_blockchain(blockchain_address)?;

        let message = claim_message(&native);
        if !self.evm.verify_signature(&blockchain, &message, signature)? {
            warn!(native_address = %native, "Claim with invalid signature");
            return Ok(ClaimOutcome::InvalidSignature);
        }

        if let Some(alias) = self.blacklist.lookup(&native).await? {
            warn!(native_address = %native, alias = %alias, "Claim from blacklisted address");
            return Ok(ClaimOutcome::Blacklisted);
        }

        if self.ledger.has_claim(&native, &blockchain).await? {
            return Ok(ClaimOutcome::AlreadyDone);
        }

        // Re-claiming the same pair while its pending record lives is
        // harmless: the user just hasn't deposited yet.
        if self.ledger.has_pending_claim_for(&native, &blockchain).await? {
            return Ok(ClaimOutcome::Ok);
        }

        if !self.ledger.has_pending_claim(&native).await? {
            // Conditional create: two wallets racing for the same BAN
            // address resolve to exactly one pending claim.
            if self.ledger.store_pending_claim(&native, &blockchain).await? {
                info!(
                    native_address = %native,
                    blockchain_address = %blockchain,
                    "Pending claim created"
                );
                return Ok(ClaimOutcome::Ok);
            }
            return Ok(ClaimOutcome::InvalidOwner);
        }

        // A different blockchain wallet holds the pending claim.
        Ok(ClaimOutcome::InvalidOwner)
    }

    /// Promote the pending claim of a BAN address after its first
    /// deposit. Returns the bound blockchain address, if any.
    pub async fn confirm(&self, native_address: &str) -> Result<Option<String>, BridgeError> {
        let bound = self.ledger.confirm_claim(native_address).await?;
        if let Some(ref blockchain) = bound {
            info!(
                native_address = %canonical_native(native_address),
                blockchain_address = %blockchain,
                "Claim confirmed"
            );
        }
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MintReceipt;
    use crate::clients::SwapToBanEvent;
    use crate::store::{KvStore, MemoryStore};
    use alloy::primitives::U256;
    use async_trait::async_trait;

    const BC_B: &str = "0x00000000000000000000000000000000000000bb";
    const BC_C: &str = "0x00000000000000000000000000000000000000cc";

    /// Signature checking stub: a signature is valid when it equals
    /// "sig:<lowercase signer address>".
    pub struct StubEvm;

    #[async_trait]
    impl EvmClient for StubEvm {
        fn verify_signature(
            &self,
            expected_signer: &str,
            _message: &str,
            signature: &str,
        ) -> Result<bool, BridgeError> {
            Ok(signature == format!("sig:{expected_signer}"))
        }

        async fn create_mint_receipt(
            &self,
            _blockchain_address: &str,
            _amount: U256,
        ) -> Result<MintReceipt, BridgeError> {
            unimplemented!("not used by claim tests")
        }

        async fn block_number(&self) -> Result<u64, BridgeError> {
            Ok(0)
        }

        async fn swap_to_ban_events(
            &self,
            _from_block: u64,
            _to_block: u64,
        ) -> Result<Vec<SwapToBanEvent>, BridgeError> {
            Ok(Vec::new())
        }
    }

    struct StubBlacklist {
        banned: Vec<String>,
    }

    #[async_trait]
    impl Blacklist for StubBlacklist {
        async fn lookup(&self, native_address: &str) -> Result<Option<String>, BridgeError> {
            Ok(self
                .banned
                .iter()
                .find(|b| **b == native_address)
                .map(|_| "scammer".to_string()))
        }
    }

    fn manager(banned: Vec<String>) -> ClaimManager {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ledger = Arc::new(LedgerStore::new(store, 0, "https://bscscan.com".into()));
        ClaimManager::new(ledger, Arc::new(StubEvm), Arc::new(StubBlacklist { banned }))
    }

    fn sig_for(blockchain_address: &str) -> String {
        format!("sig:{blockchain_address}")
    }

    #[tokio::test]
    async fn test_claim_flow() {
        let claims = manager(vec![]);

        let first = claims.claim("ban_a", BC_B, &sig_for(BC_B)).await;
        assert_eq!(first, ClaimOutcome::Ok);

        // Repeat while pending: still ok, not AlreadyDone.
        let repeat = claims.claim("ban_a", BC_B, &sig_for(BC_B)).await;
        assert_eq!(repeat, ClaimOutcome::Ok);

        // A second wallet while the pending claim lives.
        let other = claims.claim("ban_a", BC_C, &sig_for(BC_C)).await;
        assert_eq!(other, ClaimOutcome::InvalidOwner);

        // First deposit confirms the claim.
        let bound = claims.confirm("ban_a").await.unwrap();
        assert_eq!(bound.as_deref(), Some(BC_B));

        // AlreadyDone only after confirm.
        let done = claims.claim("ban_a", BC_B, &sig_for(BC_B)).await;
        assert_eq!(done, ClaimOutcome::AlreadyDone);
    }

    #[tokio::test]
    async fn test_invalid_signature_checked_first() {
        // Blacklisted address with a bad signature: the signature check
        // wins, per the contract ordering.
        let claims = manager(vec!["ban_bad".to_string()]);
        let outcome = claims.claim("ban_bad", BC_B, "sig:wrong").await;
        assert_eq!(outcome, ClaimOutcome::InvalidSignature);
    }

    #[tokio::test]
    async fn test_blacklisted_before_claim_checks() {
        let claims = manager(vec!["ban_bad".to_string()]);
        let outcome = claims.claim("ban_bad", BC_B, &sig_for(BC_B)).await;
        assert_eq!(outcome, ClaimOutcome::Blacklisted);
    }

    #[tokio::test]
    async fn test_same_blockchain_address_many_natives() {
        let claims = manager(vec![]);
        assert_eq!(claims.claim("ban_a", BC_B, &sig_for(BC_B)).await, ClaimOutcome::Ok);
        claims.confirm("ban_a").await.unwrap();
        assert_eq!(claims.claim("ban_b", BC_B, &sig_for(BC_B)).await, ClaimOutcome::Ok);
        claims.confirm("ban_b").await.unwrap();
    }
}
