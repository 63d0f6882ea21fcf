//! EVM collaborator: the wBAN token contract side of the bridge.
//!
//! Provides signature recovery for the canonical user messages, signed
//! mint receipts, and the redemption (wBAN -> BAN) event feed consumed by
//! the chain scanner.

use alloy::primitives::{keccak256, Address, Signature, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockTransactionsKind, Filter, Log, TransactionInput, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::amounts::format_ban;
use crate::error::BridgeError;
use crate::types::canonical_native;

/// A signed mint authorization. Free to re-issue: nothing moves on chain
/// until the user redeems it.
#[derive(Debug, Clone)]
pub struct MintReceipt {
    pub receipt: String,
    pub uuid: String,
    /// Current wBAN balance of the recipient.
    pub wban_balance: U256,
}

/// One wBAN -> BAN redemption event.
#[derive(Debug, Clone)]
pub struct SwapToBanEvent {
    pub blockchain_address: String,
    pub native_address: String,
    /// Human-readable BAN amount as carried by the event.
    pub amount: String,
    pub hash: String,
    pub timestamp_s: i64,
    pub wban_balance: U256,
}

#[async_trait]
pub trait EvmClient: Send + Sync {
    /// Recover the signer of `message` and compare against
    /// `expected_signer`. A malformed signature is simply not a match.
    fn verify_signature(
        &self,
        expected_signer: &str,
        message: &str,
        signature: &str,
    ) -> Result<bool, BridgeError>;

    async fn create_mint_receipt(
        &self,
        blockchain_address: &str,
        amount: U256,
    ) -> Result<MintReceipt, BridgeError>;

    async fn block_number(&self) -> Result<u64, BridgeError>;

    async fn swap_to_ban_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SwapToBanEvent>, BridgeError>;
}

pub struct WbanEvmClient {
    provider: RootProvider<Http<Client>>,
    signer: PrivateKeySigner,
    wban_address: Address,
    chain_id: u64,
}

fn upstream(context: &str, e: impl std::fmt::Display) -> BridgeError {
    BridgeError::UpstreamChain(format!("{context}: {e}"))
}

impl WbanEvmClient {
    pub fn new(
        rpc_url: &str,
        private_key: &str,
        wban_address: &str,
        chain_id: u64,
    ) -> Result<Self, BridgeError> {
        let url = rpc_url
            .parse()
            .map_err(|e| upstream("invalid EVM RPC URL", e))?;
        let provider = ProviderBuilder::new().on_http(url);
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|_| BridgeError::InvalidAddress("invalid EVM private key".to_string()))?;
        let wban_address = Address::from_str(wban_address)
            .map_err(|_| BridgeError::InvalidAddress(wban_address.to_string()))?;
        Ok(Self {
            provider,
            signer,
            wban_address,
            chain_id,
        })
    }

    /// keccak256("SwapToBan(address,string,uint256,uint256)")
    fn swap_to_ban_signature() -> alloy::primitives::B256 {
        keccak256(b"SwapToBan(address,string,uint256,uint256)")
    }

    async fn balance_of(&self, owner: Address) -> Result<U256, BridgeError> {
        // balanceOf(address) selector + left-padded owner
        let mut data = vec![0x70u8, 0xa0, 0x82, 0x31];
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(owner.as_slice());
        let tx = TransactionRequest::default()
            .to(self.wban_address)
            .input(TransactionInput::new(data.into()));
        let output = self
            .provider
            .call(&tx)
            .await
            .map_err(|e| upstream("balanceOf call", e))?;
        if output.len() < 32 {
            return Err(BridgeError::UpstreamChain(format!(
                "short balanceOf response ({} bytes)",
                output.len()
            )));
        }
        Ok(U256::from_be_slice(&output[..32]))
    }

    /// Parse a redemption log.
    ///
    /// Indexed: topics[1] = from (address).
    /// Data (abi encoded): string banAddress, uint256 amount,
    /// uint256 wbanBalance.
    fn parse_swap_log(&self, log: &Log) -> Result<SwapToBanEvent, BridgeError> {
        let topics = log.topics();
        if topics.len() < 2 {
            return Err(BridgeError::UpstreamChain(
                "redemption log missing indexed sender".to_string(),
            ));
        }
        let from = Address::from_slice(&topics[1].as_slice()[12..]);

        let data = log.data().data.as_ref();
        if data.len() < 96 {
            return Err(BridgeError::UpstreamChain(format!(
                "short redemption log data ({} bytes)",
                data.len()
            )));
        }
        let offset = usize::try_from(U256::from_be_slice(&data[0..32]))
            .map_err(|_| BridgeError::UpstreamChain("redemption log offset overflow".to_string()))?;
        let amount = U256::from_be_slice(&data[32..64]);
        let wban_balance = U256::from_be_slice(&data[64..96]);
        if data.len() < offset + 32 {
            return Err(BridgeError::UpstreamChain(
                "redemption log string offset out of range".to_string(),
            ));
        }
        let len = usize::try_from(U256::from_be_slice(&data[offset..offset + 32]))
            .map_err(|_| BridgeError::UpstreamChain("redemption log length overflow".to_string()))?;
        if data.len() < offset.saturating_add(32).saturating_add(len) {
            return Err(BridgeError::UpstreamChain(
                "redemption log string length out of range".to_string(),
            ));
        }
        let ban_address = std::str::from_utf8(&data[offset + 32..offset + 32 + len])
            .map_err(|e| upstream("redemption log ban address", e))?;

        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| BridgeError::UpstreamChain("log missing transaction hash".to_string()))?;

        Ok(SwapToBanEvent {
            blockchain_address: format!("{from:#x}"),
            native_address: canonical_native(ban_address),
            amount: format_ban(amount),
            hash: format!("{tx_hash:#x}"),
            timestamp_s: 0, // filled from the block header by the caller
            wban_balance,
        })
    }

    async fn block_timestamp(&self, number: u64) -> Result<i64, BridgeError> {
        let block = self
            .provider
            .get_block_by_number(number.into(), BlockTransactionsKind::Hashes)
            .await
            .map_err(|e| upstream("get_block_by_number", e))?
            .ok_or_else(|| BridgeError::UpstreamChain(format!("block {number} not found")))?;
        Ok(block.header.timestamp as i64)
    }
}

#[async_trait]
impl EvmClient for WbanEvmClient {
    fn verify_signature(
        &self,
        expected_signer: &str,
        message: &str,
        signature: &str,
    ) -> Result<bool, BridgeError> {
        let Ok(expected) = Address::from_str(expected_signer.trim()) else {
            return Err(BridgeError::InvalidAddress(expected_signer.to_string()));
        };
        let Ok(parsed) = Signature::from_str(signature.trim()) else {
            return Ok(false);
        };
        match parsed.recover_address_from_msg(message.as_bytes()) {
            Ok(recovered) => Ok(recovered == expected),
            Err(_) => Ok(false),
        }
    }

    async fn create_mint_receipt(
        &self,
        blockchain_address: &str,
        amount: U256,
    ) -> Result<MintReceipt, BridgeError> {
        let recipient = Address::from_str(blockchain_address.trim())
            .map_err(|_| BridgeError::InvalidAddress(blockchain_address.to_string()))?;
        let uuid = Uuid::new_v4().to_string();

        // The contract reconstructs the same digest to validate the
        // authorization: recipient ++ amount ++ uuid ++ chainId.
        let mut payload = Vec::with_capacity(20 + 32 + uuid.len() + 8);
        payload.extend_from_slice(recipient.as_slice());
        payload.extend_from_slice(&amount.to_be_bytes::<32>());
        payload.extend_from_slice(uuid.as_bytes());
        payload.extend_from_slice(&self.chain_id.to_be_bytes());
        let digest = keccak256(&payload);

        let signature = self
            .signer
            .sign_message(digest.as_slice())
            .await
            .map_err(|e| upstream("sign mint receipt", e))?;

        let wban_balance = self.balance_of(recipient).await?;
        Ok(MintReceipt {
            receipt: format!("0x{}", hex::encode(signature.as_bytes())),
            uuid,
            wban_balance,
        })
    }

    async fn block_number(&self) -> Result<u64, BridgeError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| upstream("get_block_number", e))
    }

    async fn swap_to_ban_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SwapToBanEvent>, BridgeError> {
        let filter = Filter::new()
            .address(self.wban_address)
            .event_signature(Self::swap_to_ban_signature())
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| upstream("get_logs", e))?;

        let mut timestamps: HashMap<u64, i64> = HashMap::new();
        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let Some(block_number) = log.block_number else {
                continue;
            };
            let mut event = match self.parse_swap_log(&log) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(
                        tx_hash = ?log.transaction_hash,
                        error = %e,
                        "Failed to parse redemption log"
                    );
                    continue;
                }
            };
            if let Some(ts) = timestamps.get(&block_number) {
                event.timestamp_s = *ts;
            } else {
                let ts = self.block_timestamp(block_number).await?;
                timestamps.insert(block_number, ts);
                event.timestamp_s = ts;
            }
            events.push(event);
        }
        Ok(events)
    }
}
