//! External collaborators: the BAN node, the EVM chain and the wallet
//! blacklist. The core only speaks to their traits; the concrete clients
//! live next to them.

pub mod ban;
pub mod blacklist;
pub mod evm;

pub use ban::{BanNode, BanRpcClient, DepositEvent};
pub use blacklist::{Blacklist, HttpBlacklist, NoBlacklist};
pub use evm::{EvmClient, MintReceipt, SwapToBanEvent, WbanEvmClient};
