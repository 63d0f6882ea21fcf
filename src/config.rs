use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::path::Path;

/// Main configuration for the bridge
#[derive(Debug, Clone)]
pub struct Config {
    pub redis: RedisConfig,
    pub ban: BanConfig,
    pub blockchain: BlockchainConfig,
    pub bridge: BridgeConfig,
    /// Optional URL of the shared scam-address list. When unset, the
    /// blacklist check is disabled.
    pub blacklist_url: Option<String>,
}

/// Key-value store configuration
#[derive(Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Custom Debug that redacts the Redis URL (may contain credentials).
impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// BAN node configuration
#[derive(Clone)]
pub struct BanConfig {
    pub rpc_url: String,
    /// Node-side wallet id holding the hot wallet seed.
    pub wallet_id: String,
    /// Hot wallet address users deposit to and withdrawals are paid from.
    pub hot_wallet: String,
}

/// Custom Debug that redacts the wallet id to prevent accidental log leakage.
impl fmt::Debug for BanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BanConfig")
            .field("rpc_url", &self.rpc_url)
            .field("wallet_id", &"<redacted>")
            .field("hot_wallet", &self.hot_wallet)
            .finish()
    }
}

/// EVM chain configuration
#[derive(Clone)]
pub struct BlockchainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub wban_address: String,
    pub private_key: String,
    pub explorer_url: String,
    /// Blocks kept behind the head before events are trusted.
    pub safety_depth: u64,
    /// Checkpoint returned before the scanner ever persisted one.
    pub start_block: u64,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for BlockchainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockchainConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("wban_address", &self.wban_address)
            .field("private_key", &"<redacted>")
            .field("explorer_url", &self.explorer_url)
            .field("safety_depth", &self.safety_depth)
            .field("start_block", &self.start_block)
            .finish()
    }
}

/// Queue and polling configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub queue_poll_interval_ms: u64,
    pub scan_interval_ms: u64,
    pub deposit_poll_interval_ms: u64,
    pub pending_withdrawal_delay_s: u64,
    pub api_port: u16,
}

/// Default functions
fn default_safety_depth() -> u64 {
    12
}

fn default_queue_poll_interval() -> u64 {
    250
}

fn default_scan_interval() -> u64 {
    5000
}

fn default_deposit_poll_interval() -> u64 {
    5000
}

fn default_pending_withdrawal_delay() -> u64 {
    60
}

fn default_api_port() -> u16 {
    9090
}

fn optional_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let redis = RedisConfig {
            url: env::var("REDIS_URL")
                .map_err(|_| eyre!("REDIS_URL environment variable is required"))?,
        };

        let ban = BanConfig {
            rpc_url: env::var("BAN_RPC_URL")
                .map_err(|_| eyre!("BAN_RPC_URL environment variable is required"))?,
            wallet_id: env::var("BAN_WALLET_ID")
                .map_err(|_| eyre!("BAN_WALLET_ID environment variable is required"))?,
            hot_wallet: env::var("BAN_HOT_WALLET")
                .map_err(|_| eyre!("BAN_HOT_WALLET environment variable is required"))?,
        };

        let blockchain = BlockchainConfig {
            rpc_url: env::var("BLOCKCHAIN_RPC_URL")
                .map_err(|_| eyre!("BLOCKCHAIN_RPC_URL environment variable is required"))?,
            chain_id: env::var("BLOCKCHAIN_CHAIN_ID")
                .map_err(|_| eyre!("BLOCKCHAIN_CHAIN_ID environment variable is required"))?
                .parse()
                .wrap_err("BLOCKCHAIN_CHAIN_ID must be a valid u64")?,
            wban_address: env::var("WBAN_CONTRACT_ADDRESS")
                .map_err(|_| eyre!("WBAN_CONTRACT_ADDRESS environment variable is required"))?,
            private_key: env::var("BLOCKCHAIN_PRIVATE_KEY")
                .map_err(|_| eyre!("BLOCKCHAIN_PRIVATE_KEY environment variable is required"))?,
            explorer_url: env::var("BLOCKCHAIN_EXPLORER_URL")
                .map_err(|_| eyre!("BLOCKCHAIN_EXPLORER_URL environment variable is required"))?,
            safety_depth: optional_parse("SAFETY_DEPTH", default_safety_depth()),
            start_block: optional_parse("START_BLOCK", 0),
        };

        let bridge = BridgeConfig {
            queue_poll_interval_ms: optional_parse(
                "QUEUE_POLL_INTERVAL_MS",
                default_queue_poll_interval(),
            ),
            scan_interval_ms: optional_parse("SCAN_INTERVAL_MS", default_scan_interval()),
            deposit_poll_interval_ms: optional_parse(
                "DEPOSIT_POLL_INTERVAL_MS",
                default_deposit_poll_interval(),
            ),
            pending_withdrawal_delay_s: optional_parse(
                "PENDING_WITHDRAWAL_DELAY_S",
                default_pending_withdrawal_delay(),
            ),
            api_port: optional_parse("API_PORT", default_api_port()),
        };

        let config = Config {
            redis,
            ban,
            blockchain,
            bridge,
            blacklist_url: env::var("BLACKLIST_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.redis.url.is_empty() {
            return Err(eyre!("redis.url cannot be empty"));
        }

        if self.ban.rpc_url.is_empty() {
            return Err(eyre!("ban.rpc_url cannot be empty"));
        }

        if !self.ban.hot_wallet.to_lowercase().starts_with("ban_") {
            return Err(eyre!("ban.hot_wallet must be a BAN address (ban_ prefix)"));
        }

        if self.blockchain.rpc_url.is_empty() {
            return Err(eyre!("blockchain.rpc_url cannot be empty"));
        }

        if self.blockchain.wban_address.len() != 42
            || !self.blockchain.wban_address.starts_with("0x")
        {
            return Err(eyre!(
                "blockchain.wban_address must be a valid hex address (42 chars with 0x prefix)"
            ));
        }

        if self.blockchain.private_key.len() != 66
            || !self.blockchain.private_key.starts_with("0x")
        {
            return Err(eyre!(
                "blockchain.private_key must be 66 chars (0x + 64 hex chars)"
            ));
        }

        if self.blockchain.explorer_url.is_empty() {
            return Err(eyre!("blockchain.explorer_url cannot be empty"));
        }

        Ok(())
    }
}
