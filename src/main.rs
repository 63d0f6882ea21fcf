use std::sync::Arc;
use std::time::Duration;

use wban_bridge::claims::ClaimManager;
use wban_bridge::clients::{BanRpcClient, Blacklist, HttpBlacklist, NoBlacklist, WbanEvmClient};
use wban_bridge::config::Config;
use wban_bridge::deposits::DepositService;
use wban_bridge::ledger::LedgerStore;
use wban_bridge::processors::Processors;
use wban_bridge::queue::{OperationQueue, QueueWorker};
use wban_bridge::scanner::ChainScanner;
use wban_bridge::store::{KvStore, RedisStore};
use wban_bridge::{api, metrics};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    // Run the async main
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting wBAN Bridge");

    let config = Config::load()?;
    tracing::info!(
        chain_id = config.blockchain.chain_id,
        hot_wallet = %config.ban.hot_wallet,
        "Configuration loaded"
    );

    // Connect to the key-value store
    let store: Arc<dyn KvStore> = Arc::new(RedisStore::connect(&config.redis.url).await?);
    tracing::info!("Key-value store connected");

    let ledger = Arc::new(LedgerStore::new(
        store.clone(),
        config.blockchain.start_block,
        config.blockchain.explorer_url.clone(),
    ));
    let queue = Arc::new(OperationQueue::new(store.clone()));

    // Chain collaborators
    let ban_client = Arc::new(BanRpcClient::new(
        &config.ban.rpc_url,
        &config.ban.wallet_id,
        &config.ban.hot_wallet,
    ));
    let evm_client = Arc::new(WbanEvmClient::new(
        &config.blockchain.rpc_url,
        &config.blockchain.private_key,
        &config.blockchain.wban_address,
        config.blockchain.chain_id,
    )?);
    let blacklist: Arc<dyn Blacklist> = match config.blacklist_url.as_deref() {
        Some(url) => Arc::new(HttpBlacklist::new(url)),
        None => {
            tracing::warn!("No blacklist configured, claim blacklist checks disabled");
            Arc::new(NoBlacklist)
        }
    };

    let claims = Arc::new(ClaimManager::new(
        ledger.clone(),
        evm_client.clone(),
        blacklist,
    ));

    let processors = Arc::new(Processors::new(
        ledger.clone(),
        queue.clone(),
        ban_client.clone(),
        evm_client.clone(),
        &config.ban.hot_wallet,
        Duration::from_secs(config.bridge.pending_withdrawal_delay_s),
    ));

    let worker = QueueWorker::new(
        queue.clone(),
        processors,
        Duration::from_millis(config.bridge.queue_poll_interval_ms),
    );
    let scanner = ChainScanner::new(
        evm_client,
        ledger.clone(),
        queue.clone(),
        config.blockchain.safety_depth,
        Duration::from_millis(config.bridge.scan_interval_ms),
    );
    let deposit_service = DepositService::new(ledger.clone(), claims);
    let deposit_events = ban_client.spawn_deposit_poller(Duration::from_millis(
        config.bridge.deposit_poll_interval_ms,
    ));

    // Create shutdown channels
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    let (shutdown_tx2, shutdown_rx2) = tokio::sync::mpsc::channel::<()>(1);
    let (shutdown_tx3, shutdown_rx3) = tokio::sync::mpsc::channel::<()>(1);

    // Setup signal handlers
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
        let _ = shutdown_tx2.send(()).await;
        let _ = shutdown_tx3.send(()).await;
    });

    // Start metrics/API server
    let api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.bridge.api_port));
    let api_ledger = ledger.clone();
    let api_queue = queue.clone();
    tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_addr, api_ledger, api_queue).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    metrics::UP.set(1.0);
    tracing::info!("Services initialized, starting processing");

    // Run the queue worker, scanner and deposit service concurrently
    tokio::select! {
        result = worker.run(shutdown_rx) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Queue worker error");
            }
        }
        result = scanner.run(shutdown_rx2) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Chain scanner error");
            }
        }
        result = deposit_service.run(deposit_events, shutdown_rx3) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Deposit service error");
            }
        }
    }

    tracing::info!("wBAN Bridge stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wban_bridge=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
