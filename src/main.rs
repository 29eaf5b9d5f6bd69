//! Transactor service - hosts a sender and its status API
//!
//! This binary only wires a `Sender` to its chain, status API and metrics from
//! configuration; it does not originate sends itself. Services that produce
//! transactions embed the library, share one `Arc<Sender>` between their send
//! path and `api::router`, and the status endpoints then report their sends.

use anyhow::{Context, Result};
use ethers::types::Address;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use transactor::config::Settings;
use transactor::metrics::MetricsServer;
use transactor::tx::{self, DefaultTxReplacementPolicy, NonceManager, Sender, SignerFactory};
use transactor::{api, ChainClient, EthClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting transactor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!("Loaded configuration for chain {}", settings.chain.chain_id);

    let chain = Arc::new(EthClient::new(
        settings.chain.clone(),
        settings.transactor.send_timeout(),
    )?);
    if !chain.health_check().await {
        warn!("Chain {} is not reachable yet", chain.chain_id());
    }
    let chain_client: Arc<dyn ChainClient> = chain.clone();

    let mut factory = SignerFactory::from_env(
        &settings.wallet.private_key_env,
        settings.chain.chain_id,
        chain_client.clone(),
    )?;
    if let Some(multicall) = &settings.chain.multicall_address {
        let multicall: Address = multicall
            .parse()
            .with_context(|| format!("Invalid multicall address: {}", multicall))?;
        factory = factory.with_multicall(multicall);
    }
    info!("Signing as {:?}", factory.address());

    let nonces = Arc::new(NonceManager::new(factory.address(), chain_client.clone()));
    if let Err(e) = nonces.init().await {
        warn!("Failed to seed nonce, will retry on first send: {}", e);
    }

    let sender = Arc::new(
        Sender::new(Arc::new(factory), chain_client, nonces.clone())
            .with_retry_policy(tx::retry::from_config(&settings.transactor))
            .with_replacement_policy(Arc::new(DefaultTxReplacementPolicy::with_gas_bump(
                nonces,
                settings.transactor.gas_bump_percent,
            ))),
    );

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let sender = sender.clone();
        async move {
            if let Err(e) = api::run_server(config, sender).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Transactor is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Transactor stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,transactor=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
