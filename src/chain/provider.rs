//! Chain provider with multi-RPC support and automatic failover

use super::ChainClient;
use crate::config::{ChainConfig, GasPriceStrategy};
use crate::error::{TransactorError, TransactorResult};
use crate::tx::Transaction;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct EthClient {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Upper bound on a single broadcast
    send_timeout: Duration,
}

impl EthClient {
    /// Create a new chain client
    pub fn new(config: ChainConfig, send_timeout: Duration) -> TransactorResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(TransactorError::Config(format!(
                "No valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            send_timeout,
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        if self.http_providers.len() < 2 {
            return;
        }
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> TransactorResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(TransactorError::Transport(format!(
            "All providers failed for chain {}",
            self.config.chain_id
        )))
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Estimate EIP-1559 fees
    async fn estimate_eip1559_fees(&self) -> TransactorResult<(U256, U256)> {
        let block = self
            .http()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| TransactorError::GasEstimation(e.to_string()))?
            .ok_or_else(|| TransactorError::GasEstimation("No latest block".to_string()))?;

        let base_fee = block
            .base_fee_per_gas
            .ok_or_else(|| TransactorError::GasEstimation("No base fee in block".to_string()))?;

        Ok(eip1559_fees(base_fee, self.config.max_gas_price_gwei))
    }

    /// Classify a provider error, failing over when the node itself is unreachable
    fn classify(&self, err: ProviderError) -> TransactorError {
        let classified = TransactorError::from_rpc_message(&err.to_string());
        if matches!(classified, TransactorError::Transport(_)) {
            self.failover();
        }
        classified
    }
}

#[async_trait]
impl ChainClient for EthClient {
    async fn send_transaction(
        &self,
        cancel: &CancellationToken,
        tx: &Transaction,
    ) -> TransactorResult<()> {
        let raw = tx.raw().ok_or_else(|| {
            TransactorError::InvalidSignature(format!("transaction {:?} is not signed", tx.hash()))
        })?;

        let send = async {
            match timeout(self.send_timeout, self.http().send_raw_transaction(raw)).await {
                Ok(Ok(pending)) => {
                    debug!(
                        "Transaction {:?} accepted by chain {}",
                        pending.tx_hash(),
                        self.config.chain_id
                    );
                    Ok(())
                }
                Ok(Err(e)) => match self.classify(e) {
                    TransactorError::AlreadyKnown(msg) => {
                        debug!(
                            "Transaction {:?} already in the pool of chain {}: {}",
                            tx.hash(),
                            self.config.chain_id,
                            msg
                        );
                        Ok(())
                    }
                    err => Err(err),
                },
                Err(_) => {
                    self.failover();
                    Err(TransactorError::Timeout {
                        operation: "send transaction".to_string(),
                    })
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransactorError::Cancelled),
            result = send => result,
        }
    }

    async fn pending_nonce(&self, address: Address) -> TransactorResult<u64> {
        let nonce = self
            .http()
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| {
                TransactorError::Nonce(format!("chain {}: {}", self.config.chain_id, e))
            })?;

        Ok(nonce.as_u64())
    }

    async fn gas_price(&self) -> TransactorResult<GasPrice> {
        match self.config.gas_price_strategy {
            GasPriceStrategy::Legacy => {
                let price = self
                    .http()
                    .get_gas_price()
                    .await
                    .map_err(|e| TransactorError::GasEstimation(e.to_string()))?;
                Ok(GasPrice::Legacy(price))
            }
            GasPriceStrategy::Eip1559 => {
                let (max_fee, priority_fee) = self.estimate_eip1559_fees().await?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                })
            }
        }
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> TransactorResult<U256> {
        self.http()
            .estimate_gas(tx, None)
            .await
            .map_err(|e| TransactorError::GasEstimation(e.to_string()))
    }
}

/// Max fee and tip for a block with `base_fee`, capped at `max_gas_price_gwei`
fn eip1559_fees(base_fee: U256, max_gas_price_gwei: u64) -> (U256, U256) {
    let priority_fee = U256::from(2_000_000_000u64); // 2 gwei

    // Max fee = 2 * base_fee + priority_fee (buffer for block variability)
    let max_fee = base_fee.saturating_mul(U256::from(2)).saturating_add(priority_fee);

    // Cap at configured max
    let max_wei = U256::from(max_gas_price_gwei) * U256::from(1_000_000_000u64);
    let max_fee = std::cmp::min(max_fee, max_wei);

    (max_fee, std::cmp::min(priority_fee, max_fee))
}

/// Gas price types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl GasPrice {
    /// Most the sender may pay per unit of gas
    pub fn max_fee(&self) -> U256 {
        match self {
            GasPrice::Legacy(price) => *price,
            GasPrice::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }
}
