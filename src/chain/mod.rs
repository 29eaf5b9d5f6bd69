//! Chain module - the broadcast side of the transactor
//!
//! This module provides:
//! - The `ChainClient` seam the sender and policies talk to
//! - An `ethers` backed implementation with multi-RPC failover

pub mod provider;

pub use provider::{EthClient, GasPrice};

use crate::error::TransactorResult;
use crate::tx::Transaction;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, U256};
use tokio_util::sync::CancellationToken;

/// Network access needed to dispatch transactions
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Broadcast a signed transaction.
    ///
    /// Errors are classified so the retry and replacement policies can act on
    /// them. Implementations should return `Cancelled` once `cancel` fires.
    async fn send_transaction(
        &self,
        cancel: &CancellationToken,
        tx: &Transaction,
    ) -> TransactorResult<()>;

    /// Transaction count of `address` at the pending block
    async fn pending_nonce(&self, address: Address) -> TransactorResult<u64>;

    /// Current gas price suggestion
    async fn gas_price(&self) -> TransactorResult<GasPrice>;

    /// Estimate the gas limit of an unsigned transaction
    async fn estimate_gas(&self, tx: &TypedTransaction) -> TransactorResult<U256>;
}
