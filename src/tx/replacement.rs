//! Error driven transaction replacement

use super::gas::GasEstimator;
use super::nonce::NonceSource;
use super::Transaction;
use crate::error::TransactorError;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Default gas increase for an underpriced replacement, in percent
pub const DEFAULT_GAS_BUMP_PERCENT: u64 = 15;

/// Produces the transaction to try after a failed send.
///
/// Returning `tx` itself means "resend unchanged". Anything else must be a new
/// value whose nonce and gas price are not lower than `tx`'s.
#[async_trait]
pub trait TxReplacementPolicy: Send + Sync {
    async fn get_new(&self, tx: &Transaction, err: &TransactorError) -> Transaction;
}

/// Refreshes the nonce on `NonceTooLow` and bumps gas on `ReplaceUnderpriced`
pub struct DefaultTxReplacementPolicy {
    nonces: Arc<dyn NonceSource>,
    gas_bump_percent: u64,
}

impl DefaultTxReplacementPolicy {
    pub fn new(nonces: Arc<dyn NonceSource>) -> Self {
        Self::with_gas_bump(nonces, DEFAULT_GAS_BUMP_PERCENT)
    }

    pub fn with_gas_bump(nonces: Arc<dyn NonceSource>, gas_bump_percent: u64) -> Self {
        Self {
            nonces,
            gas_bump_percent,
        }
    }

    async fn refreshed_nonce(&self, stale: u64) -> u64 {
        match self.nonces.refresh(stale).await {
            Ok(nonce) if nonce > stale => nonce,
            Ok(nonce) => {
                warn!(
                    "Nonce source returned {} for stale nonce {}, using next nonce",
                    nonce, stale
                );
                stale + 1
            }
            Err(e) => {
                warn!("Failed to refresh nonce {}, using next nonce: {}", stale, e);
                stale + 1
            }
        }
    }
}

#[async_trait]
impl TxReplacementPolicy for DefaultTxReplacementPolicy {
    async fn get_new(&self, tx: &Transaction, err: &TransactorError) -> Transaction {
        match err {
            TransactorError::NonceTooLow(_) => {
                let nonce = self.refreshed_nonce(tx.nonce()).await;
                tx.with_nonce(nonce)
            }
            TransactorError::ReplaceUnderpriced(_) => {
                let gas_price =
                    GasEstimator::bump_gas_price(&tx.gas_price(), self.gas_bump_percent);
                tx.with_gas_price(gas_price)
            }
            _ => tx.clone(),
        }
    }
}
