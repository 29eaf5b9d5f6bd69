//! Gas buffering and replacement bumps

use crate::chain::{ChainClient, GasPrice};
use crate::error::TransactorResult;

use ethers::types::U256;
use tracing::debug;

/// Gas estimator for transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            gas_price_buffer_percent: 10,
        }
    }

    /// Pad an estimated gas limit
    pub fn buffer_gas_limit(&self, estimate: U256) -> U256 {
        estimate + estimate * self.gas_limit_buffer_percent / 100
    }

    /// Get a buffered gas price from the chain
    pub async fn get_gas_price(&self, chain: &dyn ChainClient) -> TransactorResult<GasPrice> {
        let gas_price = chain.gas_price().await?;

        let buffered = match gas_price {
            GasPrice::Legacy(price) => {
                let buffer = price * self.gas_price_buffer_percent / 100;
                GasPrice::Legacy(price + buffer)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let fee_buffer = max_fee_per_gas * self.gas_price_buffer_percent / 100;
                let priority_buffer =
                    max_priority_fee_per_gas * self.gas_price_buffer_percent / 100;
                GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee_per_gas + fee_buffer,
                    max_priority_fee_per_gas: max_priority_fee_per_gas + priority_buffer,
                }
            }
        };

        debug!("Buffered gas price: {:?}", buffered);
        Ok(buffered)
    }

    /// Raise a gas price by `percent` for a replacement.
    ///
    /// Every component strictly increases, even when the percentage rounds to
    /// zero on tiny values.
    pub fn bump_gas_price(current: &GasPrice, percent: u64) -> GasPrice {
        let bump = |value: U256| {
            let bumped = value * (100 + percent) / 100;
            std::cmp::max(bumped, value + 1)
        };

        match current {
            GasPrice::Legacy(price) => GasPrice::Legacy(bump(*price)),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => GasPrice::Eip1559 {
                max_fee_per_gas: bump(*max_fee_per_gas),
                max_priority_fee_per_gas: bump(*max_priority_fee_per_gas),
            },
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}
