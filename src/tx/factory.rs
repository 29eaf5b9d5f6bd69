//! Building and signing transactions from requests

use super::gas::GasEstimator;
use super::{Transaction, TxRequest, TxRequests};
use crate::chain::{ChainClient, GasPrice};
use crate::error::{TransactorError, TransactorResult};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, U256};
use ethers::utils::id;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Multicall3 entry point used to batch several requests into one transaction
const AGGREGATE3_VALUE: &str = "aggregate3Value((address,bool,uint256,bytes)[])";

/// Builds signed transactions
#[async_trait]
pub trait Factory: Send + Sync {
    /// Build and sign a transaction carrying `requests` at `nonce`.
    ///
    /// Gas settings present in `requests` are used as-is; missing ones are
    /// filled in from the chain.
    async fn build_transaction_from_requests(
        &self,
        cancel: &CancellationToken,
        nonce: u64,
        requests: TxRequests,
    ) -> TransactorResult<Transaction>;
}

/// Factory signing with a local private key
pub struct SignerFactory {
    /// Wallet for signing
    wallet: LocalWallet,
    chain: Arc<dyn ChainClient>,
    chain_id: u64,
    /// Multicall3 deployment, required for batches
    multicall: Option<Address>,
    gas_estimator: GasEstimator,
}

impl SignerFactory {
    pub fn new(wallet: LocalWallet, chain_id: u64, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            wallet: wallet.with_chain_id(chain_id),
            chain,
            chain_id,
            multicall: None,
            gas_estimator: GasEstimator::new(),
        }
    }

    /// Load the signing key from the environment variable `var`
    pub fn from_env(
        var: &str,
        chain_id: u64,
        chain: Arc<dyn ChainClient>,
    ) -> TransactorResult<Self> {
        let key = std::env::var(var).map_err(|_| {
            TransactorError::Wallet(format!("No wallet configured. Set {}", var))
        })?;
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| TransactorError::Wallet(format!("Invalid private key: {}", e)))?;

        Ok(Self::new(wallet, chain_id, chain))
    }

    pub fn with_multicall(mut self, multicall: Address) -> Self {
        self.multicall = Some(multicall);
        self
    }

    /// Address transactions are sent from
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Destination, value and calldata for a set of requests
    fn encode_calls(&self, calls: &[TxRequest]) -> TransactorResult<(Address, U256, Bytes)> {
        match calls {
            [] => Err(TransactorError::Build("no requests to send".to_string())),
            [single] => Ok((single.to, single.value, single.data.clone())),
            batch => {
                let multicall = self.multicall.ok_or_else(|| {
                    TransactorError::Build(format!(
                        "cannot batch {} requests without a multicall address",
                        batch.len()
                    ))
                })?;

                let mut value = U256::zero();
                let mut call_tokens = Vec::with_capacity(batch.len());
                for call in batch {
                    value = value.checked_add(call.value).ok_or_else(|| {
                        TransactorError::Build("batched value overflows".to_string())
                    })?;
                    call_tokens.push(Token::Tuple(vec![
                        Token::Address(call.to),
                        Token::Bool(false),
                        Token::Uint(call.value),
                        Token::Bytes(call.data.to_vec()),
                    ]));
                }

                let mut data = id(AGGREGATE3_VALUE).to_vec();
                data.extend(abi::encode(&[Token::Array(call_tokens)]));
                Ok((multicall, value, data.into()))
            }
        }
    }
}

#[async_trait]
impl Factory for SignerFactory {
    async fn build_transaction_from_requests(
        &self,
        cancel: &CancellationToken,
        nonce: u64,
        requests: TxRequests,
    ) -> TransactorResult<Transaction> {
        let (to, value, data) = self.encode_calls(&requests.calls)?;

        let gas_price = match requests.gas_price {
            Some(gas_price) => gas_price,
            None => {
                cancellable(cancel, self.gas_estimator.get_gas_price(self.chain.as_ref())).await?
            }
        };

        let mut tx: TypedTransaction = match gas_price {
            GasPrice::Legacy(price) => TransactionRequest::new()
                .from(self.address())
                .to(to)
                .value(value)
                .data(data)
                .nonce(nonce)
                .gas_price(price)
                .chain_id(self.chain_id)
                .into(),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => Eip1559TransactionRequest::new()
                .from(self.address())
                .to(to)
                .value(value)
                .data(data)
                .nonce(nonce)
                .max_fee_per_gas(max_fee_per_gas)
                .max_priority_fee_per_gas(max_priority_fee_per_gas)
                .chain_id(self.chain_id)
                .into(),
        };

        let gas_limit = match requests.gas_limit {
            Some(gas_limit) => gas_limit,
            None => {
                let estimate = cancellable(cancel, self.chain.estimate_gas(&tx)).await?;
                self.gas_estimator.buffer_gas_limit(estimate)
            }
        };
        tx.set_gas(gas_limit);

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| TransactorError::Wallet(e.to_string()))?;

        let built = Transaction::signed(tx, signature, requests.calls);
        debug!(
            "Built tx {:?} with nonce {} and {} request(s)",
            built.hash(),
            nonce,
            built.requests().len()
        );
        Ok(built)
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = TransactorResult<T>>,
) -> TransactorResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransactorError::Cancelled),
        result = fut => result,
    }
}
