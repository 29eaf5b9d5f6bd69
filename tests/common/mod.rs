//! Shared test doubles for the sender tests
#![allow(dead_code)]

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, H256, U256};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use transactor::tx::{
    DefaultTxReplacementPolicy, Factory, InFlightRegistry, NonceManager, RetryPolicy, Sender,
    SignerFactory, Transaction, TxReplacementPolicy, TxRequest, TxRequests,
};
use transactor::{ChainClient, GasPrice, TransactorError, TransactorResult};

/// First development account of anvil/hardhat
pub const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const CHAIN_ID: u64 = 31337;

/// Chain that answers broadcasts from a script and records what it was sent
pub struct ScriptedChain {
    responses: Mutex<VecDeque<TransactorResult<()>>>,
    fallback: TransactorResult<()>,
    pending_nonce: Mutex<u64>,
    sent: Mutex<Vec<Transaction>>,
    watched: Mutex<Option<(Arc<InFlightRegistry>, Vec<String>)>>,
    observed: Mutex<Vec<Vec<bool>>>,
    gate: Option<Arc<Semaphore>>,
    /// One permit per broadcast received
    entered: Semaphore,
}

impl ScriptedChain {
    pub fn new(responses: Vec<TransactorResult<()>>, fallback: TransactorResult<()>) -> Arc<Self> {
        Arc::new(Self::build(responses, fallback, None))
    }

    /// Broadcasts block until a permit is added to `gate`
    pub fn gated(
        responses: Vec<TransactorResult<()>>,
        fallback: TransactorResult<()>,
        gate: Arc<Semaphore>,
    ) -> Arc<Self> {
        Arc::new(Self::build(responses, fallback, Some(gate)))
    }

    fn build(
        responses: Vec<TransactorResult<()>>,
        fallback: TransactorResult<()>,
        gate: Option<Arc<Semaphore>>,
    ) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback,
            pending_nonce: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
            watched: Mutex::new(None),
            observed: Mutex::new(Vec::new()),
            gate,
            entered: Semaphore::new(0),
        }
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        *self.pending_nonce.lock().unwrap() = nonce;
    }

    /// Record membership of `msg_ids` in `registry` at every broadcast
    pub fn watch(&self, registry: Arc<InFlightRegistry>, msg_ids: &[&str]) {
        let msg_ids = msg_ids.iter().map(|id| id.to_string()).collect();
        *self.watched.lock().unwrap() = Some((registry, msg_ids));
    }

    /// Wait until `n` more broadcasts have reached the chain
    pub async fn broadcasts(&self, n: u32) {
        self.entered.acquire_many(n).await.unwrap().forget();
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn observed(&self) -> Vec<Vec<bool>> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn send_transaction(
        &self,
        _cancel: &CancellationToken,
        tx: &Transaction,
    ) -> TransactorResult<()> {
        self.sent.lock().unwrap().push(tx.clone());
        if let Some((registry, msg_ids)) = self.watched.lock().unwrap().as_ref() {
            let seen = msg_ids.iter().map(|id| registry.contains(id)).collect();
            self.observed.lock().unwrap().push(seen);
        }

        self.entered.add_permits(1);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn pending_nonce(&self, _address: Address) -> TransactorResult<u64> {
        Ok(*self.pending_nonce.lock().unwrap())
    }

    async fn gas_price(&self) -> TransactorResult<GasPrice> {
        Ok(GasPrice::Legacy(U256::from(1_000_000_000u64)))
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> TransactorResult<U256> {
        Ok(U256::from(21_000))
    }
}

/// Retry policy replaying a fixed list of decisions for failed sends
pub struct ScriptedRetryPolicy {
    decisions: Mutex<VecDeque<(bool, Duration)>>,
    calls: Mutex<u32>,
    updates: Mutex<Vec<(H256, H256)>>,
}

impl ScriptedRetryPolicy {
    pub fn new(decisions: Vec<(bool, Duration)>) -> Arc<Self> {
        Arc::new(Self {
            decisions: Mutex::new(decisions.into()),
            calls: Mutex::new(0),
            updates: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    pub fn updates(&self) -> Vec<(H256, H256)> {
        self.updates.lock().unwrap().clone()
    }
}

impl RetryPolicy for ScriptedRetryPolicy {
    fn get(&self, _tx: &Transaction, err: Option<&TransactorError>) -> (bool, Duration) {
        if err.is_none() {
            return (false, Duration::ZERO);
        }
        *self.calls.lock().unwrap() += 1;
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((false, Duration::ZERO))
    }

    fn update_tx_modified(&self, old_hash: H256, new_hash: H256) {
        self.updates.lock().unwrap().push((old_hash, new_hash));
    }
}

/// Default replacement policy that counts how often it is asked
pub struct CountingReplacement {
    inner: DefaultTxReplacementPolicy,
    calls: Mutex<u32>,
}

impl CountingReplacement {
    pub fn new(inner: DefaultTxReplacementPolicy) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TxReplacementPolicy for CountingReplacement {
    async fn get_new(&self, tx: &Transaction, err: &TransactorError) -> Transaction {
        *self.calls.lock().unwrap() += 1;
        self.inner.get_new(tx, err).await
    }
}

/// Signer factory whose first `failures` builds fail
pub struct FlakyFactory {
    inner: SignerFactory,
    failures: Mutex<u32>,
}

impl FlakyFactory {
    pub fn new(inner: SignerFactory, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: Mutex::new(failures),
        })
    }
}

#[async_trait]
impl Factory for FlakyFactory {
    async fn build_transaction_from_requests(
        &self,
        cancel: &CancellationToken,
        nonce: u64,
        requests: TxRequests,
    ) -> TransactorResult<Transaction> {
        let fail = {
            let mut failures = self.failures.lock().unwrap();
            let fail = *failures > 0;
            *failures = failures.saturating_sub(1);
            fail
        };
        if fail {
            return Err(TransactorError::Wallet("signer unavailable".to_string()));
        }
        self.inner
            .build_transaction_from_requests(cancel, nonce, requests)
            .await
    }
}

pub fn signer_factory(chain: Arc<ScriptedChain>) -> SignerFactory {
    let wallet = DEV_KEY.parse::<LocalWallet>().unwrap();
    SignerFactory::new(wallet, CHAIN_ID, chain).with_multicall(Address::repeat_byte(0xca))
}

pub fn requests() -> TxRequests {
    TxRequests::new(vec![TxRequest::new(Address::repeat_byte(0x42))
        .value(1u64)
        .data(vec![0xde, 0xad, 0xbe, 0xef])])
}

pub fn batched_requests() -> TxRequests {
    TxRequests::new(vec![
        TxRequest::new(Address::repeat_byte(0x01)).data(vec![0x01]),
        TxRequest::new(Address::repeat_byte(0x02)).data(vec![0x02]),
    ])
}

/// Signed transaction ready for broadcast
pub async fn signed_tx(chain: Arc<ScriptedChain>, nonce: u64, requests: TxRequests) -> Transaction {
    signer_factory(chain)
        .build_transaction_from_requests(&CancellationToken::new(), nonce, requests)
        .await
        .unwrap()
}

/// Sender wired to `chain` with a real signer and nonce manager
pub fn sender(chain: Arc<ScriptedChain>) -> (Sender, Arc<NonceManager>) {
    let factory = signer_factory(chain.clone());
    let nonces = Arc::new(NonceManager::new(factory.address(), chain.clone()));
    (
        Sender::new(Arc::new(factory), chain, nonces.clone()),
        nonces,
    )
}

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}
