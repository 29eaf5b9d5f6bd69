//! Transaction sender with policy driven retry and replacement

use super::factory::Factory;
use super::nonce::NonceSource;
use super::registry::InFlightRegistry;
use super::replacement::{DefaultTxReplacementPolicy, TxReplacementPolicy};
use super::retry::{ExpoRetryPolicy, RetryPolicy};
use super::{Transaction, TxRequests};
use crate::chain::ChainClient;
use crate::error::{TransactorError, TransactorResult};
use crate::metrics;

use ethers::types::H256;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sends transactions, retrying and replacing them until the chain accepts
/// them or the retry policy gives up.
pub struct Sender {
    /// Factory to sign replacement transactions
    factory: Arc<dyn Factory>,
    /// Chain the transactions are broadcast to
    chain: Arc<dyn ChainClient>,
    /// Nonces for fresh sends
    nonces: Arc<dyn NonceSource>,
    /// Policy to replace transactions
    tx_replacement_policy: Arc<dyn TxReplacementPolicy>,
    /// Policy to retry transactions
    retry_policy: Arc<dyn RetryPolicy>,
    /// Messages that are currently sending (or retrying)
    sending: Arc<InFlightRegistry>,
}

impl Sender {
    /// Create a sender with the default replacement and exponential retry policies
    pub fn new(
        factory: Arc<dyn Factory>,
        chain: Arc<dyn ChainClient>,
        nonces: Arc<dyn NonceSource>,
    ) -> Self {
        Self {
            factory,
            chain,
            tx_replacement_policy: Arc::new(DefaultTxReplacementPolicy::new(nonces.clone())),
            nonces,
            retry_policy: Arc::new(ExpoRetryPolicy::default()),
            sending: Arc::new(InFlightRegistry::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_replacement_policy(
        mut self,
        tx_replacement_policy: Arc<dyn TxReplacementPolicy>,
    ) -> Self {
        self.tx_replacement_policy = tx_replacement_policy;
        self
    }

    /// Share an in-flight registry, e.g. between senders of different chains
    pub fn with_registry(mut self, sending: Arc<InFlightRegistry>) -> Self {
        self.sending = sending;
        self
    }

    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.sending
    }

    /// Whether some in-progress send currently carries `msg_id`
    pub fn is_sending(&self, msg_id: &str) -> bool {
        self.sending.contains(msg_id)
    }

    /// Send `tx` on behalf of `msg_ids`, retrying per the configured policies.
    ///
    /// Every id is reported by `is_sending` for exactly the duration of this
    /// call. Returns the error that ended the send, or `Ok` once the chain
    /// accepted some transaction of the lineage.
    pub async fn send_transaction(
        &self,
        cancel: &CancellationToken,
        tx: Transaction,
        msg_ids: &[String],
    ) -> TransactorResult<()> {
        let _in_flight = self.sending.track(msg_ids);

        let result = self.retry_tx_with_policy(cancel, tx).await;
        match &result {
            Ok(()) => {
                info!("Transaction sent for {} message(s): {:?}", msg_ids.len(), msg_ids);
                metrics::record_tx_sent();
            }
            Err(e) => {
                if e.should_alert() {
                    error!("Failed to send transaction for {:?}: {}", msg_ids, e);
                } else {
                    warn!("Failed to send transaction for {:?}: {}", msg_ids, e);
                }
                metrics::record_tx_failed(e.kind());
            }
        }

        result
    }

    /// Build a transaction from `requests` at the next nonce and send it.
    ///
    /// The nonce is handed back to the nonce source only if the build fails.
    /// Once broadcast, a transaction at that nonce may sit in a pool even when
    /// the send reports an error, so the nonce stays spent.
    pub async fn send_requests(
        &self,
        cancel: &CancellationToken,
        requests: TxRequests,
        msg_ids: &[String],
    ) -> TransactorResult<()> {
        let nonce = self.nonces.next_nonce().await?;

        let tx = match self
            .factory
            .build_transaction_from_requests(cancel, nonce, requests)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                self.nonces.release(nonce).await;
                return Err(e);
            }
        };

        self.send_transaction(cancel, tx, msg_ids).await
    }

    /// (Re)try sending `tx` according to the retry policy, replacing it when
    /// the chain rejects it for a nonce or gas price reason.
    async fn retry_tx_with_policy(
        &self,
        cancel: &CancellationToken,
        mut tx: Transaction,
    ) -> TransactorResult<()> {
        let mut lineage = LineageGuard {
            retry_policy: self.retry_policy.as_ref(),
            hash: tx.hash(),
        };

        loop {
            let outcome = match self.chain.send_transaction(cancel, &tx).await {
                // An earlier attempt reached the pool after all
                Err(e) if e.is_already_known() => {
                    debug!("Tx {:?} already known to the chain: {}", tx.hash(), e);
                    Ok(())
                }
                outcome => outcome,
            };
            metrics::record_send_attempt();

            let (retry, backoff) = self.retry_policy.get(&tx, outcome.as_ref().err());
            let err = match outcome {
                Err(err) if retry => err,
                outcome => return outcome,
            };

            let stale_hash = tx.hash();
            warn!(
                "Failed to send tx {:?}, retrying in {:?}: {}",
                stale_hash, backoff, err
            );
            metrics::record_retry(err.kind(), backoff);

            if !backoff.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TransactorError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            let replacement = self.tx_replacement_policy.get_new(&tx, &err).await;
            if replacement.hash() == stale_hash {
                continue;
            }

            // Replacements come back unsigned; keep the last good tx if signing fails
            match self
                .factory
                .build_transaction_from_requests(
                    cancel,
                    replacement.nonce(),
                    TxRequests::from_tx(&replacement),
                )
                .await
            {
                Ok(rebuilt) => {
                    debug!(
                        "Retrying tx {:?} as {:?}: gas {:?} -> {:?}, nonce {} -> {}",
                        stale_hash,
                        rebuilt.hash(),
                        tx.gas_price(),
                        rebuilt.gas_price(),
                        tx.nonce(),
                        rebuilt.nonce()
                    );
                    if rebuilt.hash() != stale_hash {
                        self.retry_policy.update_tx_modified(stale_hash, rebuilt.hash());
                        metrics::record_replacement(err.kind());
                    }
                    tx = rebuilt;
                    lineage.hash = tx.hash();
                }
                Err(e) => {
                    error!("Failed to sign replacement for tx {:?}: {}", stale_hash, e);
                }
            }
        }
    }
}

/// Drops the retry policy's state for the current hash however the send ends,
/// including when the send future itself is dropped.
struct LineageGuard<'a> {
    retry_policy: &'a dyn RetryPolicy,
    hash: H256,
}

impl Drop for LineageGuard<'_> {
    fn drop(&mut self) {
        self.retry_policy.forget(self.hash);
    }
}
