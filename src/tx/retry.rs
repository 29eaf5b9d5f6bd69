//! Retry policies deciding whether, and when, a failed send is attempted again

use super::Transaction;
use crate::config::{RetryPolicyKind, TransactorConfig};
use crate::error::TransactorError;

use dashmap::DashMap;
use ethers::types::H256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Decides whether a send is retried and how long to back off first.
///
/// Shared by every in-flight send, so implementations must tolerate
/// concurrent calls.
pub trait RetryPolicy: Send + Sync {
    /// `err` is `None` when the chain accepted `tx`
    fn get(&self, tx: &Transaction, err: Option<&TransactorError>) -> (bool, Duration);

    /// `old_hash` was replaced by `new_hash`; both belong to one logical send
    fn update_tx_modified(&self, old_hash: H256, new_hash: H256);

    /// Drop any state for `hash` once its send has ended. Called at least
    /// once per send, so unknown hashes must be ignored.
    fn forget(&self, _hash: H256) {}
}

/// Build the retry policy selected in the configuration
pub fn from_config(config: &TransactorConfig) -> Arc<dyn RetryPolicy> {
    match config.retry_policy {
        RetryPolicyKind::Exponential => Arc::new(ExpoRetryPolicy::new(
            config.base_backoff(),
            config.max_backoff(),
            config.max_retries,
        )),
        RetryPolicyKind::None => Arc::new(NoRetryPolicy),
    }
}

/// Never retries
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn get(&self, _tx: &Transaction, _err: Option<&TransactorError>) -> (bool, Duration) {
        (false, Duration::ZERO)
    }

    fn update_tx_modified(&self, _old_hash: H256, _new_hash: H256) {}
}

type LineageId = u64;

#[derive(Debug, Default)]
struct Lineage {
    retries: u32,
}

/// Exponential backoff per lineage.
///
/// A lineage is every hash one logical send has gone through. Hashes are
/// mapped to a stable lineage id so that replacing a transaction keeps
/// escalating the backoff instead of starting over.
pub struct ExpoRetryPolicy {
    base_backoff: Duration,
    max_backoff: Duration,
    max_retries: u32,
    next_lineage: AtomicU64,
    lineage_by_hash: DashMap<H256, LineageId>,
    lineages: DashMap<LineageId, Lineage>,
}

impl ExpoRetryPolicy {
    pub fn new(base_backoff: Duration, max_backoff: Duration, max_retries: u32) -> Self {
        Self {
            base_backoff,
            max_backoff,
            max_retries,
            next_lineage: AtomicU64::new(0),
            lineage_by_hash: DashMap::new(),
            lineages: DashMap::new(),
        }
    }

    /// Backoff before the `retry`-th retry (1-based)
    fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    fn lineage_of(&self, hash: H256) -> LineageId {
        *self
            .lineage_by_hash
            .entry(hash)
            .or_insert_with(|| self.next_lineage.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of lineages currently tracked
    pub fn tracked(&self) -> usize {
        self.lineages.len()
    }
}

impl Default for ExpoRetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(16), 5)
    }
}

impl RetryPolicy for ExpoRetryPolicy {
    fn get(&self, tx: &Transaction, err: Option<&TransactorError>) -> (bool, Duration) {
        let hash = tx.hash();
        let err = match err {
            Some(err) if err.is_retryable() => err,
            _ => {
                self.forget(hash);
                return (false, Duration::ZERO);
            }
        };

        let lineage = self.lineage_of(hash);
        let retries = {
            let mut state = self.lineages.entry(lineage).or_default();
            state.retries += 1;
            state.retries
        };

        if retries > self.max_retries {
            warn!(
                "Giving up on tx {:?} after {} retries: {}",
                hash, self.max_retries, err
            );
            self.forget(hash);
            return (false, Duration::ZERO);
        }

        let backoff = self.backoff_for(retries);
        debug!(
            "Retry {}/{} for tx {:?} in {:?}",
            retries, self.max_retries, hash, backoff
        );
        (true, backoff)
    }

    fn update_tx_modified(&self, old_hash: H256, new_hash: H256) {
        if let Some((_, lineage)) = self.lineage_by_hash.remove(&old_hash) {
            self.lineage_by_hash.insert(new_hash, lineage);
        }
    }

    fn forget(&self, hash: H256) {
        if let Some((_, lineage)) = self.lineage_by_hash.remove(&hash) {
            self.lineages.remove(&lineage);
        }
    }
}
