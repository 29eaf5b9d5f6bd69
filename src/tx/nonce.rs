//! Nonce management for reliable transaction submission
//!
//! Handles:
//! - Local nonce tracking to avoid conflicts between concurrent sends
//! - Resync with the chain when a send is rejected as nonce too low
//! - Returning unused nonces after a failed send

use crate::chain::ChainClient;
use crate::error::TransactorResult;

use async_trait::async_trait;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Hands out nonces for a single signing account
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Allocate the next unused nonce
    async fn next_nonce(&self) -> TransactorResult<u64>;

    /// Allocate a nonce strictly greater than `stale` after the chain rejected it
    async fn refresh(&self, stale: u64) -> TransactorResult<u64>;

    /// Give back a nonce whose send failed
    async fn release(&self, nonce: u64);
}

/// Local nonce state
#[derive(Debug, Default)]
struct NonceState {
    /// Current local nonce (next to use)
    current: u64,
    /// Whether `current` has been seeded from the chain
    synced: bool,
}

/// Tracks nonces for one account against a chain
pub struct NonceManager {
    /// Wallet address
    address: Address,
    /// Chain used to read the pending nonce
    chain: Arc<dyn ChainClient>,
    state: Mutex<NonceState>,
}

impl NonceManager {
    /// Create a new nonce manager
    pub fn new(address: Address, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            address,
            chain,
            state: Mutex::new(NonceState::default()),
        }
    }

    /// Seed the local nonce from the chain
    pub async fn init(&self) -> TransactorResult<()> {
        let on_chain = self.chain.pending_nonce(self.address).await?;
        let mut state = self.state.lock().await;
        state.current = state.current.max(on_chain);
        state.synced = true;

        debug!("Initialized nonce for {:?}: {}", self.address, state.current);
        Ok(())
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl NonceSource for NonceManager {
    async fn next_nonce(&self) -> TransactorResult<u64> {
        let mut state = self.state.lock().await;
        if !state.synced {
            state.current = self.chain.pending_nonce(self.address).await?;
            state.synced = true;
        }

        let nonce = state.current;
        state.current += 1;

        debug!("Allocated nonce {} for {:?}", nonce, self.address);
        Ok(nonce)
    }

    async fn refresh(&self, stale: u64) -> TransactorResult<u64> {
        let mut state = self.state.lock().await;

        match self.chain.pending_nonce(self.address).await {
            Ok(on_chain) => {
                if on_chain > state.current {
                    warn!(
                        "Nonce gap detected for {:?}: local {}, chain {}",
                        self.address, state.current, on_chain
                    );
                    state.current = on_chain;
                }
                state.synced = true;
            }
            Err(e) => {
                warn!(
                    "Failed to resync nonce for {:?}, using local state: {}",
                    self.address, e
                );
            }
        }

        if state.current <= stale {
            state.current = stale + 1;
        }

        let nonce = state.current;
        state.current += 1;

        debug!("Refreshed nonce {} -> {} for {:?}", stale, nonce, self.address);
        Ok(nonce)
    }

    async fn release(&self, nonce: u64) {
        let mut state = self.state.lock().await;

        // Only the most recent allocation can be handed out again
        if nonce + 1 == state.current {
            state.current = nonce;
            debug!("Released nonce {} for {:?}", nonce, self.address);
        }
    }
}
