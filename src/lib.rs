//! Transactor - send, retry and replace signed transactions
//!
//! A `Sender` broadcasts a transaction and, when the chain rejects it for a
//! recoverable reason, asks its retry policy whether to try again and its
//! replacement policy what to try next (same tx, higher gas or fresh nonce).
//! Message ids riding on a send are visible through `Sender::is_sending` for
//! the duration of the call.

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tx;

pub use chain::{ChainClient, EthClient, GasPrice};
pub use error::{TransactorError, TransactorResult};
pub use tx::{
    DefaultTxReplacementPolicy, ExpoRetryPolicy, Factory, InFlightRegistry, NoRetryPolicy,
    NonceManager, NonceSource, RetryPolicy, Sender, SignerFactory, Transaction,
    TxReplacementPolicy, TxRequest, TxRequests,
};
