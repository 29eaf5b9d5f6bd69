//! Transaction dispatch: building, sending, retrying and replacing transactions

mod factory;
mod gas;
mod nonce;
mod registry;
mod replacement;
pub mod retry;
mod sender;
mod types;

pub use factory::{Factory, SignerFactory};
pub use gas::GasEstimator;
pub use nonce::{NonceManager, NonceSource};
pub use registry::{InFlightGuard, InFlightRegistry};
pub use replacement::{DefaultTxReplacementPolicy, TxReplacementPolicy, DEFAULT_GAS_BUMP_PERCENT};
pub use retry::{ExpoRetryPolicy, NoRetryPolicy, RetryPolicy};
pub use sender::Sender;
pub use types::{Transaction, TxRequest, TxRequests};
