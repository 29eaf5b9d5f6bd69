//! Error types for the transactor

use thiserror::Error;

/// Main error type for the transactor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Nonce too low: {0}")]
    NonceTooLow(String),

    #[error("Replacement transaction underpriced: {0}")]
    ReplaceUnderpriced(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Transaction already known: {0}")]
    AlreadyKnown(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Failed to build transaction: {0}")]
    Build(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Nonce error: {0}")]
    Nonce(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactorError {
    /// Classify an error message returned by a node for `eth_sendRawTransaction`.
    ///
    /// Nodes only report these conditions as free-form strings, so matching is
    /// done on the lowercase message. Unrecognised messages are treated as
    /// transport failures and therefore retried.
    pub fn from_rpc_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let message = message.to_string();

        if lower.contains("nonce too low") {
            TransactorError::NonceTooLow(message)
        } else if lower.contains("replacement transaction underpriced")
            || lower.contains("transaction underpriced")
        {
            TransactorError::ReplaceUnderpriced(message)
        } else if lower.contains("insufficient funds") {
            TransactorError::InsufficientFunds(message)
        } else if lower.contains("invalid sender") || lower.contains("invalid signature") {
            TransactorError::InvalidSignature(message)
        } else if lower.contains("already known")
            || lower.contains("already imported")
        {
            TransactorError::AlreadyKnown(message)
        } else if lower.contains("intrinsic gas too low")
            || lower.contains("exceeds block gas limit")
        {
            TransactorError::Rejected(message)
        } else {
            TransactorError::Transport(message)
        }
    }

    /// The node already holds this exact transaction, so the broadcast took effect
    pub fn is_already_known(&self) -> bool {
        matches!(self, TransactorError::AlreadyKnown(_))
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransactorError::NonceTooLow(_)
                | TransactorError::ReplaceUnderpriced(_)
                | TransactorError::Transport(_)
                | TransactorError::Timeout { .. }
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            TransactorError::InsufficientFunds(_)
                | TransactorError::InvalidSignature(_)
                | TransactorError::Wallet(_)
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TransactorError::Config(_) => "config",
            TransactorError::NonceTooLow(_) => "nonce_too_low",
            TransactorError::ReplaceUnderpriced(_) => "replace_underpriced",
            TransactorError::InsufficientFunds(_) => "insufficient_funds",
            TransactorError::InvalidSignature(_) => "invalid_signature",
            TransactorError::AlreadyKnown(_) => "already_known",
            TransactorError::Rejected(_) => "rejected",
            TransactorError::Transport(_) => "transport",
            TransactorError::Timeout { .. } => "timeout",
            TransactorError::Build(_) => "build",
            TransactorError::Wallet(_) => "wallet",
            TransactorError::Nonce(_) => "nonce",
            TransactorError::GasEstimation(_) => "gas_estimation",
            TransactorError::Cancelled => "cancelled",
            TransactorError::Internal(_) => "internal",
        }
    }
}

/// Result type for transactor operations
pub type TransactorResult<T> = Result<T, TransactorError>;
