//! Error types for script construction, transaction building and submission

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PegError {
    #[error("Invalid key hash length: expected 20 bytes, got {0}")]
    InvalidKeyHashLength(usize),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Redeem script hash does not match the funded output's locking script")]
    ScriptMismatch,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Address belongs to a different network: {0}")]
    WrongNetwork(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    #[error("Insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Signer key does not match the output being spent")]
    SignatureMismatch,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Input index {index} out of range ({count} inputs)")]
    InputOutOfRange { index: usize, count: usize },

    #[error("Draft is frozen: inputs and outputs cannot change after signing")]
    DraftFrozen,

    #[error("No partial signature on input {0}")]
    MissingPartialSignature(usize),

    #[error("No redeem script attached to input {0}")]
    MissingRedeemScript(usize),

    #[error("Finalization failed: {0}")]
    Finalization(String),

    #[error("Chain gateway error: {0}")]
    Gateway(String),
}

/// Coarse classification of [`PegError`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    InsufficientFunds,
    Signing,
    Finalization,
    Network,
}

impl PegError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PegError::InvalidKeyHashLength(_)
            | PegError::PayloadTooLarge(_)
            | PegError::ScriptMismatch
            | PegError::InvalidAddress(_)
            | PegError::WrongNetwork(_)
            | PegError::InvalidTransaction(_)
            | PegError::Serialization(_)
            | PegError::ScriptExecution(_) => ErrorCategory::Validation,
            PegError::InsufficientFunds { .. } => ErrorCategory::InsufficientFunds,
            PegError::SignatureMismatch
            | PegError::InvalidKey(_)
            | PegError::InputOutOfRange { .. }
            | PegError::DraftFrozen => ErrorCategory::Signing,
            PegError::MissingPartialSignature(_)
            | PegError::MissingRedeemScript(_)
            | PegError::Finalization(_) => ErrorCategory::Finalization,
            PegError::Gateway(_) => ErrorCategory::Network,
        }
    }
}

pub type Result<T> = std::result::Result<T, PegError>;
