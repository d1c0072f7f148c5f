//! Error types for the disburser

use crate::chain::LedgerError;
use thiserror::Error;

/// Main error type for the disburser
#[derive(Error, Debug)]
pub enum DisburseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error in {path}: {message}")]
    Input { path: String, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Retries exhausted for transfer to {destination}")]
    RetriesExhausted { destination: String },

    #[error("Receipt for {tx_hash} not found after {attempts} attempts (transaction may still be pending, do not resubmit blindly)")]
    NotConfirmed { tx_hash: String, attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for disburser operations
pub type DisburseResult<T> = Result<T, DisburseError>;
