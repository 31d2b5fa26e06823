//! Unified error system for the ritual engine
//!
//! A single error type covers the whole engine. Variants are grouped by how the
//! engine reacts to them: fatal errors halt participation in a ritual, transient
//! errors are absorbed by the confirmation loop, and everything else is surfaced
//! to the caller unchanged.

use crate::types::{Address, BlockHash, RitualId, TxHash};
use serde::{Deserialize, Serialize};

/// Unified error type for all ritual operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RitualError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// The participant set announced out-of-band disagrees with the ledger.
    #[error("Participant mismatch for ritual {ritual_id}: ledger has {expected:?}, observed {observed:?}")]
    ParticipantMismatch {
        /// Ritual whose participant sets diverged
        ritual_id: RitualId,
        /// Providers recorded on-chain, in enrollment order
        expected: Vec<Address>,
        /// Providers observed from the enrollment notification
        observed: Vec<Address>,
    },

    /// A previously observed inclusion is no longer on the canonical chain.
    #[error("Chain reorganization detected for {tx_hash}: original block {original_block}, new block {new_block:?}")]
    ChainReorganizationDetected {
        /// Transaction whose inclusion moved
        tx_hash: TxHash,
        /// Block hash the transaction was first seen in
        original_block: BlockHash,
        /// Block hash reported now, if the transaction is still known
        new_block: Option<BlockHash>,
    },

    /// The transaction is mined but not yet buried deep enough.
    #[error("Not enough confirmations for {tx_hash}: {confirmations}/{required}")]
    NotEnoughConfirmations {
        /// Transaction being confirmed
        tx_hash: TxHash,
        /// Confirmations observed so far
        confirmations: u64,
        /// Confirmations required
        required: u64,
    },

    /// Operation exceeded its time budget
    #[error("Timeout: {operation} after {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Budget that was exceeded
        timeout_ms: u64,
    },

    /// A wait was abandoned because its outcome no longer matters
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Error message describing why the wait was abandoned
        message: String,
    },

    /// Chain RPC failure
    #[error("Chain error: {message}")]
    Chain {
        /// Error message describing the RPC failure
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Error message describing the cryptographic failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl RitualError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a chain RPC error
    pub fn chain(message: impl Into<String>) -> Self {
        Self::Chain {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Errors that indicate diverged data sources and must halt the ritual.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ParticipantMismatch { .. })
    }

    /// Errors the confirmation loop absorbs by polling again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ChainReorganizationDetected { .. }
                | Self::NotEnoughConfirmations { .. }
                | Self::Timeout { .. }
        )
    }
}

/// Standard Result type for ritual operations
pub type Result<T> = std::result::Result<T, RitualError>;

impl From<std::io::Error> for RitualError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            std::io::ErrorKind::TimedOut => Self::timeout("io", 0),
            _ => Self::storage(err.to_string()),
        }
    }
}
