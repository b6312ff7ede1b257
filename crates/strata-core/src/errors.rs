//! Unified error system for the Strata trust layer
//!
//! One error type covers the whole subsystem. Trust failures deliberately
//! carry no detail: every cryptographic or identity-resolution failure
//! collapses to [`SecurityError::Denied`] so a remote peer cannot
//! distinguish a bad signature from an unknown issuer or an expired
//! object. Infrastructure failures (bad files, lifecycle misuse, malformed
//! local input) stay distinct because an operator has to act on them.

use serde::{Deserialize, Serialize};

/// Unified error type for all trust-layer operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SecurityError {
    /// Null, malformed, or out-of-range input
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the offending input
        message: String,
    },

    /// Key, certificate, or bundle file missing or unreadable
    #[error("I/O error: {message}")]
    Io {
        /// Description of the failed file operation
        message: String,
    },

    /// Lifecycle misuse: `initialize` called twice without a shutdown
    #[error("Security module already initialized")]
    AlreadyInitialized,

    /// Lifecycle misuse: operation attempted before `initialize`
    #[error("Security module not initialized")]
    NotInitialized,

    /// The single coarse outcome for every trust failure. Detail is
    /// logged internally, never surfaced.
    #[error("Access denied")]
    Denied,

    /// Unexpected failure of an underlying primitive
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the unexpected failure
        message: String,
    },
}

impl SecurityError {
    /// Create an invalid-argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// The opaque trust-failure error
    pub fn denied() -> Self {
        Self::Denied
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type used throughout the trust layer
pub type Result<T> = std::result::Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_carries_no_detail() {
        assert_eq!(SecurityError::denied().to_string(), "Access denied");
    }

    #[test]
    fn constructors_produce_matching_variants() {
        assert!(matches!(
            SecurityError::invalid("x"),
            SecurityError::InvalidArgument { .. }
        ));
        assert!(matches!(SecurityError::io("x"), SecurityError::Io { .. }));
        assert!(matches!(
            SecurityError::internal("x"),
            SecurityError::Internal { .. }
        ));
    }
}
