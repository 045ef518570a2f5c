//! Error types for threshold key management, signing and verification

use thiserror::Error;

/// Result type alias for quorum operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while dealing, resharing, signing or verifying.
///
/// A signature that is well formed but does not satisfy the Schnorr equation
/// is not an error: the verifier reports it as `false`.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid threshold or participant configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Not enough signers or shares to reach the threshold
    #[error("Threshold not met: required {required}, got {actual}")]
    ThresholdNotMet { required: usize, actual: usize },

    /// Wrong-length or out-of-range encoded input
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Nonce reuse, commitment equivocation or a broken majority rule
    #[error("Security invariant violated: {0}")]
    SecurityViolation(String),

    /// Participant is not part of the group
    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    /// Signer was evicted or the key epoch moved on during a session
    #[error("Signer {0} is not active in the current key epoch")]
    InactiveSigner(String),

    /// A partial signature failed its individual check
    #[error("Invalid partial signature from {0}")]
    InvalidPartial(String),

    /// Operation not allowed in the current session state
    #[error("Invalid session state: expected {expected}, found {found}")]
    SessionState { expected: String, found: String },

    /// Session reached the failed terminal state
    #[error("Signing session failed: {0}")]
    SessionFailed(String),

    /// Timeout waiting for protocol messages
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Metered execution ran out of compute units
    #[error("Compute budget exceeded: limit {limit}, required {required}")]
    BudgetExceeded { limit: u64, required: u64 },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Network/relay error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error signals a possible attack rather than a client bug
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Error::SecurityViolation(_) | Error::InvalidPartial(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
