//! Error types for proof verification

use crate::types::{Hash256, ScId};
use thiserror::Error;

/// Result type for verifier operations
pub type Result<T> = std::result::Result<T, VerifierError>;

/// Errors returned to callers of the verifier.
///
/// None of these mean "the proof is invalid": an invalid proof is a normal
/// [`crate::VerificationResult::Failed`] outcome. These errors report inputs
/// that should have been rejected before reaching the verifier.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The sidechain referenced by a certificate or CSW input is not known to the view
    #[error("Unknown sidechain {0}")]
    UnknownSidechain(ScId),

    /// The view has no cumulative commitment tree root for an epoch boundary block
    #[error("Missing epoch boundary for sidechain {sc_id} epoch {epoch} at height {height}")]
    MissingEpochBoundary { sc_id: ScId, epoch: u32, height: u64 },

    /// The epoch boundary height cannot be represented
    #[error("Epoch {epoch} out of range for sidechain {sc_id}")]
    EpochOutOfRange { sc_id: ScId, epoch: u32 },

    /// The sidechain was created without a ceased-withdrawal verification key
    #[error("Sidechain {0} has no CSW verification key")]
    MissingCswVerificationKey(ScId),

    /// A transaction handed to CSW verification carries no CSW inputs
    #[error("Transaction {0} has no CSW inputs")]
    NoCswInputs(Hash256),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Proving backend error
    #[error("Proving backend error: {0}")]
    Proving(#[from] ProvingError),

    /// The background driver thread could not be started
    #[error("Failed to spawn verification driver: {0}")]
    DriverSpawn(#[source] std::io::Error),
}

/// Errors raised by a proving backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvingError {
    /// Proof bytes could not be parsed
    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    /// Verification key bytes could not be parsed
    #[error("Malformed verification key: {0}")]
    MalformedKey(String),

    /// The backend could not complete the call
    #[error("Backend failure: {0}")]
    Backend(String),
}
