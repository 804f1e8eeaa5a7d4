//! Error taxonomy for container operations

use thiserror::Error;

use crate::engine::EngineState;

pub type XkemResult<T> = Result<T, XkemError>;

/// Coarse classification used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad key sizes, malformed framing, or misuse of the engine.
    InputValidation,
    /// An AEAD tag did not verify. Always fatal to the whole operation.
    AuthenticationFailure,
    /// Entropy or I/O failure surfaced from the environment.
    ResourceFailure,
}

#[derive(Debug, Error)]
pub enum XkemError {
    #[error("operating system randomness unavailable")]
    RandomnessUnavailable,

    #[error("invalid public key length: {actual} bytes (expected {expected})")]
    InvalidPublicKeyLength { expected: usize, actual: usize },

    #[error("invalid private key length: {actual} bytes (expected {expected})")]
    InvalidPrivateKeyLength { expected: usize, actual: usize },

    #[error("invalid KEM ciphertext length: {actual} bytes (expected {expected})")]
    InvalidCiphertextLength { expected: usize, actual: usize },

    /// Deliberately carries no detail about which chunk or stage failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("AEAD encryption failed")]
    EncryptionFailed,

    #[error("key derivation failed: {0}")]
    KeyDerivation(hkdf::InvalidLength),

    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("not an xkem container (magic mismatch)")]
    MagicMismatch,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("truncated chunk: {needed} bytes declared, {available} available")]
    TruncatedChunk { needed: usize, available: usize },

    #[error("chunk of {len} bytes exceeds the {max} byte limit")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("invalid chunk size {0} (must be between 1 and 4294967295)")]
    InvalidChunkSize(usize),

    #[error("nonce reused within container")]
    DuplicateNonce,

    #[error("operation not valid in engine state {0:?}")]
    InvalidState(EngineState),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl XkemError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XkemError::AuthenticationFailed => ErrorKind::AuthenticationFailure,
            XkemError::RandomnessUnavailable
            | XkemError::EncryptionFailed
            | XkemError::KeyDerivation(_)
            | XkemError::Io(_) => ErrorKind::ResourceFailure,
            XkemError::InvalidPublicKeyLength { .. }
            | XkemError::InvalidPrivateKeyLength { .. }
            | XkemError::InvalidCiphertextLength { .. }
            | XkemError::MalformedHeader(_)
            | XkemError::MagicMismatch
            | XkemError::UnsupportedVersion(_)
            | XkemError::TruncatedChunk { .. }
            | XkemError::ChunkTooLarge { .. }
            | XkemError::InvalidChunkSize(_)
            | XkemError::DuplicateNonce
            | XkemError::InvalidState(_) => ErrorKind::InputValidation,
        }
    }
}
