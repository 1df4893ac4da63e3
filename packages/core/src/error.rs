//! Unified error hierarchy for the core.
//!
//! [`CryptoError`] is the ratchet's own internal error type (carried over from the
//! vendored ratchet crate); everything above the ratchet boundary returns
//! [`CoreError`], grouped by the domains the error-handling design calls out:
//! validation, session, transport, storage.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CryptoError {
    #[error("Failed to generate keys: {0}")]
    KeyGenerationError(String),
    #[error("Signing failed: {0}")]
    SigningError(String),
    #[error("Signature verification failed: {0}")]
    SignatureVerificationError(String),
    #[error("KEM encapsulation failed: {0}")]
    KemEncapsulationError(String),
    #[error("KEM decapsulation failed: {0}")]
    KemDecapsulationError(String),
    #[error("AEAD encryption failed: {0}")]
    AeadEncryptionError(String),
    #[error("AEAD decryption failed: {0}")]
    AeadDecryptionError(String),
    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),
    #[error("Nonce generation failed: {0}")]
    NonceGenerationError(String),
    #[error("Invalid input: {0}")]
    InvalidInputError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Other crypto error: {0}")]
    Other(String),
}

impl From<chacha20poly1305::Error> for CryptoError {
    fn from(err: chacha20poly1305::Error) -> Self {
        CryptoError::AeadEncryptionError(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for CryptoError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CryptoError::SigningError(err.to_string())
    }
}

impl From<rand::Error> for CryptoError {
    fn from(err: rand::Error) -> Self {
        CryptoError::KeyGenerationError(err.to_string())
    }
}

/// Validation failures raised at the admit boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("peer id must be exactly 32 bytes")]
    InvalidPeer,
    #[error("no discussion exists for this peer")]
    NoDiscussion,
    #[error("malformed plaintext payload: {0}")]
    MalformedPlaintext(String),
}

/// Session-adapter failures.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("session in wrong status: expected {expected}, actual {actual}")]
    WrongStatus { expected: String, actual: String },
    #[error("ratchet crypto failure: {0}")]
    CryptoFailure(#[from] CryptoError),
    #[error("no known session for peer")]
    UnknownPeer,
}

/// Message-board transport failures.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("transport call timed out")]
    Timeout,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("server returned an error: {0}")]
    ServerError(String),
}

/// Persistent-store failures.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("transaction conflict")]
    TxConflict,
    #[error("store corruption: {0}")]
    Corruption(String),
}

/// The error type every component boundary returns.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CryptoError> for CoreError {
    fn from(e: CryptoError) -> Self {
        CoreError::Session(SessionError::CryptoFailure(e))
    }
}

impl CoreError {
    /// Convenience constructor for long-term key management code, which fails in
    /// ways that are always ratchet/crypto related but don't originate inside
    /// `crate::ratchet` itself (e.g. malformed stored key material).
    pub fn crypto(message: impl Into<String>) -> Self {
        CoreError::Session(SessionError::CryptoFailure(CryptoError::Other(
            message.into(),
        )))
    }

    /// True for errors the caller should retry (transient transport/storage faults),
    /// false for errors that represent a programming mistake or unrecoverable state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Transport(TransportError::Timeout | TransportError::NetworkError(_))
                | CoreError::Storage(StorageError::TxConflict)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_timeout_is_retryable() {
        let err = CoreError::Transport(TransportError::Timeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_error_is_not_retryable() {
        let err = CoreError::Validation(ValidationError::InvalidPeer);
        assert!(!err.is_retryable());
    }

    #[test]
    fn crypto_error_converts_into_session_variant() {
        let crypto_err = CryptoError::AeadDecryptionError("bad tag".into());
        let core_err: CoreError = crypto_err.into();
        assert!(matches!(
            core_err,
            CoreError::Session(SessionError::CryptoFailure(_))
        ));
    }
}
