use thiserror::Error;

/// Error outputs from `authkit-core`.
///
/// Every public entry point returns one of these instead of panicking. The
/// `Display` form always starts with the stable caller-visible code returned
/// by [`AuthKitError::code`].
#[derive(Debug, Error)]
pub enum AuthKitError {
    /// The session configuration was rejected at construction time.
    #[error("invalid_config: {0}")]
    InvalidConfig(String),
    /// No session has been created, or the operation requires a signed-in user.
    #[error("session_not_loaded")]
    SessionNotLoaded,
    /// A sign-in handshake is already awaiting its redirect callback.
    #[error("sign_in_already_in_progress")]
    AlreadyInProgress,
    /// A response token arrived but no handshake was pending.
    #[error("no_handshake_in_progress")]
    NoHandshakeInProgress,
    /// The auth response token expired before it was consumed.
    #[error("handshake_expired")]
    HandshakeExpired,
    /// A signature did not verify against the expected key.
    #[error("signature_invalid: {0}")]
    SignatureInvalid(String),
    /// An encrypted payload was malformed or failed authentication.
    #[error("decryption_error: {0}")]
    Decryption(String),
    /// The storage backend rejected or failed a write.
    #[error("storage_write_error: {0}")]
    StorageWrite(String),
    /// The storage backend rejected or failed a read, or the object is absent.
    #[error("storage_read_error: {0}")]
    StorageRead(String),
    /// The session was replaced or torn down while an operation was in flight.
    #[error("session_invalidated")]
    SessionInvalidated,
    /// A storage operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),
    /// Unexpected error encoding or decoding internal data.
    #[error("serialization_error: {0}")]
    Serialization(String),
}

impl AuthKitError {
    /// Stable error code surfaced to callers of the request gateway.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::SessionNotLoaded => "session_not_loaded",
            Self::AlreadyInProgress => "sign_in_already_in_progress",
            Self::NoHandshakeInProgress => "no_handshake_in_progress",
            Self::HandshakeExpired => "handshake_expired",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::Decryption(_) => "decryption_error",
            Self::StorageWrite(_) => "storage_write_error",
            Self::StorageRead(_) => "storage_read_error",
            Self::SessionInvalidated => "session_invalidated",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
