//! `CoreError` — the unified error taxonomy of §7. Every fallible operation
//! below the transport boundary (crypto, identity, KEP, store) is wrapped
//! into one of these kinds; internal technical detail is logged via
//! `tracing` but not threaded further up than this type carries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed input: {0}")]
    BadInput(String),

    #[error("session vault is locked")]
    SessionLocked,

    #[error("no session for peer {0}")]
    SessionNotFound(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] securechat_crypto::CryptoError),

    #[error("replay detected: {0}")]
    ReplayDetected(String),

    #[error("possible man-in-the-middle: {0}")]
    MitmDetected(String),

    #[error("identity key integrity check failed")]
    IntegrityError,

    #[error("password does not unwrap this key")]
    BadPassword,

    #[error("relay unavailable: {0}")]
    TransportError(String),

    #[error("session is closed: {0}")]
    SessionClosed(String),
}

impl From<securechat_identity::IdentityError> for CoreError {
    fn from(e: securechat_identity::IdentityError) -> Self {
        use securechat_identity::IdentityError as E;
        match e {
            E::Crypto(c) => CoreError::Crypto(c),
            E::BadPassword => CoreError::BadPassword,
            E::IntegrityError => CoreError::IntegrityError,
            E::InvalidJwk(msg) => CoreError::BadInput(msg),
            E::NotFound(user) => CoreError::SessionNotFound(user),
            E::Serialisation(err) => CoreError::BadInput(err.to_string()),
            E::Base64Decode(err) => CoreError::BadInput(err.to_string()),
        }
    }
}

impl From<securechat_kep::KepError> for CoreError {
    fn from(e: securechat_kep::KepError) -> Self {
        CoreError::MitmDetected(e.to_string())
    }
}

impl From<securechat_store::StoreError> for CoreError {
    fn from(e: securechat_store::StoreError) -> Self {
        use securechat_store::StoreError as E;
        match e {
            E::VaultLocked => CoreError::SessionLocked,
            E::Crypto(c) => CoreError::Crypto(c),
            E::ReplayDetected(reason) => CoreError::ReplayDetected(reason),
            E::SessionNotFound(_, peer) => CoreError::SessionNotFound(peer),
            E::IdentityNotFound(user) => CoreError::SessionNotFound(user),
            other => CoreError::TransportError(other.to_string()),
        }
    }
}
