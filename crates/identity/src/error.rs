use securechat_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("password does not unwrap this identity key")]
    BadPassword,

    #[error("stored keyHash does not match recomputed hash — possible tamper")]
    IntegrityError,

    #[error("rejected JWK: {0}")]
    InvalidJwk(String),

    #[error("no published identity for user {0}")]
    NotFound(String),
}
