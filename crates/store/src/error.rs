use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("session vault is locked — unlock with password first")]
    VaultLocked,

    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] securechat_crypto::CryptoError),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("no session for (local_user_id={0}, peer_user_id={1})")]
    SessionNotFound(String, String),

    #[error("no identity record for user {0}")]
    IdentityNotFound(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("replay detected: {0}")]
    ReplayDetected(String),
}
