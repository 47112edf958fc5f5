use thiserror::Error;

/// Every variant here is surfaced by the transport layer as `MITMDetected`
/// (§4.3: "any signature failure, timestamp outside ±2 minutes, or
/// unexpected state transition aborts the handshake and emits a
/// MITMDetected event; no partial session state is persisted"). The
/// variants exist for logging/debugging, not for differentiated handling.
#[derive(Debug, Error)]
pub enum KepError {
    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] securechat_crypto::CryptoError),

    #[error("signature verification failed on round {round}")]
    InvalidSignature { round: u8 },

    #[error("timestamp {ts}ms is outside the ±{skew_ms}ms acceptance window (now={now}ms)")]
    TimestampOutOfRange { ts: i64, now: i64, skew_ms: i64 },

    #[error("malformed handshake message: {0}")]
    Malformed(String),
}
