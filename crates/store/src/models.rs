//! Database row models — these map to/from SQL rows (§3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local record of one user's own identity key material.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdentityRow {
    pub user_id: String,
    /// JSON-encoded public `EcJwk`.
    pub public_jwk_json: String,
    /// Vault-encrypted `WrappedIdentityKey` (itself already password-wrapped;
    /// this second layer lets the row travel inside an encrypted backup).
    pub wrapped_key_enc: String,
    pub version: i64,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row per local `(userId, peerId)` pair — `UNIQUE(local_user_id,
/// peer_user_id)` at the schema level enforces the spec's "one stable
/// sessionId per unordered pair" invariant (§3), diverging from a looser
/// multi-session-per-peer schema.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub local_user_id: String,
    pub peer_user_id: String,
    /// Vault-encrypted 32-byte root key.
    pub root_key_enc: String,
    /// Vault-encrypted 32-byte send key.
    pub send_key_enc: String,
    /// Vault-encrypted 32-byte recv key.
    pub recv_key_enc: String,
    /// Pre-rotation send/recv keys, present only inside the one-step key
    /// tolerance window right after a `KEY_UPDATE` (§4.3).
    pub prev_send_key_enc: Option<String>,
    pub prev_recv_key_enc: Option<String>,
    pub last_seq: i64,
    pub next_seq: i64,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row per accepted inbound nonce. Bounded to 200 per session by
/// `SessionStore::record_nonce`, which deletes the oldest row by `rowid`
/// once the 201st is inserted — a FIFO ring expressed as a trimmed table
/// rather than a field serialized inside the session blob.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsedNonceRow {
    pub session_id: String,
    pub nonce_hash: String,
    pub seq: i64,
    pub recorded_at: DateTime<Utc>,
}
