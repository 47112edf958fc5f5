//! The `Session` entity and key schedule (§3, §4.4): `create`/`load`/
//! `update`/`delete`/`listByUser`, the 200-entry used-nonce FIFO, and the
//! `onReplayDetected`/`onInvalidSignature` callbacks, all serialized per
//! session through SQLite row-level locking rather than an in-process mutex
//! (the teacher's per-session `Mutex` in `dl_store` doesn't survive a
//! multi-process client, so this repo pushes the serialization into the
//! `UNIQUE`/transactional guarantees sqlx already gives us).

use std::sync::Arc;

use securechat_kep::SessionKeys;
use sqlx::Row;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::db::Store;
use crate::error::StoreError;
use crate::events::{SecurityEvent, SecurityEventKind};
use crate::models::SessionRow;

/// Bounded per-session inbound-nonce ring size (§3, §4.4).
pub const USED_NONCE_RING_SIZE: i64 = 200;

type EventHook = Arc<dyn Fn(SecurityEvent) + Send + Sync>;

/// `storageKey = HKDF(rootKey, info="self-storage/v1")` (§9 open question 2)
/// — a self-storage session (`userId == peerId`) uses one symmetric key for
/// both directions instead of the asymmetric `sendKey`/`recvKey` pair a
/// real peer-to-peer session gets, since there's no second party to hand
/// the mirror-image key to.
const SELF_STORAGE_INFO: &[u8] = b"self-storage/v1";

/// Returns the `(sendKey, recvKey)` pair that should actually be persisted
/// for this session: `keys`' own pair for a normal session, or
/// `storageKey` duplicated into both slots when `local_user_id ==
/// peer_user_id`.
fn effective_send_recv_keys(
    local_user_id: &str,
    peer_user_id: &str,
    keys: &SessionKeys,
) -> Result<([u8; 32], [u8; 32]), StoreError> {
    if local_user_id == peer_user_id {
        let root_key = keys.root_key();
        let storage_key = securechat_crypto::kdf::derive_directional_key(&root_key, SELF_STORAGE_INFO)?;
        Ok((storage_key, storage_key))
    } else {
        Ok((keys.send_key(), keys.recv_key()))
    }
}

/// Decrypted session key material, handed back to the transport layer.
/// Zeroized on drop; never persisted in this form.
#[derive(zeroize::ZeroizeOnDrop)]
pub struct LoadedSession {
    #[zeroize(skip)]
    pub id: String,
    #[zeroize(skip)]
    pub local_user_id: String,
    #[zeroize(skip)]
    pub peer_user_id: String,
    pub root_key: [u8; 32],
    pub send_key: [u8; 32],
    pub recv_key: [u8; 32],
    /// Set only inside the one-step key tolerance window right after a
    /// rotation (§4.3) — `None` once consumed or if no rotation has
    /// happened yet.
    pub prev_recv_key: Option<[u8; 32]>,
    #[zeroize(skip)]
    pub last_seq: u64,
    #[zeroize(skip)]
    pub next_seq: u64,
    /// `"new"`/`"handshaking"`/`"active"`/`"rotating"`/`"closed"` — the
    /// transport layer is responsible for interpreting this string against
    /// its own `SessionState` enum; the store only ever reads/writes it
    /// verbatim.
    #[zeroize(skip)]
    pub state: String,
}

/// Metadata-only view used by `listByUser` — no key material.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub peer_user_id: String,
    pub state: String,
}

/// Outcome of accepting (or rejecting) an inbound envelope's replay triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
}

#[derive(Clone)]
pub struct SessionStore {
    store: Store,
    on_replay_detected: Option<EventHook>,
    on_invalid_signature: Option<EventHook>,
}

impl SessionStore {
    pub fn new(store: Store) -> Self {
        Self { store, on_replay_detected: None, on_invalid_signature: None }
    }

    pub fn with_replay_hook(mut self, hook: EventHook) -> Self {
        self.on_replay_detected = Some(hook);
        self
    }

    pub fn with_invalid_signature_hook(mut self, hook: EventHook) -> Self {
        self.on_invalid_signature = Some(hook);
        self
    }

    fn emit_replay(&self, session_id: &str, seq: Option<u64>, timestamp: Option<i64>, reason: &str) {
        tracing::warn!(
            target: "securechat_store",
            event = "replay_detected",
            session_id = %session_id,
            reason = %reason,
            "rejected inbound envelope"
        );
        if let Some(hook) = &self.on_replay_detected {
            hook(SecurityEvent {
                kind: SecurityEventKind::ReplayDetected,
                session_id: session_id.to_string(),
                seq,
                timestamp,
                reason: reason.to_string(),
            });
        }
    }

    pub fn emit_invalid_signature(&self, session_id: &str, reason: &str) {
        tracing::warn!(
            target: "securechat_store",
            event = "invalid_signature",
            session_id = %session_id,
            reason = %reason,
            "rejected handshake message"
        );
        if let Some(hook) = &self.on_invalid_signature {
            hook(SecurityEvent {
                kind: SecurityEventKind::InvalidSignature,
                session_id: session_id.to_string(),
                seq: None,
                timestamp: None,
                reason: reason.to_string(),
            });
        }
    }

    /// Persist a freshly completed (or rotated) KEP handshake. Resets
    /// `lastSeq`/`nextSeq` to their initial values (§3) — rotation discards
    /// the old key schedule, not just the old keys.
    pub async fn create(
        &self,
        local_user_id: &str,
        peer_user_id: &str,
        keys: &SessionKeys,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let (send_key, recv_key) = effective_send_recv_keys(local_user_id, peer_user_id, keys)?;
        let root_enc = self.store.encrypt_value(&keys.root_key()).await?;
        let send_enc = self.store.encrypt_value(&send_key).await?;
        let recv_enc = self.store.encrypt_value(&recv_key).await?;

        sqlx::query(
            "INSERT INTO sessions (id, local_user_id, peer_user_id, root_key_enc, send_key_enc, recv_key_enc, last_seq, next_seq, state) \
             VALUES (?, ?, ?, ?, ?, ?, 0, 1, 'active')",
        )
        .bind(&id)
        .bind(local_user_id)
        .bind(peer_user_id)
        .bind(root_enc)
        .bind(send_enc)
        .bind(recv_enc)
        .execute(&self.store.pool)
        .await?;

        Ok(id)
    }

    /// Overwrite an existing session's key schedule in place (`KEY_UPDATE`
    /// rotation, §4.5): new keys, counters reset, state returned to
    /// `active` from whatever `Rotating` left it in. The pre-rotation
    /// send/recv keys are kept in `prev_*_key_enc` rather than discarded —
    /// §4.3's one-step tolerance window needs them for messages that were
    /// encrypted before rotation but arrive after — until
    /// [`Self::consume_prev_key`] clears them.
    pub async fn rotate_keys(&self, session_id: &str, keys: &SessionKeys) -> Result<(), StoreError> {
        let current: SessionRow = sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.store.pool)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string(), String::new()))?;

        let (send_key, recv_key) = effective_send_recv_keys(&current.local_user_id, &current.peer_user_id, keys)?;
        let root_enc = self.store.encrypt_value(&keys.root_key()).await?;
        let send_enc = self.store.encrypt_value(&send_key).await?;
        let recv_enc = self.store.encrypt_value(&recv_key).await?;

        sqlx::query(
            "UPDATE sessions SET root_key_enc = ?, send_key_enc = ?, recv_key_enc = ?, \
             prev_send_key_enc = ?, prev_recv_key_enc = ?, \
             last_seq = 0, next_seq = 1, state = 'active', updated_at = datetime('now') WHERE id = ?",
        )
        .bind(root_enc)
        .bind(send_enc)
        .bind(recv_enc)
        .bind(current.send_key_enc)
        .bind(current.recv_key_enc)
        .bind(session_id)
        .execute(&self.store.pool)
        .await?;

        sqlx::query("DELETE FROM used_nonces WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.store.pool)
            .await?;
        Ok(())
    }

    /// Mark a session `rotating` — called on both sides as soon as a
    /// `KEY_UPDATE` round begins (§4.5: `Active` on `KEY_UPDATE` init →
    /// `Rotating`).
    pub async fn mark_rotating(&self, session_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sessions SET state = 'rotating', updated_at = datetime('now') WHERE id = ?")
            .bind(session_id)
            .execute(&self.store.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string(), String::new()));
        }
        Ok(())
    }

    /// The `Any → Closed` edge (§4.5): fires on `MITMDetected` or local
    /// delete. Envelopes for a `Closed` session are rejected by the
    /// transport layer before they reach this crate again.
    pub async fn close_session(&self, session_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sessions SET state = 'closed', updated_at = datetime('now') WHERE id = ?")
            .bind(session_id)
            .execute(&self.store.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string(), String::new()));
        }
        Ok(())
    }

    /// Spend the one-step key tolerance window (§4.3): clears the
    /// pre-rotation keys so at most one straggler message can ever fall
    /// back to them, regardless of whether that one attempt decrypted
    /// successfully.
    pub async fn consume_prev_key(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET prev_send_key_enc = NULL, prev_recv_key_enc = NULL WHERE id = ?")
            .bind(session_id)
            .execute(&self.store.pool)
            .await?;
        Ok(())
    }

    pub async fn load(&self, local_user_id: &str, peer_user_id: &str) -> Result<LoadedSession, StoreError> {
        let row: SessionRow = sqlx::query_as(
            "SELECT * FROM sessions WHERE local_user_id = ? AND peer_user_id = ?",
        )
        .bind(local_user_id)
        .bind(peer_user_id)
        .fetch_optional(&self.store.pool)
        .await?
        .ok_or_else(|| StoreError::SessionNotFound(local_user_id.to_string(), peer_user_id.to_string()))?;

        self.decrypt_row(row).await
    }

    pub async fn load_by_id(&self, session_id: &str) -> Result<LoadedSession, StoreError> {
        let row: SessionRow = sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.store.pool)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string(), String::new()))?;

        self.decrypt_row(row).await
    }

    async fn decrypt_row(&self, row: SessionRow) -> Result<LoadedSession, StoreError> {
        let root_key = self.decrypt_key(&row.root_key_enc).await?;
        let send_key = self.decrypt_key(&row.send_key_enc).await?;
        let recv_key = self.decrypt_key(&row.recv_key_enc).await?;
        let prev_recv_key = match &row.prev_recv_key_enc {
            Some(enc) => Some(*self.decrypt_key(enc).await?),
            None => None,
        };

        Ok(LoadedSession {
            id: row.id,
            local_user_id: row.local_user_id,
            peer_user_id: row.peer_user_id,
            root_key: *root_key,
            send_key: *send_key,
            recv_key: *recv_key,
            prev_recv_key,
            last_seq: row.last_seq as u64,
            next_seq: row.next_seq as u64,
            state: row.state,
        })
    }

    async fn decrypt_key(&self, enc: &str) -> Result<Zeroizing<[u8; 32]>, StoreError> {
        let bytes = self.store.decrypt_value(enc).await?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::Serialisation(serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "stored session key is not 32 bytes",
            ))))?;
        Ok(Zeroizing::new(arr))
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.store.pool)
            .await?;
        Ok(())
    }

    pub async fn list_by_user(&self, local_user_id: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query("SELECT id, peer_user_id, state FROM sessions WHERE local_user_id = ?")
            .bind(local_user_id)
            .fetch_all(&self.store.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| SessionSummary {
                id: r.get("id"),
                peer_user_id: r.get("peer_user_id"),
                state: r.get("state"),
            })
            .collect())
    }

    /// Allocate the next outbound `seq` for this session under the row's
    /// implicit lock (the `UPDATE ... RETURNING` is atomic at the SQLite
    /// level, so concurrent `send` calls on the same session still produce
    /// contiguous, non-overlapping sequence numbers — §5).
    pub async fn allocate_next_seq(&self, session_id: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "UPDATE sessions SET next_seq = next_seq + 1, updated_at = datetime('now') \
             WHERE id = ? RETURNING next_seq - 1 AS allocated",
        )
        .bind(session_id)
        .fetch_optional(&self.store.pool)
        .await?
        .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string(), String::new()))?;
        Ok(row.get::<i64, _>("allocated") as u64)
    }

    /// Validate and accept an inbound envelope's replay triple (§4.5 steps
    /// 2–8): stale timestamp, non-increasing `seq`, and duplicate-nonce
    /// checks, followed by an atomic `lastSeq`/nonce-ring update.
    pub async fn accept_inbound(
        &self,
        session_id: &str,
        seq: u64,
        nonce_hash: &str,
        now_ms: i64,
        timestamp_ms: i64,
        stale_window_ms: i64,
    ) -> Result<AcceptOutcome, StoreError> {
        if (now_ms - timestamp_ms).abs() > stale_window_ms {
            self.emit_replay(session_id, Some(seq), Some(timestamp_ms), "stale");
            return Err(StoreError::ReplayDetected("stale".to_string()));
        }

        let row = sqlx::query("SELECT last_seq FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.store.pool)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string(), String::new()))?;
        let last_seq: i64 = row.get("last_seq");
        if seq as i64 <= last_seq {
            self.emit_replay(session_id, Some(seq), Some(timestamp_ms), "seq");
            return Err(StoreError::ReplayDetected("seq".to_string()));
        }

        let duplicate: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM used_nonces WHERE session_id = ? AND nonce_hash = ?",
        )
        .bind(session_id)
        .bind(nonce_hash)
        .fetch_optional(&self.store.pool)
        .await?;
        if duplicate.is_some() {
            self.emit_replay(session_id, Some(seq), Some(timestamp_ms), "duplicate-nonce");
            return Err(StoreError::ReplayDetected("duplicate-nonce".to_string()));
        }

        let mut tx = self.store.pool.begin().await?;
        sqlx::query("UPDATE sessions SET last_seq = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(seq as i64)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO used_nonces (session_id, nonce_hash, seq) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(nonce_hash)
            .bind(seq as i64)
            .execute(&mut *tx)
            .await?;
        // Evict the oldest entries once the ring exceeds its cap.
        sqlx::query(
            "DELETE FROM used_nonces WHERE session_id = ? AND rowid NOT IN \
             (SELECT rowid FROM used_nonces WHERE session_id = ? ORDER BY rowid DESC LIMIT ?)",
        )
        .bind(session_id)
        .bind(session_id)
        .bind(USED_NONCE_RING_SIZE)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(AcceptOutcome::Accepted)
    }
}
