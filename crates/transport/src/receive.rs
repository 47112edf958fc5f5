//! Receiving a text message (§4.5 steps 1–9): structural validation, the
//! replay triple (stale timestamp / non-increasing `seq` / nonce length /
//! duplicate nonce), decrypt, deliver. Grounded in the teacher's
//! `cmd_poll_inbox` (`commands/messaging.rs`) minus the Tauri command
//! wrapper; the nonce-length and stale/seq/duplicate gate is pushed down
//! into `securechat_store::SessionStore::accept_inbound` except for the
//! nonce-length check, which this module performs first since the store
//! only ever sees a nonce *hash*, not the raw bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use securechat_crypto::aead;
use securechat_proto::{CipherFields, Envelope, PlaintextContent};
use securechat_store::{LoadedSession, SessionStore};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::CoreError;

/// Wire nonce length bounds (§3, §8 boundary cases: 11/12/32/33 bytes).
pub const NONCE_MIN_LEN: usize = 12;
pub const NONCE_MAX_LEN: usize = 32;

fn aad(session_id: &str, seq: u64) -> Vec<u8> {
    let mut out = session_id.as_bytes().to_vec();
    out.extend_from_slice(&seq.to_be_bytes());
    out
}

fn nonce_hash(nonce: &[u8]) -> String {
    hex::encode(Sha256::digest(nonce))
}

fn decrypt_with_key(key: &[u8; 32], session_id: &str, seq: u64, iv: &[u8; aead::IV_LEN], ct_and_tag: &[u8]) -> Option<Vec<u8>> {
    aead::decrypt_with_iv(key, iv, ct_and_tag, &aad(session_id, seq)).ok().map(|pt| pt.to_vec())
}

/// Validate the replay triple and decrypt `fields`' ciphertext, returning
/// the raw plaintext bytes. `stale_window_ms` and `now_ms` are supplied by
/// the caller so tests can exercise the boundary without sleeping (§7
/// `SECURECHAT_STALE_WINDOW_MS`).
///
/// Tries `session.recv_key` first; if that fails to authenticate and
/// `session.prev_recv_key` is still set, falls back to it once (§4.3's
/// one-step key tolerance window for messages encrypted just before a
/// `KEY_UPDATE` completed). Either way the fallback key is then consumed —
/// at most one straggler ever gets a second chance.
async fn decrypt_cipher_fields(
    sessions: &SessionStore,
    session: &LoadedSession,
    fields: &CipherFields,
    now_ms: i64,
    stale_window_ms: i64,
) -> Result<Vec<u8>, CoreError> {
    let nonce = STANDARD
        .decode(&fields.nonce)
        .map_err(|e| CoreError::BadInput(format!("nonce is not valid base64: {e}")))?;
    if nonce.len() < NONCE_MIN_LEN || nonce.len() > NONCE_MAX_LEN {
        return Err(CoreError::ReplayDetected("nonce-size".to_string()));
    }
    let hash = nonce_hash(&nonce);

    sessions
        .accept_inbound(&fields.session_id, fields.seq, &hash, now_ms, fields.timestamp, stale_window_ms)
        .await?;

    let iv_bytes = STANDARD
        .decode(&fields.iv)
        .map_err(|e| CoreError::BadInput(format!("iv is not valid base64: {e}")))?;
    let iv: [u8; aead::IV_LEN] = iv_bytes
        .try_into()
        .map_err(|_| CoreError::BadInput("iv must be 12 bytes".to_string()))?;
    let ciphertext = STANDARD
        .decode(&fields.ciphertext)
        .map_err(|e| CoreError::BadInput(format!("ciphertext is not valid base64: {e}")))?;
    let tag = STANDARD
        .decode(&fields.auth_tag)
        .map_err(|e| CoreError::BadInput(format!("authTag is not valid base64: {e}")))?;

    let mut ct_and_tag = ciphertext;
    ct_and_tag.extend_from_slice(&tag);

    if let Some(pt) = decrypt_with_key(&session.recv_key, &fields.session_id, fields.seq, &iv, &ct_and_tag) {
        return Ok(pt);
    }

    if let Some(prev_key) = session.prev_recv_key {
        let fallback = decrypt_with_key(&prev_key, &fields.session_id, fields.seq, &iv, &ct_and_tag);
        sessions.consume_prev_key(&fields.session_id).await?;
        if let Some(pt) = fallback {
            return Ok(pt);
        }
    }

    sessions.emit_invalid_signature(&fields.session_id, "auth-tag");
    Err(CoreError::MitmDetected("auth-tag".to_string()))
}

/// Receive and decrypt a `MSG` envelope, returning its [`PlaintextContent`].
/// `envelope` must already have been routed to the local user (`receiver ==
/// local_user_id`) by the caller. Envelopes addressed to a `Closed` session
/// are dropped rather than decrypted (§4.5).
pub async fn receive_text(
    sessions: &SessionStore,
    envelope: &Envelope,
    now_ms: i64,
    stale_window_ms: i64,
) -> Result<PlaintextContent, CoreError> {
    let fields = match envelope {
        Envelope::Msg(f) => f,
        _ => return Err(CoreError::BadInput("expected a MSG envelope".to_string())),
    };
    let session = sessions.load_by_id(&fields.session_id).await?;
    if session.state == "closed" {
        return Err(CoreError::SessionClosed(fields.session_id.clone()));
    }
    let mut plaintext = decrypt_cipher_fields(sessions, &session, fields, now_ms, stale_window_ms).await?;
    let content: Result<PlaintextContent, CoreError> =
        serde_json::from_slice(&plaintext).map_err(|e| CoreError::BadInput(e.to_string()));
    plaintext.zeroize();
    content
}
