//! `KEY_UPDATE` rotation (§4.3, §4.5): the same signed-ECDH dance as
//! `handshake`, repeated on an already-established session with fresh
//! ephemerals, so both sides end up with a new `rootKey`/`sendKey`/
//! `recvKey` and reset counters without tearing the session down. Mirrors
//! `handshake.rs`'s "caller drives the network, hold the `PendingInit`
//! between rounds" shape; the only difference is that round 2 calls
//! `SessionStore::rotate_keys` on the *existing* session instead of
//! `SessionStore::create`.
//!
//! A session is marked `Rotating` as soon as either side starts a round,
//! and only returns to `Active` once `rotate_keys` actually lands — if
//! verification fails partway through, the session is closed outright
//! rather than left rotating forever, since a failed `KEY_UPDATE` round is
//! as strong a MITM signal as a failed initial handshake (§4.5's
//! `Any → Closed` edge on `MITMDetected`).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use securechat_identity::{IdentityKeyPair, KeyDirectory};
use securechat_kep::{KepInitMessage, KepResponseMessage, PendingInit};
use securechat_proto::{Envelope, KeyUpdateFields, KeyUpdatePhase};
use securechat_store::SessionStore;

use crate::error::CoreError;

fn init_message_to_fields(message: &KepInitMessage) -> KeyUpdateFields {
    KeyUpdateFields {
        phase: KeyUpdatePhase::Init,
        session_id: message.session_id.clone(),
        sender: message.sender.clone(),
        receiver: message.receiver.clone(),
        ephemeral_pub: message.ephemeral_pub.clone(),
        ts1: message.ts1,
        ts2: None,
        sig: STANDARD.encode(&message.sig1),
    }
}

fn fields_to_init_message(fields: &KeyUpdateFields) -> Result<KepInitMessage, CoreError> {
    Ok(KepInitMessage {
        session_id: fields.session_id.clone(),
        sender: fields.sender.clone(),
        receiver: fields.receiver.clone(),
        ephemeral_pub: fields.ephemeral_pub.clone(),
        ts1: fields.ts1,
        sig1: STANDARD
            .decode(&fields.sig)
            .map_err(|e| CoreError::BadInput(format!("sig is not valid base64: {e}")))?,
    })
}

fn response_message_to_fields(message: &KepResponseMessage) -> KeyUpdateFields {
    KeyUpdateFields {
        phase: KeyUpdatePhase::Response,
        session_id: message.session_id.clone(),
        sender: message.sender.clone(),
        receiver: message.receiver.clone(),
        ephemeral_pub: message.ephemeral_pub.clone(),
        ts1: message.ts1,
        ts2: Some(message.ts2),
        sig: STANDARD.encode(&message.sig2),
    }
}

fn fields_to_response_message(fields: &KeyUpdateFields) -> Result<KepResponseMessage, CoreError> {
    let ts2 = fields
        .ts2
        .ok_or_else(|| CoreError::BadInput("KEY_UPDATE response is missing ts2".to_string()))?;
    Ok(KepResponseMessage {
        session_id: fields.session_id.clone(),
        sender: fields.sender.clone(),
        receiver: fields.receiver.clone(),
        ephemeral_pub: fields.ephemeral_pub.clone(),
        ts1: fields.ts1,
        ts2,
        sig2: STANDARD
            .decode(&fields.sig)
            .map_err(|e| CoreError::BadInput(format!("sig is not valid base64: {e}")))?,
    })
}

/// Round 1 (A → B): same shape as `handshake::initiate`, but keyed on the
/// session that already exists between `local_user_id`/`peer_user_id`
/// rather than minting a new one, and marks that session `Rotating` before
/// handing the envelope back to the caller.
pub async fn initiate_rotation(
    session_id: &str,
    local_user_id: &str,
    peer_user_id: &str,
    local_identity: &IdentityKeyPair,
    sessions: &SessionStore,
    now_ms: i64,
) -> Result<(PendingInit, Envelope), CoreError> {
    let pending = securechat_kep::initiate(session_id, local_user_id, peer_user_id, local_identity.secret(), now_ms)?;
    sessions.mark_rotating(session_id).await?;
    let envelope = Envelope::KeyUpdate(init_message_to_fields(&pending.message));
    Ok((pending, envelope))
}

/// Round 2 (B): verify the fresh `KEP_INIT`-shaped `KEY_UPDATE`, derive new
/// keys, and atomically replace B's existing session's key schedule via
/// [`securechat_store::SessionStore::rotate_keys`] rather than creating a
/// new row. On verification failure the session is closed, not left
/// `Rotating` (§4.5).
pub async fn respond_rotation(
    fields: &KeyUpdateFields,
    directory: &dyn KeyDirectory,
    local_identity: &IdentityKeyPair,
    sessions: &SessionStore,
    now_ms: i64,
) -> Result<Envelope, CoreError> {
    if fields.phase != KeyUpdatePhase::Init {
        return Err(CoreError::BadInput("expected a KEY_UPDATE init phase".to_string()));
    }
    let init = fields_to_init_message(fields)?;
    let existing = sessions.load(&init.receiver, &init.sender).await?;
    sessions.mark_rotating(&existing.id).await?;

    let sender_identity = directory.get(&init.sender).await?;
    let outcome = match securechat_kep::respond(&init, &sender_identity.jwk, local_identity.secret(), now_ms) {
        Ok(outcome) => outcome,
        Err(e) => {
            sessions.close_session(&existing.id).await?;
            return Err(CoreError::from(e));
        }
    };

    sessions.rotate_keys(&existing.id, &outcome.keys).await?;
    Ok(Envelope::KeyUpdate(response_message_to_fields(&outcome.message)))
}

/// A finishes round 2: verify, derive the mirror-image keys, rotate A's
/// own copy of the same session. Returns the local session id that was
/// rotated.
pub async fn complete_rotation(
    pending: PendingInit,
    fields: &KeyUpdateFields,
    directory: &dyn KeyDirectory,
    sessions: &SessionStore,
    now_ms: i64,
) -> Result<String, CoreError> {
    if fields.phase != KeyUpdatePhase::Response {
        return Err(CoreError::BadInput("expected a KEY_UPDATE response phase".to_string()));
    }
    let local_session_id = pending.message.session_id.clone();
    let response = fields_to_response_message(fields)?;
    let peer_identity = directory.get(&response.sender).await?;

    let keys = match securechat_kep::complete(pending, &response, &peer_identity.jwk, now_ms) {
        Ok(keys) => keys,
        Err(e) => {
            sessions.close_session(&local_session_id).await?;
            return Err(CoreError::from(e));
        }
    };

    sessions.rotate_keys(&local_session_id, &keys).await?;
    Ok(local_session_id)
}
