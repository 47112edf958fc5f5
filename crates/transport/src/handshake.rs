//! Transport-level orchestration of the KEP handshake (§4.3, §4.5): wires
//! `securechat_kep`'s pure protocol functions to the `KeyDirectory` (peer
//! public keys), the `SessionStore` (persisting the resulting key
//! schedule), and the wire `Envelope` shapes of `securechat_proto`.
//!
//! Each function here does exactly one round and returns control to the
//! caller — same "caller drives the network" shape as
//! `securechat_kep::handshake`, generalized one layer up to also persist
//! state and speak `Envelope` instead of the bare KEP messages.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use securechat_identity::{IdentityKeyPair, KeyDirectory};
use securechat_kep::{KepInitMessage, KepResponseMessage, PendingInit};
use securechat_proto::{Envelope, KepInitFields, KepResponseFields};
use securechat_store::SessionStore;

use crate::error::CoreError;

fn init_message_to_fields(message: &KepInitMessage) -> KepInitFields {
    KepInitFields {
        session_id: message.session_id.clone(),
        sender: message.sender.clone(),
        receiver: message.receiver.clone(),
        ephemeral_pub: message.ephemeral_pub.clone(),
        ts1: message.ts1,
        sig1: STANDARD.encode(&message.sig1),
    }
}

fn fields_to_init_message(fields: &KepInitFields) -> Result<KepInitMessage, CoreError> {
    Ok(KepInitMessage {
        session_id: fields.session_id.clone(),
        sender: fields.sender.clone(),
        receiver: fields.receiver.clone(),
        ephemeral_pub: fields.ephemeral_pub.clone(),
        ts1: fields.ts1,
        sig1: STANDARD
            .decode(&fields.sig1)
            .map_err(|e| CoreError::BadInput(format!("sig1 is not valid base64: {e}")))?,
    })
}

fn response_message_to_fields(message: &KepResponseMessage) -> KepResponseFields {
    KepResponseFields {
        session_id: message.session_id.clone(),
        sender: message.sender.clone(),
        receiver: message.receiver.clone(),
        ephemeral_pub: message.ephemeral_pub.clone(),
        ts1: message.ts1,
        ts2: message.ts2,
        sig2: STANDARD.encode(&message.sig2),
    }
}

fn fields_to_response_message(fields: &KepResponseFields) -> Result<KepResponseMessage, CoreError> {
    Ok(KepResponseMessage {
        session_id: fields.session_id.clone(),
        sender: fields.sender.clone(),
        receiver: fields.receiver.clone(),
        ephemeral_pub: fields.ephemeral_pub.clone(),
        ts1: fields.ts1,
        ts2: fields.ts2,
        sig2: STANDARD
            .decode(&fields.sig2)
            .map_err(|e| CoreError::BadInput(format!("sig2 is not valid base64: {e}")))?,
    })
}

/// Round 1 (A → B): build and sign `KEP_INIT`. The caller is responsible
/// for handing the envelope to a [`crate::relay::RelayClient`] and for
/// holding onto the returned [`PendingInit`] until round 2 arrives or the
/// 30s round timeout (`securechat_kep::ROUND_TIMEOUT_SECS`) expires.
pub fn initiate(
    session_id: &str,
    local_user_id: &str,
    peer_user_id: &str,
    local_identity: &IdentityKeyPair,
    now_ms: i64,
) -> Result<(PendingInit, Envelope), CoreError> {
    let pending = securechat_kep::initiate(session_id, local_user_id, peer_user_id, local_identity.secret(), now_ms)?;
    let envelope = Envelope::KepInit(init_message_to_fields(&pending.message));
    Ok((pending, envelope))
}

/// Round 2 (B): verify `KEP_INIT`, derive keys, persist the new session,
/// and build the signed `KEP_RESPONSE` to send back.
pub async fn respond(
    fields: &KepInitFields,
    directory: &dyn KeyDirectory,
    local_identity: &IdentityKeyPair,
    sessions: &SessionStore,
    now_ms: i64,
) -> Result<(Envelope, String), CoreError> {
    let init = fields_to_init_message(fields)?;
    let sender_identity = directory.get(&init.sender).await?;
    let outcome = securechat_kep::respond(&init, &sender_identity.jwk, local_identity.secret(), now_ms)?;

    let session_id = sessions.create(&init.receiver, &init.sender, &outcome.keys).await?;
    let envelope = Envelope::KepResponse(response_message_to_fields(&outcome.message));
    Ok((envelope, session_id))
}

/// A finishes round 2: verify `sig2`, derive the mirror-image keys,
/// persist the new session. Returns the local session id.
pub async fn complete(
    pending: PendingInit,
    fields: &KepResponseFields,
    directory: &dyn KeyDirectory,
    sessions: &SessionStore,
    now_ms: i64,
) -> Result<String, CoreError> {
    let response = fields_to_response_message(fields)?;
    let peer_identity = directory.get(&response.sender).await?;
    let local_user_id = pending.message.sender.clone();
    let peer_user_id = pending.message.receiver.clone();
    let keys = securechat_kep::complete(pending, &response, &peer_identity.jwk, now_ms)?;
    let session_id = sessions.create(&local_user_id, &peer_user_id, &keys).await?;
    Ok(session_id)
}
