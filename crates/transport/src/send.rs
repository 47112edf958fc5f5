//! Sending a text message (§4.5 steps 1–6): load session, allocate `seq`,
//! encrypt, build the `MSG` envelope, hand it to the relay. Grounded in the
//! teacher's `cmd_send_message` (`commands/messaging.rs`) minus the Tauri
//! command wrapper.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand_core::RngCore;
use securechat_crypto::aead;
use securechat_proto::{CipherFields, Envelope, PlaintextContent};
use securechat_store::SessionStore;

use crate::error::CoreError;
use crate::relay::RelayClient;

/// 16 raw bytes, the minimum of the `[16, 32]` wire range (§3/§8).
pub const NONCE_LEN: usize = 16;

fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand_core::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// `sessionId || seq` bound as AEAD associated data (§9 open question 1).
fn aad(session_id: &str, seq: u64) -> Vec<u8> {
    let mut out = session_id.as_bytes().to_vec();
    out.extend_from_slice(&seq.to_be_bytes());
    out
}

pub(crate) fn encrypt_payload(
    send_key: &[u8; 32],
    session_id: &str,
    seq: u64,
    plaintext: &[u8],
) -> Result<(String, String, String, String), CoreError> {
    let iv = aead::random_iv();
    let nonce = random_nonce();
    let ct_and_tag = aead::encrypt_with_iv(send_key, &iv, plaintext, &aad(session_id, seq))?;
    let tag_at = ct_and_tag.len() - aead::TAG_LEN;
    let (ciphertext, tag) = ct_and_tag.split_at(tag_at);
    Ok((
        STANDARD.encode(ciphertext),
        STANDARD.encode(iv),
        STANDARD.encode(tag),
        STANDARD.encode(nonce),
    ))
}

/// Send a text message over `session_id` to `receiver`, returning the
/// envelope handed to the relay (useful for tests; callers normally only
/// care about the `Result<(), _>`).
pub async fn send_text(
    sessions: &SessionStore,
    relay: &dyn RelayClient,
    session_id: &str,
    sender: &str,
    receiver: &str,
    body: &str,
    now_ms: i64,
) -> Result<Envelope, CoreError> {
    let session = sessions.load_by_id(session_id).await?;
    if session.state == "closed" {
        return Err(CoreError::SessionClosed(session_id.to_string()));
    }
    let seq = sessions.allocate_next_seq(session_id).await?;
    let content = PlaintextContent::Text { body: body.to_string() };
    let plaintext = serde_json::to_vec(&content).map_err(|e| CoreError::BadInput(e.to_string()))?;

    let (ciphertext, iv, auth_tag, nonce) = encrypt_payload(&session.send_key, session_id, seq, &plaintext)?;

    let envelope = Envelope::Msg(CipherFields {
        session_id: session_id.to_string(),
        sender: sender.to_string(),
        receiver: receiver.to_string(),
        ciphertext,
        iv,
        auth_tag,
        timestamp: now_ms,
        seq,
        nonce,
    });

    tracing::info!(
        target: "securechat_transport",
        event = "msg_send",
        session_id = %session_id,
        seq = seq,
        "sent text message"
    );

    relay.send_envelope(envelope.clone()).await?;
    Ok(envelope)
}
