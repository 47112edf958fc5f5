//! Wire messages for the two KEP rounds (§4.3). Transport-level framing
//! (the `KEP_INIT`/`KEP_RESPONSE` envelope types) lives in
//! `securechat_transport` / `securechat_proto`; these are the payloads
//! carried inside them.

use securechat_crypto::EcJwk;
use serde::{Deserialize, Serialize};

/// Round 1, A → B.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KepInitMessage {
    pub session_id: String,
    pub sender: String,
    pub receiver: String,
    pub ephemeral_pub: EcJwk,
    pub ts1: i64,
    pub sig1: Vec<u8>,
}

/// Round 2, B → A.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KepResponseMessage {
    pub session_id: String,
    pub sender: String,
    pub receiver: String,
    pub ephemeral_pub: EcJwk,
    pub ts1: i64,
    pub ts2: i64,
    pub sig2: Vec<u8>,
}

fn encode_part(buf: &mut Vec<u8>, part: &[u8]) {
    buf.extend_from_slice(&(part.len() as u32).to_be_bytes());
    buf.extend_from_slice(part);
}

/// `m1 = sessionId || A || B || eA_pub || ts1`, length-prefixed per field so
/// the concatenation is unambiguous (a plain `||` of variable-length UTF-8
/// strings would let an attacker shift a byte from one field into the next
/// without changing the joined bytes).
pub(crate) fn m1_transcript(
    session_id: &str,
    a: &str,
    b: &str,
    ea_pub: &EcJwk,
    ts1: i64,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    encode_part(&mut buf, session_id.as_bytes());
    encode_part(&mut buf, a.as_bytes());
    encode_part(&mut buf, b.as_bytes());
    encode_part(&mut buf, &serde_json::to_vec(ea_pub)?);
    encode_part(&mut buf, &ts1.to_be_bytes());
    Ok(buf)
}

/// `m2 = sessionId || A || B || eA_pub || eB_pub || ts1 || ts2`.
pub(crate) fn m2_transcript(
    session_id: &str,
    a: &str,
    b: &str,
    ea_pub: &EcJwk,
    eb_pub: &EcJwk,
    ts1: i64,
    ts2: i64,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    encode_part(&mut buf, session_id.as_bytes());
    encode_part(&mut buf, a.as_bytes());
    encode_part(&mut buf, b.as_bytes());
    encode_part(&mut buf, &serde_json::to_vec(ea_pub)?);
    encode_part(&mut buf, &serde_json::to_vec(eb_pub)?);
    encode_part(&mut buf, &ts1.to_be_bytes());
    encode_part(&mut buf, &ts2.to_be_bytes());
    Ok(buf)
}
