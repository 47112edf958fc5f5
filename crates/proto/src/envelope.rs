//! The wire envelope (§3, §6) — a tagged sum type with one explicit case
//! per `type`, replacing a flat struct with optional fields: invalid field
//! combinations (a `meta` block on a `MSG`, an `ephemeralPub` on a
//! `FILE_CHUNK`) are rejected at parse time by construction, not by a
//! runtime check after the fact (§9 redesign flag).
//!
//! `MSG`/`FILE_META`/`FILE_CHUNK` carry AEAD ciphertext plus the replay
//! triple (`seq`, `nonce`, `timestamp`); `KEP_INIT`/`KEP_RESPONSE`/
//! `KEY_UPDATE` carry the signed handshake payload instead — there is no
//! session key yet to encrypt them with, so they have no `ciphertext`/`iv`/
//! `authTag` fields to begin with.

use securechat_crypto::EcJwk;
use serde::{Deserialize, Serialize};

/// Fields shared by every envelope that carries AEAD ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherFields {
    pub session_id: String,
    pub sender: String,
    pub receiver: String,
    /// Base64 (standard, padded) AEAD ciphertext, tag excluded.
    pub ciphertext: String,
    /// Base64, 12 raw bytes (96 bits).
    pub iv: String,
    /// Base64, 16 raw bytes (128 bits).
    pub auth_tag: String,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub seq: u64,
    /// Base64, 16–32 raw bytes.
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetaInfo {
    pub filename: String,
    pub size: u64,
    pub total_chunks: u32,
    pub mimetype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunkInfo {
    pub chunk_index: u32,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetaFields {
    #[serde(flatten)]
    pub cipher: CipherFields,
    pub meta: FileMetaInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChunkFields {
    #[serde(flatten)]
    pub cipher: CipherFields,
    pub meta: FileChunkInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KepInitFields {
    pub session_id: String,
    pub sender: String,
    pub receiver: String,
    pub ephemeral_pub: EcJwk,
    pub ts1: i64,
    /// Base64 DER-encoded ECDSA signature.
    pub sig1: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KepResponseFields {
    pub session_id: String,
    pub sender: String,
    pub receiver: String,
    pub ephemeral_pub: EcJwk,
    pub ts1: i64,
    pub ts2: i64,
    /// Base64 DER-encoded ECDSA signature.
    pub sig2: String,
}

/// `KEY_UPDATE` reuses the KEP_INIT/KEP_RESPONSE shapes for its two rounds
/// (§4.3: "the same two-round dance is repeated using FRESH ephemerals");
/// `phase` distinguishes which round this message is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyUpdatePhase {
    Init,
    Response,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyUpdateFields {
    pub phase: KeyUpdatePhase,
    pub session_id: String,
    pub sender: String,
    pub receiver: String,
    pub ephemeral_pub: EcJwk,
    pub ts1: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts2: Option<i64>,
    /// Base64 DER-encoded ECDSA signature (sig1 for `Init`, sig2 for `Response`).
    pub sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "MSG")]
    Msg(CipherFields),
    #[serde(rename = "FILE_META")]
    FileMeta(FileMetaFields),
    #[serde(rename = "FILE_CHUNK")]
    FileChunk(FileChunkFields),
    #[serde(rename = "KEP_INIT")]
    KepInit(KepInitFields),
    #[serde(rename = "KEP_RESPONSE")]
    KepResponse(KepResponseFields),
    #[serde(rename = "KEY_UPDATE")]
    KeyUpdate(KeyUpdateFields),
}

impl Envelope {
    pub fn session_id(&self) -> &str {
        match self {
            Envelope::Msg(f) => &f.session_id,
            Envelope::FileMeta(f) => &f.cipher.session_id,
            Envelope::FileChunk(f) => &f.cipher.session_id,
            Envelope::KepInit(f) => &f.session_id,
            Envelope::KepResponse(f) => &f.session_id,
            Envelope::KeyUpdate(f) => &f.session_id,
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            Envelope::Msg(f) => &f.sender,
            Envelope::FileMeta(f) => &f.cipher.sender,
            Envelope::FileChunk(f) => &f.cipher.sender,
            Envelope::KepInit(f) => &f.sender,
            Envelope::KepResponse(f) => &f.sender,
            Envelope::KeyUpdate(f) => &f.sender,
        }
    }

    pub fn receiver(&self) -> &str {
        match self {
            Envelope::Msg(f) => &f.receiver,
            Envelope::FileMeta(f) => &f.cipher.receiver,
            Envelope::FileChunk(f) => &f.cipher.receiver,
            Envelope::KepInit(f) => &f.receiver,
            Envelope::KepResponse(f) => &f.receiver,
            Envelope::KeyUpdate(f) => &f.receiver,
        }
    }
}
