//! HTTPS API DTOs consumed by the core (§6) — the WebSocket-unavailable
//! fallback plus the key-directory and session-metadata endpoints. Shaped
//! after the relay/session request-response structs the core actually calls;
//! the auth/registration/device-enrollment surface is an external
//! collaborator (§1) and has no DTOs here.

use chrono::{DateTime, Utc};
use securechat_crypto::EcJwk;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

// ── /keys ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyUploadRequest {
    pub public_identity_key_jwk: EcJwk,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyUploadOutcome {
    Unchanged,
    Rotated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyUploadResponse {
    pub outcome: KeyUploadOutcome,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetaResponse {
    pub user_id: String,
    pub public_identity_key_jwk: EcJwk,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub key_hash: String,
}

// ── /sessions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub user_id1: String,
    pub user_id2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session: SessionMeta,
    pub is_new: bool,
}

// ── /files ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadRequest {
    pub file_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Base64 ciphertext of this chunk (tag excluded).
    pub encrypted_data: String,
    pub iv: String,
    pub auth_tag: String,
    pub session_id: String,
    pub timestamp: i64,
    pub seq: u64,
    pub nonce: String,
    /// Only present on chunk 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadResponse {
    pub file_id: String,
    pub chunk_index: u32,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunkResponse {
    pub file_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub encrypted_data: String,
    pub iv: String,
    pub auth_tag: String,
}

// ── /messages/relay ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub envelope: Envelope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub message_id: String,
    pub received_at: DateTime<Utc>,
}

// ── Common ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
