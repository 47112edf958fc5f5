//! securechat_proto — the wire envelope, plaintext content shapes, and the
//! HTTPS fallback API (C5, §3, §6).
//!
//! # Modules
//! - `envelope` — the `Envelope` tagged sum type the relay actually sees
//! - `message`  — plaintext content carried inside an envelope's ciphertext
//! - `api`      — request/response DTOs for the `/keys`, `/sessions`,
//!                `/files`, and `/messages/relay` endpoints

pub mod api;
pub mod envelope;
pub mod message;

pub use envelope::{
    CipherFields, Envelope, FileChunkFields, FileChunkInfo, FileMetaFields, FileMetaInfo,
    KepInitFields, KepResponseFields, KeyUpdateFields, KeyUpdatePhase,
};
pub use message::PlaintextContent;
