//! securechat_store — encrypted local session store and key schedule (C4,
//! §3, §4.4).
//!
//! # Encryption strategy
//! SQLite does not natively encrypt. Application-level encryption is used
//! instead: session key material is stored as AES-256-GCM ciphertext,
//! base64-encoded, under a key derived from the user's password
//! (`SessionVault`). Non-sensitive metadata (ids, counters, timestamps) is
//! stored in plaintext to allow efficient queries.
//!
//! # Migration
//! sqlx migrations in `migrations/` run on first `Store::open`.

pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod session;
pub mod vault;

pub use db::Store;
pub use error::StoreError;
pub use events::{SecurityEvent, SecurityEventKind};
pub use session::{AcceptOutcome, LoadedSession, SessionStore, SessionSummary, USED_NONCE_RING_SIZE};
pub use vault::{new_vault_salt, SessionVault};
