//! Plaintext carried inside an `Envelope`'s AEAD ciphertext (never seen by
//! the relay). Restricted to the two content shapes this core actually
//! transports — text and file metadata; reactions/typing/receipts/group
//! invites belong to the UI layer this repo does not build.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaintextContent {
    Text { body: String },
    File { filename: String, mimetype: String, size: u64 },
}
