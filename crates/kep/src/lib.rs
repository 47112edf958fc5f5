//! securechat_kep — the two-round signed-ECDH key exchange protocol (C3, §4.3).
//!
//! # Module layout
//! - `handshake` — `initiate`/`respond`/`complete`, the handshake itself
//! - `messages`  — `KEP_INIT`/`KEP_RESPONSE` payloads and their transcripts
//! - `tie_break` — simultaneous-initiation resolution
//! - `error`     — unified error type (every variant maps to `MITMDetected`)

pub mod error;
pub mod handshake;
pub mod messages;
pub mod tie_break;

pub use error::KepError;
pub use handshake::{complete, initiate, respond, PendingInit, ResponseOutcome, SessionKeys, ROUND_TIMEOUT_SECS, TIMESTAMP_SKEW_MS};
pub use messages::{KepInitMessage, KepResponseMessage};
pub use tie_break::{resolve_tie, Winner};
