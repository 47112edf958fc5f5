//! securechat_transport — envelope transport, replay protection, and the
//! chunked file pipeline (C5, §4.5, §6).
//!
//! # Module layout
//! - `handshake`     — transport-level KEP orchestration (identity +
//!                     directory + session store + `Envelope`)
//! - `key_update`    — `KEY_UPDATE` rotation, the same dance on an existing
//!                     session
//! - `send`/`receive` — the text-message send/receive pipelines
//! - `file_transfer` — chunked file send/receive and reassembly
//! - `state`         — the per-direction session state machine
//! - `relay`         — `RelayClient` trait + in-memory `LoopbackRelay`
//! - `config`        — environment-variable configuration
//! - `tracing_init`  — global `tracing` subscriber installation
//! - `error`         — the unified `CoreError` taxonomy (§7)

pub mod config;
pub mod error;
pub mod file_transfer;
pub mod handshake;
pub mod key_update;
pub mod receive;
pub mod relay;
pub mod send;
pub mod state;
pub mod tracing_init;

pub use config::Config;
pub use error::CoreError;
pub use file_transfer::{receive_file_chunk, receive_file_meta, send_file, FileReassembler, DEFAULT_CHUNK_SIZE_BYTES};
pub use key_update::{complete_rotation, initiate_rotation, respond_rotation};
pub use receive::{receive_text, NONCE_MAX_LEN, NONCE_MIN_LEN};
pub use relay::{LoopbackRelay, RelayClient};
pub use send::{send_text, NONCE_LEN};
pub use state::{SessionState, Transition};
pub use tracing_init::init_tracing;
