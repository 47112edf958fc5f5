//! `RelayClient` (§4.5, §6): the boundary between this core and the
//! WebSocket/HTTPS relay service, which is an external collaborator (§1)
//! this repo does not implement. [`LoopbackRelay`] is an in-memory test
//! double that also enforces the server-side `MessageMeta` invariants of
//! §6 — unique `(sessionId, nonceHash)`, monotonic `(sessionId, seq)` per
//! sender — so integration tests can exercise the full send/receive path
//! without a live server.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use securechat_proto::Envelope;

use crate::error::CoreError;

#[async_trait]
pub trait RelayClient: Send + Sync {
    /// `msg:send` / `kep:init` / `kep:response` / `key:update` (§6) — hand
    /// an outbound envelope to the relay for fan-out to `envelope.receiver()`.
    async fn send_envelope(&self, envelope: Envelope) -> Result<(), CoreError>;

    /// Drain the inbox for `user_id` (the `msg:receive` stream, or the
    /// `/messages/relay` HTTPS fallback's pull side).
    async fn poll(&self, user_id: &str) -> Result<Vec<Envelope>, CoreError>;
}

fn cipher_seq(envelope: &Envelope) -> Option<u64> {
    match envelope {
        Envelope::Msg(f) => Some(f.seq),
        Envelope::FileMeta(f) => Some(f.cipher.seq),
        Envelope::FileChunk(f) => Some(f.cipher.seq),
        _ => None,
    }
}

fn cipher_nonce(envelope: &Envelope) -> Option<&str> {
    match envelope {
        Envelope::Msg(f) => Some(&f.nonce),
        Envelope::FileMeta(f) => Some(&f.cipher.nonce),
        Envelope::FileChunk(f) => Some(&f.cipher.nonce),
        _ => None,
    }
}

struct Inner {
    inboxes: HashMap<String, Vec<Envelope>>,
    seen_nonces: HashSet<(String, String)>,
    last_seq_by_sender: HashMap<(String, String), u64>,
}

/// In-memory stand-in for the relay, scoped to a single process — not a
/// production transport, just the metadata gate §6 describes the real
/// server enforcing.
pub struct LoopbackRelay {
    inner: Mutex<Inner>,
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                inboxes: HashMap::new(),
                seen_nonces: HashSet::new(),
                last_seq_by_sender: HashMap::new(),
            }),
        }
    }
}

impl Default for LoopbackRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayClient for LoopbackRelay {
    async fn send_envelope(&self, envelope: Envelope) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().expect("loopback relay mutex poisoned");

        if let (Some(seq), Some(nonce)) = (cipher_seq(&envelope), cipher_nonce(&envelope)) {
            let session_id = envelope.session_id().to_string();
            let sender = envelope.sender().to_string();

            let nonce_key = (session_id.clone(), nonce.to_string());
            if !inner.seen_nonces.insert(nonce_key) {
                return Err(CoreError::ReplayDetected("duplicate-nonce".into()));
            }

            let seq_key = (session_id, sender);
            let last = inner.last_seq_by_sender.get(&seq_key).copied().unwrap_or(0);
            if seq <= last {
                return Err(CoreError::ReplayDetected("seq".into()));
            }
            inner.last_seq_by_sender.insert(seq_key, seq);
        }

        inner
            .inboxes
            .entry(envelope.receiver().to_string())
            .or_default()
            .push(envelope);
        Ok(())
    }

    async fn poll(&self, user_id: &str) -> Result<Vec<Envelope>, CoreError> {
        let mut inner = self.inner.lock().expect("loopback relay mutex poisoned");
        Ok(inner.inboxes.remove(user_id).unwrap_or_default())
    }
}
