//! Security events surfaced by the store to registered callbacks (§7
//! `onReplayDetected`/`onInvalidSignature`). Grounded in the teacher's
//! `RiskEventRow` shape, carried here as a plain struct rather than a DB row
//! since there is no UI to read a persisted feed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SecurityEventKind {
    ReplayDetected,
    InvalidSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub session_id: String,
    pub seq: Option<u64>,
    pub timestamp: Option<i64>,
    pub reason: String,
}
