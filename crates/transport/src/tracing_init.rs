//! `init_tracing()` — this repo is a library workspace with no binary
//! entrypoint, so there's no `main` to call
//! `tracing_subscriber::fmt().init()` the way the teacher's
//! `apps/dl-secure-channel/src-tauri/src/lib.rs` does. Tests and any
//! embedding binary call this instead, with the same
//! `EnvFilter::try_from_default_env` fallback pattern.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber. Safe to call more than once —
/// later calls are no-ops (`set_global_default` fails silently if a
/// subscriber is already installed, same as the teacher's pattern).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("securechat_transport=info,securechat_store=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
