//! Environment-variable configuration (§7), mirroring the teacher's
//! `DL_IDS_URL`/`DL_RLY_URL` pattern: one `Config::from_env()` that reads
//! overrides with sane defaults, so tests can shrink the stale-timestamp
//! window or the PBKDF2 floor without sleeping or waiting on slow KDFs.

use std::env;

use securechat_crypto::kdf::MIN_PBKDF2_ITERATIONS;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL for the HTTPS fallback API of §6.
    pub relay_url: String,
    /// PBKDF2 iteration floor (§4.1: "≥100,000 iterations").
    pub pbkdf2_iterations: u32,
    /// C4 session-encryption-key cache lifetime, in seconds.
    pub vault_auto_lock_secs: u64,
    /// Replay staleness window of §4.5 step 2, in milliseconds.
    pub stale_window_ms: i64,
    /// File chunking policy constant of §4.5, in bytes.
    pub chunk_size_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: "https://relay.securechat.example".to_string(),
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
            vault_auto_lock_secs: 3600,
            stale_window_ms: 120_000,
            chunk_size_bytes: 64 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            relay_url: env::var("SECURECHAT_RELAY_URL").unwrap_or(default.relay_url),
            pbkdf2_iterations: env_or("SECURECHAT_PBKDF2_ITERS", default.pbkdf2_iterations).max(MIN_PBKDF2_ITERATIONS),
            vault_auto_lock_secs: env_or("SECURECHAT_VAULT_AUTO_LOCK_SECS", default.vault_auto_lock_secs),
            stale_window_ms: env_or("SECURECHAT_STALE_WINDOW_MS", default.stale_window_ms),
            chunk_size_bytes: env_or("SECURECHAT_CHUNK_SIZE_BYTES", default.chunk_size_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = Config::default();
        assert_eq!(config.stale_window_ms, 120_000);
        assert_eq!(config.chunk_size_bytes, 65_536);
        assert_eq!(config.vault_auto_lock_secs, 3600);
        assert!(config.pbkdf2_iterations >= MIN_PBKDF2_ITERATIONS);
    }

    #[test]
    fn pbkdf2_override_cannot_go_below_the_floor() {
        env::set_var("SECURECHAT_PBKDF2_ITERS", "10");
        let config = Config::from_env();
        assert_eq!(config.pbkdf2_iterations, MIN_PBKDF2_ITERATIONS);
        env::remove_var("SECURECHAT_PBKDF2_ITERS");
    }
}
