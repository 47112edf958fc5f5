//! SessionVault: in-memory key material unlocked by the user password.
//!
//! Holds the 32-byte store-encryption key in memory. When the caller locks
//! (or auto-lock fires), the key is zeroized from memory. Named
//! `SessionVault` to avoid confusion with C2's identity-key vault — this one
//! guards session-store records, not the long-term identity private key.
//!
//! Auto-lock: configurable inactivity timer, default 1 hour (§5 "lifetime
//! ≤1 hour or until logout").

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use zeroize::ZeroizeOnDrop;

use crate::error::StoreError;
use securechat_crypto::kdf::{derive_password_key, generate_salt};

const DEFAULT_AUTO_LOCK_SECS: u64 = 3600;

#[derive(ZeroizeOnDrop)]
struct VaultInner {
    key: [u8; 32],
    #[zeroize(skip)]
    last_activity: Instant,
    #[zeroize(skip)]
    auto_lock_secs: u64,
}

/// Thread-safe vault handle. Clone to share across store callers.
#[derive(Clone)]
pub struct SessionVault {
    inner: Arc<RwLock<Option<VaultInner>>>,
}

impl SessionVault {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(None)) }
    }

    /// Unlock with the user password and a 16-byte PBKDF2 salt. Call after
    /// successful login, before any store read/write.
    pub async fn unlock(
        &self,
        password: &[u8],
        salt: &[u8; 16],
        pbkdf2_iterations: u32,
    ) -> Result<(), StoreError> {
        let key = derive_password_key(password, salt, pbkdf2_iterations)?;
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner {
            key: key.0,
            last_activity: Instant::now(),
            auto_lock_secs: DEFAULT_AUTO_LOCK_SECS,
        });
        Ok(())
    }

    /// Unlock with an already-derived key (e.g. cached from a prior unlock).
    pub async fn unlock_with_key(&self, key: [u8; 32]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner {
            key,
            last_activity: Instant::now(),
            auto_lock_secs: DEFAULT_AUTO_LOCK_SECS,
        });
        Ok(())
    }

    pub async fn lock(&self) {
        let mut guard = self.inner.write().await;
        *guard = None;
    }

    pub async fn is_locked(&self) -> bool {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(inner) => {
                if inner.auto_lock_secs > 0 && inner.last_activity.elapsed() > Duration::from_secs(inner.auto_lock_secs) {
                    drop(guard);
                    self.lock().await;
                    return true;
                }
                false
            }
            None => true,
        }
    }

    /// 0 disables auto-lock.
    pub async fn set_auto_lock_timeout(&self, seconds: u64) {
        let mut guard = self.inner.write().await;
        if let Some(ref mut inner) = *guard {
            inner.auto_lock_secs = seconds;
        }
    }

    pub async fn touch(&self) {
        let mut guard = self.inner.write().await;
        if let Some(ref mut inner) = *guard {
            inner.last_activity = Instant::now();
        }
    }

    /// Access the raw key for an encrypt/decrypt operation. Errs if locked
    /// or if auto-lock has expired. Touches the activity timer on success.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[u8; 32]) -> Result<R, StoreError>,
    {
        if self.is_locked().await {
            return Err(StoreError::VaultLocked);
        }
        let mut guard = self.inner.write().await;
        match guard.as_mut() {
            Some(inner) => {
                inner.last_activity = Instant::now();
                f(&inner.key)
            }
            None => Err(StoreError::VaultLocked),
        }
    }

    pub async fn time_until_lock(&self) -> Option<u64> {
        let guard = self.inner.read().await;
        guard.as_ref().map(|inner| {
            if inner.auto_lock_secs == 0 {
                return u64::MAX;
            }
            inner.auto_lock_secs.saturating_sub(inner.last_activity.elapsed().as_secs())
        })
    }
}

impl Default for SessionVault {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a fresh random salt for a new local account (stored alongside
/// the wrapped key — it is not itself secret).
pub fn new_vault_salt() -> [u8; 16] {
    generate_salt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn locked_vault_rejects_key_access() {
        let vault = SessionVault::new();
        assert!(vault.is_locked().await);
        let result = vault.with_key(|_| Ok(())).await;
        assert!(matches!(result, Err(StoreError::VaultLocked)));
    }

    #[tokio::test]
    async fn unlock_then_lock_round_trips() {
        let vault = SessionVault::new();
        let salt = new_vault_salt();
        vault.unlock(b"hunter2", &salt, 100_000).await.unwrap();
        assert!(!vault.is_locked().await);
        vault.lock().await;
        assert!(vault.is_locked().await);
    }
}
