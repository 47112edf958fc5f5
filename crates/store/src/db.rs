//! Database abstraction over SQLite via sqlx.

use std::path::Path;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use crate::{error::StoreError, vault::SessionVault};

const STORE_AAD: &[u8] = b"securechat-store-v1";

/// Central store handle. Cheap to clone (`SqlitePool` is internally `Arc`'d).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
    pub vault: SessionVault,
}

impl Store {
    /// Open (or create) the SQLite database at `db_path`, running all
    /// pending migrations.
    ///
    /// WAL journal mode and foreign-key enforcement are set at connection
    /// time here — not inside a migration, since SQLite forbids changing
    /// `journal_mode` inside a transaction and sqlx wraps every migration in
    /// one.
    pub async fn open(db_path: &Path, vault: SessionVault) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self { pool, vault })
    }

    /// Encrypt a plaintext value with the vault key.
    pub async fn encrypt_value(&self, plaintext: &[u8]) -> Result<String, StoreError> {
        self.vault
            .with_key(|key| {
                let ct = securechat_crypto::aead::encrypt(key, plaintext, STORE_AAD)?;
                Ok(URL_SAFE_NO_PAD.encode(ct))
            })
            .await
    }

    /// Decrypt a vault-encrypted value.
    pub async fn decrypt_value(&self, b64: &str) -> Result<Vec<u8>, StoreError> {
        let ct = URL_SAFE_NO_PAD
            .decode(b64)
            .map_err(|e| StoreError::Crypto(securechat_crypto::CryptoError::Base64Decode(e)))?;

        self.vault
            .with_key(|key| {
                let pt = securechat_crypto::aead::decrypt(key, &ct, STORE_AAD)?;
                Ok(pt.to_vec())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{new_vault_salt, SessionVault};
    use std::path::PathBuf;
    use uuid::Uuid;

    async fn temp_store() -> (Store, PathBuf) {
        let db_path = PathBuf::from(format!("/tmp/securechat-store-test-{}.db", Uuid::new_v4()));
        let vault = SessionVault::new();
        vault.unlock(b"hunter2", &new_vault_salt(), 100_000).await.unwrap();
        let store = Store::open(&db_path, vault).await.expect("open store");
        (store, db_path)
    }

    fn cleanup(db_path: &PathBuf) {
        let _ = std::fs::remove_file(db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[tokio::test]
    async fn sessions_table_rejects_a_second_row_for_the_same_pair() {
        let (store, db_path) = temp_store().await;

        sqlx::query(
            "INSERT INTO sessions (id, local_user_id, peer_user_id, root_key_enc, send_key_enc, recv_key_enc) VALUES (?, ?, ?, 'x', 'x', 'x')",
        )
        .bind("sid-1")
        .bind("alice")
        .bind("bob")
        .execute(&store.pool)
        .await
        .expect("insert first session");

        let second = sqlx::query(
            "INSERT INTO sessions (id, local_user_id, peer_user_id, root_key_enc, send_key_enc, recv_key_enc) VALUES (?, ?, ?, 'y', 'y', 'y')",
        )
        .bind("sid-2")
        .bind("alice")
        .bind("bob")
        .execute(&store.pool)
        .await;

        assert!(second.is_err());
        cleanup(&db_path);
    }

    #[tokio::test]
    async fn encrypt_decrypt_round_trips_through_the_vault() {
        let (store, db_path) = temp_store().await;
        let ct = store.encrypt_value(b"top secret root key material").await.unwrap();
        let pt = store.decrypt_value(&ct).await.unwrap();
        assert_eq!(pt, b"top secret root key material");
        cleanup(&db_path);
    }
}
