//! `publishPublic`/`rotate` and the server-side key directory they talk to
//! (§4.2, §6 `/keys/*`).
//!
//! The real directory is an HTTPS service external to this core (§1). This
//! module defines the contract as a trait plus an in-memory reference
//! implementation that enforces the same invariants (version bump on
//! change, idempotent republish, tamper-evident `keyHash`) so the rest of
//! the workspace — and its tests — can depend on the behavior without a
//! live server.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use securechat_crypto::EcJwk;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::IdentityError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyVersionRecord {
    pub version: u32,
    pub key_hash: String,
    pub replaced_at: DateTime<Utc>,
}

/// Server-side view of a user's current public identity key (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedIdentity {
    pub user_id: String,
    pub jwk: EcJwk,
    pub key_hash: String,
    pub version: u32,
    pub previous_versions: Vec<KeyVersionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether `publish` observed a key change (used by callers deciding
/// whether to invalidate cached peer sessions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Unchanged,
    Rotated { new_version: u32 },
}

#[async_trait::async_trait]
pub trait KeyDirectory: Send + Sync {
    /// `publishPublic(jwk)` (§4.2). Rejects JWKs carrying `d` or any curve
    /// other than P-256 before ever touching storage.
    async fn publish(&self, user_id: &str, jwk: &EcJwk) -> Result<PublishOutcome, IdentityError>;

    /// `GET /keys/{userId}` (§6). Recomputes and checks `keyHash` on every
    /// read (§4.2 tamper check); a mismatch is `IntegrityError`.
    async fn get(&self, user_id: &str) -> Result<PublishedIdentity, IdentityError>;

    async fn get_history(&self, user_id: &str) -> Result<Vec<KeyVersionRecord>, IdentityError>;
}

#[derive(Default)]
pub struct InMemoryKeyDirectory {
    records: Arc<RwLock<HashMap<String, PublishedIdentity>>>,
}

impl InMemoryKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn reject_private_or_foreign_curve(jwk: &EcJwk) -> Result<(), IdentityError> {
    if jwk.d.is_some() {
        return Err(IdentityError::InvalidJwk("public key submission must not carry d".into()));
    }
    if jwk.kty != "EC" || jwk.crv != "P-256" {
        return Err(IdentityError::InvalidJwk(format!(
            "unsupported key type {}/{}",
            jwk.kty, jwk.crv
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl KeyDirectory for InMemoryKeyDirectory {
    async fn publish(&self, user_id: &str, jwk: &EcJwk) -> Result<PublishOutcome, IdentityError> {
        reject_private_or_foreign_curve(jwk)?;
        let hash = hex::encode(jwk.canonical_hash()?);
        let now = Utc::now();
        let mut records = self.records.write().await;

        match records.get_mut(user_id) {
            None => {
                records.insert(
                    user_id.to_string(),
                    PublishedIdentity {
                        user_id: user_id.to_string(),
                        jwk: jwk.clone(),
                        key_hash: hash,
                        version: 1,
                        previous_versions: Vec::new(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(PublishOutcome::Rotated { new_version: 1 })
            }
            Some(existing) => {
                if existing.key_hash == hash {
                    // P4: idempotent publish — version and history untouched.
                    Ok(PublishOutcome::Unchanged)
                } else {
                    existing.previous_versions.push(KeyVersionRecord {
                        version: existing.version,
                        key_hash: existing.key_hash.clone(),
                        replaced_at: now,
                    });
                    existing.version += 1;
                    existing.key_hash = hash;
                    existing.jwk = jwk.clone();
                    existing.updated_at = now;
                    Ok(PublishOutcome::Rotated {
                        new_version: existing.version,
                    })
                }
            }
        }
    }

    async fn get(&self, user_id: &str) -> Result<PublishedIdentity, IdentityError> {
        let records = self.records.read().await;
        let record = records
            .get(user_id)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(user_id.to_string()))?;
        let recomputed = hex::encode(record.jwk.canonical_hash()?);
        if recomputed != record.key_hash {
            return Err(IdentityError::IntegrityError);
        }
        Ok(record)
    }

    async fn get_history(&self, user_id: &str) -> Result<Vec<KeyVersionRecord>, IdentityError> {
        let records = self.records.read().await;
        records
            .get(user_id)
            .map(|r| r.previous_versions.clone())
            .ok_or_else(|| IdentityError::NotFound(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::IdentityKeyPair;

    #[tokio::test]
    async fn first_publish_is_version_one() {
        let dir = InMemoryKeyDirectory::new();
        let identity = IdentityKeyPair::generate();
        let outcome = dir.publish("alice", &identity.public_jwk()).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Rotated { new_version: 1 });
    }

    #[tokio::test]
    async fn republishing_same_key_is_idempotent() {
        // P4
        let dir = InMemoryKeyDirectory::new();
        let identity = IdentityKeyPair::generate();
        dir.publish("alice", &identity.public_jwk()).await.unwrap();
        let outcome = dir.publish("alice", &identity.public_jwk()).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Unchanged);
        let fetched = dir.get("alice").await.unwrap();
        assert_eq!(fetched.version, 1);
        assert!(fetched.previous_versions.is_empty());
    }

    #[tokio::test]
    async fn rotation_bumps_version_and_records_history() {
        let dir = InMemoryKeyDirectory::new();
        let first = IdentityKeyPair::generate();
        let second = IdentityKeyPair::generate();
        dir.publish("alice", &first.public_jwk()).await.unwrap();
        let outcome = dir.publish("alice", &second.public_jwk()).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Rotated { new_version: 2 });
        let history = dir.get_history("alice").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
    }

    #[tokio::test]
    async fn rejects_jwk_with_private_component() {
        let dir = InMemoryKeyDirectory::new();
        let identity = IdentityKeyPair::generate();
        let mut jwk = identity.public_jwk();
        jwk.d = Some("leaked".to_string());
        assert!(dir.publish("alice", &jwk).await.is_err());
    }

    #[tokio::test]
    async fn get_unknown_user_is_not_found() {
        let dir = InMemoryKeyDirectory::new();
        assert!(matches!(dir.get("nobody").await, Err(IdentityError::NotFound(_))));
    }
}
