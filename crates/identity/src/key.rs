//! Long-term P-256 identity signing key pair (§4.2) — `IdentityKeyPair`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::SecretKey;
use rand_core::OsRng;
use securechat_crypto::{aead, jwk::EcJwk, kdf};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::IdentityError;

/// One per user. The private half never leaves the device unwrapped.
pub struct IdentityKeyPair {
    secret: SecretKey,
}

/// The password-wrapped form persisted at rest: `{wrappedKey, salt, iv}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedIdentityKey {
    /// base64 `AES-GCM(key = PBKDF2(password, salt, iters), iv, JWK(priv))`.
    pub wrapped_key: String,
    pub salt: [u8; 16],
    pub iv: [u8; 12],
}

impl IdentityKeyPair {
    /// `generateIdentity()` (§4.2).
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        Self { secret }
    }

    pub fn public_jwk(&self) -> EcJwk {
        EcJwk::from_public(&self.secret.public_key())
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        securechat_crypto::signing::sign(&self.secret, message)
    }

    /// Short, human-comparable fingerprint: hex SHA-256 of the canonical
    /// public JWK. Used for out-of-band verification, never as a secret.
    pub fn fingerprint(&self) -> Result<String, IdentityError> {
        let hash = self.public_jwk().canonical_hash()?;
        Ok(hex::encode(hash))
    }

    /// `wrapPrivate(priv, password)` (§4.2).
    pub fn wrap(&self, password: &[u8], pbkdf2_iterations: u32) -> Result<WrappedIdentityKey, IdentityError> {
        let salt = kdf::generate_salt();
        let key = kdf::derive_password_key(password, &salt, pbkdf2_iterations)?;
        let iv = aead::random_iv();
        let jwk = EcJwk::from_secret(&self.secret);
        let mut plaintext = serde_json::to_vec(&jwk)?;
        let wrapped = aead::encrypt_with_iv(&key.0, &iv, &plaintext, b"securechat-identity-wrap")?;
        plaintext.zeroize();
        Ok(WrappedIdentityKey {
            wrapped_key: STANDARD.encode(wrapped),
            salt,
            iv,
        })
    }

    /// `unwrapPrivate(…, password)` — fails with [`IdentityError::BadPassword`]
    /// on tag mismatch (§4.2).
    pub fn unwrap(
        wrapped: &WrappedIdentityKey,
        password: &[u8],
        pbkdf2_iterations: u32,
    ) -> Result<Self, IdentityError> {
        let key = kdf::derive_password_key(password, &wrapped.salt, pbkdf2_iterations)?;
        let ciphertext = STANDARD.decode(&wrapped.wrapped_key)?;
        let mut plaintext = aead::decrypt_with_iv(&key.0, &wrapped.iv, &ciphertext, b"securechat-identity-wrap")
            .map_err(|_| IdentityError::BadPassword)?;
        let jwk: EcJwk = serde_json::from_slice(&plaintext)?;
        plaintext.zeroize();
        let secret = jwk.to_secret_key()?;
        Ok(Self { secret })
    }
}
