//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM. Key size: 32 bytes. IV: 12 bytes (random, fresh per
//! call). Tag: 16 bytes (128 bits), appended to the ciphertext by the
//! underlying crate.
//!
//! Ciphertext wire format returned by [`encrypt`]:
//!   [ iv (12 bytes) | ciphertext + tag ]
//!
//! Callers that already carry an explicit `iv` field on the wire (the
//! envelope format does — see `securechat_transport`) should use
//! [`encrypt_with_iv`] / [`decrypt_with_iv`] instead and transmit the IV
//! out of band rather than paying for it twice.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

fn cipher(key: &[u8; 32]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey("bad AES-256-GCM key length".into()))
}

/// Generate a fresh random 12-byte IV.
pub fn random_iv() -> [u8; IV_LEN] {
    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
    let mut out = [0u8; IV_LEN];
    out.copy_from_slice(&nonce);
    out
}

/// Encrypt `plaintext` under `key` with an explicit, caller-supplied 12-byte
/// IV. Returns raw ciphertext+tag (no IV prefix) — use when the IV already
/// travels as its own envelope field.
pub fn encrypt_with_iv(
    key: &[u8; 32],
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher(key)?;
    let nonce = Nonce::from_slice(iv);
    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Decrypt raw ciphertext+tag under `key`/`iv`/`aad`. On tag mismatch
/// returns [`CryptoError::AeadDecrypt`] — the caller maps this to
/// `MITMDetected(reason="auth-tag")`.
pub fn decrypt_with_iv(
    key: &[u8; 32],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = cipher(key)?;
    let nonce = Nonce::from_slice(iv);
    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

/// Encrypt `plaintext` with a 32-byte key, prepending a freshly generated
/// random 12-byte IV to the output.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let iv = random_iv();
    let ciphertext = encrypt_with_iv(key, &iv, plaintext, aad)?;
    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (iv || ciphertext+tag) produced by [`encrypt`].
pub fn decrypt(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (iv_bytes, ct) = data.split_at(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);
    decrypt_with_iv(key, &iv, ct, aad)
}

/// Encrypt a 32-byte key with another 32-byte wrapping key (key transport),
/// used by `securechat_identity` to wrap a private key at rest.
pub fn wrap_key(wrap_key: &[u8; 32], key_to_wrap: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    encrypt(wrap_key, key_to_wrap, b"securechat-key-wrap")
}

/// Decrypt a wrapped key produced by [`wrap_key`].
pub fn unwrap_key(wrap_key: &[u8; 32], wrapped: &[u8]) -> Result<[u8; 32], CryptoError> {
    let plaintext = decrypt(wrap_key, wrapped, b"securechat-key-wrap")?;
    if plaintext.len() != 32 {
        return Err(CryptoError::InvalidKey("unwrapped key has wrong length".into()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&plaintext);
    Ok(out)
}
