//! Key derivation functions.
//!
//! `derive_password_key` — PBKDF2-HMAC-SHA256, derives the 32-byte key used
//! to wrap identity private keys (§4.2) and to encrypt session-store
//! records (§4.4).
//!
//! `hkdf_expand` / `derive_root_key` / `derive_directional_key` —
//! HKDF-SHA256, used for KEP session key material (§4.3).

use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// Floor enforced regardless of caller-supplied configuration (§4.1).
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// 32-byte key derived from a user password. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct DerivedKey(pub [u8; 32]);

/// Derive a 32-byte key from a user password + 16-byte salt via
/// PBKDF2-HMAC-SHA256. `iterations` must be at least [`MIN_PBKDF2_ITERATIONS`].
pub fn derive_password_key(
    password: &[u8],
    salt: &[u8; 16],
    iterations: u32,
) -> Result<DerivedKey, CryptoError> {
    if iterations < MIN_PBKDF2_ITERATIONS {
        return Err(CryptoError::KeyDerivation(format!(
            "PBKDF2 iteration count {iterations} is below the {MIN_PBKDF2_ITERATIONS} floor"
        )));
    }
    let mut output = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
    Ok(DerivedKey(output))
}

/// Generate a fresh random 16-byte salt (store alongside the wrapped key —
/// it is not itself secret).
pub fn generate_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Expand `ikm` + `info` into `output.len()` bytes via HKDF-SHA256.
/// `salt = None` is equivalent to the RFC 5869 "no salt provided" case.
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// `rootKey = HKDF(Z, salt = ts1||ts2, info = "SecureChat/root/v1")` (§4.3).
pub fn derive_root_key(shared_secret: &[u8], salt: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut key = [0u8; 32];
    hkdf_expand(shared_secret, Some(salt), b"SecureChat/root/v1", &mut key)?;
    Ok(key)
}

/// `{send,recv}Key = HKDF(rootKey, salt = "", info = <role-direction>)` (§4.3).
/// `info` is one of `b"A\xe2\x86\x92B/v1"` / `b"B\xe2\x86\x92A/v1"` — see
/// `securechat_kep::info` for the exact byte strings used on the wire.
pub fn derive_directional_key(root_key: &[u8; 32], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut key = [0u8; 32];
    hkdf_expand(root_key, None, info, &mut key)?;
    Ok(key)
}
