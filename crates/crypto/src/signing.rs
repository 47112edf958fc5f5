//! P-256 ECDSA signatures (SHA-256 digest via the `ecdsa` crate's default
//! digest binding for `p256`). Used by `securechat_identity` to sign KEP
//! ephemerals and by `securechat_kep` to verify them.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::SecretKey;

use crate::error::CryptoError;
use crate::jwk::EcJwk;

/// Sign `message` with a P-256 private key, returning a DER-encoded
/// signature. Not deterministic (RFC 6979 is not required by the protocol).
pub fn sign(secret: &SecretKey, message: &[u8]) -> Vec<u8> {
    let signing_key = SigningKey::from(secret);
    let sig: Signature = signing_key.sign(message);
    sig.to_der().as_bytes().to_vec()
}

/// Verify a DER-encoded P-256/SHA-256 signature against a public JWK.
/// Returns [`CryptoError::SignatureVerification`] on any failure — bad JWK
/// shape, malformed signature, or a genuine mismatch are all folded into
/// the single kind the caller maps to `MITMDetected`.
pub fn verify(public_jwk: &EcJwk, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let public = public_jwk
        .to_public_key()
        .map_err(|_| CryptoError::SignatureVerification)?;
    let verifying_key = VerifyingKey::from(&public);
    let sig = Signature::from_der(signature).map_err(|_| CryptoError::SignatureVerification)?;
    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::SignatureVerification)
}
