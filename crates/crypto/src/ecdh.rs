//! P-256 (secp256r1) ECDH ephemeral key agreement.
//!
//! Public keys are exchanged as JWK (see [`crate::jwk`]); the raw shared
//! secret is never used directly as a key — it is always passed into HKDF
//! by the caller (`securechat_kep`).

use p256::ecdh::{EphemeralSecret, SharedSecret};
use p256::PublicKey;
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::jwk::EcJwk;

/// A fresh, single-use ECDH key pair. `secret` MUST be discarded after one
/// `diffie_hellman` call — KEP rounds never reuse an ephemeral.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_jwk(&self) -> EcJwk {
        EcJwk::from_public(&self.public)
    }

    /// Compute `ECDH(self.secret, their_public)`. Consumes `self` so the
    /// ephemeral secret cannot accidentally be reused for a second round.
    pub fn diffie_hellman(self, their_public: &EcJwk) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        let their_public = their_public.to_public_key()?;
        let shared: SharedSecret = self.secret.diffie_hellman(&their_public);
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_ends_agree() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        let a_pub = a.public_jwk();
        let b_pub = b.public_jwk();
        let za = a.diffie_hellman(&b_pub).unwrap();
        let zb = b.diffie_hellman(&a_pub).unwrap();
        assert_eq!(*za, *zb);
    }

    #[test]
    fn mismatched_ends_disagree() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        let c = EphemeralKeyPair::generate();
        let b_pub = b.public_jwk();
        let c_pub = c.public_jwk();
        let za = a.diffie_hellman(&b_pub).unwrap();
        let a2 = EphemeralKeyPair::generate();
        let za2 = a2.diffie_hellman(&c_pub).unwrap();
        assert_ne!(*za, *za2);
    }
}
