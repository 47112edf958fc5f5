//! JWK (RFC 7517) encoding for P-256 keys, restricted to the subset this
//! protocol needs: `kty="EC"`, `crv="P-256"`, `x`, `y`, optional `d`.
//!
//! A JWK carrying `d` is a private key and MUST never be accepted where a
//! peer's *public* key is expected (§4.2 invariant, P6).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::CryptoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl EcJwk {
    pub fn from_public(public: &PublicKey) -> Self {
        let point = public.to_encoded_point(false);
        let x = point.x().expect("uncompressed SEC1 point carries x");
        let y = point.y().expect("uncompressed SEC1 point carries y");
        Self {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: URL_SAFE_NO_PAD.encode(x),
            y: URL_SAFE_NO_PAD.encode(y),
            d: None,
        }
    }

    /// JWK for a full keypair, including the private scalar `d`. Never
    /// publish this — it exists only for the locally wrapped-at-rest form.
    pub fn from_secret(secret: &SecretKey) -> Self {
        let mut jwk = Self::from_public(&secret.public_key());
        jwk.d = Some(URL_SAFE_NO_PAD.encode(secret.to_bytes()));
        jwk
    }

    /// Recover the public key, rejecting anything carrying `d`. This is the
    /// path used whenever a JWK arrives from the network as "someone's
    /// public key" (peer identity keys, KEP ephemerals).
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        self.validate_shape()?;
        if self.d.is_some() {
            return Err(CryptoError::InvalidJwk(
                "public JWK must not carry a d component".into(),
            ));
        }
        self.reconstruct_public()
    }

    pub fn to_secret_key(&self) -> Result<SecretKey, CryptoError> {
        self.validate_shape()?;
        let d = self
            .d
            .as_ref()
            .ok_or_else(|| CryptoError::InvalidJwk("private JWK missing d".into()))?;
        let mut bytes = URL_SAFE_NO_PAD
            .decode(d)
            .map_err(|e| CryptoError::InvalidJwk(format!("bad d: {e}")))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|_| CryptoError::InvalidJwk("d is not a valid P-256 scalar".into()));
        bytes.zeroize();
        secret
    }

    fn validate_shape(&self) -> Result<(), CryptoError> {
        if self.kty != "EC" {
            return Err(CryptoError::InvalidJwk(format!("unsupported kty {:?}", self.kty)));
        }
        if self.crv != "P-256" {
            return Err(CryptoError::InvalidJwk(format!("unsupported crv {:?}", self.crv)));
        }
        Ok(())
    }

    fn reconstruct_public(&self) -> Result<PublicKey, CryptoError> {
        let x = URL_SAFE_NO_PAD
            .decode(&self.x)
            .map_err(|e| CryptoError::InvalidJwk(format!("bad x: {e}")))?;
        let y = URL_SAFE_NO_PAD
            .decode(&self.y)
            .map_err(|e| CryptoError::InvalidJwk(format!("bad y: {e}")))?;
        if x.len() != 32 || y.len() != 32 {
            return Err(CryptoError::InvalidJwk("x/y must each be 32 bytes".into()));
        }
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);
        PublicKey::from_sec1_bytes(&sec1)
            .map_err(|_| CryptoError::InvalidJwk("x/y is not a point on P-256".into()))
    }

    /// `SHA-256(canonical JSON)` used for the server-side `keyHash` tamper
    /// check (§4.2) — fixed field order, `d` never included.
    pub fn canonical_hash(&self) -> Result<[u8; 32], CryptoError> {
        let canonical = serde_json::json!({
            "kty": self.kty,
            "crv": self.crv,
            "x": self.x,
            "y": self.y,
        });
        let bytes = serde_json::to_vec(&canonical)?;
        Ok(Sha256::digest(bytes).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::SecretKey;
    use rand_core::OsRng;

    #[test]
    fn public_roundtrip() {
        let secret = SecretKey::random(&mut OsRng);
        let jwk = EcJwk::from_public(&secret.public_key());
        let recovered = jwk.to_public_key().unwrap();
        assert_eq!(recovered, secret.public_key());
    }

    #[test]
    fn rejects_d_on_public_key_path() {
        let secret = SecretKey::random(&mut OsRng);
        let jwk = EcJwk::from_secret(&secret);
        assert!(jwk.d.is_some());
        assert!(jwk.to_public_key().is_err());
    }

    #[test]
    fn rejects_wrong_curve_label() {
        let secret = SecretKey::random(&mut OsRng);
        let mut jwk = EcJwk::from_public(&secret.public_key());
        jwk.crv = "P-384".to_string();
        assert!(jwk.to_public_key().is_err());
    }

    #[test]
    fn canonical_hash_is_stable_and_d_free() {
        let secret = SecretKey::random(&mut OsRng);
        let with_d = EcJwk::from_secret(&secret);
        let without_d = EcJwk::from_public(&secret.public_key());
        assert_eq!(with_d.canonical_hash().unwrap(), without_d.canonical_hash().unwrap());
    }
}
