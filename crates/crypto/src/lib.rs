//! securechat_crypto — cryptographic primitives for the SecureChat E2EE core.
//!
//! # Design principles
//! - No custom crypto; every primitive comes from an audited Rust crate.
//! - Zeroize all secret material on drop.
//! - Primitive failures collapse into a single [`CryptoError`]; no partial
//!   output (key bits, plaintext) is ever returned alongside an `Err`.
//!
//! # Module layout
//! - `aead`    — AES-256-GCM encrypt/decrypt helpers
//! - `ecdh`    — P-256 ephemeral ECDH key agreement
//! - `signing` — P-256 ECDSA sign/verify
//! - `jwk`     — JWK encode/decode for P-256 public and private keys
//! - `kdf`     — PBKDF2-SHA256 (password hardening) and HKDF-SHA256 (session
//!               key schedule)
//! - `error`   — unified error type

pub mod aead;
pub mod ecdh;
pub mod error;
pub mod jwk;
pub mod kdf;
pub mod signing;

pub use error::CryptoError;
pub use jwk::EcJwk;
