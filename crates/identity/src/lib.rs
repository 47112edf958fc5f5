//! securechat_identity — long-term identity keys, password-wrapped storage,
//! and publication/rotation (C2, §4.2).
//!
//! # Module layout
//! - `key`       — `IdentityKeyPair` (generate/sign/wrap/unwrap)
//! - `directory` — `KeyDirectory` trait (the server-side key publish/fetch
//!                 API of §6) plus an in-memory reference implementation
//! - `rotate`    — `rotate(password)` orchestration
//! - `error`     — unified error type

pub mod directory;
pub mod error;
pub mod key;
pub mod rotate;

pub use directory::{InMemoryKeyDirectory, KeyDirectory, KeyVersionRecord, PublishOutcome, PublishedIdentity};
pub use error::IdentityError;
pub use key::{IdentityKeyPair, WrappedIdentityKey};
pub use rotate::{rotate, RotationResult};
