//! `rotate(password)` (§4.2): generate a fresh identity, wrap it locally,
//! publish the new public half.
//!
//! Marking active sessions stale and forcing renegotiation via KEP is the
//! caller's responsibility (this crate has no notion of sessions — that
//! lives in `securechat_store`/`securechat_transport`). Callers MUST treat
//! every existing session as stale as soon as this function returns
//! successfully, per §4.2: "on success all active sessions MUST be marked
//! stale and renegotiated via KEP before next message."

use crate::directory::{KeyDirectory, PublishOutcome};
use crate::error::IdentityError;
use crate::key::{IdentityKeyPair, WrappedIdentityKey};

pub struct RotationResult {
    pub identity: IdentityKeyPair,
    pub wrapped: WrappedIdentityKey,
    pub outcome: PublishOutcome,
}

pub async fn rotate(
    user_id: &str,
    password: &[u8],
    pbkdf2_iterations: u32,
    directory: &dyn KeyDirectory,
) -> Result<RotationResult, IdentityError> {
    let identity = IdentityKeyPair::generate();
    let wrapped = identity.wrap(password, pbkdf2_iterations)?;
    let outcome = directory.publish(user_id, &identity.public_jwk()).await?;
    Ok(RotationResult {
        identity,
        wrapped,
        outcome,
    })
}
