//! The two-round signed-ECDH handshake itself (§4.3): `initiate` (A, round
//! 1), `respond` (B, round 2), `complete` (A, finishes round 2).
//!
//! These functions are pure with respect to I/O: the caller (transport
//! layer) supplies `now_ms`, fetches peer identity public keys from the
//! `securechat_identity::KeyDirectory`, and is responsible for the 30s
//! round timeout and for persisting the resulting [`SessionKeys`] into the
//! session store. Nothing here touches a clock or the network directly —
//! same shape as the teacher's `x3dh::initiate`/`x3dh::respond`.

use securechat_crypto::ecdh::EphemeralKeyPair;
use securechat_crypto::{kdf, signing, EcJwk};
use zeroize::ZeroizeOnDrop;

use crate::error::KepError;
use crate::messages::{m1_transcript, m2_transcript, KepInitMessage, KepResponseMessage};

/// Timestamps outside this window abort the handshake (§4.3).
pub const TIMESTAMP_SKEW_MS: i64 = 120_000;
/// A KEP round that hasn't completed within this long is abandoned by the
/// caller (§5); enforced by the transport layer, not here.
pub const ROUND_TIMEOUT_SECS: u64 = 30;

/// Literal HKDF `info` strings from §4.3 — not templated with real user
/// ids, they denote handshake *roles* (initiator→responder / vice versa).
pub const INFO_A_TO_B: &[u8] = "A→B/v1".as_bytes();
pub const INFO_B_TO_A: &[u8] = "B→A/v1".as_bytes();

/// The three keys a completed (or rotated) KEP round yields.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    root_key: [u8; 32],
    send_key: [u8; 32],
    recv_key: [u8; 32],
}

impl SessionKeys {
    pub fn root_key(&self) -> [u8; 32] {
        self.root_key
    }
    pub fn send_key(&self) -> [u8; 32] {
        self.send_key
    }
    pub fn recv_key(&self) -> [u8; 32] {
        self.recv_key
    }
}

/// Held by the initiator between round 1 and round 2 — carries the
/// ephemeral secret that must not be reused or persisted.
pub struct PendingInit {
    pub message: KepInitMessage,
    ephemeral: EphemeralKeyPair,
    ts1: i64,
}

fn check_timestamp(ts: i64, now_ms: i64) -> Result<(), KepError> {
    if (now_ms - ts).abs() > TIMESTAMP_SKEW_MS {
        return Err(KepError::TimestampOutOfRange {
            ts,
            now: now_ms,
            skew_ms: TIMESTAMP_SKEW_MS,
        });
    }
    Ok(())
}

fn root_salt(ts1: i64, ts2: i64) -> Vec<u8> {
    let mut salt = Vec::with_capacity(16);
    salt.extend_from_slice(&ts1.to_be_bytes());
    salt.extend_from_slice(&ts2.to_be_bytes());
    salt
}

/// Round 1 (A → B, `KEP_INIT`).
pub fn initiate(
    session_id: &str,
    a_id: &str,
    b_id: &str,
    a_identity_secret: &p256::SecretKey,
    now_ms: i64,
) -> Result<PendingInit, KepError> {
    let ephemeral = EphemeralKeyPair::generate();
    let ea_pub = ephemeral.public_jwk();
    let transcript = m1_transcript(session_id, a_id, b_id, &ea_pub, now_ms)
        .map_err(|e| KepError::Malformed(e.to_string()))?;
    let sig1 = signing::sign(a_identity_secret, &transcript);

    Ok(PendingInit {
        message: KepInitMessage {
            session_id: session_id.to_string(),
            sender: a_id.to_string(),
            receiver: b_id.to_string(),
            ephemeral_pub: ea_pub,
            ts1: now_ms,
            sig1,
        },
        ephemeral,
        ts1: now_ms,
    })
}

pub struct ResponseOutcome {
    pub message: KepResponseMessage,
    pub keys: SessionKeys,
}

/// Round 2 (B → A, `KEP_RESPONSE`).
pub fn respond(
    init: &KepInitMessage,
    a_identity_pub: &EcJwk,
    b_identity_secret: &p256::SecretKey,
    now_ms: i64,
) -> Result<ResponseOutcome, KepError> {
    check_timestamp(init.ts1, now_ms)?;

    let m1 = m1_transcript(&init.session_id, &init.sender, &init.receiver, &init.ephemeral_pub, init.ts1)
        .map_err(|e| KepError::Malformed(e.to_string()))?;
    signing::verify(a_identity_pub, &m1, &init.sig1).map_err(|_| KepError::InvalidSignature { round: 1 })?;

    let eb = EphemeralKeyPair::generate();
    let eb_pub = eb.public_jwk();
    let shared = eb.diffie_hellman(&init.ephemeral_pub)?;
    let root_key = kdf::derive_root_key(&shared[..], &root_salt(init.ts1, now_ms))?;
    let send_key = kdf::derive_directional_key(&root_key, INFO_B_TO_A)?;
    let recv_key = kdf::derive_directional_key(&root_key, INFO_A_TO_B)?;

    let m2 = m2_transcript(
        &init.session_id,
        &init.sender,
        &init.receiver,
        &init.ephemeral_pub,
        &eb_pub,
        init.ts1,
        now_ms,
    )
    .map_err(|e| KepError::Malformed(e.to_string()))?;
    let sig2 = signing::sign(b_identity_secret, &m2);

    Ok(ResponseOutcome {
        message: KepResponseMessage {
            session_id: init.session_id.clone(),
            sender: init.receiver.clone(),
            receiver: init.sender.clone(),
            ephemeral_pub: eb_pub,
            ts1: init.ts1,
            ts2: now_ms,
            sig2,
        },
        keys: SessionKeys {
            root_key,
            send_key,
            recv_key,
        },
    })
}

/// A finishes round 2: verify `sig2`, derive the mirror-image directional
/// keys, discard the ephemeral secret (consumed by value, so it cannot be
/// reused).
pub fn complete(
    init: PendingInit,
    response: &KepResponseMessage,
    b_identity_pub: &EcJwk,
    now_ms: i64,
) -> Result<SessionKeys, KepError> {
    check_timestamp(response.ts2, now_ms)?;

    let m2 = m2_transcript(
        &init.message.session_id,
        &init.message.sender,
        &init.message.receiver,
        &init.message.ephemeral_pub,
        &response.ephemeral_pub,
        init.ts1,
        response.ts2,
    )
    .map_err(|e| KepError::Malformed(e.to_string()))?;
    signing::verify(b_identity_pub, &m2, &response.sig2).map_err(|_| KepError::InvalidSignature { round: 2 })?;

    let shared = init.ephemeral.diffie_hellman(&response.ephemeral_pub)?;
    let root_key = kdf::derive_root_key(&shared[..], &root_salt(init.ts1, response.ts2))?;
    let send_key = kdf::derive_directional_key(&root_key, INFO_A_TO_B)?;
    let recv_key = kdf::derive_directional_key(&root_key, INFO_B_TO_A)?;

    Ok(SessionKeys {
        root_key,
        send_key,
        recv_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::SecretKey;
    use rand_core::OsRng;
    use securechat_crypto::EcJwk;

    fn identity() -> (SecretKey, EcJwk) {
        let secret = SecretKey::random(&mut OsRng);
        let public = EcJwk::from_public(&secret.public_key());
        (secret, public)
    }

    #[test]
    fn handshake_yields_symmetric_keys() {
        // P7
        let (a_secret, a_pub) = identity();
        let (b_secret, b_pub) = identity();

        let init = initiate("s1", "alice", "bob", &a_secret, 1_000).unwrap();
        let outcome = respond(&init.message, &a_pub, &b_secret, 1_050).unwrap();
        let a_keys = complete(init, &outcome.message, &b_pub, 1_100).unwrap();

        assert_eq!(a_keys.root_key(), outcome.keys.root_key());
        assert_eq!(a_keys.send_key(), outcome.keys.recv_key());
        assert_eq!(a_keys.recv_key(), outcome.keys.send_key());
    }

    #[test]
    fn tampered_init_signature_is_rejected() {
        let (a_secret, a_pub) = identity();
        let (b_secret, _) = identity();
        let mut init = initiate("s1", "alice", "bob", &a_secret, 1_000).unwrap();
        init.message.sender = "mallory".to_string(); // mutate signed field after signing
        assert!(matches!(
            respond(&init.message, &a_pub, &b_secret, 1_050),
            Err(KepError::InvalidSignature { round: 1 })
        ));
    }

    #[test]
    fn stale_init_timestamp_is_rejected() {
        let (a_secret, a_pub) = identity();
        let (b_secret, _) = identity();
        let init = initiate("s1", "alice", "bob", &a_secret, 0).unwrap();
        let err = respond(&init.message, &a_pub, &b_secret, 200_000).unwrap_err();
        assert!(matches!(err, KepError::TimestampOutOfRange { .. }));
    }

    #[test]
    fn wrong_responder_signature_is_rejected() {
        let (a_secret, a_pub) = identity();
        let (b_secret, _wrong_pub) = identity();
        let (_, attacker_pub) = identity();
        let init = initiate("s1", "alice", "bob", &a_secret, 1_000).unwrap();
        let outcome = respond(&init.message, &a_pub, &b_secret, 1_050).unwrap();
        let err = complete(init, &outcome.message, &attacker_pub, 1_100).unwrap_err();
        assert!(matches!(err, KepError::InvalidSignature { round: 2 }));
    }
}
