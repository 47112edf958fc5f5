//! Chunked file pipeline (§4.5): sender splits a file into fixed-size
//! chunks, each independently AEAD-encrypted with its own fresh iv/nonce,
//! preceded by one `FILE_META` envelope; the receiver buffers chunks keyed
//! by session and reassembles them in `chunkIndex` order regardless of
//! arrival order, discarding the whole file on any chunk's integrity
//! failure.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use securechat_crypto::aead;
use securechat_proto::{CipherFields, Envelope, FileChunkFields, FileChunkInfo, FileMetaFields, FileMetaInfo};
use securechat_store::{LoadedSession, SessionStore};
use sha2::Digest;
use zeroize::Zeroize;

use crate::error::CoreError;
use crate::relay::RelayClient;
use crate::send::encrypt_payload;

/// Fixed chunking policy constant (§4.5, §7 `SECURECHAT_CHUNK_SIZE_BYTES`).
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 64 * 1024;

fn total_chunks(size: u64, chunk_size: usize) -> u32 {
    if size == 0 {
        return 1;
    }
    ((size + chunk_size as u64 - 1) / chunk_size as u64) as u32
}

/// Encrypt and send `data` as one `FILE_META` envelope followed by its
/// `FILE_CHUNK`s, each getting its own freshly allocated `seq`.
pub async fn send_file(
    sessions: &SessionStore,
    relay: &dyn RelayClient,
    session_id: &str,
    sender: &str,
    receiver: &str,
    filename: &str,
    mimetype: &str,
    data: &[u8],
    chunk_size: usize,
    now_ms: i64,
) -> Result<(), CoreError> {
    let session = sessions.load_by_id(session_id).await?;
    if session.state == "closed" {
        return Err(CoreError::SessionClosed(session_id.to_string()));
    }
    let chunks = total_chunks(data.len() as u64, chunk_size);

    let meta = FileMetaInfo {
        filename: filename.to_string(),
        size: data.len() as u64,
        total_chunks: chunks,
        mimetype: mimetype.to_string(),
    };
    let meta_plaintext = serde_json::to_vec(&meta).map_err(|e| CoreError::BadInput(e.to_string()))?;
    let meta_seq = sessions.allocate_next_seq(session_id).await?;
    let (ciphertext, iv, auth_tag, nonce) = encrypt_payload(&session.send_key, session_id, meta_seq, &meta_plaintext)?;
    let meta_envelope = Envelope::FileMeta(FileMetaFields {
        cipher: CipherFields {
            session_id: session_id.to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            ciphertext,
            iv,
            auth_tag,
            timestamp: now_ms,
            seq: meta_seq,
            nonce,
        },
        meta,
    });
    relay.send_envelope(meta_envelope).await?;

    // `[].chunks(n)` yields nothing, but `totalChunks` is 1 for an empty
    // file (§8: "files of 0 bytes" is a named boundary case) — emit exactly
    // one empty chunk so the receiver's chunk count still matches.
    let pieces: Vec<&[u8]> = if data.is_empty() { vec![&[][..]] } else { data.chunks(chunk_size.max(1)).collect() };

    for (chunk_index, chunk) in pieces.into_iter().enumerate() {
        let chunk_index = chunk_index as u32;
        let seq = sessions.allocate_next_seq(session_id).await?;
        let (ciphertext, iv, auth_tag, nonce) = encrypt_payload(&session.send_key, session_id, seq, chunk)?;
        let envelope = Envelope::FileChunk(FileChunkFields {
            cipher: CipherFields {
                session_id: session_id.to_string(),
                sender: sender.to_string(),
                receiver: receiver.to_string(),
                ciphertext,
                iv,
                auth_tag,
                timestamp: now_ms,
                seq,
                nonce,
            },
            meta: FileChunkInfo { chunk_index, total_chunks: chunks },
        });
        relay.send_envelope(envelope).await?;
    }

    tracing::info!(
        target: "securechat_transport",
        event = "file_send",
        session_id = %session_id,
        total_chunks = chunks,
        "sent file"
    );
    Ok(())
}

fn cipher_aad(session_id: &str, seq: u64) -> Vec<u8> {
    let mut out = session_id.as_bytes().to_vec();
    out.extend_from_slice(&seq.to_be_bytes());
    out
}

/// Mirrors `receive::decrypt_cipher_fields`'s key-epoch fallback: try the
/// current `recv_key`, then the pre-rotation `prev_recv_key` once, before
/// surfacing MITM (§4.3 one-step key tolerance window).
async fn decrypt_chunk(sessions: &SessionStore, session: &LoadedSession, cipher: &CipherFields, now_ms: i64, stale_window_ms: i64) -> Result<Vec<u8>, CoreError> {
    let nonce = STANDARD
        .decode(&cipher.nonce)
        .map_err(|e| CoreError::BadInput(format!("nonce is not valid base64: {e}")))?;
    if nonce.len() < crate::receive::NONCE_MIN_LEN || nonce.len() > crate::receive::NONCE_MAX_LEN {
        return Err(CoreError::ReplayDetected("nonce-size".to_string()));
    }
    let hash = hex::encode(sha2::Sha256::digest(&nonce));
    sessions
        .accept_inbound(&cipher.session_id, cipher.seq, &hash, now_ms, cipher.timestamp, stale_window_ms)
        .await?;

    let iv_bytes = STANDARD.decode(&cipher.iv).map_err(|e| CoreError::BadInput(e.to_string()))?;
    let iv: [u8; aead::IV_LEN] = iv_bytes.try_into().map_err(|_| CoreError::BadInput("iv must be 12 bytes".to_string()))?;
    let mut ct = STANDARD.decode(&cipher.ciphertext).map_err(|e| CoreError::BadInput(e.to_string()))?;
    let tag = STANDARD.decode(&cipher.auth_tag).map_err(|e| CoreError::BadInput(e.to_string()))?;
    ct.extend_from_slice(&tag);
    let aad = cipher_aad(&cipher.session_id, cipher.seq);

    if let Ok(pt) = aead::decrypt_with_iv(&session.recv_key, &iv, &ct, &aad) {
        return Ok(pt.to_vec());
    }

    if let Some(prev_key) = session.prev_recv_key {
        let fallback = aead::decrypt_with_iv(&prev_key, &iv, &ct, &aad).ok().map(|pt| pt.to_vec());
        sessions.consume_prev_key(&cipher.session_id).await?;
        if let Some(pt) = fallback {
            return Ok(pt);
        }
    }

    sessions.emit_invalid_signature(&cipher.session_id, "auth-tag");
    Err(CoreError::MitmDetected("auth-tag".to_string()))
}

/// Buffers `FILE_CHUNK` envelopes for one in-flight file transfer and
/// reassembles them once every chunk named by `FILE_META.totalChunks` has
/// arrived, regardless of the order envelopes were handed to it.
pub struct FileReassembler {
    total_chunks: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
}

impl FileReassembler {
    pub fn new(total_chunks: u32) -> Self {
        Self { total_chunks, chunks: BTreeMap::new() }
    }

    /// Returns `true` once every chunk has been received.
    pub fn insert(&mut self, chunk_index: u32, plaintext: Vec<u8>) -> bool {
        self.chunks.insert(chunk_index, plaintext);
        self.chunks.len() as u32 == self.total_chunks
    }

    /// Concatenate the buffered chunks in `chunkIndex` order. Only
    /// meaningful once [`Self::insert`] has returned `true`.
    pub fn finish(self) -> Vec<u8> {
        self.chunks.into_values().flatten().collect()
    }
}

/// Decrypt one `FILE_META` envelope, returning its metadata and the total
/// chunk count the caller should size a [`FileReassembler`] for.
pub async fn receive_file_meta(
    sessions: &SessionStore,
    envelope: &Envelope,
    now_ms: i64,
    stale_window_ms: i64,
) -> Result<FileMetaInfo, CoreError> {
    let fields = match envelope {
        Envelope::FileMeta(f) => f,
        _ => return Err(CoreError::BadInput("expected a FILE_META envelope".to_string())),
    };
    let session = sessions.load_by_id(&fields.cipher.session_id).await?;
    if session.state == "closed" {
        return Err(CoreError::SessionClosed(fields.cipher.session_id.clone()));
    }
    let mut plaintext = decrypt_chunk(sessions, &session, &fields.cipher, now_ms, stale_window_ms).await?;
    let meta: FileMetaInfo = serde_json::from_slice(&plaintext).map_err(|e| CoreError::BadInput(e.to_string()))?;
    plaintext.zeroize();
    Ok(meta)
}

/// Decrypt one `FILE_CHUNK` envelope and feed it into `reassembler`.
/// Returns `true` once the file is complete. On any integrity failure the
/// caller must discard `reassembler` entirely (§4.5: "if any chunk fails
/// integrity, the entire file is discarded") — this function does not
/// retain partial state itself, so propagating the error and dropping the
/// reassembler is sufficient.
pub async fn receive_file_chunk(
    sessions: &SessionStore,
    envelope: &Envelope,
    reassembler: &mut FileReassembler,
    now_ms: i64,
    stale_window_ms: i64,
) -> Result<bool, CoreError> {
    let fields = match envelope {
        Envelope::FileChunk(f) => f,
        _ => return Err(CoreError::BadInput("expected a FILE_CHUNK envelope".to_string())),
    };
    let session = sessions.load_by_id(&fields.cipher.session_id).await?;
    if session.state == "closed" {
        return Err(CoreError::SessionClosed(fields.cipher.session_id.clone()));
    }
    let plaintext = decrypt_chunk(sessions, &session, &fields.cipher, now_ms, stale_window_ms).await?;
    Ok(reassembler.insert(fields.meta.chunk_index, plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::LoopbackRelay;
    use securechat_kep::SessionKeys;
    use securechat_store::{new_vault_salt, SessionVault, Store};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn handshake_keys() -> (SessionKeys, SessionKeys) {
        let a_secret = p256::SecretKey::random(&mut rand_core::OsRng);
        let a_pub = securechat_crypto::EcJwk::from_public(&a_secret.public_key());
        let b_secret = p256::SecretKey::random(&mut rand_core::OsRng);
        let b_pub = securechat_crypto::EcJwk::from_public(&b_secret.public_key());
        let init = securechat_kep::initiate("s1", "alice", "bob", &a_secret, 1_000).unwrap();
        let outcome = securechat_kep::respond(&init.message, &a_pub, &b_secret, 1_050).unwrap();
        let a_keys = securechat_kep::complete(init, &outcome.message, &b_pub, 1_100).unwrap();
        (a_keys, outcome.keys)
    }

    async fn temp_sessions() -> (SessionStore, PathBuf) {
        let db_path = PathBuf::from(format!("/tmp/securechat-file-test-{}.db", Uuid::new_v4()));
        let vault = SessionVault::new();
        vault.unlock(b"hunter2", &new_vault_salt(), 100_000).await.unwrap();
        let store = Store::open(&db_path, vault).await.unwrap();
        (SessionStore::new(store), db_path)
    }

    fn cleanup(db_path: &PathBuf) {
        let _ = std::fs::remove_file(db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[test]
    fn total_chunks_covers_boundary_sizes() {
        assert_eq!(total_chunks(0, 64), 1);
        assert_eq!(total_chunks(1, 64), 1);
        assert_eq!(total_chunks(63, 64), 1);
        assert_eq!(total_chunks(64, 64), 1);
        assert_eq!(total_chunks(65, 64), 2);
    }

    #[tokio::test]
    async fn file_round_trip_reassembles_out_of_arrival_order() {
        let (a_keys, b_keys) = handshake_keys();
        let (a_sessions, a_path) = temp_sessions().await;
        let (b_sessions, b_path) = temp_sessions().await;
        let a_id = a_sessions.create("alice", "bob", &a_keys).await.unwrap();
        let b_id = b_sessions.create("bob", "alice", &b_keys).await.unwrap();
        let relay = LoopbackRelay::new();

        let chunk_size = 64 * 1024;
        let data: Vec<u8> = (0..(200 * 1024usize)).map(|i| (i % 251) as u8).collect();
        let expected_hash = sha2::Sha256::digest(&data);

        send_file(&a_sessions, &relay, &a_id, "alice", "bob", "photo.bin", "application/octet-stream", &data, chunk_size, 1_000)
            .await
            .unwrap();

        let mut inbox = relay.poll("bob").await.unwrap();
        // Rewrite sessionId to B's local session and scramble delivery order.
        for envelope in inbox.iter_mut() {
            match envelope {
                Envelope::FileMeta(f) => f.cipher.session_id = b_id.clone(),
                Envelope::FileChunk(f) => f.cipher.session_id = b_id.clone(),
                _ => unreachable!(),
            }
        }
        let meta_envelope = inbox.remove(0);
        assert!(matches!(meta_envelope, Envelope::FileMeta(_)));
        let order = [2usize, 0, 3, 1];
        let scrambled: Vec<_> = order.iter().map(|&i| inbox[i].clone()).collect();

        let meta = receive_file_meta(&b_sessions, &meta_envelope, 1_010, 120_000).await.unwrap();
        assert_eq!(meta.total_chunks, 4);
        assert_eq!(meta.size, data.len() as u64);

        let mut reassembler = FileReassembler::new(meta.total_chunks);
        let mut done = false;
        for envelope in &scrambled {
            done = receive_file_chunk(&b_sessions, envelope, &mut reassembler, 1_010, 120_000).await.unwrap();
        }
        assert!(done);
        let reconstructed = reassembler.finish();
        assert_eq!(sha2::Sha256::digest(&reconstructed)[..], expected_hash[..]);

        cleanup(&a_path);
        cleanup(&b_path);
    }

    #[tokio::test]
    async fn empty_file_still_yields_one_chunk() {
        let (a_keys, b_keys) = handshake_keys();
        let (a_sessions, a_path) = temp_sessions().await;
        let (b_sessions, b_path) = temp_sessions().await;
        let a_id = a_sessions.create("alice", "bob", &a_keys).await.unwrap();
        let b_id = b_sessions.create("bob", "alice", &b_keys).await.unwrap();
        let relay = LoopbackRelay::new();

        send_file(&a_sessions, &relay, &a_id, "alice", "bob", "empty.bin", "application/octet-stream", &[], 64 * 1024, 1_000)
            .await
            .unwrap();

        let mut inbox = relay.poll("bob").await.unwrap();
        for envelope in inbox.iter_mut() {
            match envelope {
                Envelope::FileMeta(f) => f.cipher.session_id = b_id.clone(),
                Envelope::FileChunk(f) => f.cipher.session_id = b_id.clone(),
                _ => unreachable!(),
            }
        }

        let meta = receive_file_meta(&b_sessions, &inbox[0], 1_010, 120_000).await.unwrap();
        assert_eq!(meta.total_chunks, 1);
        assert_eq!(meta.size, 0);

        let mut reassembler = FileReassembler::new(meta.total_chunks);
        let done = receive_file_chunk(&b_sessions, &inbox[1], &mut reassembler, 1_010, 120_000).await.unwrap();
        assert!(done);
        assert!(reassembler.finish().is_empty());

        cleanup(&a_path);
        cleanup(&b_path);
    }

    #[tokio::test]
    async fn send_file_rejects_closed_session() {
        let (a_keys, _) = handshake_keys();
        let (a_sessions, a_path) = temp_sessions().await;
        let a_id = a_sessions.create("alice", "bob", &a_keys).await.unwrap();
        a_sessions.close_session(&a_id).await.unwrap();
        let relay = LoopbackRelay::new();

        let err = send_file(&a_sessions, &relay, &a_id, "alice", "bob", "x.bin", "application/octet-stream", &[1, 2, 3], 64 * 1024, 1_000).await;
        assert!(matches!(err, Err(CoreError::SessionClosed(id)) if id == a_id));
        cleanup(&a_path);
    }
}
