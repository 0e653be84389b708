//! ossvault-crypto: streaming encryption for object-storage payloads
//!
//! Architecture: chunk-then-seal with XChaCha20-Poly1305 in the STREAM
//! construction. Payloads are encrypted and decrypted as lazy chunk
//! sequences, so memory use is bounded by the chunk size, not the object size.
//!
//! ```text
//! source ─read chunk_size─▶ seal(counter, last?) ─▶ [header][c0][c1]..[cN final]
//! ```
//!
//! - `sealed`: the authenticated chunked codec (used when a key is configured)
//! - `plain`: the pass-through codec with the same contract (no key)
//! - `size`: ciphertext length from plaintext length, and back
//! - `key`: the 256-bit secret key

pub mod codec;
pub mod key;
pub mod plain;
pub mod sealed;
pub mod size;

use std::sync::Arc;

use ossvault_core::config::EncryptionConfig;
use ossvault_core::CryptResult;

pub use codec::{concat, decrypt_to_vec, encrypt_to_vec, BoxReader, ChunkCodec};
pub use key::SecretKey;
pub use plain::PlainCodec;
pub use sealed::SealedCodec;
pub use size::{opened_size, sealed_size};

/// Size of the secret key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-stream header
pub const HEADER_SIZE: usize = 24;

/// Bytes of the header used as the STREAM nonce prefix
/// (XChaCha20 nonce minus the 4-byte counter and 1-byte last-block flag)
pub const NONCE_PREFIX_SIZE: usize = 19;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Upper bound on plaintext bytes per chunk
pub const MAX_CHUNK_SIZE: usize = 8192;

/// Build the codec for an encryption config: sealed when a key is present,
/// plain otherwise. Bad keys and chunk sizes fail here, not mid-stream.
pub fn build_codec(config: &EncryptionConfig) -> CryptResult<Arc<dyn ChunkCodec>> {
    let codec: Arc<dyn ChunkCodec> = match config.key.as_deref() {
        Some(encoded) => {
            let key = SecretKey::from_base64(encoded)?;
            Arc::new(SealedCodec::new(key, config.chunk_size)?)
        }
        None => Arc::new(PlainCodec::new(config.chunk_size)?),
    };
    tracing::debug!(codec = codec.name(), chunk_size = codec.chunk_size(), "codec configured");
    Ok(codec)
}
