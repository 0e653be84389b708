//! Chunked XChaCha20-Poly1305 stream codec
//!
//! Envelope (binary):
//! ```text
//! [24 bytes: random header][chunk 0]...[chunk N-1, final]
//! chunk i = ciphertext(plaintext_i) || 16-byte Poly1305 tag
//! ```
//!
//! Chunks are sealed with the STREAM construction (`StreamBE32`): the AEAD
//! nonce is `header[..19] || counter_be32 || last_block_flag`, so chunk order
//! and the final marker are both authenticated. Dropping, reordering or
//! appending chunks makes decryption fail.
//!
//! The per-stream key is HKDF-SHA256(salt = header, ikm = secret key), so the
//! configured key is never used directly as an AEAD key.

use bytes::Bytes;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::stream::{NewStream, StreamBE32, StreamPrimitive};
use chacha20poly1305::{KeyInit, XChaCha20Poly1305};
use futures::StreamExt;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, trace};
use zeroize::Zeroize;

use ossvault_core::{ChunkStream, CryptError, CryptResult, StreamStat};

use crate::codec::{BlockReader, BoxReader, ChunkCodec};
use crate::key::SecretKey;
use crate::size;
use crate::{HEADER_SIZE, KEY_SIZE, MAX_CHUNK_SIZE, NONCE_PREFIX_SIZE, TAG_SIZE};

const SUBKEY_INFO: &[u8] = b"ossvault-stream";

type Cipher = StreamBE32<XChaCha20Poly1305>;

/// Authenticated chunked stream codec.
#[derive(Debug, Clone)]
pub struct SealedCodec {
    key: SecretKey,
    chunk_size: usize,
}

impl SealedCodec {
    /// Smallest chunk size: room for the stream overhead plus one byte.
    pub const MIN_CHUNK_SIZE: usize = HEADER_SIZE + TAG_SIZE + 1;
    pub const MAX_CHUNK_SIZE: usize = MAX_CHUNK_SIZE;

    pub fn new(key: SecretKey, chunk_size: usize) -> CryptResult<Self> {
        if !(Self::MIN_CHUNK_SIZE..=Self::MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(CryptError::invalid_config(format!(
                "invalid chunk size {chunk_size}: must be within [{}, {}]",
                Self::MIN_CHUNK_SIZE,
                Self::MAX_CHUNK_SIZE
            )));
        }
        Ok(Self { key, chunk_size })
    }
}

impl ChunkCodec for SealedCodec {
    fn name(&self) -> &'static str {
        "xchacha20poly1305-stream"
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn encrypt<'a>(&self, source: BoxReader<'a>) -> ChunkStream<'a> {
        let mut header = [0u8; HEADER_SIZE];
        rand::thread_rng().fill_bytes(&mut header);

        let session = match stream_cipher(&self.key, &header) {
            Ok(cipher) => SealSession {
                blocks: BlockReader::new(source),
                cipher,
                header: Some(header),
                position: 0,
                finished: false,
                chunk_size: self.chunk_size,
            },
            Err(err) => return futures::stream::once(async move { Err(err) }).boxed(),
        };
        debug!(chunk_size = self.chunk_size, "seal session started");

        futures::stream::try_unfold(session, |mut session| async move {
            Ok::<_, CryptError>(session.next_chunk().await?.map(|chunk| (chunk, session)))
        })
        .boxed()
    }

    fn decrypt<'a>(&self, source: BoxReader<'a>) -> ChunkStream<'a> {
        let session = OpenSession {
            blocks: BlockReader::new(source),
            key: self.key.clone(),
            cipher: None,
            position: 0,
            finished: false,
            chunk_size: self.chunk_size,
        };

        futures::stream::try_unfold(session, |mut session| async move {
            Ok::<_, CryptError>(session.next_chunk().await?.map(|chunk| (chunk, session)))
        })
        .boxed()
    }

    fn stat(&self, source: &StreamStat) -> StreamStat {
        match source.size {
            Some(plain) if plain > 0 => {
                source.resized(size::sealed_size(plain, self.chunk_size))
            }
            _ => source.clone(),
        }
    }

    fn decrypted_stat(&self, source: &StreamStat) -> StreamStat {
        match source.size {
            Some(sealed) if sealed > HEADER_SIZE as u64 => {
                source.resized(size::opened_size(sealed, self.chunk_size))
            }
            _ => source.clone(),
        }
    }
}

/// Derive the per-stream STREAM cipher from the secret key and the header.
fn stream_cipher(key: &SecretKey, header: &[u8]) -> CryptResult<Cipher> {
    let hkdf = Hkdf::<Sha256>::new(Some(header), key.as_bytes());
    let mut subkey = [0u8; KEY_SIZE];
    hkdf.expand(SUBKEY_INFO, &mut subkey)
        .map_err(|e| CryptError::malformed(format!("stream key derivation failed: {e}")))?;

    let aead = XChaCha20Poly1305::new(GenericArray::from_slice(&subkey));
    subkey.zeroize();

    Ok(StreamBE32::from_aead(
        aead,
        GenericArray::from_slice(&header[..NONCE_PREFIX_SIZE]),
    ))
}

/// Per-call encrypt state: emits the header, then one sealed chunk per block.
struct SealSession<'a> {
    blocks: BlockReader<'a>,
    cipher: Cipher,
    header: Option<[u8; HEADER_SIZE]>,
    position: u32,
    finished: bool,
    chunk_size: usize,
}

impl SealSession<'_> {
    async fn next_chunk(&mut self) -> CryptResult<Option<Bytes>> {
        if let Some(header) = self.header.take() {
            return Ok(Some(Bytes::copy_from_slice(&header)));
        }
        if self.finished {
            return Ok(None);
        }

        let (mut block, last) = self
            .blocks
            .next_block(self.chunk_size, TAG_SIZE)
            .await
            .map_err(|e| CryptError::io("cannot read plaintext source", e))?;

        if self.position == u32::MAX {
            return Err(CryptError::malformed("stream exceeds the maximum chunk count"));
        }

        self.cipher
            .encrypt_in_place(self.position, last, b"", &mut block)
            .map_err(|_| CryptError::malformed(format!("sealing chunk {} failed", self.position)))?;

        trace!(chunk = self.position, bytes = block.len(), last, "sealed chunk");
        self.position += 1;
        if last {
            self.finished = true;
            debug!(chunks = self.position, "seal session finished");
        }
        Ok(Some(Bytes::from(block)))
    }
}

/// Per-call decrypt state: parses the header, then opens one chunk per block.
struct OpenSession<'a> {
    blocks: BlockReader<'a>,
    key: SecretKey,
    cipher: Option<Cipher>,
    position: u32,
    finished: bool,
    chunk_size: usize,
}

impl OpenSession<'_> {
    async fn read_header(&mut self) -> CryptResult<Cipher> {
        let (header, exhausted) = self
            .blocks
            .next_block(HEADER_SIZE, 0)
            .await
            .map_err(|e| CryptError::io("cannot read encrypted source", e))?;

        // A stream always carries at least the final chunk after its header.
        if header.len() < HEADER_SIZE || exhausted {
            return Err(CryptError::truncated());
        }
        debug!(chunk_size = self.chunk_size, "open session started");
        stream_cipher(&self.key, &header)
    }

    async fn next_chunk(&mut self) -> CryptResult<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        let cipher = match self.cipher.take() {
            Some(cipher) => cipher,
            None => self.read_header().await?,
        };

        let (block, last) = self
            .blocks
            .next_block(self.chunk_size + TAG_SIZE, 0)
            .await
            .map_err(|e| CryptError::io("cannot read encrypted source", e))?;

        if block.len() < TAG_SIZE {
            return Err(CryptError::truncated());
        }
        if self.position == u32::MAX {
            return Err(CryptError::malformed("stream exceeds the maximum chunk count"));
        }

        let position = self.position;
        let plaintext = if last {
            open_last(&cipher, position, block)?
        } else {
            open_next(&cipher, position, block)?
        };

        trace!(chunk = position, bytes = plaintext.len(), last, "opened chunk");
        self.position += 1;
        if last {
            self.finished = true;
            debug!(chunks = self.position, "open session finished");
        } else {
            self.cipher = Some(cipher);
        }
        Ok(Some(Bytes::from(plaintext)))
    }
}

/// The source ended after this block, so it must carry the final flag.
///
/// A failed open leaves `block` untouched, so the second attempt reuses it.
fn open_last(cipher: &Cipher, position: u32, mut block: Vec<u8>) -> CryptResult<Vec<u8>> {
    if cipher.decrypt_in_place(position, true, b"", &mut block).is_ok() {
        return Ok(block);
    }

    // Authentic, but not the final chunk: the rest of the stream is missing.
    if cipher.decrypt_in_place(position, false, b"", &mut block).is_ok() {
        return Err(CryptError::truncated());
    }

    Err(CryptError::authentication(format!(
        "cannot decrypt: chunk {position} failed authentication"
    )))
}

/// More data follows this block, so it must not carry the final flag.
fn open_next(cipher: &Cipher, position: u32, mut block: Vec<u8>) -> CryptResult<Vec<u8>> {
    if cipher.decrypt_in_place(position, false, b"", &mut block).is_ok() {
        return Ok(block);
    }

    if cipher.decrypt_in_place(position, true, b"", &mut block).is_ok() {
        return Err(CryptError::malformed(format!(
            "cannot decrypt: data follows the final chunk {position}"
        )));
    }

    Err(CryptError::authentication(format!(
        "cannot decrypt: chunk {position} failed authentication"
    )))
}
