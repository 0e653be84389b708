//! The codec contract shared by the sealed and plain codecs

use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

use futures::TryStreamExt;
use ossvault_core::{ChunkStream, CryptResult, StreamStat};

/// A borrowed-or-owned sequential source. The codec reads it but never closes
/// it: pass `Box::new(&mut reader)` to keep ownership.
pub type BoxReader<'a> = Box<dyn AsyncRead + Send + Unpin + 'a>;

/// Turns a sequential byte source into a lazy sequence of chunks and back.
///
/// Implementations hold only immutable configuration; every `encrypt` /
/// `decrypt` call owns its own session state, so one codec can serve many
/// streams concurrently.
pub trait ChunkCodec: Send + Sync + fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Plaintext bytes per chunk
    fn chunk_size(&self) -> usize;

    fn encrypt<'a>(&self, source: BoxReader<'a>) -> ChunkStream<'a>;

    fn decrypt<'a>(&self, source: BoxReader<'a>) -> ChunkStream<'a>;

    /// Size descriptor of `encrypt`'s output given the plaintext descriptor.
    fn stat(&self, source: &StreamStat) -> StreamStat;

    /// Size descriptor of `decrypt`'s output given the ciphertext descriptor.
    fn decrypted_stat(&self, source: &StreamStat) -> StreamStat;
}

/// Encrypt an in-memory value into one buffer.
pub async fn encrypt_to_vec<C: ChunkCodec + ?Sized>(codec: &C, plaintext: &[u8]) -> CryptResult<Vec<u8>> {
    let capacity = codec
        .stat(&StreamStat::with_size(plaintext.len() as u64))
        .size
        .unwrap_or(0) as usize;
    concat(codec.encrypt(Box::new(plaintext)), capacity).await
}

/// Decrypt an in-memory envelope into one buffer.
pub async fn decrypt_to_vec<C: ChunkCodec + ?Sized>(codec: &C, ciphertext: &[u8]) -> CryptResult<Vec<u8>> {
    concat(codec.decrypt(Box::new(ciphertext)), ciphertext.len()).await
}

/// Drain a chunk stream into one buffer.
pub async fn concat(chunks: ChunkStream<'_>, capacity: usize) -> CryptResult<Vec<u8>> {
    chunks
        .try_fold(Vec::with_capacity(capacity), |mut out, chunk| async move {
            out.extend_from_slice(&chunk);
            Ok(out)
        })
        .await
}

/// Reads fixed-size blocks, peeking one byte past each block so the caller
/// learns whether the block it got is the last one.
pub(crate) struct BlockReader<'a> {
    source: BoxReader<'a>,
    lookahead: Option<u8>,
    exhausted: bool,
}

impl<'a> BlockReader<'a> {
    pub(crate) fn new(source: BoxReader<'a>) -> Self {
        Self {
            source,
            lookahead: None,
            exhausted: false,
        }
    }

    /// Read up to `size` bytes (fewer only at end of source), reserving
    /// `spare` extra capacity for an in-place tag. Returns the block and
    /// whether the source is exhausted after it.
    pub(crate) async fn next_block(&mut self, size: usize, spare: usize) -> io::Result<(Vec<u8>, bool)> {
        let mut block = Vec::with_capacity(size + spare);
        block.resize(size, 0);

        let mut filled = 0;
        if let Some(byte) = self.lookahead.take() {
            if size > 0 {
                block[0] = byte;
                filled = 1;
            } else {
                self.lookahead = Some(byte);
            }
        }

        while filled < size && !self.exhausted {
            let n = self.source.read(&mut block[filled..]).await?;
            if n == 0 {
                self.exhausted = true;
            }
            filled += n;
        }
        block.truncate(filled);

        if !self.exhausted && self.lookahead.is_none() {
            let mut peek = [0u8; 1];
            match self.source.read(&mut peek).await? {
                0 => self.exhausted = true,
                _ => self.lookahead = Some(peek[0]),
            }
        }

        let done = self.exhausted && self.lookahead.is_none();
        Ok((block, done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `step` bytes per read, like a slow socket.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            let end = (self.pos + self.step).min(self.data.len());
            let n = (end - self.pos).min(buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn blocks_are_full_until_the_last() {
        let data: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
        let mut blocks = BlockReader::new(Box::new(Trickle { data: data.clone(), pos: 0, step: 7 }));

        let mut out = Vec::new();
        loop {
            let (block, last) = blocks.next_block(100, 0).await.unwrap();
            out.extend_from_slice(&block);
            if last {
                assert_eq!(block.len(), 50);
                break;
            }
            assert_eq!(block.len(), 100);
        }
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn exact_multiple_ends_on_a_full_block() {
        let data = vec![3u8; 200];
        let mut blocks = BlockReader::new(Box::new(&data[..]));

        let (first, last) = blocks.next_block(100, 0).await.unwrap();
        assert_eq!((first.len(), last), (100, false));
        let (second, last) = blocks.next_block(100, 0).await.unwrap();
        assert_eq!((second.len(), last), (100, true));
    }

    #[tokio::test]
    async fn empty_source_yields_one_empty_last_block() {
        let mut blocks = BlockReader::new(Box::new(&b""[..]));
        let (block, last) = blocks.next_block(64, 16).await.unwrap();
        assert!(block.is_empty());
        assert!(last);
        assert!(block.capacity() >= 16);
    }
}
