//! Lazy chunk sequence → readable stream adapter
//!
//! Codecs produce ciphertext/plaintext as a lazy, forward-only sequence of
//! byte chunks whose boundaries follow the codec's block size. Upload APIs
//! want a reader and pick their own read sizes. [`ChunkReader`] sits between
//! the two: it pulls chunks on demand, hands out exactly as many bytes as
//! asked for, and keeps the remainder in a leftover buffer for the next read.
//!
//! Pulling the next chunk is what drives the producer (a source read plus a
//! seal/open step), so the consumer's read rate is the only backpressure.

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::Stream;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, trace};

use crate::error::{CryptError, CryptResult};
use crate::types::StreamStat;

/// A lazy, finite, forward-only sequence of byte chunks.
pub type ChunkStream<'a> = BoxStream<'a, CryptResult<Bytes>>;

enum State<'a> {
    Streaming(ChunkStream<'a>),
    Exhausted,
    Failed(CryptError),
    Closed,
}

/// Sequential, read-only stream over a [`ChunkStream`].
///
/// Bytes delivered across any mix of `read_up_to` / `AsyncRead` calls are
/// exactly the in-order concatenation of the underlying chunks, whatever
/// read sizes the consumer asks for.
pub struct ChunkReader<'a> {
    state: State<'a>,
    buffer: BytesMut,
    stat: StreamStat,
    pulled: u64,
    delivered: u64,
}

impl<'a> ChunkReader<'a> {
    /// Open a reader over `chunks`; `stat` is reported as-is by [`Self::stat`].
    pub fn new(chunks: ChunkStream<'a>, stat: StreamStat) -> Self {
        Self {
            state: State::Streaming(chunks),
            buffer: BytesMut::new(),
            stat,
            pulled: 0,
            delivered: 0,
        }
    }

    /// Convenience for any `Stream` of chunks.
    pub fn from_stream<S>(chunks: S, stat: StreamStat) -> Self
    where
        S: Stream<Item = CryptResult<Bytes>> + Send + 'a,
    {
        Self::new(Box::pin(chunks), stat)
    }

    pub fn stat(&self) -> &StreamStat {
        &self.stat
    }

    /// Bytes handed to the consumer so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Bytes pulled but not yet delivered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Return up to `n` bytes. Fewer than `n` only when the sequence ran out;
    /// an empty result with `n > 0` means end of stream.
    pub async fn read_up_to(&mut self, n: usize) -> CryptResult<Bytes> {
        if n == 0 {
            return Ok(Bytes::new());
        }

        while self.buffer.len() < n {
            match self.next_chunk().await? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => break,
            }
        }

        let take = n.min(self.buffer.len());
        let out = self.buffer.split_to(take).freeze();
        self.delivered += out.len() as u64;
        trace!(
            requested = n,
            returned = out.len(),
            buffered = self.buffer.len(),
            "chunk reader read"
        );
        Ok(out)
    }

    /// True iff nothing is buffered and the sequence has no further elements.
    ///
    /// May pull from the sequence to find out; pulled bytes are buffered, and
    /// zero-length chunks are skipped.
    pub async fn at_end(&mut self) -> CryptResult<bool> {
        loop {
            if !self.buffer.is_empty() {
                return Ok(false);
            }
            match self.next_chunk().await? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => return Ok(true),
            }
        }
    }

    /// Release the buffer and drop the sequence. Later reads return nothing.
    ///
    /// A sequence abandoned here is never finalized; that is allowed.
    pub fn close(&mut self) {
        if !matches!(self.state, State::Closed) {
            trace!(
                delivered = self.delivered,
                dropped = self.buffer.len(),
                "chunk reader closed"
            );
        }
        self.state = State::Closed;
        self.buffer = BytesMut::new();
    }

    /// The stream is read-only.
    pub fn write(&mut self, _data: &[u8]) -> CryptResult<usize> {
        Err(CryptError::unsupported("write on a read-only chunk stream"))
    }

    /// The stream is forward-only.
    pub fn seek(&mut self, _pos: io::SeekFrom) -> CryptResult<u64> {
        Err(CryptError::unsupported("seek on a forward-only chunk stream"))
    }

    async fn next_chunk(&mut self) -> CryptResult<Option<Bytes>> {
        futures::future::poll_fn(|cx| self.poll_next_chunk(cx)).await
    }

    fn poll_next_chunk(&mut self, cx: &mut Context<'_>) -> Poll<CryptResult<Option<Bytes>>> {
        let polled = match &mut self.state {
            State::Streaming(chunks) => ready!(chunks.as_mut().poll_next(cx)),
            State::Failed(err) => return Poll::Ready(Err(err.clone_lossy())),
            State::Exhausted | State::Closed => return Poll::Ready(Ok(None)),
        };

        match polled {
            Some(Ok(chunk)) => {
                self.pulled += chunk.len() as u64;
                Poll::Ready(Ok(Some(chunk)))
            }
            Some(Err(err)) => {
                self.buffer = BytesMut::new();
                self.state = State::Failed(err.clone_lossy());
                Poll::Ready(Err(err))
            }
            None => {
                if let Some(expected) = self.stat.size {
                    if expected != self.pulled {
                        debug!(
                            expected,
                            actual = self.pulled,
                            "chunk stream length differs from its size descriptor"
                        );
                    }
                }
                self.state = State::Exhausted;
                Poll::Ready(Ok(None))
            }
        }
    }
}

impl AsyncRead for ChunkReader<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if !this.buffer.is_empty() {
                let n = buf.remaining().min(this.buffer.len());
                buf.put_slice(&this.buffer.split_to(n));
                this.delivered += n as u64;
                return Poll::Ready(Ok(()));
            }

            match ready!(this.poll_next_chunk(cx)) {
                Ok(Some(chunk)) => this.buffer.extend_from_slice(&chunk),
                Ok(None) => return Poll::Ready(Ok(())),
                Err(err) => return Poll::Ready(Err(err.into())),
            }
        }
    }
}

impl Drop for ChunkReader<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChunkReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Streaming(_) => "streaming",
            State::Exhausted => "exhausted",
            State::Failed(_) => "failed",
            State::Closed => "closed",
        };
        f.debug_struct("ChunkReader")
            .field("state", &state)
            .field("buffered", &self.buffer.len())
            .field("delivered", &self.delivered)
            .field("stat", &self.stat)
            .finish()
    }
}
