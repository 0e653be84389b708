//! Pass-through codec used when no key is configured
//!
//! Same contract as the sealed codec, so the write/read paths do not branch
//! on whether encryption is active: it only re-chunks the source.

use bytes::Bytes;
use futures::StreamExt;

use ossvault_core::{ChunkStream, CryptError, CryptResult, StreamStat};

use crate::codec::{BlockReader, BoxReader, ChunkCodec};
use crate::MAX_CHUNK_SIZE;

#[derive(Debug, Clone, Copy)]
pub struct PlainCodec {
    chunk_size: usize,
}

impl PlainCodec {
    pub const MIN_CHUNK_SIZE: usize = 1;
    pub const MAX_CHUNK_SIZE: usize = MAX_CHUNK_SIZE;

    pub fn new(chunk_size: usize) -> CryptResult<Self> {
        if !(Self::MIN_CHUNK_SIZE..=Self::MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(CryptError::invalid_config(format!(
                "invalid chunk size {chunk_size}: must be within [{}, {}]",
                Self::MIN_CHUNK_SIZE,
                Self::MAX_CHUNK_SIZE
            )));
        }
        Ok(Self { chunk_size })
    }

    fn rechunk<'a>(&self, source: BoxReader<'a>) -> ChunkStream<'a> {
        let chunk_size = self.chunk_size;
        futures::stream::try_unfold(Some(BlockReader::new(source)), move |blocks| async move {
            let Some(mut blocks) = blocks else {
                return Ok(None);
            };
            let (block, last) = blocks
                .next_block(chunk_size, 0)
                .await
                .map_err(|e| CryptError::io("cannot read source", e))?;
            let next = if last { None } else { Some(blocks) };
            Ok::<_, CryptError>(Some((Bytes::from(block), next)))
        })
        .boxed()
    }
}

impl ChunkCodec for PlainCodec {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn encrypt<'a>(&self, source: BoxReader<'a>) -> ChunkStream<'a> {
        self.rechunk(source)
    }

    fn decrypt<'a>(&self, source: BoxReader<'a>) -> ChunkStream<'a> {
        self.rechunk(source)
    }

    fn stat(&self, source: &StreamStat) -> StreamStat {
        source.clone()
    }

    fn decrypted_stat(&self, source: &StreamStat) -> StreamStat {
        source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decrypt_to_vec, encrypt_to_vec};
    use futures::TryStreamExt;

    #[test]
    fn test_chunk_size_bounds() {
        assert!(PlainCodec::new(1).is_ok());
        assert!(PlainCodec::new(PlainCodec::MAX_CHUNK_SIZE).is_ok());
        assert!(matches!(PlainCodec::new(0), Err(CryptError::InvalidConfiguration(_))));
        assert!(matches!(
            PlainCodec::new(PlainCodec::MAX_CHUNK_SIZE + 1),
            Err(CryptError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_identity_roundtrip() {
        let codec = PlainCodec::new(4096).unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let encoded = encrypt_to_vec(&codec, &data).await.unwrap();
        assert_eq!(encoded, data, "plain codec must not transform content");
        assert_eq!(decrypt_to_vec(&codec, &encoded).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_rechunks_into_chunk_size_pieces() {
        let codec = PlainCodec::new(4).unwrap();
        let chunks: Vec<Bytes> = codec
            .encrypt(Box::new(&b"abcdefghij"[..]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks, vec![&b"abcd"[..], &b"efgh"[..], &b"ij"[..]]);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let codec = PlainCodec::new(16).unwrap();
        assert!(encrypt_to_vec(&codec, b"").await.unwrap().is_empty());
    }

    #[test]
    fn test_stat_is_size_neutral() {
        let codec = PlainCodec::new(4096).unwrap();
        for stat in [StreamStat::with_size(0), StreamStat::with_size(10_000), StreamStat::unknown()] {
            assert_eq!(codec.stat(&stat), stat);
            assert_eq!(codec.decrypted_stat(&stat), stat);
        }
    }
}
