//! Transparent encryption over any storage adapter
//!
//! Content goes through the codec on the way in and out; every other
//! operation is forwarded to the inner adapter untouched. Sizes reported by
//! `file_size`/`metadata` are therefore the stored (ciphertext) sizes.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use ossvault_core::config::EncryptionConfig;
use ossvault_core::{ByteSource, ChunkReader, Visibility};
use ossvault_crypto::{build_codec, decrypt_to_vec, encrypt_to_vec, ChunkCodec};

use crate::adapter::{FileAttributes, StorageAdapter, StorageAttributes, WriteOptions};
use crate::error::{StorageError, StorageResult};

pub struct EncryptedAdapter<A> {
    inner: A,
    codec: Arc<dyn ChunkCodec>,
}

impl<A: StorageAdapter> EncryptedAdapter<A> {
    pub fn new(inner: A, codec: Arc<dyn ChunkCodec>) -> Self {
        Self { inner, codec }
    }

    /// Codec chosen by `config`: sealed with a key, pass-through without.
    pub fn from_config(inner: A, config: &EncryptionConfig) -> StorageResult<Self> {
        let codec = build_codec(config)?;
        Ok(Self::new(inner, codec))
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn codec(&self) -> &Arc<dyn ChunkCodec> {
        &self.codec
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: StorageAdapter> StorageAdapter for EncryptedAdapter<A> {
    async fn write(&self, path: &str, contents: Bytes, options: &WriteOptions) -> StorageResult<()> {
        let sealed = encrypt_to_vec(self.codec.as_ref(), &contents)
            .await
            .map_err(|e| StorageError::write(path, e))?;
        debug!(path, codec = self.codec.name(), plain = contents.len(), stored = sealed.len(), "write");
        self.inner.write(path, Bytes::from(sealed), options).await
    }

    async fn write_stream(
        &self,
        path: &str,
        contents: ByteSource,
        options: &WriteOptions,
    ) -> StorageResult<()> {
        let (reader, stat) = contents.into_parts();
        let sealed_stat = self.codec.stat(&stat);
        debug!(path, codec = self.codec.name(), plain = ?stat.size, stored = ?sealed_stat.size, "write stream");

        let chunks = self.codec.encrypt(reader);
        let sealed = ChunkReader::new(chunks, sealed_stat.clone());
        self.inner
            .write_stream(path, ByteSource::new(sealed, sealed_stat), options)
            .await
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let stored = self.inner.read(path).await?;
        let plain = decrypt_to_vec(self.codec.as_ref(), &stored)
            .await
            .map_err(|e| StorageError::read(path, e))?;
        debug!(path, codec = self.codec.name(), stored = stored.len(), plain = plain.len(), "read");
        Ok(Bytes::from(plain))
    }

    async fn read_stream(&self, path: &str) -> StorageResult<ByteSource> {
        let (reader, stat) = self.inner.read_stream(path).await?.into_parts();
        let plain_stat = self.codec.decrypted_stat(&stat);
        let chunks = self.codec.decrypt(reader);
        Ok(ByteSource::new(
            ChunkReader::new(chunks, plain_stat.clone()),
            plain_stat,
        ))
    }

    async fn file_exists(&self, path: &str) -> StorageResult<bool> {
        self.inner.file_exists(path).await
    }

    async fn directory_exists(&self, path: &str) -> StorageResult<bool> {
        self.inner.directory_exists(path).await
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.inner.delete(path).await
    }

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        self.inner.delete_directory(path).await
    }

    async fn create_directory(&self, path: &str, options: &WriteOptions) -> StorageResult<()> {
        self.inner.create_directory(path, options).await
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> StorageResult<()> {
        self.inner.set_visibility(path, visibility).await
    }

    async fn visibility(&self, path: &str) -> StorageResult<FileAttributes> {
        self.inner.visibility(path).await
    }

    async fn metadata(&self, path: &str) -> StorageResult<FileAttributes> {
        self.inner.metadata(path).await
    }

    async fn mime_type(&self, path: &str) -> StorageResult<FileAttributes> {
        self.inner.mime_type(path).await
    }

    async fn last_modified(&self, path: &str) -> StorageResult<FileAttributes> {
        self.inner.last_modified(path).await
    }

    async fn file_size(&self, path: &str) -> StorageResult<FileAttributes> {
        self.inner.file_size(path).await
    }

    async fn list_contents(&self, path: &str, deep: bool) -> StorageResult<Vec<StorageAttributes>> {
        self.inner.list_contents(path, deep).await
    }

    async fn move_file(&self, from: &str, to: &str) -> StorageResult<()> {
        self.inner.move_file(from, to).await
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        self.inner.copy(from, to).await
    }

    fn url(&self, path: &str) -> StorageResult<String> {
        self.inner.url(path)
    }

    async fn temporary_url(&self, path: &str, expires_in: Duration) -> StorageResult<String> {
        self.inner.temporary_url(path, expires_in).await
    }
}

impl<A: std::fmt::Debug> std::fmt::Debug for EncryptedAdapter<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedAdapter")
            .field("inner", &self.inner)
            .field("codec", &self.codec)
            .finish()
    }
}
