//! OpenDAL operator factory and the operator-backed storage adapter

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use opendal::{EntryMode, ErrorKind, Metadata, Operator, Writer};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use ossvault_core::config::StorageConfig;
use ossvault_core::{ByteSource, ChunkReader, CryptError, StreamStat, Visibility};

use crate::adapter::{
    DirectoryAttributes, FileAttributes, StorageAdapter, StorageAttributes, WriteOptions,
};
use crate::error::{io_source, StorageError, StorageResult};
use crate::prefix::PathPrefixer;

/// Ranged read size when streaming an object down
const READ_CHUNK_SIZE: u64 = 256 * 1024;

/// Upload part size; S3 rejects multipart parts under 5 MiB
const WRITE_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Minimal config needed to build an operator
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for any S3-compatible endpoint.
///
/// Path-style addressing is the opendal default, which MinIO and other self-hosted S3 servers need.
pub fn build_operator(cfg: &S3Settings) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an operator from ossvault config + loaded credentials.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_from_core_config(
    storage: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP, credentials travel unencrypted"
        );
    }

    build_operator(&S3Settings {
        endpoint: storage.endpoint.clone(),
        region: storage.region.clone(),
        bucket: storage.bucket.clone(),
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
    })
}

/// [`StorageAdapter`] over an OpenDAL [`Operator`].
///
/// The backend has no ACL support, so visibility is reported as the
/// configured default and cannot be changed per object.
#[derive(Debug, Clone)]
pub struct OperatorAdapter {
    op: Operator,
    prefixer: PathPrefixer,
    public_base: Option<String>,
    default_visibility: Visibility,
}

impl OperatorAdapter {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            prefixer: PathPrefixer::default(),
            public_base: None,
            default_visibility: Visibility::Private,
        }
    }

    /// S3 adapter for `storage`, with root, URL base, and visibility applied.
    pub fn from_config(
        storage: &StorageConfig,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> StorageResult<Self> {
        let op = build_from_core_config(storage, access_key_id, secret_access_key)
            .map_err(|e| StorageError::Config(format!("{e:#}")))?;

        let public_base = match &storage.cdn_url {
            Some(cdn) => cdn.trim_end_matches('/').to_string(),
            None => format!(
                "{}/{}",
                storage.endpoint.trim_end_matches('/'),
                storage.bucket
            ),
        };

        Ok(Self::new(op)
            .with_root(&storage.root)
            .with_public_base(public_base)
            .with_default_visibility(storage.default_visibility))
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.prefixer = PathPrefixer::new(root);
        self
    }

    /// Base that `url()` appends object keys to
    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_default_visibility(mut self, visibility: Visibility) -> Self {
        self.default_visibility = visibility;
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn attributes(&self, location: &str, meta: &Metadata) -> FileAttributes {
        FileAttributes {
            path: self.prefixer.strip_prefix(location).to_string(),
            file_size: Some(meta.content_length()),
            visibility: Some(self.default_visibility),
            last_modified: meta.last_modified().map(|t| t.to_string()),
            mime_type: meta.content_type().map(str::to_string),
        }
    }

    async fn stat(&self, path: &str, kind: &'static str) -> StorageResult<FileAttributes> {
        let location = self.prefixer.prefix_path(path);
        let meta = self
            .op
            .stat(&location)
            .await
            .map_err(|e| StorageError::metadata(path, kind, e))?;
        Ok(self.attributes(&location, &meta))
    }

    /// The content type to send, if the backend can store one.
    fn content_type_for<'a>(&self, path: &str, requested: Option<&'a str>) -> Option<&'a str> {
        let content_type = requested?;
        if !self.op.info().full_capability().write_with_content_type {
            debug!(path, content_type, "backend does not store content types, dropping");
            return None;
        }
        Some(content_type)
    }

    async fn copy_object(&self, from: &str, to: &str) -> opendal::Result<()> {
        match self.op.copy(from, to).await {
            Err(e) if e.kind() == ErrorKind::Unsupported => {
                debug!(from, to, "server-side copy unsupported, copying through the client");
                let data = self.op.read(from).await?;
                self.op.write(to, data).await.map(|_| ())
            }
            other => other,
        }
    }
}

/// Streams `location` down in ranged reads of `READ_CHUNK_SIZE`.
fn ranged_chunks(
    reader: opendal::Reader,
    size: u64,
) -> impl futures::Stream<Item = Result<Bytes, CryptError>> + Send + 'static {
    futures::stream::try_unfold((reader, 0u64), move |(reader, offset)| async move {
        if offset >= size {
            return Ok::<_, CryptError>(None);
        }
        let end = (offset + READ_CHUNK_SIZE).min(size);
        let chunk = reader
            .read(offset..end)
            .await
            .map_err(|e| CryptError::io("reading object", e.into()))?
            .to_bytes();
        if chunk.is_empty() {
            return Err(CryptError::io(
                "reading object",
                std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            ));
        }
        let next = offset + chunk.len() as u64;
        Ok(Some((chunk, (reader, next))))
    })
}

impl StorageAdapter for OperatorAdapter {
    async fn file_exists(&self, path: &str) -> StorageResult<bool> {
        let location = self.prefixer.prefix_path(path);
        self.op
            .exists(&location)
            .await
            .map_err(|e| StorageError::UnableToCheckExistence {
                location: path.to_string(),
                source: e.into(),
            })
    }

    async fn directory_exists(&self, path: &str) -> StorageResult<bool> {
        let location = self.prefixer.prefix_directory_path(path);
        let entries = self
            .op
            .list(&location)
            .await
            .map_err(|e| StorageError::UnableToCheckExistence {
                location: path.to_string(),
                source: e.into(),
            })?;
        Ok(!entries.is_empty())
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let location = self.prefixer.prefix_path(path);
        let data = self
            .op
            .read(&location)
            .await
            .map_err(|e| StorageError::read(path, e))?;
        Ok(data.to_bytes())
    }

    async fn read_stream(&self, path: &str) -> StorageResult<ByteSource> {
        let location = self.prefixer.prefix_path(path);
        let meta = self
            .op
            .stat(&location)
            .await
            .map_err(|e| StorageError::read(path, e))?;
        let reader = self
            .op
            .reader(&location)
            .await
            .map_err(|e| StorageError::read(path, e))?;

        let mut stat = StreamStat::with_size(meta.content_length());
        stat.content_type = meta.content_type().map(str::to_string);

        let chunks = ranged_chunks(reader, meta.content_length());
        Ok(ByteSource::new(
            ChunkReader::from_stream(chunks, stat.clone()),
            stat,
        ))
    }

    async fn write(&self, path: &str, contents: Bytes, options: &WriteOptions) -> StorageResult<()> {
        let location = self.prefixer.prefix_path(path);
        let mut write = self.op.write_with(&location, contents);
        if let Some(content_type) = self.content_type_for(path, options.content_type.as_deref()) {
            write = write.content_type(content_type);
        }
        write.await.map_err(|e| StorageError::write(path, e))?;
        Ok(())
    }

    async fn write_stream(
        &self,
        path: &str,
        contents: ByteSource,
        options: &WriteOptions,
    ) -> StorageResult<()> {
        let location = self.prefixer.prefix_path(path);
        let declared = contents.stat().size;
        let requested = options
            .content_type
            .as_deref()
            .or(contents.stat().content_type.as_deref());

        let mut open = self.op.writer_with(&location).chunk(WRITE_CHUNK_SIZE);
        if let Some(content_type) = self.content_type_for(path, requested) {
            open = open.content_type(content_type);
        }
        let mut writer = open.await.map_err(|e| StorageError::write(path, e))?;

        let result = upload(&mut writer, contents, path).await;
        let written = abort_on_error(&mut writer, path, result).await?;

        if declared.is_some_and(|size| size != written) {
            debug!(path, ?declared, written, "stream length differs from its descriptor");
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let location = self.prefixer.prefix_path(path);
        self.op
            .delete(&location)
            .await
            .map_err(|e| StorageError::UnableToDeleteFile {
                location: path.to_string(),
                source: e.into(),
            })
    }

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        let location = self.prefixer.prefix_directory_path(path);
        self.op
            .remove_all(&location)
            .await
            .map_err(|e| StorageError::UnableToDeleteDirectory {
                location: path.to_string(),
                source: e.into(),
            })
    }

    async fn create_directory(&self, path: &str, _options: &WriteOptions) -> StorageResult<()> {
        let location = self.prefixer.prefix_directory_path(path);
        self.op
            .create_dir(&location)
            .await
            .map_err(|e| StorageError::UnableToCreateDirectory {
                location: path.to_string(),
                source: e.into(),
            })
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> StorageResult<()> {
        Err(StorageError::UnableToSetVisibility {
            location: path.to_string(),
            source: format!("per-object visibility ({visibility}) is not supported by this backend")
                .into(),
        })
    }

    async fn visibility(&self, path: &str) -> StorageResult<FileAttributes> {
        let attrs = self.stat(path, "visibility").await?;
        Ok(FileAttributes {
            visibility: attrs.visibility,
            ..FileAttributes::new(attrs.path)
        })
    }

    async fn metadata(&self, path: &str) -> StorageResult<FileAttributes> {
        self.stat(path, "metadata").await
    }

    async fn mime_type(&self, path: &str) -> StorageResult<FileAttributes> {
        let attrs = self.stat(path, "mime type").await?;
        if attrs.mime_type.is_none() {
            return Err(StorageError::metadata(path, "mime type", "backend reported none"));
        }
        Ok(attrs)
    }

    async fn last_modified(&self, path: &str) -> StorageResult<FileAttributes> {
        let attrs = self.stat(path, "last modified").await?;
        if attrs.last_modified.is_none() {
            return Err(StorageError::metadata(path, "last modified", "backend reported none"));
        }
        Ok(attrs)
    }

    async fn file_size(&self, path: &str) -> StorageResult<FileAttributes> {
        self.stat(path, "file size").await
    }

    async fn list_contents(&self, path: &str, deep: bool) -> StorageResult<Vec<StorageAttributes>> {
        let location = self.prefixer.prefix_directory_path(path);
        let entries = self
            .op
            .list_with(&location)
            .recursive(deep)
            .await
            .map_err(|e| StorageError::UnableToListContents {
                location: path.to_string(),
                source: e.into(),
            })?;

        let listed = entries
            .iter()
            .filter(|entry| entry.path().trim_start_matches('/') != location.trim_start_matches('/'))
            .map(|entry| match entry.metadata().mode() {
                EntryMode::DIR => StorageAttributes::Directory(DirectoryAttributes {
                    path: self.prefixer.strip_directory_prefix(entry.path()).to_string(),
                }),
                _ => StorageAttributes::File(self.attributes(entry.path(), entry.metadata())),
            })
            .collect();
        Ok(listed)
    }

    async fn move_file(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = self.prefixer.prefix_path(from);
        let destination = self.prefixer.prefix_path(to);
        let moved = async {
            self.copy_object(&source, &destination).await?;
            self.op.delete(&source).await
        };
        moved.await.map_err(|e| StorageError::UnableToMoveFile {
            from: from.to_string(),
            to: to.to_string(),
            source: e.into(),
        })
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = self.prefixer.prefix_path(from);
        let destination = self.prefixer.prefix_path(to);
        self.copy_object(&source, &destination)
            .await
            .map_err(|e| StorageError::UnableToCopyFile {
                from: from.to_string(),
                to: to.to_string(),
                source: e.into(),
            })
    }

    fn url(&self, path: &str) -> StorageResult<String> {
        let base = self.public_base.as_deref().ok_or_else(|| StorageError::UnableToGenerateUrl {
            location: path.to_string(),
            source: "no public base URL configured".into(),
        })?;
        Ok(format!("{base}/{}", self.prefixer.prefix_path(path)))
    }

    async fn temporary_url(&self, path: &str, expires_in: Duration) -> StorageResult<String> {
        let location = self.prefixer.prefix_path(path);
        let signed = self
            .op
            .presign_read(&location, expires_in)
            .await
            .map_err(|e| StorageError::UnableToGenerateUrl {
                location: path.to_string(),
                source: e.into(),
            })?;
        Ok(signed.uri().to_string())
    }
}

/// Copy `source` into `writer` and commit it, returning the bytes written.
async fn upload(writer: &mut Writer, mut source: ByteSource, path: &str) -> StorageResult<u64> {
    let mut buf = BytesMut::with_capacity(64 * 1024);
    let mut written = 0u64;
    loop {
        buf.reserve(64 * 1024);
        let n = source
            .read_buf(&mut buf)
            .await
            .map_err(|e| StorageError::write(path, io_source(e)))?;
        if n == 0 {
            break;
        }
        written += n as u64;
        writer
            .write(buf.split().freeze())
            .await
            .map_err(|e| StorageError::write(path, e))?;
    }
    writer
        .close()
        .await
        .map_err(|e| StorageError::write(path, e))?;
    Ok(written)
}

/// Discard a failed upload so no partial object or multipart session is left behind.
async fn abort_on_error<T>(
    writer: &mut Writer,
    path: &str,
    result: StorageResult<T>,
) -> StorageResult<T> {
    if result.is_err() {
        if let Err(abort) = writer.abort().await {
            warn!(path, error = %abort, "aborting upload failed");
        }
    }
    result
}
