//! The storage adapter contract

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use ossvault_core::{ByteSource, Visibility};
use serde::Serialize;

use crate::error::StorageResult;

/// Per-write options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Falls back to the adapter's default when unset
    pub visibility: Option<Visibility>,
    pub content_type: Option<String>,
}

impl WriteOptions {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileAttributes {
    pub path: String,
    pub file_size: Option<u64>,
    pub visibility: Option<Visibility>,
    /// RFC 3339 timestamp as reported by the backend
    pub last_modified: Option<String>,
    pub mime_type: Option<String>,
}

impl FileAttributes {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryAttributes {
    pub path: String,
}

/// One listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageAttributes {
    File(FileAttributes),
    Directory(DirectoryAttributes),
}

impl StorageAttributes {
    pub fn path(&self) -> &str {
        match self {
            StorageAttributes::File(f) => &f.path,
            StorageAttributes::Directory(d) => &d.path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, StorageAttributes::File(_))
    }
}

/// A filesystem-like view over one object store.
///
/// Paths are relative to the adapter's root. Every failure is reported as the
/// [`StorageError`](crate::StorageError) variant named after the operation.
pub trait StorageAdapter: Send + Sync {
    fn file_exists(&self, path: &str) -> impl Future<Output = StorageResult<bool>> + Send;

    fn directory_exists(&self, path: &str) -> impl Future<Output = StorageResult<bool>> + Send;

    fn read(&self, path: &str) -> impl Future<Output = StorageResult<Bytes>> + Send;

    /// Forward-only stream of the object; the returned source carries the
    /// object's size descriptor.
    fn read_stream(&self, path: &str) -> impl Future<Output = StorageResult<ByteSource>> + Send;

    fn write(
        &self,
        path: &str,
        contents: Bytes,
        options: &WriteOptions,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Upload from a stream without buffering it whole.
    fn write_stream(
        &self,
        path: &str,
        contents: ByteSource,
        options: &WriteOptions,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn delete(&self, path: &str) -> impl Future<Output = StorageResult<()>> + Send;

    fn delete_directory(&self, path: &str) -> impl Future<Output = StorageResult<()>> + Send;

    fn create_directory(
        &self,
        path: &str,
        options: &WriteOptions,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn set_visibility(
        &self,
        path: &str,
        visibility: Visibility,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn visibility(&self, path: &str) -> impl Future<Output = StorageResult<FileAttributes>> + Send;

    /// Everything the backend reports about one object
    fn metadata(&self, path: &str) -> impl Future<Output = StorageResult<FileAttributes>> + Send;

    fn mime_type(&self, path: &str) -> impl Future<Output = StorageResult<FileAttributes>> + Send;

    fn last_modified(&self, path: &str) -> impl Future<Output = StorageResult<FileAttributes>> + Send;

    fn file_size(&self, path: &str) -> impl Future<Output = StorageResult<FileAttributes>> + Send;

    fn list_contents(
        &self,
        path: &str,
        deep: bool,
    ) -> impl Future<Output = StorageResult<Vec<StorageAttributes>>> + Send;

    fn move_file(&self, from: &str, to: &str) -> impl Future<Output = StorageResult<()>> + Send;

    fn copy(&self, from: &str, to: &str) -> impl Future<Output = StorageResult<()>> + Send;

    /// Public URL of an object
    fn url(&self, path: &str) -> StorageResult<String>;

    /// Pre-signed read URL valid for `expires_in`
    fn temporary_url(
        &self,
        path: &str,
        expires_in: Duration,
    ) -> impl Future<Output = StorageResult<String>> + Send;
}
