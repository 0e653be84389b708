//! ossvault-storage: the adapter contract, an OpenDAL-backed adapter, and the
//! decorator that encrypts whatever passes through it

pub mod adapter;
pub mod encrypted;
pub mod error;
pub mod operator;
pub mod prefix;

pub use adapter::{
    DirectoryAttributes, FileAttributes, StorageAdapter, StorageAttributes, WriteOptions,
};
pub use encrypted::EncryptedAdapter;
pub use error::{BoxError, StorageError, StorageResult};
pub use operator::{build_from_core_config, build_operator, OperatorAdapter, S3Settings};
pub use prefix::PathPrefixer;
