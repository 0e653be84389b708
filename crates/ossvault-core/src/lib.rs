//! ossvault-core: shared building blocks for the ossvault encrypted object store
//!
//! - `error`: the crypt error taxonomy shared by codecs and readers
//! - `config`: TOML configuration schema (`ossvault.toml`)
//! - `types`: size descriptors and one-shot byte sources
//! - `reader`: adapts a lazy sequence of byte chunks into an `AsyncRead`

pub mod config;
pub mod error;
pub mod reader;
pub mod types;

pub use error::{CryptError, CryptResult, FailureKind};
pub use reader::{ChunkReader, ChunkStream};
pub use types::{ByteSource, StreamStat, Visibility};
