use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// Size descriptor for a stream, known independently of reading it.
///
/// `size == None` means the length is unknown (e.g. a pipe).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStat {
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

impl StreamStat {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            content_type: None,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Same descriptor with a different length
    pub fn resized(&self, size: u64) -> Self {
        Self {
            size: Some(size),
            content_type: self.content_type.clone(),
        }
    }
}

/// Object visibility, mapped to ACLs by the storage layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => f.write_str("public"),
            Visibility::Private => f.write_str("private"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

/// A one-shot, forward-only readable resource plus its size descriptor.
///
/// The reader is consumed by whoever reads it; it is never rewound.
pub struct ByteSource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    stat: StreamStat,
}

impl ByteSource {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static, stat: StreamStat) -> Self {
        Self {
            reader: Box::new(reader),
            stat,
        }
    }

    /// In-memory source over `data`
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let stat = StreamStat::with_size(data.len() as u64);
        Self::new(io::Cursor::new(data), stat)
    }

    /// Open a local file; the size comes from its metadata.
    pub async fn from_file(path: &Path) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self::new(file, StreamStat::with_size(len)))
    }

    pub fn stat(&self) -> &StreamStat {
        &self.stat
    }

    pub fn into_parts(self) -> (Box<dyn AsyncRead + Send + Unpin>, StreamStat) {
        (self.reader, self.stat)
    }

    pub async fn read_to_end(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.stat.size.unwrap_or(0) as usize);
        self.reader.read_to_end(&mut out).await?;
        Ok(out)
    }
}

impl AsyncRead for ByteSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("stat", &self.stat)
            .finish_non_exhaustive()
    }
}
