//! Upload sources
//!
//! The transfer engine slices chunks through [`ChunkSource`] so the same loop
//! drives real files and in-memory buffers.

use crate::error::{CliError, Result};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Random-access byte source with a fixed length
#[async_trait]
pub trait ChunkSource: Send {
    /// Total length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `[offset, offset + max_len)`, clipped to the end of the source
    async fn read_chunk(&mut self, offset: u64, max_len: u64) -> Result<Vec<u8>>;
}

/// Identity of a local file, used to rediscover its job after a restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub modified_ms: u64,
}

impl UploadFile {
    /// Stat a file on disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CliError::FileNotFound(path.display().to_string()),
            _ => CliError::Io(e),
        })?;

        if !metadata.is_file() {
            return Err(CliError::FileNotFound(path.display().to_string()));
        }

        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            modified_ms,
        })
    }
}

/// Chunk source backed by a file on disk
pub struct FileSource {
    file: tokio::fs::File,
    len: u64,
}

impl FileSource {
    pub async fn open(upload: &UploadFile) -> Result<Self> {
        let file = tokio::fs::File::open(&upload.path).await?;
        Ok(Self {
            file,
            len: upload.size,
        })
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_chunk(&mut self, offset: u64, max_len: u64) -> Result<Vec<u8>> {
        let wanted = max_len.min(self.len.saturating_sub(offset));
        let mut buffer = Vec::with_capacity(wanted as usize);

        self.file.seek(SeekFrom::Start(offset)).await?;
        (&mut self.file)
            .take(wanted)
            .read_to_end(&mut buffer)
            .await?;

        if (buffer.len() as u64) < wanted {
            return Err(CliError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "file shrank during upload: expected {} bytes at offset {}, read {}",
                    wanted,
                    offset,
                    buffer.len()
                ),
            )));
        }

        Ok(buffer)
    }
}

/// Chunk source over an in-memory buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_chunk(&mut self, offset: u64, max_len: u64) -> Result<Vec<u8>> {
        let start = (offset as usize).min(self.data.len());
        let end = (offset.saturating_add(max_len) as usize).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }
}
