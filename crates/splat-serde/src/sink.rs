use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Destination of an export. Writers push their bytes through this and nothing else.
///
/// `is_final` marks the last write of an export.
#[allow(async_fn_in_trait)]
pub trait SplatSink {
    async fn write(&mut self, bytes: &[u8], is_final: bool) -> std::io::Result<()>;
}

/// Collects an export in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub data: Vec<u8>,
    /// Number of `write` calls received.
    pub writes: usize,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl SplatSink for MemorySink {
    async fn write(&mut self, bytes: &[u8], is_final: bool) -> std::io::Result<()> {
        self.data.extend_from_slice(bytes);
        self.writes += 1;
        self.finished |= is_final;
        Ok(())
    }
}

/// Streams an export to a file.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub async fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            file: File::create(path).await?,
        })
    }
}

impl SplatSink for FileSink {
    async fn write(&mut self, bytes: &[u8], is_final: bool) -> std::io::Result<()> {
        self.file.write_all(bytes).await?;
        if is_final {
            self.file.flush().await?;
        }
        Ok(())
    }
}
