use super::ReadAt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Local file reader with random access support.
///
/// Positioned reads run on tokio's blocking pool, so a slow disk never stalls
/// the runtime threads that are resolving other requests.
pub struct LocalFileReader {
    file: Arc<std::fs::File>,
    size: u64,
}

impl LocalFileReader {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let size = file.metadata().await?.len();
        Ok(Self {
            file: Arc::new(file.into_std().await),
            size,
        })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let file = Arc::clone(&self.file);
        let len = buf.len();
        let chunk = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
            let mut chunk = vec![0u8; len];
            let n = positioned_read(&file, offset, &mut chunk)?;
            chunk.truncate(n);
            Ok(chunk)
        })
        .await??;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(unix)]
fn positioned_read(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn positioned_read(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn positioned_read(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = file;
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}
