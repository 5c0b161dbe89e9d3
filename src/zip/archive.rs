use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_compression::tokio::bufread::DeflateDecoder;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::io::LocalFileReader;
use crate::path::matcher;

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipEntry};

/// Entries buffered between the parsing task and the consumer.
const DISCOVERY_BUFFER: usize = 64;

const COPY_BUFFER: usize = 64 * 1024;

/// Decompressed contents of one entry.
pub type EntryReader<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

/// One item pushed by the discovery task.
#[derive(Debug)]
pub enum Discovery {
    Entry(ZipEntry),
    /// Every entry has been sent.
    Complete,
}

/// Pull side of an archive's entry discovery.
///
/// Entries arrive in central directory order. Dropping the stream stops the
/// producer: its next send fails and the task exits.
pub struct DiscoveryStream {
    rx: mpsc::Receiver<Result<Discovery>>,
    task: JoinHandle<()>,
    complete: bool,
}

impl DiscoveryStream {
    /// Next entry, `Ok(None)` once discovery completes.
    ///
    /// A producer that goes away without sending [`Discovery::Complete`] is a
    /// failure, never an empty listing.
    pub async fn next(&mut self) -> Result<Option<ZipEntry>> {
        if self.complete {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Ok(Discovery::Entry(entry))) => Ok(Some(entry)),
            Some(Ok(Discovery::Complete)) => {
                self.complete = true;
                Ok(None)
            }
            Some(Err(e)) => {
                self.complete = true;
                Err(e)
            }
            None => {
                self.complete = true;
                Err(anyhow!("Entry discovery ended before completing"))
            }
        }
    }
}

impl Drop for DiscoveryStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum State {
    Opened(Option<Arc<LocalFileReader>>),
    Closed,
}

/// A per-request handle on one archive file.
///
/// Opening is free: the file is not touched until the first listing or
/// extraction. Every operation after [`close`](Self::close) fails.
pub struct Archive {
    path: PathBuf,
    state: State,
}

impl Archive {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: State::Opened(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Opened(_))
    }

    /// Release the underlying file. Safe to call any number of times.
    pub fn close(&mut self) {
        if let State::Opened(reader) = std::mem::replace(&mut self.state, State::Closed) {
            debug!(archive = %self.path.display(), touched = reader.is_some(), "closed archive");
        }
    }

    async fn parser(&mut self) -> Result<ZipParser<LocalFileReader>> {
        let reader = match &mut self.state {
            State::Closed => bail!("Archive {} is closed", self.path.display()),
            State::Opened(Some(reader)) => Arc::clone(reader),
            State::Opened(slot) => {
                trace!(archive = %self.path.display(), "opening archive");
                let reader = Arc::new(LocalFileReader::open(&self.path).await?);
                *slot = Some(Arc::clone(&reader));
                reader
            }
        };
        Ok(ZipParser::new(reader))
    }

    /// Start pushing entries from the central directory onto a bounded channel.
    pub async fn discover(&mut self) -> Result<DiscoveryStream> {
        let parser = self.parser().await?;
        let (tx, rx) = mpsc::channel(DISCOVERY_BUFFER);

        let task = tokio::spawn(async move {
            let directory = match parser.read_central_directory().await {
                Ok(directory) => directory,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            for entry in directory.entries() {
                let failed = entry.is_err();
                if tx.send(entry.map(Discovery::Entry)).await.is_err() || failed {
                    return;
                }
            }
            let _ = tx.send(Ok(Discovery::Complete)).await;
        });

        Ok(DiscoveryStream {
            rx,
            task,
            complete: false,
        })
    }

    /// First discovered entry accepted by `predicate`.
    ///
    /// `Ok(None)` means the whole archive was listed without a match; `Err`
    /// is reserved for I/O and format failures.
    pub async fn find_one<F>(&mut self, predicate: F) -> Result<Option<ZipEntry>>
    where
        F: Fn(&ZipEntry) -> bool,
    {
        let mut stream = self.discover().await?;
        while let Some(entry) = stream.next().await? {
            if predicate(&entry) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// [`find_one`](Self::find_one) with the depth-aware name matcher.
    pub async fn find(&mut self, name: &str, depth: usize) -> Result<Option<ZipEntry>> {
        self.find_one(matcher(name, depth)).await
    }

    /// Every entry accepted by `predicate`, in discovery order.
    pub async fn find_all<F>(&mut self, predicate: F) -> Result<Vec<ZipEntry>>
    where
        F: Fn(&ZipEntry) -> bool,
    {
        let mut stream = self.discover().await?;
        let mut matches = Vec::new();
        while let Some(entry) = stream.next().await? {
            if predicate(&entry) {
                matches.push(entry);
            }
        }
        Ok(matches)
    }

    /// Decompressed bytes of `entry`. The reader borrows the handle, so it
    /// cannot outlive it.
    pub async fn stream_bytes(&mut self, entry: &ZipEntry) -> Result<EntryReader<'_>> {
        if entry.is_directory {
            bail!("{} is a directory", entry.name);
        }
        if entry.is_encrypted() {
            bail!("Encrypted entries are not supported: {}", entry.name);
        }

        let parser = self.parser().await?;
        let offset = parser.data_offset(entry).await?;

        let mut file = fs::File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.seek(SeekFrom::Start(offset)).await?;
        let raw = BufReader::new(file.take(entry.compressed_size));

        let reader: EntryReader<'_> = match entry.compression_method {
            CompressionMethod::Stored => Box::pin(raw),
            CompressionMethod::Deflate => Box::pin(DeflateDecoder::new(raw)),
            CompressionMethod::Unknown(method) => {
                bail!(
                    "Unsupported compression method {} for {} (only STORED and DEFLATE)",
                    method,
                    entry.name
                )
            }
        };
        Ok(reader)
    }

    /// Decompress `entry` to `destination`, verifying size and CRC-32.
    ///
    /// On failure the destination is removed again.
    pub async fn extract_to_file(&mut self, entry: &ZipEntry, destination: &Path) -> Result<()> {
        let result = self.write_entry(entry, destination).await;
        if result.is_err() {
            let _ = fs::remove_file(destination).await;
        }
        result
    }

    async fn write_entry(&mut self, entry: &ZipEntry, destination: &Path) -> Result<()> {
        let mut reader = self.stream_bytes(entry).await?;
        let mut file = fs::File::create(destination)
            .await
            .with_context(|| format!("Failed to create {}", destination.display()))?;

        let mut hasher = crc32fast::Hasher::new();
        let mut buf = vec![0u8; COPY_BUFFER];
        let mut written = 0u64;
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .with_context(|| format!("Failed to decompress {}", entry.name))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])
                .await
                .with_context(|| format!("Failed to write {}", destination.display()))?;
            written += n as u64;
        }
        file.flush().await?;

        if written != entry.uncompressed_size {
            bail!(
                "Size mismatch for {}: expected {} bytes, got {}",
                entry.name,
                entry.uncompressed_size,
                written
            );
        }
        let crc = hasher.finalize();
        if crc != entry.crc32 {
            bail!(
                "CRC mismatch for {}: expected {:08x}, got {:08x}",
                entry.name,
                entry.crc32,
                crc
            );
        }
        Ok(())
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        self.close();
    }
}
