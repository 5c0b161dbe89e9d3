//! Delivery of resolved requests.
//!
//! [`respond`] is the one place a [`Resolution`] turns into output. The
//! [`StaticSender`] behind it owns everything about the bytes on the wire
//! (ranges, validators, content types); [`WriterSender`] is the plain
//! implementation used by the CLI.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::mount::ArchiveListing;
use crate::resolver::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Found,
    NotFound,
}

impl Status {
    pub fn as_u16(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Found => 302,
            Status::NotFound => 404,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Status::Ok => "OK",
            Status::Found => "Found",
            Status::NotFound => "Not Found",
        };
        write!(f, "{} {}", self.as_u16(), reason)
    }
}

/// Sends responses for resolved requests.
#[async_trait]
pub trait StaticSender: Send {
    /// Send a file that is known to exist. With `head` only metadata goes out.
    async fn send_file(&mut self, path: &Path, head: bool) -> Result<Status>;

    async fn redirect(&mut self, location: &str) -> Result<Status>;

    async fn not_found(&mut self) -> Result<Status>;

    async fn listing(&mut self, archives: &[ArchiveListing], head: bool) -> Result<Status>;
}

/// Hand `resolution` to `sender`.
pub async fn respond<S>(sender: &mut S, resolution: &Resolution, head: bool) -> Result<Status>
where
    S: StaticSender + ?Sized,
{
    match resolution {
        Resolution::ServeCached(path)
        | Resolution::ServeExtracted(path)
        | Resolution::ServeArchive(path) => sender.send_file(path, head).await,
        Resolution::Redirect(location) => sender.redirect(location).await,
        Resolution::NotFound => sender.not_found().await,
        Resolution::Listing(archives) => sender.listing(archives, head).await,
    }
}

/// Streams bodies into any writer and remembers the headers it would send.
pub struct WriterSender<W> {
    writer: W,
    location: Option<String>,
    content_length: Option<u64>,
}

impl<W: AsyncWrite + Unpin + Send> WriterSender<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            location: None,
            content_length: None,
        }
    }

    /// `Location` of the last redirect.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Body size of the last file sent.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> StaticSender for WriterSender<W> {
    async fn send_file(&mut self, path: &Path, head: bool) -> Result<Status> {
        let mut file = fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        self.content_length = Some(file.metadata().await?.len());
        if !head {
            tokio::io::copy(&mut file, &mut self.writer).await?;
            self.writer.flush().await?;
        }
        Ok(Status::Ok)
    }

    async fn redirect(&mut self, location: &str) -> Result<Status> {
        self.location = Some(location.to_string());
        Ok(Status::Found)
    }

    async fn not_found(&mut self) -> Result<Status> {
        Ok(Status::NotFound)
    }

    async fn listing(&mut self, archives: &[ArchiveListing], head: bool) -> Result<Status> {
        if !head {
            for archive in archives {
                let line = format!("{}\t{}\n", archive.file_name, archive.contents_href());
                self.writer.write_all(line.as_bytes()).await?;
            }
            self.writer.flush().await?;
        }
        Ok(Status::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streams_file_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, b"<h1>hi</h1>").unwrap();

        let mut sender = WriterSender::new(Vec::new());
        let status = respond(&mut sender, &Resolution::ServeCached(path), false)
            .await
            .unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(sender.content_length(), Some(11));
        assert_eq!(sender.into_inner(), b"<h1>hi</h1>");
    }

    #[tokio::test]
    async fn head_sends_no_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"abc").unwrap();

        let mut sender = WriterSender::new(Vec::new());
        respond(&mut sender, &Resolution::ServeExtracted(path), true)
            .await
            .unwrap();
        assert_eq!(sender.content_length(), Some(3));
        assert!(sender.into_inner().is_empty());
    }

    #[tokio::test]
    async fn redirect_and_not_found() {
        let mut sender = WriterSender::new(Vec::new());
        let status = respond(&mut sender, &Resolution::Redirect("img/".into()), false)
            .await
            .unwrap();
        assert_eq!(status, Status::Found);
        assert_eq!(sender.location(), Some("img/"));

        let status = respond(&mut sender, &Resolution::NotFound, false).await.unwrap();
        assert_eq!(status.to_string(), "404 Not Found");
    }

    #[tokio::test]
    async fn listing_lines() {
        let archives = vec![ArchiveListing {
            file_name: "site.zip".into(),
            name: "site".into(),
            size: 10,
        }];
        let mut sender = WriterSender::new(Vec::new());
        respond(&mut sender, &Resolution::Listing(archives), false)
            .await
            .unwrap();
        assert_eq!(sender.into_inner(), b"site.zip\t/site/\n");
    }
}
