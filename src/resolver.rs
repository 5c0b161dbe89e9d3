//! Request resolution: from a request path to a cached file, a redirect or a 404.
//!
//! For a path inside an archive the steps are:
//!
//! 1. directory requests (`""`, `"docs/"`) become requests for `index.html`
//! 2. a plain file in the cache tree is served as is; the archive stays shut
//! 3. otherwise the archive is searched with the depth-aware matcher:
//!    no match is a 404, a directory entry redirects to `path/`, a file entry
//!    is extracted into the cache and served from there
//!
//! Resolvers only decide. Delivering bytes is up to a
//! [`StaticSender`](crate::sender::StaticSender), see [`respond`](crate::sender::respond).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use percent_encoding::percent_decode_str;
use tracing::{debug, instrument};

use crate::cache::ExtractionCache;
use crate::mount::{ArchiveListing, Mount, NodeKind, is_plain_name};
use crate::path::{is_safe_relative, with_default_document};
use crate::zip::Archive;

/// Depth used for `/{name}/{path}` requests: archive content is addressed as
/// if nested one folder under the exposed name.
pub const DEFAULT_REQUEST_DEPTH: usize = 1;

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The entry was already in the cache.
    ServeCached(PathBuf),
    /// The entry was extracted into the cache by this request.
    ServeExtracted(PathBuf),
    /// A raw archive file at the mount root.
    ServeArchive(PathBuf),
    /// Location relative to the requested resource's parent, as sent in the
    /// `Location` header: the last requested segment plus `/`.
    Redirect(String),
    NotFound,
    Listing(Vec<ArchiveListing>),
}

impl Resolution {
    /// File to hand to the static sender, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            Resolution::ServeCached(path)
            | Resolution::ServeExtracted(path)
            | Resolution::ServeArchive(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other,
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            _ => Method::Other,
        })
    }
}

/// Resolves requests against one [`Mount`], sharing one [`ExtractionCache`]
/// between all of them.
pub struct ContentResolver {
    mount: Mount,
    cache: ExtractionCache,
    depth: usize,
}

impl ContentResolver {
    pub fn new(mount: Mount) -> Self {
        Self {
            mount,
            cache: ExtractionCache::new(),
            depth: DEFAULT_REQUEST_DEPTH,
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Map a request onto the resolvers.
    ///
    /// - `/` lists the archives at the mount root
    /// - `/{name}` serves or redirects to an archive
    /// - `/{name}/{path...}` resolves `path` inside `{name}.{ext}`
    #[instrument(skip(self), level = "debug")]
    pub async fn route(&self, method: Method, request_path: &str) -> Result<Resolution> {
        if method == Method::Other {
            return Ok(Resolution::NotFound);
        }

        let request_path = request_path.split(['?', '#']).next().unwrap_or_default();
        let decoded = percent_decode_str(request_path).decode_utf8_lossy();
        let path = decoded.trim_start_matches('/');

        match path.split_once('/') {
            _ if path.is_empty() => self.list().await,
            None => self.resolve_archive(path).await,
            Some((name, sub_path)) => self.resolve_content(name, sub_path).await,
        }
    }

    /// Archive listing for the mount root.
    pub async fn list(&self) -> Result<Resolution> {
        Ok(Resolution::Listing(self.mount.list_archives().await?))
    }

    /// A request naming an archive without a path inside it.
    ///
    /// `site.zip` is served raw; `site` redirects to `site/` when `site.zip`
    /// exists.
    pub async fn resolve_archive(&self, name: &str) -> Result<Resolution> {
        if self.mount.inspect(name).await? == Some(NodeKind::File) {
            if self.mount.is_archive_name(name) {
                return Ok(Resolution::ServeArchive(self.mount.root().join(name)));
            }
            return Ok(Resolution::NotFound);
        }

        let archive_name = self.mount.archive_file_name(name);
        if self.mount.inspect(&archive_name).await? == Some(NodeKind::File) {
            return Ok(Resolution::Redirect(format!("{name}/")));
        }
        Ok(Resolution::NotFound)
    }

    /// Resolve `sub_path` inside the archive exposed as `name`.
    pub async fn resolve_content(&self, name: &str, sub_path: &str) -> Result<Resolution> {
        if !is_plain_name(name) {
            return Ok(Resolution::NotFound);
        }
        let archive_name = self.mount.archive_file_name(name);
        if self.mount.inspect(&archive_name).await? != Some(NodeKind::File) {
            debug!(archive = %archive_name, "no such archive");
            return Ok(Resolution::NotFound);
        }

        self.resolve_in_archive(
            &self.mount.archive_path(name),
            &self.mount.contents_root(name),
            sub_path,
            self.depth,
        )
        .await
    }

    /// Resolve `path` inside `archive_path`, caching under `contents`.
    pub async fn resolve_in_archive(
        &self,
        archive_path: &Path,
        contents: &Path,
        path: &str,
        depth: usize,
    ) -> Result<Resolution> {
        let resolved = with_default_document(path);
        if !is_safe_relative(&resolved) {
            debug!(path, "rejected path outside the cache tree");
            return Ok(Resolution::NotFound);
        }

        if ExtractionCache::has_cached(contents, &resolved).await? {
            debug!(path = %resolved, "cache hit");
            return Ok(Resolution::ServeCached(ExtractionCache::cache_path(
                contents, &resolved,
            )));
        }

        debug!(path = %resolved, archive = %archive_path.display(), "cache miss");
        let mut archive = Archive::open(archive_path);
        let outcome = self.lookup(&mut archive, contents, &resolved, depth).await;
        archive.close();
        outcome
    }

    async fn lookup(
        &self,
        archive: &mut Archive,
        contents: &Path,
        resolved: &str,
        depth: usize,
    ) -> Result<Resolution> {
        let Some(entry) = archive.find(resolved, depth).await? else {
            debug!(path = resolved, "no matching entry");
            return Ok(Resolution::NotFound);
        };

        if entry.is_directory {
            let last = resolved.rsplit('/').next().unwrap_or(resolved);
            return Ok(Resolution::Redirect(format!("{last}/")));
        }

        let extracted = self
            .cache
            .materialize(archive, &entry, contents, resolved)
            .await?;
        let file = ExtractionCache::cache_path(contents, resolved);
        Ok(if extracted {
            Resolution::ServeExtracted(file)
        } else {
            Resolution::ServeCached(file)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn resolver() -> (tempfile::TempDir, ContentResolver) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ContentResolver::new(Mount::new(dir.path()).unwrap());
        (dir, resolver)
    }

    #[rstest]
    #[case("GET", Method::Get)]
    #[case("head", Method::Head)]
    #[case("POST", Method::Other)]
    fn parses_methods(#[case] input: &str, #[case] expected: Method) {
        assert_eq!(input.parse::<Method>().unwrap(), expected);
    }

    #[tokio::test]
    async fn unknown_archive_is_not_found() {
        let (_dir, resolver) = resolver();
        assert_eq!(
            resolver.route(Method::Get, "/nosuch").await.unwrap(),
            Resolution::NotFound
        );
        assert_eq!(
            resolver.route(Method::Get, "/nosuch/index.html").await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn raw_archive_and_redirect() {
        let (dir, resolver) = resolver();
        std::fs::write(dir.path().join("site.zip"), b"PK").unwrap();

        assert_eq!(
            resolver.route(Method::Get, "/site.zip").await.unwrap(),
            Resolution::ServeArchive(dir.path().join("site.zip"))
        );
        assert_eq!(
            resolver.route(Method::Head, "/site").await.unwrap(),
            Resolution::Redirect("site/".into())
        );
    }

    #[tokio::test]
    async fn non_archive_file_is_not_served() {
        let (dir, resolver) = resolver();
        std::fs::write(dir.path().join("notes.txt"), b"secret").unwrap();
        assert_eq!(
            resolver.route(Method::Get, "/notes.txt").await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn other_methods_are_not_found() {
        let (dir, resolver) = resolver();
        std::fs::write(dir.path().join("site.zip"), b"PK").unwrap();
        assert_eq!(
            resolver.route(Method::Other, "/site.zip").await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn root_lists_archives() {
        let (dir, resolver) = resolver();
        std::fs::write(dir.path().join("site.zip"), b"PK").unwrap();
        let Resolution::Listing(archives) = resolver.route(Method::Get, "/").await.unwrap() else {
            panic!("expected a listing");
        };
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].name, "site");
    }

    #[tokio::test]
    async fn traversal_never_reaches_the_archive() {
        let (dir, resolver) = resolver();
        // Not a zip: any attempt to open it would fail loudly.
        std::fs::write(dir.path().join("site.zip"), b"garbage").unwrap();
        assert_eq!(
            resolver.route(Method::Get, "/site/../../etc/passwd").await.unwrap(),
            Resolution::NotFound
        );
        assert_eq!(
            resolver.route(Method::Get, "/site/%2e%2e/secret").await.unwrap(),
            Resolution::NotFound
        );
    }
}
