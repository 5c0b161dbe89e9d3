//! The data directory: source archives at the root, extracted entries under
//! `contents/{name}/`.
//!
//! ```text
//! {root}/site.zip
//! {root}/contents/site/index.html
//! {root}/contents/site/img/logo.png
//! ```

use anyhow::{Context, Result, bail};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Directory under the mount root holding one cache tree per archive.
pub const CONTENTS_DIR: &str = "contents";

pub const DEFAULT_EXTENSION: &str = "zip";

/// Characters escaped in a URL path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// What a name at the mount root refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// One archive found at the mount root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveListing {
    /// File name including the extension, e.g. `site.zip`
    pub file_name: String,
    /// File name without the extension, e.g. `site`
    pub name: String,
    pub size: u64,
}

impl ArchiveListing {
    /// Link to the archive's browsable contents.
    pub fn contents_href(&self) -> String {
        format!("/{}/", utf8_percent_encode(&self.name, SEGMENT))
    }
}

#[derive(Debug, Clone)]
pub struct Mount {
    root: PathBuf,
    extension: String,
}

impl Mount {
    /// Mount an existing directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or is not a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&root)
            .with_context(|| format!("Data directory {} is not accessible", root.display()))?;
        if !metadata.is_dir() {
            bail!("Data directory {} is not a directory", root.display());
        }
        Ok(Self {
            root,
            extension: DEFAULT_EXTENSION.to_string(),
        })
    }

    /// Recognize archives by `extension` (without the leading dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn archive_file_name(&self, name: &str) -> String {
        format!("{}.{}", name, self.extension)
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.root.join(self.archive_file_name(name))
    }

    /// Cache tree for the archive called `name`.
    pub fn contents_root(&self, name: &str) -> PathBuf {
        self.root.join(CONTENTS_DIR).join(name)
    }

    /// True if `file_name` carries the recognized archive extension.
    pub fn is_archive_name(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    /// Type of the node called `name` directly under the root, if any.
    ///
    /// Names that would leave the root are reported as absent.
    pub async fn inspect(&self, name: &str) -> Result<Option<NodeKind>> {
        if !is_plain_name(name) {
            return Ok(None);
        }
        let path = self.root.join(name);
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(NodeKind::File)),
            Ok(metadata) if metadata.is_dir() => Ok(Some(NodeKind::Directory)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to inspect {}", path.display())),
        }
    }

    /// Archives directly under the root, sorted by file name.
    pub async fn list_archives(&self) -> Result<Vec<ArchiveListing>> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to read {}", self.root.display()))?;

        let mut archives = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !self.is_archive_name(&file_name) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = Path::new(&file_name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            archives.push(ArchiveListing {
                file_name,
                name,
                size: metadata.len(),
            });
        }
        archives.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(archives)
    }
}

/// A single path segment that is neither empty nor a dot name.
pub(crate) fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount() -> (tempfile::TempDir, Mount) {
        let dir = tempfile::tempdir().unwrap();
        let mount = Mount::new(dir.path()).unwrap();
        (dir, mount)
    }

    #[test]
    fn rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Mount::new(dir.path().join("missing")).is_err());
    }

    #[test]
    fn layout() {
        let (dir, mount) = mount();
        assert_eq!(mount.archive_path("site"), dir.path().join("site.zip"));
        assert_eq!(
            mount.contents_root("site"),
            dir.path().join("contents").join("site")
        );
    }

    #[test]
    fn custom_extension() {
        let (dir, mount) = mount();
        let mount = mount.with_extension(".jar");
        assert_eq!(mount.archive_path("app"), dir.path().join("app.jar"));
        assert!(mount.is_archive_name("app.jar"));
        assert!(!mount.is_archive_name("app.zip"));
    }

    #[tokio::test]
    async fn inspect_kinds() {
        let (dir, mount) = mount();
        std::fs::write(dir.path().join("site.zip"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("site")).unwrap();

        assert_eq!(mount.inspect("site.zip").await.unwrap(), Some(NodeKind::File));
        assert_eq!(mount.inspect("site").await.unwrap(), Some(NodeKind::Directory));
        assert_eq!(mount.inspect("nosuch").await.unwrap(), None);
        assert_eq!(mount.inspect("..").await.unwrap(), None);
        assert_eq!(mount.inspect("a/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lists_only_top_level_archives() {
        let (dir, mount) = mount();
        std::fs::write(dir.path().join("b.zip"), b"bb").unwrap();
        std::fs::write(dir.path().join("a.zip"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("dir.zip")).unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.zip"), b"c").unwrap();

        let archives = mount.list_archives().await.unwrap();
        let names: Vec<_> = archives.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, ["a.zip", "b.zip"]);
        assert_eq!(archives[1].name, "b");
        assert_eq!(archives[1].size, 2);
        assert_eq!(archives[0].contents_href(), "/a/");
    }

    #[test]
    fn contents_href_is_escaped() {
        let listing = ArchiveListing {
            file_name: "my site.zip".into(),
            name: "my site".into(),
            size: 0,
        };
        assert_eq!(listing.contents_href(), "/my%20site/");
    }
}
