#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::path::Path;

use zipserve::{ContentResolver, Mount};

/// 1980-01-01 in DOS date format.
const DOS_DATE: u16 = (1 << 5) | 1;

/// Writes small ZIP archives for tests.
#[derive(Default)]
pub struct ZipBuilder {
    data: Vec<u8>,
    central: Vec<u8>,
    count: u16,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, contents: &[u8]) -> Self {
        let crc = crc32fast::hash(contents);
        self.raw(name, 0, contents, contents.to_vec(), crc)
    }

    pub fn deflated(self, name: &str, contents: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents).unwrap();
        let compressed = encoder.finish().unwrap();
        let crc = crc32fast::hash(contents);
        self.raw(name, 8, contents, compressed, crc)
    }

    pub fn directory(self, name: &str) -> Self {
        assert!(name.ends_with('/'));
        self.raw(name, 0, b"", Vec::new(), 0)
    }

    /// Stored entry whose recorded CRC does not match its bytes.
    pub fn corrupt(self, name: &str, contents: &[u8]) -> Self {
        let crc = crc32fast::hash(contents) ^ 0xDEADBEEF;
        self.raw(name, 0, contents, contents.to_vec(), crc)
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = comment.as_bytes().to_vec();
        self
    }

    pub fn raw(mut self, name: &str, method: u16, contents: &[u8], stored: Vec<u8>, crc: u32) -> Self {
        let offset = self.data.len() as u32;
        let name_bytes = name.as_bytes();

        let lfh = &mut self.data;
        lfh.extend_from_slice(b"PK\x03\x04");
        lfh.write_u16::<LittleEndian>(20).unwrap();
        lfh.write_u16::<LittleEndian>(0).unwrap();
        lfh.write_u16::<LittleEndian>(method).unwrap();
        lfh.write_u16::<LittleEndian>(0).unwrap();
        lfh.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        lfh.write_u32::<LittleEndian>(crc).unwrap();
        lfh.write_u32::<LittleEndian>(stored.len() as u32).unwrap();
        lfh.write_u32::<LittleEndian>(contents.len() as u32).unwrap();
        lfh.write_u16::<LittleEndian>(name_bytes.len() as u16).unwrap();
        lfh.write_u16::<LittleEndian>(0).unwrap();
        lfh.extend_from_slice(name_bytes);
        lfh.extend_from_slice(&stored);

        let cd = &mut self.central;
        cd.extend_from_slice(b"PK\x01\x02");
        cd.write_u16::<LittleEndian>(20).unwrap();
        cd.write_u16::<LittleEndian>(20).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(method).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        cd.write_u32::<LittleEndian>(crc).unwrap();
        cd.write_u32::<LittleEndian>(stored.len() as u32).unwrap();
        cd.write_u32::<LittleEndian>(contents.len() as u32).unwrap();
        cd.write_u16::<LittleEndian>(name_bytes.len() as u16).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u32::<LittleEndian>(0).unwrap();
        cd.write_u32::<LittleEndian>(offset).unwrap();
        cd.extend_from_slice(name_bytes);

        self.count += 1;
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = self.data;
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);

        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u32::<LittleEndian>(self.central.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(self.comment.len() as u16).unwrap();
        out.extend_from_slice(&self.comment);
        out
    }

    pub fn write_to(self, path: &Path) {
        std::fs::write(path, self.finish()).unwrap();
    }
}

/// The archive from the depth-matching example: everything under `public/`.
pub fn site_archive() -> ZipBuilder {
    ZipBuilder::new()
        .directory("public/")
        .stored("public/index.html", b"<h1>home</h1>")
        .directory("public/img/")
        .deflated("public/img/logo.png", &logo_bytes())
        .deflated("public/docs/index.html", b"<h1>docs</h1>")
}

/// Something that actually compresses.
pub fn logo_bytes() -> Vec<u8> {
    (0..4096u32).flat_map(|i| (i % 251).to_le_bytes()).collect()
}

/// A mount in a fresh temp dir with `archive` saved as `{name}.zip`.
pub fn mount_with(name: &str, archive: ZipBuilder) -> (tempfile::TempDir, ContentResolver) {
    let dir = tempfile::tempdir().unwrap();
    archive.write_to(&dir.path().join(format!("{name}.zip")));
    let resolver = ContentResolver::new(Mount::new(dir.path()).unwrap());
    (dir, resolver)
}

/// Every `.part` file left anywhere under `root`.
pub fn leftover_parts(root: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "part") {
                found.push(path);
            }
        }
    }
    found
}
