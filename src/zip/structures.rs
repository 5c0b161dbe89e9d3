use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use anyhow::{Result, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        // Skip the two disk numbers; multi-disk archives are not supported.
        let mut cursor = Cursor::new(&data[8..]);

        Ok(Self {
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub eocd64_offset: u64,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 End of Central Directory Locator");
        }

        let mut cursor = Cursor::new(&data[8..]);

        Ok(Self {
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 End of Central Directory");
        }

        // Record size, versions and disk numbers precede the counts.
        let mut cursor = Cursor::new(&data[32..]);

        Ok(Self {
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// General purpose flag bit 0: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// One record from an archive's central directory.
///
/// Entries are metadata snapshots; reading their bytes goes through the
/// [`Archive`](super::Archive) that discovered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Internal path, as stored in the archive
    pub name: String,
    pub is_directory: bool,
    pub compression_method: CompressionMethod,
    pub flags: u16,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
}

impl ZipEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

/// Variable-length tail of a Local File Header, needed to find the data.
pub struct LocalFileHeader {
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LFH_SIZE || &data[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header");
        }

        let mut cursor = Cursor::new(&data[26..]);

        Ok(Self {
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// `None` if the offset does not fit in a `u64`.
    pub fn data_offset(&self, lfh_offset: u64) -> Option<u64> {
        lfh_offset.checked_add(
            LFH_SIZE as u64 + self.file_name_length as u64 + self.extra_field_length as u64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(date: u16, time: u16) -> ZipEntry {
        ZipEntry {
            name: "a.txt".into(),
            is_directory: false,
            compression_method: CompressionMethod::Stored,
            flags: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: time,
            last_mod_date: date,
        }
    }

    #[test]
    fn dos_timestamp() {
        // 2021-03-14 15:09:26
        let date = ((2021 - 1980) << 9) | (3 << 5) | 14;
        let time = (15 << 11) | (9 << 5) | 13;
        let e = entry(date, time);
        assert_eq!(e.mod_date(), (2021, 3, 14));
        assert_eq!(e.mod_time(), (15, 9, 26));
    }

    #[test]
    fn eocd_rejects_bad_signature() {
        let mut data = vec![0u8; EndOfCentralDirectory::SIZE];
        data[0..4].copy_from_slice(b"PK\x03\x04");
        assert!(EndOfCentralDirectory::from_bytes(&data).is_err());
    }

    #[test]
    fn eocd_detects_zip64_markers() {
        let mut data = vec![0u8; EndOfCentralDirectory::SIZE];
        data[0..4].copy_from_slice(EndOfCentralDirectory::SIGNATURE);
        data[16..20].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        let eocd = EndOfCentralDirectory::from_bytes(&data).unwrap();
        assert!(eocd.is_zip64());
    }

    #[test]
    fn local_header_data_offset() {
        let mut data = vec![0u8; LFH_SIZE];
        data[0..4].copy_from_slice(LFH_SIGNATURE);
        data[26..28].copy_from_slice(&5u16.to_le_bytes());
        data[28..30].copy_from_slice(&4u16.to_le_bytes());
        let lfh = LocalFileHeader::from_bytes(&data).unwrap();
        assert_eq!(lfh.data_offset(100), Some(100 + 30 + 5 + 4));
        assert_eq!(lfh.data_offset(u64::MAX - 10), None);
    }

    #[test]
    fn compression_method_round_trips_unknown() {
        assert_eq!(CompressionMethod::from_u16(8), CompressionMethod::Deflate);
        assert_eq!(CompressionMethod::from_u16(12).as_u16(), 12);
    }
}
