//! Archive file entries
//!
//! Each entry is a 0x38-byte fixed prefix followed by the UTF-16LE
//! filename with no terminator; `entry_size` covers both.

use binrw::{BinRead, BinWrite};

use crate::checksum::Md5Hash;
use crate::unicode::UniName;

/// Fixed part of an on-disk file entry
pub const FILE_ENTRY_FIX_SIZE: u64 = 0x38;

/// Status bit 0: the file participates in the parity set
pub const STATUS_IN_PARITY: u64 = 0x1;

/// On-disk shape of one file entry
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct FileEntryRecord {
    pub entry_size: u64,
    pub status: u64,
    pub file_size: u64,
    pub hash: [u8; 16],
    pub hash_16k: [u8; 16],
    #[br(count = entry_size.saturating_sub(FILE_ENTRY_FIX_SIZE) / 2)]
    pub filename: Vec<u16>,
}

/// A file covered by an archive, as held in memory.
///
/// `match_idx` is a weak link into the directory index, resolved during
/// reconciliation; the index is append-only so the link stays valid.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: UniName,
    pub status: u64,
    pub file_size: u64,
    pub hash: Md5Hash,
    pub hash_16k: Md5Hash,
    pub match_idx: Option<usize>,
}

impl ArchiveEntry {
    pub fn in_parity_set(&self) -> bool {
        self.status & STATUS_IN_PARITY != 0
    }

    /// Size of this entry when serialized.
    pub fn entry_size(&self) -> u64 {
        FILE_ENTRY_FIX_SIZE + 2 * self.name.len() as u64
    }

    pub fn to_record(&self) -> FileEntryRecord {
        FileEntryRecord {
            entry_size: self.entry_size(),
            status: self.status,
            file_size: self.file_size,
            hash: *self.hash.as_bytes(),
            hash_16k: *self.hash_16k.as_bytes(),
            filename: self.name.units().to_vec(),
        }
    }
}

impl From<FileEntryRecord> for ArchiveEntry {
    fn from(rec: FileEntryRecord) -> Self {
        ArchiveEntry {
            name: UniName::new(rec.filename),
            status: rec.status,
            file_size: rec.file_size,
            hash: Md5Hash::new(rec.hash),
            hash_16k: Md5Hash::new(rec.hash_16k),
            match_idx: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::{BinRead, BinWrite};
    use std::io::Cursor;

    fn sample() -> ArchiveEntry {
        ArchiveEntry {
            name: UniName::from("file.dat"),
            status: STATUS_IN_PARITY,
            file_size: 1234,
            hash: Md5Hash::new([0xAA; 16]),
            hash_16k: Md5Hash::new([0xBB; 16]),
            match_idx: None,
        }
    }

    #[test]
    fn entry_size_accounts_for_name() {
        assert_eq!(sample().entry_size(), 0x38 + 16);
    }

    #[test]
    fn record_roundtrip() {
        let entry = sample();
        let mut buf = Cursor::new(Vec::new());
        entry.to_record().write(&mut buf).unwrap();
        assert_eq!(buf.get_ref().len() as u64, entry.entry_size());

        buf.set_position(0);
        let back: ArchiveEntry = FileEntryRecord::read(&mut buf).unwrap().into();
        assert_eq!(back.name, entry.name);
        assert_eq!(back.status, entry.status);
        assert_eq!(back.file_size, entry.file_size);
        assert_eq!(back.hash, entry.hash);
        assert_eq!(back.hash_16k, entry.hash_16k);
    }

    #[test]
    fn filename_is_utf16le_without_terminator() {
        let entry = sample();
        let mut buf = Cursor::new(Vec::new());
        entry.to_record().write(&mut buf).unwrap();
        let bytes = buf.into_inner();
        assert_eq!(&bytes[0x38..0x3A], &[b'f', 0]);
        assert_eq!(bytes.len(), 0x38 + 16);
    }

    #[test]
    fn parity_set_membership_is_bit_zero() {
        let mut entry = sample();
        assert!(entry.in_parity_set());
        entry.status = 0x2;
        assert!(!entry.in_parity_set());
    }
}
