//! Legacy v0.x "PAR"/"PXX" archives (read-only)
//!
//! Pre-1.0 clients wrote two file kinds: an index with magic `PAR\0`
//! and recovery volumes with magic `PXX\0`. The header is shorter and
//! variable, file entries use a different layout (digests swapped,
//! null-terminated name at 0x3A), and the control hash covers the file
//! from 0x36 (index) or 0x40 (volume). Reading upgrades the archive to
//! a [`Manifest`]; writing the old format is not supported.

use log::debug;
use std::io;
use std::path::Path;

use super::{ArchiveEntry, Manifest};
use crate::checksum::Md5Hash;
use crate::error::{ParError, Result};
use crate::fileio::{self, LazyFile};
use crate::unicode::UniName;

/// Client id recorded for upgraded legacy archives
const LEGACY_CLIENT_ID: u32 = 0x0200_0500;

/// The only legacy PXX revision that stored its volume number; other
/// revisions always meant volume 1.
const VERSION_WITH_VOL_NUMBER: u16 = 0x85;

/// Offset of one past the control hash, where its coverage begins
const CONTROL_START_PAR: u64 = 0x36;
const CONTROL_START_PXX: u64 = 0x40;

/// Fixed prefix of a legacy file entry; the name starts at 0x3A
const LEGACY_ENTRY_NAME_OFFSET: usize = 0x3A;

pub fn is_legacy_magic(data: &[u8]) -> bool {
    data.len() >= 4 && (&data[..4] == b"PAR\0" || &data[..4] == b"PXX\0")
}

fn truncated(what: &str) -> ParError {
    ParError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("legacy archive truncated in {}", what),
    ))
}

fn read_exact(file: &LazyFile, off: u64, buf: &mut [u8], what: &str) -> Result<()> {
    if file.read_at(off, buf)? < buf.len() {
        return Err(truncated(what));
    }
    Ok(())
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u64_at(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(buf[off..off + 8].try_into().expect("8-byte slice"))
}

/// Parse one legacy file entry; returns the entry and its declared
/// size.
fn read_legacy_entry(bytes: &[u8]) -> Result<(ArchiveEntry, usize)> {
    if bytes.len() < LEGACY_ENTRY_NAME_OFFSET {
        return Err(truncated("file entry"));
    }
    let entry_size = u64_at(bytes, 0x00) as usize;
    let status = u64_at(bytes, 0x08);
    let file_size = u64_at(bytes, 0x10);
    // Digest order is swapped relative to v1.0: 16k first, full second
    let hash_16k = Md5Hash::new(bytes[0x18..0x28].try_into().expect("16-byte slice"));
    let hash = Md5Hash::new(bytes[0x28..0x38].try_into().expect("16-byte slice"));

    // Null-terminated UTF-16LE name
    let mut name_units = Vec::new();
    let mut off = LEGACY_ENTRY_NAME_OFFSET;
    while off + 1 < bytes.len() {
        let unit = u16_at(bytes, off);
        if unit == 0 {
            break;
        }
        name_units.push(unit);
        off += 2;
    }

    if entry_size < LEGACY_ENTRY_NAME_OFFSET || entry_size > bytes.len() {
        return Err(truncated("file entry size"));
    }

    Ok((
        ArchiveEntry {
            name: UniName::new(name_units),
            status,
            file_size,
            hash,
            hash_16k,
            match_idx: None,
        },
        entry_size,
    ))
}

/// Read a legacy archive positioned at its beginning. The handle is
/// kept on the returned manifest for volume files.
pub fn read_legacy(file: LazyFile, path: &Path, check_control: bool) -> Result<Manifest> {
    let display = path.display().to_string();

    let mut magic = [0u8; 4];
    read_exact(&file, 0, &mut magic, "magic")?;
    if !is_legacy_magic(&magic) {
        return Err(ParError::NotPar(display));
    }
    let is_volume = &magic == b"PXX\0";

    // Variable header: version, set hash, (volume number), file list
    // offset, data offset, (data size), control hash.
    let mut off = 4u64;
    let mut two = [0u8; 2];
    let mut eight = [0u8; 8];
    let mut sixteen = [0u8; 16];

    read_exact(&file, off, &mut two, "version")?;
    let version = u16::from_le_bytes(two);
    off += 2;

    read_exact(&file, off, &mut sixteen, "set hash")?;
    let set_hash = Md5Hash::new(sixteen);
    off += 16;

    let mut vol_number = 0u64;
    if is_volume {
        read_exact(&file, off, &mut two, "volume number")?;
        vol_number = u16::from_le_bytes(two) as u64;
        off += 2;
        if version != VERSION_WITH_VOL_NUMBER {
            vol_number = 1;
        }
    }

    read_exact(&file, off, &mut eight, "file list offset")?;
    let file_list = u64::from_le_bytes(eight);
    off += 8;

    read_exact(&file, off, &mut eight, "data offset")?;
    let data_offset = u64::from_le_bytes(eight);
    off += 8;

    let mut data_size = 0u64;
    if is_volume {
        read_exact(&file, off, &mut eight, "data size")?;
        data_size = u64::from_le_bytes(eight);
        off += 8;
    }

    read_exact(&file, off, &mut sixteen, "control hash")?;
    let control_hash = Md5Hash::new(sixteen);

    if check_control {
        let start = if is_volume {
            CONTROL_START_PXX
        } else {
            CONTROL_START_PAR
        };
        let (_, computed) = fileio::md5_region_to_eof(&file, start)?;
        if computed != control_hash {
            return Err(ParError::Corrupt(display));
        }
    }

    // The first 8 bytes of the list region hold the list size,
    // including themselves.
    read_exact(&file, file_list, &mut eight, "file list size")?;
    let list_size = u64::from_le_bytes(eight).saturating_sub(8);
    let mut list = vec![0u8; list_size as usize];
    read_exact(&file, file_list + 8, &mut list, "file list")?;

    let mut files = Vec::new();
    let mut pos = 0usize;
    while pos < list.len() {
        let (entry, used) = read_legacy_entry(&list[pos..])?;
        files.push(entry);
        pos += used;
    }

    debug!(
        "{}: legacy {} version 0x{:x}, volume {}, {} files",
        display,
        if is_volume { "PXX" } else { "PAR" },
        version,
        vol_number,
        files.len()
    );

    Ok(Manifest {
        path: UniName::from(path),
        version: version as u32,
        client: LEGACY_CLIENT_ID,
        control_hash,
        set_hash,
        vol_number,
        data_offset,
        data_size,
        files,
        comment: UniName::default(),
        handle: if is_volume {
            Some(file)
        } else {
            file.close();
            None
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::compute_md5;
    use crate::fileio::HandleCache;

    /// Build a minimal legacy PXX volume: header, file list with one
    /// entry, no payload beyond the list.
    fn build_pxx(version: u16, vol: u16) -> Vec<u8> {
        let name: Vec<u8> = "data.bin"
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let entry_size = (LEGACY_ENTRY_NAME_OFFSET + name.len()) as u64;

        let mut entry = Vec::new();
        entry.extend_from_slice(&entry_size.to_le_bytes());
        entry.extend_from_slice(&1u64.to_le_bytes()); // status
        entry.extend_from_slice(&4096u64.to_le_bytes()); // file size
        entry.extend_from_slice(&[0x16; 16]); // 16k hash
        entry.extend_from_slice(&[0xFF; 16]); // full hash
        entry.extend_from_slice(&[0, 0]); // pad to 0x3A
        entry.extend_from_slice(&name);

        let header_len = 4 + 2 + 16 + 2 + 8 + 8 + 8 + 16;
        let file_list = header_len as u64;
        let list_size = 8 + entry.len() as u64;
        let data = file_list + list_size;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"PXX\0");
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&[0xAB; 16]); // set hash
        bytes.extend_from_slice(&vol.to_le_bytes());
        bytes.extend_from_slice(&file_list.to_le_bytes());
        bytes.extend_from_slice(&data.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes()); // data size
        let control_at = bytes.len();
        bytes.extend_from_slice(&[0u8; 16]); // control hash placeholder
        bytes.extend_from_slice(&list_size.to_le_bytes());
        bytes.extend_from_slice(&entry);

        let digest = compute_md5(&bytes[CONTROL_START_PXX as usize..]);
        bytes[control_at..control_at + 16].copy_from_slice(digest.as_bytes());
        bytes
    }

    fn parse(bytes: &[u8], check_control: bool) -> Result<Manifest> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.pxx");
        std::fs::write(&path, bytes).unwrap();
        let cache = HandleCache::new(false);
        let file = LazyFile::open_read(&cache, path.clone());
        read_legacy(file, &path, check_control)
    }

    #[test]
    fn pxx_with_volume_field() {
        let m = parse(&build_pxx(0x85, 7), true).unwrap();
        assert_eq!(m.vol_number, 7);
        assert_eq!(m.files.len(), 1);
        assert_eq!(m.files[0].name.to_string(), "data.bin");
        assert_eq!(m.files[0].file_size, 4096);
        // Digest order is swapped relative to v1.0
        assert_eq!(m.files[0].hash.as_bytes(), &[0xFF; 16]);
        assert_eq!(m.files[0].hash_16k.as_bytes(), &[0x16; 16]);
        assert!(m.handle.is_some());
    }

    #[test]
    fn pxx_without_volume_field_means_volume_one() {
        let m = parse(&build_pxx(0x80, 9), true).unwrap();
        assert_eq!(m.vol_number, 1);
    }

    #[test]
    fn corrupt_control_hash_is_rejected() {
        let mut bytes = build_pxx(0x85, 1);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            parse(&bytes, true),
            Err(ParError::Corrupt(_))
        ));
        // And accepted when control checking is off
        assert!(parse(&bytes, false).is_ok());
    }

    #[test]
    fn rejects_unknown_magic() {
        assert!(!is_legacy_magic(b"PAX\0"));
        assert!(is_legacy_magic(b"PAR\0"));
        assert!(is_legacy_magic(b"PXX\0"));
    }
}
