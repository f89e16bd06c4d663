//! PAR archive reading and writing
//!
//! One [`Manifest`] type covers index files (volume 0) and recovery
//! volumes (volume ≥ 1); operations that differ branch on the volume
//! number. Legacy v0.x "PAR"/"PXX" files are recognized by their 3-byte
//! magic and upgraded to a `Manifest` on read.

use binrw::{BinRead, BinWrite};
use log::debug;
use std::io::{self, Cursor};
use std::path::Path;

pub mod entry;
pub mod header;
pub mod legacy;

pub use entry::{ArchiveEntry, FileEntryRecord, FILE_ENTRY_FIX_SIZE, STATUS_IN_PARITY};
pub use header::{
    VolumeHeader, CLIENT_ID, CONTROL_HASH_OFFSET, CONTROL_REGION_START, FIXED_HEADER_SIZE,
    PAR_MAGIC, VERSION_1_0, VERSION_MAX,
};

use crate::checksum::{compute_md5, Md5Hash};
use crate::error::{ParError, Result};
use crate::fileio::{self, HandleCache, LazyFile};
use crate::unicode::UniName;

/// A parsed (or about-to-be-written) PAR archive.
#[derive(Debug)]
pub struct Manifest {
    /// Name the archive was read from or will be written to
    pub path: UniName,
    pub version: u32,
    pub client: u32,
    pub control_hash: Md5Hash,
    pub set_hash: Md5Hash,
    /// 0 = index, k ≥ 1 = recovery volume
    pub vol_number: u64,
    /// Offset of the comment (volume 0) or parity payload (volume ≥ 1)
    pub data_offset: u64,
    pub data_size: u64,
    pub files: Vec<ArchiveEntry>,
    /// UTF-16 comment blob, volume 0 only
    pub comment: UniName,
    /// Open handle, kept for recovery volumes so the payload can be
    /// streamed without reopening
    pub handle: Option<LazyFile>,
}

impl Manifest {
    /// Fresh in-memory archive, as produced when loading a name that
    /// does not exist on disk yet.
    pub fn new_empty(path: &Path, vol_number: u64) -> Self {
        Manifest {
            path: UniName::from(path),
            version: VERSION_1_0,
            client: CLIENT_ID,
            control_hash: Md5Hash::default(),
            set_hash: Md5Hash::default(),
            vol_number,
            data_offset: 0,
            data_size: 0,
            files: Vec::new(),
            comment: UniName::default(),
            handle: None,
        }
    }

    /// Log the parsed header and entries (loglevel ≥ 2).
    pub fn dump(&self) {
        debug!(
            "PAR file dump: version 0x{:08x} client 0x{:08x} volume {} files {}",
            self.version,
            self.client,
            self.vol_number,
            self.files.len()
        );
        debug!(
            "  control hash: {}  set hash: {}",
            self.control_hash, self.set_hash
        );
        debug!(
            "  data: 0x{:x} size 0x{:x}",
            self.data_offset, self.data_size
        );
        if self.vol_number == 0 {
            debug!("  comment: {}", self.comment);
        }
        for f in &self.files {
            debug!(
                "    {} status 0x{:x} size {} hash {} 16k {}",
                f.name, f.status, f.file_size, f.hash, f.hash_16k
            );
        }
    }
}

/// Derive a volume number from a filename's trailing digits
/// (`demo.p03` → 3, `demo.par` → 0).
pub fn guess_volume_number(path: &Path) -> u64 {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let Some(name) = name else { return 0 };
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}

fn binrw_err(e: binrw::Error) -> ParError {
    ParError::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Parse a file-list region into entries; stops when the bytes are
/// exhausted.
pub fn parse_file_list(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut files = Vec::new();
    let mut cursor = Cursor::new(bytes);
    while (cursor.position() as usize) < bytes.len() {
        let start = cursor.position();
        let record = FileEntryRecord::read(&mut cursor).map_err(binrw_err)?;
        if record.entry_size < FILE_ENTRY_FIX_SIZE {
            return Err(ParError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "file entry smaller than its fixed prefix",
            )));
        }
        // The declared size is authoritative for finding the next entry
        cursor.set_position(start + record.entry_size);
        files.push(record.into());
    }
    Ok(files)
}

/// Read an archive.
///
/// With `create` set, a missing file yields a fresh in-memory manifest
/// whose volume number is guessed from the name's trailing digits.
/// With `check_control` set, the MD5 over bytes [0x20..EOF) must match
/// the stored control hash.
pub fn read_manifest(
    cache: &HandleCache,
    path: &Path,
    create: bool,
    check_control: bool,
) -> Result<Manifest> {
    let display = path.display().to_string();
    let file = LazyFile::open_read(cache, path.to_path_buf());

    let mut head = [0u8; FIXED_HEADER_SIZE as usize];
    let n = match file.read_at(0, &mut head) {
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::NotFound && create => {
            debug!("{}: not on disk, creating empty manifest", display);
            return Ok(Manifest::new_empty(path, guess_volume_number(path)));
        }
        Err(e) => return Err(e.into()),
    };

    if n >= 4 && legacy::is_legacy_magic(&head[..4]) && !(n >= 8 && &head[..8] == PAR_MAGIC) {
        return legacy::read_legacy(file, path, check_control);
    }
    if n < FIXED_HEADER_SIZE as usize || &head[..8] != PAR_MAGIC {
        return Err(ParError::NotPar(display));
    }

    let header = VolumeHeader::read(&mut Cursor::new(&head[..])).map_err(binrw_err)?;

    if header.version > VERSION_MAX {
        return Err(ParError::VersionMismatch {
            file: display,
            major: (header.version >> 16) as u16,
            minor: ((header.version & 0xFFFF) >> 8) as u16,
        });
    }

    if check_control {
        let (_, computed) = fileio::md5_region_to_eof(&file, CONTROL_REGION_START)?;
        if computed.as_bytes() != &header.control_hash {
            return Err(ParError::Corrupt(display));
        }
    }

    let mut list = vec![0u8; header.file_list_size as usize];
    let got = file.read_at(header.file_list, &mut list)?;
    if got < list.len() {
        return Err(ParError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "file list truncated",
        )));
    }
    let files = parse_file_list(&list)?;
    if files.len() as u64 != header.num_files {
        debug!(
            "{}: header claims {} files, list holds {}",
            display,
            header.num_files,
            files.len()
        );
    }

    let mut manifest = Manifest {
        path: UniName::from(path),
        version: header.version,
        client: header.client,
        control_hash: Md5Hash::new(header.control_hash),
        set_hash: Md5Hash::new(header.set_hash),
        vol_number: header.vol_number,
        data_offset: header.data,
        data_size: header.data_size,
        files,
        comment: UniName::default(),
        handle: None,
    };

    if manifest.vol_number == 0 {
        let mut comment = vec![0u8; manifest.data_size as usize];
        let got = file.read_at(manifest.data_offset, &mut comment)?;
        manifest.comment = UniName::from_utf16le(&comment[..got]);
        // Index archives are fully consumed; no handle kept
    } else {
        manifest.handle = Some(file);
    }

    Ok(manifest)
}

/// Compute the set hash: MD5 over the sorted full hashes of the
/// parity-set files. Sorting makes the hash a function of the file
/// *set*, independent of list order.
pub fn compute_set_hash(files: &[ArchiveEntry]) -> Md5Hash {
    let mut hashes: Vec<[u8; 16]> = files
        .iter()
        .filter(|f| f.in_parity_set())
        .map(|f| *f.hash.as_bytes())
        .collect();
    hashes.sort_unstable();
    let concat: Vec<u8> = hashes.into_iter().flatten().collect();
    compute_md5(&concat)
}

/// Write an archive header, file entries, and (for volume 0) the
/// comment.
///
/// Updates the manifest's layout fields, set hash, and — for volume 0 —
/// control hash. Every archive this writes carries a valid control
/// hash; the no-control toggle only skips validation on read. For
/// recovery volumes the handle is stored on the manifest, positioned
/// for the parity payload at `data_offset`; their control hash is
/// patched in by the caller once the payload is written.
///
/// The target path must be vacant: rename-away runs before this, and
/// the open uses create-new semantics.
pub fn write_manifest(cache: &HandleCache, path: &Path, manifest: &mut Manifest) -> Result<()> {
    let display = path.display().to_string();

    let mut entries = Vec::new();
    {
        let mut cursor = Cursor::new(&mut entries);
        for f in &manifest.files {
            f.to_record().write(&mut cursor).map_err(binrw_err)?;
        }
    }

    manifest.data_offset = FIXED_HEADER_SIZE + entries.len() as u64;
    manifest.data_size = if manifest.vol_number == 0 {
        manifest.comment.to_utf16le().len() as u64
    } else {
        manifest
            .files
            .iter()
            .filter(|f| f.in_parity_set())
            .map(|f| f.file_size)
            .max()
            .unwrap_or(0)
    };
    manifest.set_hash = compute_set_hash(&manifest.files);
    manifest.control_hash = Md5Hash::default();

    let header = VolumeHeader {
        version: manifest.version,
        client: manifest.client,
        control_hash: *manifest.control_hash.as_bytes(),
        set_hash: *manifest.set_hash.as_bytes(),
        vol_number: manifest.vol_number,
        num_files: manifest.files.len() as u64,
        file_list: FIXED_HEADER_SIZE,
        file_list_size: entries.len() as u64,
        data: manifest.data_offset,
        data_size: manifest.data_size,
    };
    let mut head = Cursor::new(Vec::new());
    header.write(&mut head).map_err(binrw_err)?;

    let file = match LazyFile::create(cache, path.to_path_buf()) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(ParError::WriteBlocked(display));
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all_at(0, head.get_ref())?;
    file.write_all_at(FIXED_HEADER_SIZE, &entries)?;

    if manifest.vol_number == 0 {
        file.write_all_at(manifest.data_offset, &manifest.comment.to_utf16le())?;
        let end = manifest.data_offset + manifest.data_size;
        manifest.control_hash =
            fileio::patch_region_md5(&file, CONTROL_HASH_OFFSET, CONTROL_REGION_START, end)?;
        file.close();
        manifest.handle = None;
    } else {
        manifest.handle = Some(file);
    }
    Ok(())
}
