//! File access primitives
//!
//! Archives and data files are accessed through [`LazyFile`] handles:
//! the OS file is opened on first use and can be transparently closed
//! and reopened later. When the open-file-limit workaround is enabled,
//! hitting EMFILE/ENFILE closes the least-recently-opened idle read
//! handle and retries; write handles are never evicted.
//!
//! Output files are always created with create-new semantics, so an
//! existing file is never silently overwritten; the rename-away
//! protocol must have cleared the path first.

use log::debug;
use md5::{Digest, Md5};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use crate::checksum::Md5Hash;

#[derive(Debug)]
struct Slot {
    file: Option<File>,
    pos: u64,
}

#[derive(Debug)]
struct CacheInner {
    enabled: bool,
    open_reads: VecDeque<Weak<RefCell<Slot>>>,
}

/// Registry of open read handles, least recently opened first.
#[derive(Clone, Debug)]
pub struct HandleCache {
    inner: Rc<RefCell<CacheInner>>,
}

impl HandleCache {
    pub fn new(enabled: bool) -> Self {
        HandleCache {
            inner: Rc::new(RefCell::new(CacheInner {
                enabled,
                open_reads: VecDeque::new(),
            })),
        }
    }

    fn register(&self, slot: &Rc<RefCell<Slot>>) {
        self.inner
            .borrow_mut()
            .open_reads
            .push_back(Rc::downgrade(slot));
    }

    /// Close the oldest still-open read handle that isn't `requester`.
    /// Returns false when nothing could be evicted.
    fn evict_one(&self, requester: &Rc<RefCell<Slot>>) -> bool {
        let mut inner = self.inner.borrow_mut();
        while let Some(weak) = inner.open_reads.pop_front() {
            let Some(slot) = weak.upgrade() else { continue };
            if Rc::ptr_eq(&slot, requester) {
                continue;
            }
            let mut s = slot.borrow_mut();
            if s.file.is_some() {
                s.file = None;
                return true;
            }
        }
        false
    }

    fn enabled(&self) -> bool {
        self.inner.borrow().enabled
    }
}

/// A file handle that opens lazily and tolerates being closed behind
/// its back by the handle cache.
#[derive(Debug)]
pub struct LazyFile {
    path: PathBuf,
    write: bool,
    slot: Rc<RefCell<Slot>>,
    cache: HandleCache,
}

impl LazyFile {
    /// A read handle; the file is opened on first access.
    pub fn open_read(cache: &HandleCache, path: PathBuf) -> Self {
        LazyFile {
            path,
            write: false,
            slot: Rc::new(RefCell::new(Slot { file: None, pos: 0 })),
            cache: cache.clone(),
        }
    }

    /// Create a new file for writing. Fails if the file already exists.
    pub fn create(cache: &HandleCache, path: PathBuf) -> io::Result<Self> {
        let lf = LazyFile {
            path,
            write: true,
            slot: Rc::new(RefCell::new(Slot { file: None, pos: 0 })),
            cache: cache.clone(),
        };
        lf.ensure_open(true)?;
        Ok(lf)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self, create: bool) -> io::Result<()> {
        if self.slot.borrow().file.is_some() {
            return Ok(());
        }
        loop {
            let attempt = if self.write {
                let mut opts = OpenOptions::new();
                opts.read(true).write(true);
                if create {
                    opts.create_new(true);
                }
                opts.open(&self.path)
            } else {
                File::open(&self.path)
            };
            match attempt {
                Ok(file) => {
                    self.slot.borrow_mut().file = Some(file);
                    // Reopened handles have lost their OS position; the
                    // next positioned access re-seeks.
                    self.slot.borrow_mut().pos = 0;
                    if !self.write {
                        self.cache.register(&self.slot);
                    }
                    return Ok(());
                }
                Err(e) => {
                    let out_of_handles = matches!(
                        e.raw_os_error(),
                        Some(code) if code == 24 /* EMFILE */ || code == 23 /* ENFILE */
                    );
                    if out_of_handles && self.cache.enabled() && self.cache.evict_one(&self.slot) {
                        debug!("out of file handles; evicted an idle read handle");
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    fn seek_to(&self, off: u64) -> io::Result<()> {
        let mut slot = self.slot.borrow_mut();
        if slot.pos != off {
            slot.file
                .as_mut()
                .expect("ensure_open establishes the handle")
                .seek(SeekFrom::Start(off))?;
            slot.pos = off;
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes at `off`. Returns the number read,
    /// which is short only at end of file.
    pub fn read_at(&self, off: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open(false)?;
        self.seek_to(off)?;
        let mut filled = 0usize;
        loop {
            let mut slot = self.slot.borrow_mut();
            let n = slot
                .file
                .as_mut()
                .expect("ensure_open establishes the handle")
                .read(&mut buf[filled..])?;
            slot.pos += n as u64;
            filled += n;
            if n == 0 || filled == buf.len() {
                return Ok(filled);
            }
        }
    }

    /// Write the whole buffer at `off`.
    pub fn write_all_at(&self, off: u64, buf: &[u8]) -> io::Result<()> {
        self.ensure_open(false)?;
        self.seek_to(off)?;
        let mut slot = self.slot.borrow_mut();
        slot.file
            .as_mut()
            .expect("ensure_open establishes the handle")
            .write_all(buf)?;
        slot.pos += buf.len() as u64;
        Ok(())
    }

    pub fn flush(&self) -> io::Result<()> {
        if let Some(file) = self.slot.borrow_mut().file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    /// Current file length via metadata.
    pub fn len(&self) -> io::Result<u64> {
        // The handle may be closed; metadata goes through the path.
        self.flush()?;
        Ok(std::fs::metadata(&self.path)?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop the OS handle; the next access reopens.
    pub fn close(&self) {
        self.slot.borrow_mut().file = None;
    }
}

/// MD5 over a file region from `start` to EOF; returns (end offset, digest).
pub fn md5_region_to_eof(file: &LazyFile, start: u64) -> io::Result<(u64, Md5Hash)> {
    let mut hasher = Md5::new();
    let mut buf = [0u8; 65536];
    let mut off = start;
    loop {
        let n = file.read_at(off, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        off += n as u64;
    }
    Ok((off, Md5Hash::new(hasher.finalize().into())))
}

/// Compute the digest of `[start..EOF)`, verify the file ends exactly at
/// `expected_end`, and patch the digest in at `digest_off`.
///
/// This is the control-hash finalization step for freshly written
/// volumes; the length check guarantees no trailing padding was
/// produced.
pub fn patch_region_md5(
    file: &LazyFile,
    digest_off: u64,
    start: u64,
    expected_end: u64,
) -> io::Result<Md5Hash> {
    let (end, digest) = md5_region_to_eof(file, start)?;
    if end != expected_end {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("file ends at {} but {} expected", end, expected_end),
        ));
    }
    file.write_all_at(digest_off, digest.as_bytes())?;
    file.flush()?;
    Ok(digest)
}

pub fn file_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

pub fn rename_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::rename(src, dst)
}

pub fn delete_file(path: &Path) -> io::Result<()> {
    std::fs::remove_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        std::fs::write(&path, b"occupied").unwrap();

        let cache = HandleCache::new(false);
        let err = LazyFile::create(&cache, path.clone()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        // The occupant is untouched
        assert_eq!(std::fs::read(&path).unwrap(), b"occupied");
    }

    #[test]
    fn positioned_read_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let cache = HandleCache::new(false);

        let f = LazyFile::create(&cache, path.clone()).unwrap();
        f.write_all_at(0, b"hello world").unwrap();
        f.write_all_at(6, b"earth").unwrap();

        let mut buf = [0u8; 11];
        assert_eq!(f.read_at(0, &mut buf).unwrap(), 11);
        assert_eq!(&buf, b"hello earth");
    }

    #[test]
    fn read_survives_forced_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"0123456789").unwrap();

        let cache = HandleCache::new(true);
        let f = LazyFile::open_read(&cache, path);
        let mut buf = [0u8; 4];
        assert_eq!(f.read_at(0, &mut buf).unwrap(), 4);

        // Close behind its back, as the cache would under EMFILE
        f.close();

        assert_eq!(f.read_at(4, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"4567");
    }

    #[test]
    fn region_md5_patches_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let cache = HandleCache::new(false);

        let f = LazyFile::create(&cache, path.clone()).unwrap();
        let mut contents = vec![0u8; 64];
        contents[32..].copy_from_slice(&[7u8; 32]);
        f.write_all_at(0, &contents).unwrap();

        patch_region_md5(&f, 16, 32, 64).unwrap();

        let expect = crate::checksum::compute_md5(&[7u8; 32]);
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(&on_disk[16..32], expect.as_bytes());
    }

    #[test]
    fn patch_rejects_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let cache = HandleCache::new(false);

        let f = LazyFile::create(&cache, path).unwrap();
        f.write_all_at(0, &[0u8; 40]).unwrap();

        let err = patch_region_md5(&f, 16, 32, 64).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
