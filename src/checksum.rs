//! MD5 hashing utilities
//!
//! All digest computation goes through these helpers: whole buffers,
//! readers, files, and file regions (the control hash covers an archive
//! from offset 0x20 to EOF).

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Size of the cheap candidacy prefix: the first 16 KiB of a file
pub const PREFIX_SIZE: usize = 16384;

/// A 16-byte MD5 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Md5Hash([u8; 16]);

impl Md5Hash {
    pub fn new(bytes: [u8; 16]) -> Self {
        Md5Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for Md5Hash {
    fn from(bytes: [u8; 16]) -> Self {
        Md5Hash(bytes)
    }
}

impl std::fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Compute the MD5 of a buffer in one shot
#[inline]
pub fn compute_md5(data: &[u8]) -> Md5Hash {
    Md5Hash::new(Md5::digest(data).into())
}

/// Stream a reader to EOF, returning the byte count and digest
pub fn md5_of_reader<R: Read>(mut reader: R) -> io::Result<(u64, Md5Hash)> {
    let mut hasher = Md5::new();
    let mut buf = [0u8; 65536];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((total, Md5Hash::new(hasher.finalize().into())))
}

/// Full-file MD5, returning the file size as a side effect
pub fn md5_of_file(path: &Path) -> io::Result<(u64, Md5Hash)> {
    md5_of_reader(File::open(path)?)
}

/// MD5 of the first 16 KiB of a file.
///
/// Also returns the first 8 bytes (the "magic" used to pre-screen PAR
/// candidates) and the number of bytes actually read.
pub fn md5_prefix_of_file(path: &Path) -> io::Result<(Md5Hash, [u8; 8], u64)> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; PREFIX_SIZE];
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let mut magic = [0u8; 8];
    let m = filled.min(8);
    magic[..m].copy_from_slice(&buf[..m]);
    Ok((compute_md5(&buf[..filled]), magic, filled as u64))
}
