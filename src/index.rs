//! Directory and hash index
//!
//! A rooted, append-only list of the files the tool can see. Digests
//! are computed lazily and only ever advance NONE → PREFIX → FULL; the
//! prefix pass also captures the first 8 bytes so archive discovery can
//! skip non-PAR candidates without hashing them twice.

use log::debug;
use rustc_hash::FxHashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::checksum::{self, Md5Hash};
use crate::unicode::{NameMatch, UniName};

/// How much of a file has been hashed so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HashLevel {
    None,
    /// First 16 KiB digested, magic captured
    Prefix,
    /// Whole file digested, size known
    Full,
}

/// One file in the directory index
#[derive(Debug, Clone)]
pub struct HashedFile {
    pub name: UniName,
    pub hashed: HashLevel,
    pub hash_16k: Md5Hash,
    pub hash: Md5Hash,
    pub file_size: u64,
    pub magic: [u8; 8],
}

impl HashedFile {
    fn new(name: UniName) -> Self {
        HashedFile {
            name,
            hashed: HashLevel::None,
            hash_16k: Md5Hash::default(),
            hash: Md5Hash::default(),
            file_size: 0,
            magic: [0; 8],
        }
    }
}

/// The directory index, rooted at the working directory of the run.
pub struct DirIndex {
    root: PathBuf,
    entries: Vec<HashedFile>,
    scanned: bool,
}

impl DirIndex {
    pub fn new(root: PathBuf) -> Self {
        DirIndex {
            root,
            entries: Vec::new(),
            scanned: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> &HashedFile {
        &self.entries[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &HashedFile)> {
        self.entries.iter().enumerate()
    }

    /// On-disk path of an entry.
    pub fn path_of(&self, idx: usize) -> PathBuf {
        self.root.join(self.entries[idx].name.to_path())
    }

    /// Read the root directory on first use; later calls only add names
    /// not seen before.
    pub fn ensure_scanned(&mut self) -> io::Result<()> {
        if self.scanned {
            return Ok(());
        }
        self.scan()?;
        self.scanned = true;
        Ok(())
    }

    fn scan(&mut self) -> io::Result<()> {
        let mut seen: FxHashSet<Vec<u16>> = self
            .entries
            .iter()
            .map(|e| e.name.units().to_vec())
            .collect();
        for dirent in std::fs::read_dir(&self.root)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_file() {
                continue;
            }
            let name = UniName::from(&*dirent.file_name().to_string_lossy());
            if seen.insert(name.units().to_vec()) {
                self.entries.push(HashedFile::new(name));
            }
        }
        debug!("directory index: {} entries", self.entries.len());
        Ok(())
    }

    fn position_of(&self, name: &UniName) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.compare(name) == NameMatch::Equal)
    }

    /// Add a name (for files the tool just created). Returns the index
    /// of the existing entry when the name is already present.
    pub fn add(&mut self, name: UniName) -> usize {
        if let Some(idx) = self.position_of(&name) {
            return idx;
        }
        self.entries.push(HashedFile::new(name));
        self.entries.len() - 1
    }

    /// Forget everything hashed about an entry, for files whose content
    /// the tool just rewrote.
    pub fn invalidate(&mut self, idx: usize) {
        let e = &mut self.entries[idx];
        e.hashed = HashLevel::None;
        e.file_size = 0;
    }

    /// Compute digests up to `level`, idempotently: levels already
    /// reached are never recomputed, so at most one I/O pass happens per
    /// (file, level). On error the entry keeps its previous level.
    pub fn ensure_hashed(&mut self, idx: usize, level: HashLevel) -> io::Result<()> {
        let path = self.path_of(idx);
        let entry = &mut self.entries[idx];

        if level >= HashLevel::Prefix && entry.hashed < HashLevel::Prefix {
            let (hash_16k, magic, _) = checksum::md5_prefix_of_file(&path)?;
            entry.hash_16k = hash_16k;
            entry.magic = magic;
            entry.hashed = HashLevel::Prefix;
        }
        if level >= HashLevel::Full && entry.hashed < HashLevel::Full {
            let (size, hash) = checksum::md5_of_file(&path)?;
            entry.hash = hash;
            entry.file_size = size;
            entry.hashed = HashLevel::Full;
        }
        Ok(())
    }

    /// Look a name up, preferring an exact-case match over a folded one.
    /// Folded matches are only admitted when `ignore_case` is set.
    pub fn find_by_name(&self, name: &UniName, ignore_case: bool) -> Option<usize> {
        let mut found = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            match entry.name.compare(name) {
                NameMatch::Equal => return Some(idx),
                NameMatch::CaseOnly if ignore_case && found.is_none() => found = Some(idx),
                _ => {}
            }
        }
        found
    }

    /// Track an on-disk rename in the index.
    pub fn record_rename(&mut self, src: &UniName, dst: &UniName) {
        for entry in &mut self.entries {
            if entry.name.compare(src) == NameMatch::Equal {
                entry.name = dst.clone();
            }
        }
    }
}
