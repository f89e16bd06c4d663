//! The programmatic archive session
//!
//! A [`ParSession`] owns the directory index, the current file list,
//! and the current volume list, and exposes the operations the CLI and
//! the interactive interface are built from: load, search, check,
//! fixname, recover, addfile, addpars, create. File and volume lists
//! stay sorted case-insensitively by name; entries are addressed by
//! their position in the last listing.

use log::{debug, warn};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{ParError, Result};
use crate::fileio::HandleCache;
use crate::format::{self, ArchiveEntry, Manifest};
use crate::index::{DirIndex, HashLevel};
use crate::matrix::ColumnMap;
use crate::reconcile;
use crate::reporters::{ConsoleReporter, FileStatus, Reporter};
use crate::restore::{self, RestoreContext, RestoreOutcome, VolumeSlot};
use crate::unicode::{NameMatch, UniName};

/// Outcome of a whole-set verification.
#[derive(Debug)]
pub enum SetStatus {
    /// Every file (and, if requested, every volume) is present
    AllFound,
    /// Files are missing but the loaded volumes cover them
    Restorable { missing: usize },
    /// A restore pass ran
    Restored(RestoreOutcome),
    /// More files are missing than volumes are available
    Unrestorable { missing: usize, available: usize },
}

pub struct ParSession {
    cfg: Config,
    index: DirIndex,
    cache: HandleCache,
    files: Vec<ArchiveEntry>,
    volumes: Vec<VolumeSlot>,
    reporter: Box<dyn Reporter>,
}

impl ParSession {
    pub fn new(cfg: Config, root: PathBuf) -> Self {
        let reporter: Box<dyn Reporter> = Box::new(ConsoleReporter::new());
        Self::with_reporter(cfg, root, reporter)
    }

    pub fn with_reporter(cfg: Config, root: PathBuf, reporter: Box<dyn Reporter>) -> Self {
        let cache = HandleCache::new(cfg.limit_handles);
        ParSession {
            index: DirIndex::new(root),
            cache,
            cfg,
            files: Vec::new(),
            volumes: Vec::new(),
            reporter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.cfg
    }

    pub fn files(&self) -> &[ArchiveEntry] {
        &self.files
    }

    pub fn volumes(&self) -> &[VolumeSlot] {
        &self.volumes
    }

    /// Names of the loaded archives, in list order.
    pub fn parlist(&self) -> Vec<String> {
        self.volumes.iter().map(|v| v.name.to_string()).collect()
    }

    /// Names of the expected data files, in list order.
    pub fn filelist(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.to_string()).collect()
    }

    fn insert_volume_sorted(&mut self, slot: VolumeSlot) {
        let at = self
            .volumes
            .iter()
            .position(|v| v.name.caseless_cmp(&slot.name) == std::cmp::Ordering::Greater)
            .unwrap_or(self.volumes.len());
        self.volumes.insert(at, slot);
    }

    fn insert_file_sorted(&mut self, entry: ArchiveEntry) {
        let at = self
            .files
            .iter()
            .position(|f| f.name.caseless_cmp(&entry.name) == std::cmp::Ordering::Greater)
            .unwrap_or(self.files.len());
        self.files.insert(at, entry);
    }

    /// Load an archive into the session. A name with no file behind it
    /// yields an empty archive to build on (volume number guessed from
    /// trailing digits).
    pub fn load(&mut self, name: &str) -> Result<()> {
        let uni = UniName::from(name);
        if self
            .volumes
            .iter()
            .any(|v| v.name.compare(&uni) == NameMatch::Equal)
        {
            return Err(ParError::AlreadyLoaded(name.to_string()));
        }

        let path = self.index.root().join(uni.to_path());
        let mut manifest = format::read_manifest(&self.cache, &path, true, self.cfg.check_control)?;
        if self.cfg.loglevel > 1 {
            manifest.dump();
        }
        self.index.ensure_scanned()?;

        let mut slot = VolumeSlot::new(uni.clone(), manifest.vol_number);
        slot.data_offset = manifest.data_offset;
        slot.data_size = manifest.data_size;
        slot.fnrs = file_numbers(&mut self.files, std::mem::take(&mut manifest.files));
        slot.handle = manifest.handle.take();
        slot.match_idx = self.index.find_by_name(&uni, self.cfg.ignore_case);
        self.insert_volume_sorted(slot);
        Ok(())
    }

    /// Scan the directory for further volumes of the current file set
    /// and load them. With `partial`, a volume qualifies when its file
    /// list merely intersects the session's.
    pub fn search(&mut self, partial: bool) -> Result<()> {
        self.index.ensure_scanned()?;

        for idx in 0..self.index.len() {
            // The captured magic screens out non-PAR files cheaply
            let _ = self.index.ensure_hashed(idx, HashLevel::Prefix);
            {
                let entry = self.index.entry(idx);
                if entry.hashed >= HashLevel::Prefix && !has_par_magic(&entry.magic) {
                    continue;
                }
            }
            let name = self.index.entry(idx).name.clone();
            if self
                .volumes
                .iter()
                .any(|v| v.name.compare(&name) == NameMatch::Equal)
            {
                continue;
            }
            let path = self.index.path_of(idx);
            let mut manifest =
                match format::read_manifest(&self.cache, &path, false, self.cfg.check_control) {
                    Ok(m) => m,
                    Err(e) => {
                        debug!("{}: skipped during search: {}", name, e);
                        if matches!(e, ParError::Corrupt(_)) {
                            self.reporter
                                .file_status(&name.to_string(), &FileStatus::Corrupt);
                        }
                        continue;
                    }
                };
            if manifest.vol_number == 0
                || !files_match(&self.files, &manifest.files, partial)
            {
                continue;
            }
            if !partial
                && self
                    .volumes
                    .iter()
                    .any(|v| v.vol_number == manifest.vol_number)
            {
                warn!(
                    "{}: duplicate volume number {}, keeping the first",
                    name, manifest.vol_number
                );
                continue;
            }

            let mut slot = VolumeSlot::new(name.clone(), manifest.vol_number);
            slot.data_offset = manifest.data_offset;
            slot.data_size = manifest.data_size;
            slot.fnrs = file_numbers(&mut self.files, std::mem::take(&mut manifest.files));
            slot.handle = manifest.handle.take();
            slot.match_idx = Some(idx);
            self.insert_volume_sorted(slot);
            debug!("{}: volume {} joined the set", name, manifest.vol_number);
        }
        Ok(())
    }

    /// Gather every recovery volume in the directory regardless of
    /// file set, merging all their file lists. Used by the mix
    /// operation.
    pub fn gather_all(&mut self) -> Result<usize> {
        self.index.ensure_scanned()?;
        self.reporter.note("Looking for PAR archives:");

        let mut found = 0;
        for idx in 0..self.index.len() {
            let _ = self.index.ensure_hashed(idx, HashLevel::Prefix);
            {
                let entry = self.index.entry(idx);
                if entry.hashed >= HashLevel::Prefix && !has_par_magic(&entry.magic) {
                    continue;
                }
            }
            let name = self.index.entry(idx).name.clone();
            if self
                .volumes
                .iter()
                .any(|v| v.name.compare(&name) == NameMatch::Equal)
            {
                continue;
            }
            let path = self.index.path_of(idx);
            let mut manifest =
                match format::read_manifest(&self.cache, &path, false, self.cfg.check_control) {
                    Ok(m) => m,
                    Err(e) => {
                        if matches!(e, ParError::Corrupt(_)) {
                            self.reporter
                                .file_status(&name.to_string(), &FileStatus::Corrupt);
                        }
                        continue;
                    }
                };
            if manifest.vol_number == 0 {
                continue;
            }
            let fnrs = file_numbers(&mut self.files, std::mem::take(&mut manifest.files));
            if self
                .volumes
                .iter()
                .any(|v| v.vol_number == manifest.vol_number && v.fnrs == fnrs)
            {
                warn!(
                    "{}: duplicate volume number {}, keeping the first",
                    name, manifest.vol_number
                );
                continue;
            }
            let mut slot = VolumeSlot::new(name.clone(), manifest.vol_number);
            slot.data_offset = manifest.data_offset;
            slot.data_size = manifest.data_size;
            slot.fnrs = fnrs;
            slot.handle = manifest.handle.take();
            slot.match_idx = Some(idx);
            self.insert_volume_sorted(slot);
            self.reporter
                .file_status(&name.to_string(), &FileStatus::Found(String::new()));
            found += 1;
        }
        Ok(found)
    }

    /// Remove a loaded archive by its position in the volume list.
    pub fn unload(&mut self, entry: usize) -> Result<()> {
        if entry >= self.volumes.len() {
            return Err(ParError::NotFound(format!("volume entry {}", entry + 1)));
        }
        // Dropping the slot closes its handle
        self.volumes.remove(entry);
        Ok(())
    }

    /// Verify one expected file against the directory.
    pub fn check(&mut self, entry: usize) -> Result<()> {
        let f = self
            .files
            .get_mut(entry)
            .ok_or(ParError::InvalidArgument)?;
        if reconcile::find_file(
            &mut self.index,
            &self.cfg,
            self.reporter.as_ref(),
            f,
            false,
        ) {
            Ok(())
        } else {
            Err(ParError::Corrupt(f.name.to_string()))
        }
    }

    /// The on-disk name carrying an expected file's content.
    pub fn find(&mut self, entry: usize) -> Result<String> {
        let f = self
            .files
            .get_mut(entry)
            .ok_or(ParError::InvalidArgument)?;
        if !reconcile::find_file(
            &mut self.index,
            &self.cfg,
            self.reporter.as_ref(),
            f,
            false,
        ) {
            return Err(ParError::NotFound(f.name.to_string()));
        }
        let idx = f.match_idx.expect("match bound by find_file");
        Ok(self.index.entry(idx).name.to_string())
    }

    /// Rename matched files to their expected names; with smart rename
    /// enabled, also learn a pattern from the matched pairs and apply
    /// it to the unmatched rest.
    pub fn fixname(&mut self, entry: Option<usize>) -> Result<()> {
        if let Some(e) = entry {
            if e >= self.files.len() {
                return Err(ParError::InvalidArgument);
            }
        }
        let mut failure: Option<ParError> = None;

        // Bind what can be bound, then learn the rename pattern from
        // the matched pairs before any renaming disturbs them.
        for i in 0..self.files.len() {
            reconcile::find_file(
                &mut self.index,
                &self.cfg,
                self.reporter.as_ref(),
                &mut self.files[i],
                false,
            );
        }
        let pattern = if entry.is_none() && self.cfg.smart_rename {
            reconcile::find_best_sub(&self.index, &self.files)
        } else {
            None
        };

        for i in 0..self.files.len() {
            if let Some(only) = entry {
                if i != only {
                    continue;
                }
            }
            if self.files[i].match_idx.is_none() {
                failure = Some(ParError::NotFound(self.files[i].name.to_string()));
                continue;
            }
            let midx = self.files[i].match_idx.expect("matched");
            let on_disk = self.index.entry(midx).name.clone();
            let wanted = self.files[i].name.clone();
            if on_disk.compare(&wanted) == NameMatch::Equal {
                continue;
            }
            if let Err(e) = reconcile::rename_away(
                &mut self.index,
                &self.cfg,
                self.reporter.as_ref(),
                &on_disk,
                &wanted,
            ) {
                self.reporter
                    .file_status(&wanted.to_string(), &FileStatus::NotFixed);
                failure = Some(e);
            } else {
                self.reporter
                    .file_status(&wanted.to_string(), &FileStatus::Fixed);
            }
        }

        if let Some(pattern) = pattern {
            let fixed = reconcile::apply_rename_pattern(
                &mut self.index,
                &self.cfg,
                self.reporter.as_ref(),
                &mut self.files,
                &pattern,
            );
            if fixed > 0 && self.files.iter().all(|f| f.match_idx.is_some()) {
                failure = None;
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn getstatus(&self, entry: usize) -> Result<u64> {
        self.files
            .get(entry)
            .map(|f| f.status)
            .ok_or(ParError::InvalidArgument)
    }

    pub fn setstatus(&mut self, entry: usize, status: u64) -> Result<()> {
        let f = self
            .files
            .get_mut(entry)
            .ok_or(ParError::InvalidArgument)?;
        f.status = status;
        Ok(())
    }

    /// Restore missing files (and provisioned volumes). Restoring a
    /// single entry is not supported.
    pub fn recover(&mut self, entry: Option<usize>) -> Result<RestoreOutcome> {
        if entry.is_some() {
            return Err(ParError::NotImplemented);
        }
        let mut ctx = RestoreContext {
            index: &mut self.index,
            cfg: &self.cfg,
            cache: &self.cache,
            reporter: self.reporter.as_ref(),
        };
        restore::restore_files(&mut ctx, &mut self.files, &mut self.volumes)
    }

    /// Add a data file to the expected list.
    pub fn addfile(&mut self, name: &str) -> Result<()> {
        let uni = UniName::from(name).file_name();
        self.index.ensure_scanned()?;
        let idx = self
            .index
            .find_by_name(&uni, self.cfg.ignore_case)
            .ok_or_else(|| ParError::NotFound(name.to_string()))?;
        self.index.ensure_hashed(idx, HashLevel::Full)?;

        let on_disk = self.index.entry(idx);
        for f in &self.files {
            match f.name.compare(&on_disk.name) {
                NameMatch::Equal => {
                    return if f.hash == on_disk.hash {
                        Err(ParError::AlreadyLoaded(name.to_string()))
                    } else {
                        Err(ParError::NameClash(name.to_string()))
                    };
                }
                NameMatch::CaseOnly if f.hash == on_disk.hash => {
                    return Err(ParError::AlreadyLoaded(name.to_string()));
                }
                _ => {}
            }
        }

        let entry = ArchiveEntry {
            name: on_disk.name.clone(),
            status: if self.cfg.include_new {
                format::STATUS_IN_PARITY
            } else {
                0
            },
            file_size: on_disk.file_size,
            hash: on_disk.hash,
            hash_16k: on_disk.hash_16k,
            match_idx: Some(idx),
        };
        self.insert_file_sorted(entry);
        Ok(())
    }

    /// Make sure volumes 1..=n exist in the volume list, provisioning
    /// missing ones under names derived from `entry`'s.
    pub fn addpars(&mut self, entry: usize, n: u64) -> Result<()> {
        if n < 1 || entry >= self.volumes.len() {
            return Err(ParError::InvalidArgument);
        }
        let base = self.volumes[entry].name.clone();
        self.index.ensure_scanned()?;

        for vol in 1..=n {
            let Some(candidate) = volume_file_name(&base, vol) else {
                return Err(ParError::InvalidArgument);
            };
            // An existing on-disk file of that name fixes the casing
            let (name, match_idx) =
                match self.index.find_by_name(&candidate, self.cfg.ignore_case) {
                    Some(idx) => (self.index.entry(idx).name.clone(), Some(idx)),
                    None => (candidate, None),
                };
            if self
                .volumes
                .iter()
                .any(|v| v.name.compare(&name) == NameMatch::Equal)
            {
                continue;
            }
            let mut slot = VolumeSlot::new(name, vol);
            slot.match_idx = match_idx;
            self.insert_volume_sorted(slot);
        }
        Ok(())
    }

    /// Write the index archives and produce the provisioned volumes
    /// from the current file list.
    pub fn create(&mut self, entry: Option<usize>) -> Result<RestoreOutcome> {
        if entry.is_some() {
            return Err(ParError::NotImplemented);
        }

        for vi in 0..self.volumes.len() {
            if self.volumes[vi].vol_number != 0 {
                continue;
            }
            if let Some(h) = &self.volumes[vi].handle {
                h.close();
            }
            self.volumes[vi].handle = None;
            let name = self.volumes[vi].name.clone();
            reconcile::move_away(
                &mut self.index,
                &self.cfg,
                self.reporter.as_ref(),
                &name,
                ".old",
            )?;
            let full_path = self.index.root().join(name.to_path());
            let mut manifest = Manifest::new_empty(&full_path, 0);
            manifest.files = self.files.clone();
            format::write_manifest(&self.cache, &full_path, &mut manifest)?;
            let idx = self.index.add(name);
            self.index.invalidate(idx);
            self.volumes[vi].match_idx = Some(idx);
        }

        self.recover(None)
    }

    /// Whole-set verification, as the check/recover verbs see it.
    pub fn verify_set(&mut self, restore: bool) -> Result<SetStatus> {
        self.reporter.note("Looking for PXX volumes:");
        let mut present_vols = 0usize;
        let mut total_vols = 0usize;
        for v in &self.volumes {
            if v.vol_number == 0 {
                continue;
            }
            total_vols += 1;
            if v.is_present() {
                present_vols += 1;
                self.reporter
                    .file_status(&v.name.to_string(), &FileStatus::Ok);
            } else {
                self.reporter
                    .file_status(&v.name.to_string(), &FileStatus::NotFound);
            }
        }

        self.reporter.note("Looking for data files:");
        let mut missing = 0usize;
        for i in 0..self.files.len() {
            let found = reconcile::find_file(
                &mut self.index,
                &self.cfg,
                self.reporter.as_ref(),
                &mut self.files[i],
                true,
            );
            if !found && self.files[i].in_parity_set() {
                missing += 1;
            }
        }

        if missing == 0 && (!self.cfg.recover_volumes || present_vols == total_vols) {
            self.reporter.note("\nAll files found");
            return Ok(SetStatus::AllFound);
        }
        if missing > present_vols {
            self.reporter.note("\nToo many missing files:");
            for f in &self.files {
                if f.match_idx.is_none() && f.in_parity_set() {
                    self.reporter.note(&format!("  {}", f.name));
                }
            }
            self.reporter.note("\nErrors occurred.\n");
            return Ok(SetStatus::Unrestorable {
                missing,
                available: present_vols,
            });
        }
        if !restore {
            self.reporter.note("\nRestorable:");
            for f in &self.files {
                if f.match_idx.is_none() && f.in_parity_set() {
                    self.reporter
                        .file_status(&f.name.to_string(), &FileStatus::Restorable);
                }
            }
            return Ok(SetStatus::Restorable { missing });
        }

        self.reporter.note("\nRestoring:");
        let outcome = self.recover(None)?;
        if outcome.failed() {
            self.reporter.note("\nErrors occurred.\n");
        }
        Ok(SetStatus::Restored(outcome))
    }
}

/// Magic screen for archive discovery: v1.0 or legacy.
fn has_par_magic(magic: &[u8; 8]) -> bool {
    magic == format::PAR_MAGIC || format::legacy::is_legacy_magic(&magic[..4])
}

/// Map a volume's parity files onto the session list, appending
/// entries the session has not seen yet. Returns the volume's 1-based
/// column map.
pub fn file_numbers(master: &mut Vec<ArchiveEntry>, incoming: Vec<ArchiveEntry>) -> ColumnMap {
    let mut fnrs = ColumnMap::new();
    for entry in incoming {
        let pos = master
            .iter()
            .position(|m| m.file_size == entry.file_size && m.hash == entry.hash);
        let in_parity = entry.in_parity_set();
        let j = match pos {
            Some(p) => p,
            None => {
                master.push(entry);
                master.len() - 1
            }
        };
        if in_parity {
            fnrs.push((j + 1) as u16);
        }
    }
    fnrs
}

/// Do two file lists describe the same parity set? With `partial`, any
/// shared member counts.
pub fn files_match(a: &[ArchiveEntry], b: &[ArchiveEntry], partial: bool) -> bool {
    let pa: Vec<&ArchiveEntry> = a.iter().filter(|f| f.in_parity_set()).collect();
    let pb: Vec<&ArchiveEntry> = b.iter().filter(|f| f.in_parity_set()).collect();
    if partial {
        return pa
            .iter()
            .any(|x| pb.iter().any(|y| x.file_size == y.file_size && x.hash == y.hash));
    }
    pa.len() == pb.len()
        && pa
            .iter()
            .zip(&pb)
            .all(|(x, y)| x.file_size == y.file_size && x.hash == y.hash)
}

/// Derive a volume file name from an archive name: replace trailing
/// digits (or the last two characters) with the zero-padded volume
/// number, at least two digits wide (`demo.par` → `demo.p01`).
pub fn volume_file_name(base: &UniName, vol: u64) -> Option<UniName> {
    if vol < 1 {
        return None;
    }
    let mut digits = 2usize;
    let mut bound = 100u64;
    while vol >= bound {
        digits += 1;
        bound *= 10;
    }

    let units = base.units();
    let mut cut = units.len();
    let is_digit = |u: u16| (b'0' as u16..=b'9' as u16).contains(&u);
    if cut == 0 {
        return None;
    }
    if !is_digit(units[cut - 1]) {
        cut = cut.saturating_sub(2);
    } else {
        while cut > 0 && is_digit(units[cut - 1]) {
            cut -= 1;
        }
    }

    let mut out = units[..cut].to_vec();
    let text = format!("{:0width$}", vol, width = digits);
    out.extend(text.encode_utf16());
    Some(UniName::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Md5Hash;

    fn entry(name: &str, size: u64, hash_byte: u8, parity: bool) -> ArchiveEntry {
        ArchiveEntry {
            name: UniName::from(name),
            status: if parity { 1 } else { 0 },
            file_size: size,
            hash: Md5Hash::new([hash_byte; 16]),
            hash_16k: Md5Hash::new([hash_byte ^ 0xFF; 16]),
            match_idx: None,
        }
    }

    #[test]
    fn volume_names_replace_extension_tail() {
        let base = UniName::from("demo.par");
        assert_eq!(
            volume_file_name(&base, 1).unwrap(),
            UniName::from("demo.p01")
        );
        assert_eq!(
            volume_file_name(&base, 42).unwrap(),
            UniName::from("demo.p42")
        );
        assert_eq!(
            volume_file_name(&base, 123).unwrap(),
            UniName::from("demo.p123")
        );
    }

    #[test]
    fn volume_names_replace_existing_digits() {
        let base = UniName::from("demo.p05");
        assert_eq!(
            volume_file_name(&base, 7).unwrap(),
            UniName::from("demo.p07")
        );
    }

    #[test]
    fn volume_zero_has_no_name() {
        assert!(volume_file_name(&UniName::from("demo.par"), 0).is_none());
    }

    #[test]
    fn file_numbers_maps_and_merges() {
        let mut master = vec![entry("a", 10, 1, true), entry("b", 20, 2, true)];
        let incoming = vec![
            entry("b-renamed", 20, 2, true),
            entry("c", 30, 3, true),
            entry("n", 40, 4, false),
        ];
        let fnrs = file_numbers(&mut master, incoming);

        // b matched position 2, c appended as position 3; the
        // non-parity file merges but gets no column
        assert_eq!(fnrs.as_slice(), &[2, 3]);
        assert_eq!(master.len(), 4);
        assert_eq!(master[2].name, UniName::from("c"));
    }

    #[test]
    fn files_match_full_and_partial() {
        let a = vec![entry("a", 10, 1, true), entry("b", 20, 2, true)];
        let same = vec![entry("x", 10, 1, true), entry("y", 20, 2, true)];
        let overlap = vec![entry("x", 10, 1, true), entry("z", 99, 9, true)];
        let disjoint = vec![entry("q", 7, 7, true)];

        assert!(files_match(&a, &same, false));
        assert!(!files_match(&a, &overlap, false));
        assert!(files_match(&a, &overlap, true));
        assert!(!files_match(&a, &disjoint, true));
    }

    #[test]
    fn files_match_ignores_non_parity_entries() {
        let a = vec![entry("a", 10, 1, true), entry("note", 5, 8, false)];
        let b = vec![entry("a2", 10, 1, true)];
        assert!(files_match(&a, &b, false));
    }
}
