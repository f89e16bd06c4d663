//! Matching expected files against the directory
//!
//! An archive entry is bound to a directory entry by name first (exact
//! case preferred), then by content: the 16 KiB prefix digest screens
//! candidates cheaply before the full digest decides. Files that are
//! in the way of a write are renamed aside, never overwritten. When
//! several matched pairs reveal a systematic renaming, a substitution
//! pattern is learned and applied to the entries that found no match.

use log::debug;

use crate::config::Config;
use crate::error::{ParError, Result};
use crate::fileio;
use crate::format::ArchiveEntry;
use crate::index::{DirIndex, HashLevel};
use crate::reporters::{FileStatus, Reporter};
use crate::unicode::{NameMatch, UniName};

/// Minimum number of supporting pairs before a substitution pattern is
/// trusted
pub const SMART_RENAME_THRESHOLD: usize = 2;

/// Bind `entry` to a directory entry with the same content, if one
/// exists. With `display` set, progress lines are emitted and the
/// duplicate scan honors the configuration.
pub fn find_file(
    index: &mut DirIndex,
    cfg: &Config,
    reporter: &dyn Reporter,
    entry: &mut ArchiveEntry,
    display: bool,
) -> bool {
    if entry.match_idx.is_some() {
        return true;
    }
    if index.ensure_scanned().is_err() {
        return false;
    }

    let mut corrupt_seen = false;

    // Pass 1: candidates that carry the expected name
    let name_candidates: Vec<(usize, NameMatch)> = index
        .iter()
        .map(|(idx, e)| (idx, e.name.compare(&entry.name)))
        .filter(|(_, cm)| match cm {
            NameMatch::Equal => true,
            NameMatch::CaseOnly => cfg.ignore_case,
            NameMatch::Different => false,
        })
        .collect();

    for (idx, cm) in name_candidates {
        if index.ensure_hashed(idx, HashLevel::Full).is_err() {
            if display {
                reporter.note(&format!("      ERROR: {}: cannot hash", index.entry(idx).name));
            }
            corrupt_seen = true;
            continue;
        }
        if index.entry(idx).hash == entry.hash {
            if cm == NameMatch::Equal || entry.match_idx.is_none() {
                entry.match_idx = Some(idx);
            }
            continue;
        }
        if display {
            reporter.note(&format!(
                "      ERROR: {}: failed md5 sum",
                index.entry(idx).name
            ));
        }
        corrupt_seen = true;
    }

    if entry.match_idx.is_some() {
        if display {
            reporter.file_status(&entry.name.to_string(), &FileStatus::Ok);
        }
        if !display || !cfg.find_duplicates {
            return true;
        }
    }

    // Pass 2: match by content anywhere in the directory
    for idx in 0..index.len() {
        if entry.match_idx == Some(idx) {
            continue;
        }
        if index.ensure_hashed(idx, HashLevel::Prefix).is_err() {
            continue;
        }
        if index.entry(idx).hash_16k != entry.hash_16k {
            continue;
        }
        if index.ensure_hashed(idx, HashLevel::Full).is_err() {
            continue;
        }
        if index.entry(idx).hash != entry.hash {
            continue;
        }
        if entry.match_idx.is_none() {
            entry.match_idx = Some(idx);
            if display {
                let on_disk = index.entry(idx).name.clone();
                if cfg.fix_names {
                    match rename_away(index, cfg, reporter, &on_disk, &entry.name.clone()) {
                        Ok(()) => {
                            reporter.file_status(&entry.name.to_string(), &FileStatus::Fixed)
                        }
                        Err(_) => {
                            reporter.file_status(&entry.name.to_string(), &FileStatus::NotFixed)
                        }
                    }
                } else {
                    reporter.file_status(
                        &entry.name.to_string(),
                        &FileStatus::Found(on_disk.to_string()),
                    );
                }
            }
            if !display || !cfg.find_duplicates {
                return true;
            }
        } else {
            reporter.duplicate(
                &index.entry(entry.match_idx.expect("bound above")).name.to_string(),
                &index.entry(idx).name.to_string(),
            );
        }
    }

    if entry.match_idx.is_none() && display {
        reporter.file_status(
            &entry.name.to_string(),
            if corrupt_seen {
                &FileStatus::Corrupt
            } else {
                &FileStatus::NotFound
            },
        );
    }
    entry.match_idx.is_some()
}

/// Rename an in-the-way file to a `.bad`/`.old` sibling.
///
/// Returns Ok when the target is free (possibly after renaming). Fails
/// with [`ParError::WriteBlocked`] when move-away is disabled or every
/// fallback name is taken; the filesystem is untouched in that case.
pub fn move_away(
    index: &mut DirIndex,
    cfg: &Config,
    reporter: &dyn Reporter,
    file: &UniName,
    ext: &str,
) -> Result<()> {
    let path = index.root().join(file.to_path());
    if !fileio::file_exists(&path) {
        return Ok(());
    }
    if !cfg.move_away {
        return Err(ParError::WriteBlocked(file.to_string()));
    }

    let mut target = UniName::from(format!("{}{}", file, ext).as_str());
    if fileio::file_exists(&index.root().join(target.to_path())) {
        let mut found = false;
        for n in 0..100 {
            target = UniName::from(format!("{}{}{:02}", file, ext, n).as_str());
            if !fileio::file_exists(&index.root().join(target.to_path())) {
                found = true;
                break;
            }
        }
        if !found {
            return Err(ParError::WriteBlocked(file.to_string()));
        }
    }

    rename_file(index, reporter, file, &target)
}

/// Rename `src` to `dst`, moving away anything that occupies `dst`
/// first.
pub fn rename_away(
    index: &mut DirIndex,
    cfg: &Config,
    reporter: &dyn Reporter,
    src: &UniName,
    dst: &UniName,
) -> Result<()> {
    move_away(index, cfg, reporter, dst, ".bad")?;
    rename_file(index, reporter, src, dst)
}

fn rename_file(
    index: &mut DirIndex,
    reporter: &dyn Reporter,
    src: &UniName,
    dst: &UniName,
) -> Result<()> {
    reporter.rename(&src.to_string(), &dst.to_string());
    fileio::rename_file(
        &index.root().join(src.to_path()),
        &index.root().join(dst.to_path()),
    )?;
    index.record_rename(src, dst);
    Ok(())
}

/// One literal replacement inside a name: at `off` (counted in the
/// source string), `from` becomes `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPiece {
    pub off: usize,
    pub from: Vec<u16>,
    pub to: Vec<u16>,
}

/// A minimum-edit transformation of one name into another, produced by
/// recursive longest-common-substring decomposition.
#[derive(Debug, Clone, Default)]
pub struct SubPattern {
    pieces: Vec<SubPiece>,
}

impl SubPattern {
    /// Learn the pattern that turns `from` into `to`.
    pub fn learn(from: &UniName, to: &UniName) -> SubPattern {
        let mut pieces = Vec::new();
        decompose(from.units(), to.units(), 0, &mut pieces);
        SubPattern { pieces }
    }

    /// No-op pattern (the two names were equal).
    pub fn is_identity(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Pass a name through the pattern. Returns None when the name does
    /// not carry the literals the pattern expects.
    pub fn apply(&self, input: &UniName) -> Option<UniName> {
        let src = input.units();
        let mut out = Vec::with_capacity(src.len());
        let mut fp = 0usize;
        for piece in &self.pieces {
            while fp < piece.off {
                out.push(*src.get(fp)?);
                fp += 1;
            }
            if src.len() < fp + piece.from.len() || src[fp..fp + piece.from.len()] != piece.from[..]
            {
                return None;
            }
            fp += piece.from.len();
            out.extend_from_slice(&piece.to);
        }
        out.extend_from_slice(&src[fp..]);
        Some(UniName::new(out))
    }
}

/// Trim common affixes, then split on the longest common substring and
/// recurse into both gaps.
fn decompose(from: &[u16], to: &[u16], off: usize, out: &mut Vec<SubPiece>) {
    let mut f = from;
    let mut t = to;
    let mut off = off;

    while !f.is_empty() && !t.is_empty() && f[0] == t[0] {
        f = &f[1..];
        t = &t[1..];
        off += 1;
    }
    while !f.is_empty() && !t.is_empty() && f[f.len() - 1] == t[t.len() - 1] {
        f = &f[..f.len() - 1];
        t = &t[..t.len() - 1];
    }
    if f.is_empty() && t.is_empty() {
        return;
    }

    // Longest common substring of the remaining middles
    let (mut ml, mut mf, mut mt) = (0usize, 0usize, 0usize);
    for i in 0..f.len() {
        if f.len() - i <= ml {
            break;
        }
        for j in 0..t.len() {
            if t.len() - j <= ml {
                break;
            }
            let mut k = 0;
            while i + k < f.len() && j + k < t.len() && f[i + k] == t[j + k] {
                k += 1;
            }
            if k > ml {
                ml = k;
                mf = i;
                mt = j;
            }
        }
    }

    if ml == 0 {
        out.push(SubPiece {
            off,
            from: f.to_vec(),
            to: t.to_vec(),
        });
        return;
    }
    decompose(&f[..mf], &t[..mt], off, out);
    decompose(&f[mf + ml..], &t[mt + ml..], off + mf + ml, out);
}

/// Learn the substitution pattern behind the already-matched entries.
///
/// A pattern qualifies only when it maps *every* matched expected name
/// to that entry's on-disk name and more than
/// [`SMART_RENAME_THRESHOLD`] pairs support it, so a selected pattern
/// is sound by construction.
pub fn find_best_sub(index: &DirIndex, files: &[ArchiveEntry]) -> Option<SubPattern> {
    let pairs: Vec<(&UniName, UniName)> = files
        .iter()
        .filter_map(|f| {
            f.match_idx
                .map(|idx| (&f.name, index.entry(idx).name.clone()))
        })
        .collect();
    if pairs.len() <= SMART_RENAME_THRESHOLD {
        return None;
    }

    for (from, to) in &pairs {
        let candidate = SubPattern::learn(from, to);
        if candidate.is_identity() {
            continue;
        }
        let coverage = pairs
            .iter()
            .filter(|(f, t)| candidate.apply(f).as_ref() == Some(t))
            .count();
        if coverage == pairs.len() {
            debug!("substitution pattern supported by {} pairs", coverage);
            return Some(candidate);
        }
    }
    None
}

/// Apply a learned pattern to entries that found no match: predict the
/// on-disk name, and if such a file exists, rename it back to the
/// expected name.
pub fn apply_rename_pattern(
    index: &mut DirIndex,
    cfg: &Config,
    reporter: &dyn Reporter,
    files: &mut [ArchiveEntry],
    pattern: &SubPattern,
) -> usize {
    let mut fixed = 0;
    for entry in files.iter_mut() {
        if entry.match_idx.is_some() {
            continue;
        }
        let Some(predicted) = pattern.apply(&entry.name) else {
            continue;
        };
        let Some(found) = index.find_by_name(&predicted, cfg.ignore_case) else {
            continue;
        };
        let on_disk = index.entry(found).name.clone();
        match rename_away(index, cfg, reporter, &on_disk, &entry.name.clone()) {
            Ok(()) => {
                entry.match_idx = Some(found);
                reporter.file_status(&entry.name.to_string(), &FileStatus::Fixed);
                fixed += 1;
            }
            Err(_) => {
                reporter.file_status(&entry.name.to_string(), &FileStatus::NotFixed);
            }
        }
    }
    fixed
}
