//! Restore and create orchestration
//!
//! Splits the expected file list into present and missing, assembles
//! the input and output row sets, runs the solver and the streaming
//! codec, then verifies every produced file: data files by full MD5
//! against the manifest, recovery volumes by finalizing their control
//! hash. Broken outputs are deleted unless the keep toggle is on.
//!
//! Creating volumes is the same pipeline with the volumes on the
//! output side; a mixed run can restore data files and produce fresh
//! volumes in one pass.

use log::debug;

use crate::codec::{self, StreamFile};
use crate::config::Config;
use crate::error::{ParError, Result};
use crate::fileio::{self, HandleCache, LazyFile};
use crate::format::{self, ArchiveEntry, Manifest, CONTROL_HASH_OFFSET, CONTROL_REGION_START};
use crate::index::{DirIndex, HashLevel};
use crate::matrix::{build_multipliers, ColumnMap, RowTag};
use crate::reconcile;
use crate::reporters::{FileStatus, Reporter};
use crate::unicode::UniName;

/// A recovery volume the session knows about: loaded from disk
/// (handle present) or provisioned for creation (handle absent).
pub struct VolumeSlot {
    pub name: UniName,
    /// 0 for a loaded index archive, k ≥ 1 for a recovery volume
    pub vol_number: u64,
    /// Payload location within the file, once known
    pub data_offset: u64,
    pub data_size: u64,
    /// 1-based file numbers of the parity-set files, in volume column
    /// order
    pub fnrs: ColumnMap,
    pub handle: Option<LazyFile>,
    pub match_idx: Option<usize>,
}

impl VolumeSlot {
    pub fn new(name: UniName, vol_number: u64) -> Self {
        VolumeSlot {
            name,
            vol_number,
            data_offset: 0,
            data_size: 0,
            fnrs: ColumnMap::new(),
            handle: None,
            match_idx: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.handle.is_some()
    }
}

/// Everything an orchestrated run needs to touch.
pub struct RestoreContext<'a> {
    pub index: &'a mut DirIndex,
    pub cfg: &'a Config,
    pub cache: &'a HandleCache,
    pub reporter: &'a dyn Reporter,
}

/// Tally of one restore/create pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct RestoreOutcome {
    pub recovered: usize,
    pub not_restored: usize,
    pub volumes_written: usize,
    pub volumes_failed: usize,
}

impl RestoreOutcome {
    pub fn failed(&self) -> bool {
        self.not_restored > 0 || self.volumes_failed > 0
    }
}

/// The identity column map: every parity-set file under its own
/// 1-based list position.
pub fn identity_fnrs(files: &[ArchiveEntry]) -> ColumnMap {
    files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.in_parity_set())
        .map(|(i, _)| (i + 1) as u16)
        .collect()
}

fn discard_output(ctx: &RestoreContext, name: &UniName) {
    if !ctx.cfg.keep_broken {
        let _ = fileio::delete_file(&ctx.index.root().join(name.to_path()));
    }
}

/// Restore every missing parity-set file in `files` and produce every
/// provisioned volume in `volumes`.
pub fn restore_files(
    ctx: &mut RestoreContext,
    files: &mut [ArchiveEntry],
    volumes: &mut [VolumeSlot],
) -> Result<RestoreOutcome> {
    let mut outcome = RestoreOutcome::default();

    // Partition the expected files. Files outside the parity set are
    // not covered by recovery data; missing ones are simply skipped.
    let mut present_files = Vec::new();
    let mut missing_files = Vec::new();
    for i in 0..files.len() {
        if reconcile::find_file(ctx.index, ctx.cfg, ctx.reporter, &mut files[i], false) {
            present_files.push(i);
        } else if files[i].in_parity_set() {
            missing_files.push(i);
        }
    }

    let present_vols: Vec<usize> = (0..volumes.len())
        .filter(|&v| volumes[v].vol_number > 0 && volumes[v].is_present())
        .collect();
    let missing_vols: Vec<usize> = (0..volumes.len())
        .filter(|&v| volumes[v].vol_number > 0 && !volumes[v].is_present())
        .collect();

    if missing_files.len() > present_vols.len() {
        ctx.reporter.note("\nToo many missing files:");
        for &fi in &missing_files {
            ctx.reporter.note(&format!("  {}", files[fi].name));
        }
        return Err(ParError::Unrestorable {
            missing: missing_files.len(),
            available: present_vols.len(),
        });
    }

    debug!(
        "restore: {} data inputs, {} volume inputs, {} file outputs, {} volume outputs",
        present_files.len(),
        present_vols.len(),
        missing_files.len(),
        missing_vols.len()
    );

    // Provision the volumes to be created: header and file list now,
    // payload streamed below, control hash last.
    let mut created_vols = Vec::new();
    for &vi in &missing_vols {
        if volumes[vi].fnrs.is_empty() {
            volumes[vi].fnrs = identity_fnrs(files);
        }
        let name = volumes[vi].name.clone();
        if reconcile::move_away(ctx.index, ctx.cfg, ctx.reporter, &name, ".old").is_err() {
            ctx.reporter
                .file_status(&name.to_string(), &FileStatus::Failed);
            outcome.volumes_failed += 1;
            continue;
        }
        let full_path = ctx.index.root().join(name.to_path());
        let mut manifest = Manifest::new_empty(&full_path, volumes[vi].vol_number);
        manifest.files = files.to_vec();
        match format::write_manifest(ctx.cache, &full_path, &mut manifest) {
            Ok(()) => {
                let slot = &mut volumes[vi];
                slot.data_offset = manifest.data_offset;
                slot.data_size = manifest.data_size;
                slot.handle = manifest.handle.take();
                created_vols.push(vi);
            }
            Err(e) => {
                debug!("provisioning {} failed: {}", name, e);
                ctx.reporter
                    .file_status(&name.to_string(), &FileStatus::Failed);
                outcome.volumes_failed += 1;
            }
        }
    }

    // Open the surviving data files.
    let mut data_inputs: Vec<(usize, LazyFile)> = Vec::new();
    for &fi in &present_files {
        let midx = files[fi].match_idx.expect("present files are matched");
        let path = ctx.index.path_of(midx);
        data_inputs.push((fi, LazyFile::open_read(ctx.cache, path)));
    }

    // Create the missing data files, renaming occupants aside.
    let mut data_outputs: Vec<(usize, LazyFile)> = Vec::new();
    for &fi in &missing_files {
        let name = files[fi].name.clone();
        if reconcile::move_away(ctx.index, ctx.cfg, ctx.reporter, &name, ".bad").is_err() {
            ctx.reporter
                .file_status(&name.to_string(), &FileStatus::NotRestored);
            outcome.not_restored += 1;
            continue;
        }
        match LazyFile::create(ctx.cache, ctx.index.root().join(name.to_path())) {
            Ok(f) => data_outputs.push((fi, f)),
            Err(e) => {
                debug!("creating {} failed: {}", name, e);
                ctx.reporter
                    .file_status(&name.to_string(), &FileStatus::NotRestored);
                outcome.not_restored += 1;
            }
        }
    }

    // Row tables and streams, data files first, volumes after.
    let mut input_tags = Vec::new();
    let mut inputs = Vec::new();
    for (fi, file) in &data_inputs {
        input_tags.push(RowTag::Data { column: *fi });
        inputs.push(StreamFile::new(file, 0, files[*fi].file_size));
    }
    for &vi in &present_vols {
        let slot = &volumes[vi];
        input_tags.push(RowTag::Volume {
            number: slot.vol_number,
            columns: slot.fnrs.clone(),
        });
        inputs.push(StreamFile::new(
            slot.handle.as_ref().expect("present volume has a handle"),
            slot.data_offset,
            slot.data_size,
        ));
    }

    let mut output_tags = Vec::new();
    let mut outputs = Vec::new();
    for (fi, file) in &data_outputs {
        output_tags.push(RowTag::Data { column: *fi });
        outputs.push(StreamFile::new(file, 0, files[*fi].file_size));
    }
    for &vi in &created_vols {
        let slot = &volumes[vi];
        output_tags.push(RowTag::Volume {
            number: slot.vol_number,
            columns: slot.fnrs.clone(),
        });
        outputs.push(StreamFile::new(
            slot.handle.as_ref().expect("created volume has a handle"),
            slot.data_offset,
            slot.data_size,
        ));
    }

    let muls = build_multipliers(&input_tags, &output_tags);

    if let Err(e) = codec::recreate(&muls, &inputs, &outputs, ctx.reporter) {
        drop(inputs);
        drop(outputs);
        // Abort: nothing half-written survives unless asked to keep it
        for (fi, file) in &data_outputs {
            file.close();
            ctx.reporter
                .file_status(&files[*fi].name.to_string(), &FileStatus::NotRestored);
            discard_output(ctx, &files[*fi].name);
        }
        for &vi in &created_vols {
            if let Some(h) = &volumes[vi].handle {
                h.close();
            }
            volumes[vi].handle = None;
            ctx.reporter
                .file_status(&volumes[vi].name.to_string(), &FileStatus::Failed);
            discard_output(ctx, &volumes[vi].name);
        }
        return Err(e);
    }
    drop(inputs);
    drop(outputs);

    // Verify restored data files by their manifest digest.
    for (o, (fi, file)) in data_outputs.iter().enumerate() {
        file.close();
        let entry = &files[*fi];
        let name_str = entry.name.to_string();

        if !muls.is_recoverable(o) {
            ctx.reporter.file_status(&name_str, &FileStatus::NotRestored);
            discard_output(ctx, &entry.name);
            outcome.not_restored += 1;
            continue;
        }

        let idx = ctx.index.add(entry.name.clone());
        ctx.index.invalidate(idx);
        if ctx.index.ensure_hashed(idx, HashLevel::Full).is_err() {
            ctx.reporter.file_status(&name_str, &FileStatus::NotRestored);
            discard_output(ctx, &entry.name);
            outcome.not_restored += 1;
            continue;
        }
        let produced = ctx.index.entry(idx);
        if (produced.file_size == 0 && entry.file_size != 0) || produced.hash != entry.hash {
            ctx.reporter
                .note(&format!("      ERROR: {}: failed md5 check", name_str));
            ctx.reporter.file_status(&name_str, &FileStatus::NotRestored);
            discard_output(ctx, &entry.name);
            outcome.not_restored += 1;
            continue;
        }
        files[*fi].match_idx = Some(idx);
        ctx.reporter.file_status(&name_str, &FileStatus::Recovered);
        outcome.recovered += 1;
    }

    // Finalize created volumes: control hash over [0x20..EOF), patched
    // at 0x10; the write also asserts the file ends exactly at the
    // payload end.
    let out_base = data_outputs.len();
    for (k, &vi) in created_vols.iter().enumerate() {
        let o = out_base + k;
        let name = volumes[vi].name.clone();
        let finalized = muls.is_recoverable(o)
            && {
                let slot = &volumes[vi];
                let end = slot.data_offset + slot.data_size;
                let handle = slot.handle.as_ref().expect("created volume has a handle");
                fileio::patch_region_md5(handle, CONTROL_HASH_OFFSET, CONTROL_REGION_START, end)
                    .is_ok()
            };

        let slot = &mut volumes[vi];
        if let Some(h) = &slot.handle {
            h.close();
        }
        if finalized {
            let idx = ctx.index.add(name.clone());
            ctx.index.invalidate(idx);
            slot.match_idx = Some(idx);
            ctx.reporter.file_status(&name.to_string(), &FileStatus::Ok);
            outcome.volumes_written += 1;
        } else {
            slot.handle = None;
            ctx.reporter
                .file_status(&name.to_string(), &FileStatus::Failed);
            discard_output(ctx, &name);
            outcome.volumes_failed += 1;
        }
    }

    Ok(outcome)
}
