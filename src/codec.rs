//! Streaming Reed-Solomon codec
//!
//! Walks every input and output in 16 KiB blocks: each block of each
//! input is passed through the 256-byte multiply table for each
//! affected output and XORed into that output's working buffer, then
//! the buffers are flushed. One pass restores any number of files and
//! produces any number of volumes simultaneously.
//!
//! Strictly sequential; the inner loop allocates nothing (the tables
//! and buffers are set up front).

use crate::error::{ParError, Result};
use crate::fileio::LazyFile;
use crate::galois::make_lut;
use crate::matrix::MulTable;
use crate::reporters::Reporter;

/// Processing block size, fixed by the format's heritage
pub const BLOCK_SIZE: usize = 0x4000;

/// One stream the codec reads from or writes to: a file region of
/// `len` bytes starting at `offset` (volumes place their payload after
/// the header).
pub struct StreamFile<'a> {
    pub file: &'a LazyFile,
    pub offset: u64,
    pub len: u64,
}

impl<'a> StreamFile<'a> {
    pub fn new(file: &'a LazyFile, offset: u64, len: u64) -> Self {
        StreamFile { file, offset, len }
    }
}

/// Run the transformation described by `muls` over all streams.
///
/// Outputs whose coefficient row is missing (unrecoverable) are
/// skipped entirely and produce no data; the orchestrator decides
/// their fate. A short read or failed write aborts the whole pass;
/// partially written outputs are left for the caller to clean up.
pub fn recreate(
    muls: &MulTable,
    inputs: &[StreamFile],
    outputs: &[StreamFile],
    reporter: &dyn Reporter,
) -> Result<()> {
    debug_assert_eq!(muls.inputs(), inputs.len());
    debug_assert_eq!(muls.outputs(), outputs.len());

    let total = outputs
        .iter()
        .enumerate()
        .filter(|(j, _)| muls.is_recoverable(*j))
        .map(|(_, o)| o.len)
        .max()
        .unwrap_or(0);

    // Setup: one LUT per (output, input) pair with a non-zero
    // coefficient, one working buffer per output, one scratch block.
    let luts: Vec<Vec<Option<Box<[u8; 256]>>>> = (0..outputs.len())
        .map(|j| {
            let row = muls.row(j).unwrap_or(&[]);
            row.iter()
                .map(|&m| {
                    if m.is_zero() {
                        None
                    } else {
                        Some(Box::new(make_lut(m)))
                    }
                })
                .collect()
        })
        .collect();
    let mut work = vec![[0u8; BLOCK_SIZE]; outputs.len()];
    let mut scratch = [0u8; BLOCK_SIZE];

    let mut s = 0u64;
    while s < total {
        reporter.progress(s, total);
        for buf in work.iter_mut() {
            buf.fill(0);
        }

        for (i, input) in inputs.iter().enumerate() {
            if s >= input.len {
                continue;
            }
            let want = BLOCK_SIZE.min((input.len - s) as usize);
            let got = input.file.read_at(input.offset + s, &mut scratch[..want])?;
            if got < want {
                reporter.note("READ ERROR!");
                return Err(ParError::read_error());
            }
            for (j, output) in outputs.iter().enumerate() {
                if s >= output.len || !muls.is_recoverable(j) {
                    continue;
                }
                let Some(lut) = &luts[j][i] else { continue };
                let buf = &mut work[j];
                for q in 0..want {
                    buf[q] ^= lut[scratch[q] as usize];
                }
            }
        }

        for (j, output) in outputs.iter().enumerate() {
            if s >= output.len || !muls.is_recoverable(j) {
                continue;
            }
            let want = BLOCK_SIZE.min((output.len - s) as usize);
            if let Err(e) = output.file.write_all_at(output.offset + s, &work[j][..want]) {
                reporter.note("WRITE ERROR!");
                return Err(e.into());
            }
        }

        s += BLOCK_SIZE as u64;
    }
    reporter.progress_done();
    Ok(())
}
