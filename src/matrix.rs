//! Reed-Solomon coding matrix and coefficient solver
//!
//! Recovery volume k holds, for data column i, the Vandermonde
//! coefficient (i+1)^(k-1) over GF(2^8). Restoring works backwards:
//! build the coding matrix from every available row, substitute the
//! data columns that are still on disk, Gauss-Jordan the remainder to
//! the identity while mirroring every row operation into a running
//! inverse, and read each requested output's coefficient vector out of
//! the inverse.
//!
//! Volumes requested as *outputs* occupy extra matrix rows tied to
//! synthetic columns counted down from the right edge, so creating
//! volumes and recreating files are the same computation.
//!
//! The field bounds the scheme at 255 data columns.

use log::debug;
use smallvec::SmallVec;

use crate::galois::Galois8;

/// 1-based data-file numbers covered by a volume, in the volume's own
/// column order
pub type ColumnMap = SmallVec<[u16; 32]>;

/// What a matrix row stands for.
#[derive(Debug, Clone)]
pub enum RowTag {
    /// A data file occupying column `column` (0-based)
    Data { column: usize },
    /// A recovery volume with its Vandermonde row index and the data
    /// columns it covers
    Volume { number: u64, columns: ColumnMap },
}

impl RowTag {
    fn max_column(&self) -> usize {
        match self {
            RowTag::Data { column } => column + 1,
            RowTag::Volume { columns, .. } => {
                columns.iter().map(|&c| c as usize).max().unwrap_or(0)
            }
        }
    }
}

/// Per-output multiplication coefficients, one entry per input row.
///
/// `None` marks an output the surviving rows cannot determine.
pub struct MulTable {
    inputs: usize,
    rows: Vec<Option<Vec<Galois8>>>,
}

impl MulTable {
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, output: usize) -> Option<&[Galois8]> {
        self.rows[output].as_deref()
    }

    pub fn is_recoverable(&self, output: usize) -> bool {
        self.rows[output].is_some()
    }
}

/// Fill one Vandermonde row: column `fnr-1` gets (k+1)^(number-1) for
/// the k-th covered file.
fn fill_volume_row(row: &mut [Galois8], columns: &ColumnMap, number: u64) {
    for (k, &fnr) in columns.iter().enumerate() {
        row[fnr as usize - 1] = Galois8::new((k + 1) as u8).pow(number.saturating_sub(1));
    }
}

/// Build the coefficient table for `outputs` from `inputs`.
pub fn build_multipliers(inputs: &[RowTag], outputs: &[RowTag]) -> MulTable {
    let out_volumes = outputs
        .iter()
        .filter(|t| matches!(t, RowTag::Volume { .. }))
        .count();

    let max_col = inputs
        .iter()
        .chain(outputs.iter())
        .map(RowTag::max_column)
        .max()
        .unwrap_or(0);
    let n = max_col + out_volumes;
    let r = inputs
        .iter()
        .filter(|t| matches!(t, RowTag::Volume { .. }))
        .count()
        + out_volumes;

    let mut mt = vec![vec![Galois8::ZERO; n]; r];
    // The running inverse has one column per input row; it starts as
    // the identity restricted to the volume inputs.
    let mut imt = vec![vec![Galois8::ZERO; inputs.len()]; r];

    let mut j = 0;
    for (i, tag) in inputs.iter().enumerate() {
        if let RowTag::Volume { number, columns } = tag {
            fill_volume_row(&mut mt[j], columns, *number);
            imt[j][i] = Galois8::ONE;
            j += 1;
        }
    }

    // Requested volumes take the remaining rows, each bound to a fresh
    // synthetic column from the right edge inward.
    let mut synth = n;
    let mut synth_cols = vec![None; outputs.len()];
    for (o, tag) in outputs.iter().enumerate() {
        if let RowTag::Volume { number, columns } = tag {
            fill_volume_row(&mut mt[j], columns, *number);
            synth -= 1;
            mt[j][synth] = Galois8::ONE;
            synth_cols[o] = Some(synth);
            j += 1;
        }
    }

    // Substitute the data that is still present: its matrix row would
    // be a unit vector, so adding it moves the column into the inverse
    // and zeroes it out of the coding matrix.
    for (i, tag) in inputs.iter().enumerate() {
        if let RowTag::Data { column } = tag {
            for row in 0..r {
                let v = mt[row][*column];
                imt[row][i] += v;
                mt[row][*column] = Galois8::ZERO;
            }
        }
    }

    // Gauss-Jordan the remaining rows to the identity, mirroring every
    // operation into the inverse. Pivot is the first non-zero entry,
    // scanning left to right.
    for i in 0..r {
        let Some(l) = (0..n).find(|&c| !mt[i][c].is_zero()) else {
            continue;
        };
        let d = mt[i][l];
        for c in 0..n {
            mt[i][c] /= d;
        }
        for c in 0..inputs.len() {
            imt[i][c] /= d;
        }
        for k in 0..r {
            if k == i {
                continue;
            }
            let factor = mt[k][l];
            if factor.is_zero() {
                continue;
            }
            for c in 0..n {
                let v = mt[i][c] * factor;
                mt[k][c] += v;
            }
            for c in 0..inputs.len() {
                let v = imt[i][c] * factor;
                imt[k][c] += v;
            }
        }
    }

    // Each output's coefficients sit in the row whose only remaining
    // 1-entry is the output's column; an output with no such row is
    // under-determined and unrecoverable.
    let mut rows = Vec::with_capacity(outputs.len());
    for (o, tag) in outputs.iter().enumerate() {
        let col = match tag {
            RowTag::Data { column } => *column,
            RowTag::Volume { .. } => synth_cols[o].expect("synthetic column was allocated"),
        };
        let found = (0..r).find(|&row| {
            mt[row][col] == Galois8::ONE
                && (0..n).all(|c| c == col || mt[row][c].is_zero())
        });
        match found {
            Some(row) => rows.push(Some(imt[row].clone())),
            None => {
                debug!("output {} (column {}) is unrecoverable", o, col);
                rows.push(None);
            }
        }
    }

    MulTable {
        inputs: inputs.len(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_map(n: u16) -> ColumnMap {
        (1..=n).collect()
    }

    fn volume(number: u64, n: u16) -> RowTag {
        RowTag::Volume {
            number,
            columns: full_map(n),
        }
    }

    /// Encode `data` into the payload of volume `number` by brute
    /// force, straight from the definition.
    fn encode_volume(data: &[Vec<u8>], number: u64) -> Vec<u8> {
        let len = data.iter().map(|d| d.len()).max().unwrap_or(0);
        let mut out = vec![0u8; len];
        for (i, d) in data.iter().enumerate() {
            let coeff = Galois8::new((i + 1) as u8).pow(number - 1);
            for (q, &b) in d.iter().enumerate() {
                out[q] ^= (Galois8::new(b) * coeff).value();
            }
        }
        out
    }

    /// Apply a coefficient row to the given input streams.
    fn apply(coeffs: &[Galois8], streams: &[&[u8]], len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        for (i, s) in streams.iter().enumerate() {
            for (q, &b) in s.iter().enumerate() {
                out[q] ^= (Galois8::new(b) * coeffs[i]).value();
            }
        }
        out
    }

    #[test]
    fn volume_one_is_plain_parity() {
        // v1 = d0 + d1 + d2, so losing d1 means d1 = d0 + d2 + v1
        let inputs = vec![
            RowTag::Data { column: 0 },
            RowTag::Data { column: 2 },
            volume(1, 3),
        ];
        let outputs = vec![RowTag::Data { column: 1 }];
        let muls = build_multipliers(&inputs, &outputs);

        let row = muls.row(0).expect("recoverable");
        assert_eq!(row, &[Galois8::ONE, Galois8::ONE, Galois8::ONE]);
    }

    #[test]
    fn recovers_one_missing_file_bit_exactly() {
        let data = vec![
            vec![1u8, 2, 3, 4, 5],
            vec![10u8, 20, 30, 40, 50],
            vec![9u8, 8, 7, 6, 5],
        ];
        let v1 = encode_volume(&data, 1);

        let inputs = vec![
            RowTag::Data { column: 0 },
            RowTag::Data { column: 2 },
            volume(1, 3),
        ];
        let outputs = vec![RowTag::Data { column: 1 }];
        let muls = build_multipliers(&inputs, &outputs);
        let row = muls.row(0).unwrap();

        let restored = apply(row, &[&data[0], &data[2], &v1], 5);
        assert_eq!(restored, data[1]);
    }

    #[test]
    fn recovers_two_missing_files_from_two_volumes() {
        let data = vec![
            vec![0x11u8; 7],
            vec![1u8, 2, 3, 4, 5, 6, 7],
            vec![0xFEu8, 0xDC, 0xBA, 0x98, 0x76, 0x54, 0x32],
            vec![0x00u8, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00],
        ];
        let v1 = encode_volume(&data, 1);
        let v2 = encode_volume(&data, 2);

        let inputs = vec![
            RowTag::Data { column: 1 },
            RowTag::Data { column: 3 },
            volume(1, 4),
            volume(2, 4),
        ];
        let outputs = vec![RowTag::Data { column: 0 }, RowTag::Data { column: 2 }];
        let muls = build_multipliers(&inputs, &outputs);

        let streams: Vec<&[u8]> = vec![&data[1], &data[3], &v1, &v2];
        let r0 = apply(muls.row(0).unwrap(), &streams, 7);
        let r2 = apply(muls.row(1).unwrap(), &streams, 7);
        assert_eq!(r0, data[0]);
        assert_eq!(r2, data[2]);
    }

    #[test]
    fn under_determined_output_is_marked_unrecoverable() {
        // Two files missing, one volume present
        let inputs = vec![RowTag::Data { column: 0 }, volume(1, 3)];
        let outputs = vec![RowTag::Data { column: 1 }, RowTag::Data { column: 2 }];
        let muls = build_multipliers(&inputs, &outputs);

        assert!(!muls.is_recoverable(0));
        assert!(!muls.is_recoverable(1));
    }

    #[test]
    fn creating_a_volume_yields_vandermonde_coefficients() {
        // All data present, volume 3 requested: the coefficient for
        // data column i must be (i+1)^2
        let inputs = vec![
            RowTag::Data { column: 0 },
            RowTag::Data { column: 1 },
            RowTag::Data { column: 2 },
        ];
        let outputs = vec![volume(3, 3)];
        let muls = build_multipliers(&inputs, &outputs);

        let row = muls.row(0).expect("creatable");
        for i in 0..3u64 {
            assert_eq!(row[i as usize], Galois8::new((i + 1) as u8).pow(2));
        }
    }

    #[test]
    fn recreating_a_volume_from_data_matches_encoding() {
        let data = vec![vec![5u8, 6, 7], vec![8u8, 9, 10]];
        let expected = encode_volume(&data, 2);

        let inputs = vec![RowTag::Data { column: 0 }, RowTag::Data { column: 1 }];
        let outputs = vec![volume(2, 2)];
        let muls = build_multipliers(&inputs, &outputs);

        let streams: Vec<&[u8]> = vec![&data[0], &data[1]];
        let payload = apply(muls.row(0).unwrap(), &streams, 3);
        assert_eq!(payload, expected);
    }

    #[test]
    fn mixed_restore_and_volume_creation() {
        // Lose d1, restore it AND produce a fresh volume 2 in one pass
        let data = vec![vec![3u8, 1, 4, 1], vec![5u8, 9, 2, 6], vec![5u8, 3, 5, 8]];
        let v1 = encode_volume(&data, 1);
        let v2 = encode_volume(&data, 2);

        let inputs = vec![
            RowTag::Data { column: 0 },
            RowTag::Data { column: 2 },
            volume(1, 3),
        ];
        let outputs = vec![RowTag::Data { column: 1 }, volume(2, 3)];
        let muls = build_multipliers(&inputs, &outputs);

        let streams: Vec<&[u8]> = vec![&data[0], &data[2], &v1];
        assert_eq!(apply(muls.row(0).unwrap(), &streams, 4), data[1]);
        assert_eq!(apply(muls.row(1).unwrap(), &streams, 4), v2);
    }

    #[test]
    fn volume_numbers_need_not_be_contiguous() {
        let data = vec![vec![42u8; 9], vec![17u8; 9], vec![99u8; 9]];
        let v2 = encode_volume(&data, 2);
        let v5 = encode_volume(&data, 5);

        let inputs = vec![RowTag::Data { column: 1 }, volume(2, 3), volume(5, 3)];
        let outputs = vec![RowTag::Data { column: 0 }, RowTag::Data { column: 2 }];
        let muls = build_multipliers(&inputs, &outputs);

        let streams: Vec<&[u8]> = vec![&data[1], &v2, &v5];
        assert_eq!(apply(muls.row(0).unwrap(), &streams, 9), data[0]);
        assert_eq!(apply(muls.row(1).unwrap(), &streams, 9), data[2]);
    }
}
