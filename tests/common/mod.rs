//! Common test utilities
#![allow(dead_code)]

use std::io::Write;

use proptest::prelude::*;
use spfc::blocking::{BlockGrid, ColumnBlocking};
use spfc::sparse::CsrMatrix;
use tempfile::NamedTempFile;

/// Assert two f32 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Write `csr` as a general real Matrix Market file
pub fn write_matrix_market(csr: &CsrMatrix) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    writeln!(file, "%%MatrixMarket matrix coordinate real general").unwrap();
    writeln!(file, "% generated by the spfc test suite").unwrap();
    writeln!(file, "{} {} {}", csr.rows(), csr.cols(), csr.nnz()).unwrap();
    for i in 0..csr.rows() {
        let (cols, vals) = csr.row(i);
        for (c, v) in cols.iter().zip(vals) {
            writeln!(file, "{} {} {}", i + 1, c + 1, v).unwrap();
        }
    }
    file.flush().unwrap();
    file
}

/// Random CSR matrix with small integer-valued weights
pub fn arb_csr(max_rows: usize, max_cols: usize) -> impl Strategy<Value = CsrMatrix> {
    (1..=max_rows, 1..=max_cols).prop_flat_map(|(rows, cols)| {
        let entries = proptest::collection::vec((0..rows, 0..cols, -4i32..=4), 0..=rows * cols);
        entries.prop_map(move |entries| {
            let triplets: Vec<(usize, usize, f32)> = entries
                .into_iter()
                .filter(|&(_, _, v)| v != 0)
                .map(|(r, c, v)| (r, c, v as f32))
                .collect();
            CsrMatrix::from_triplets(rows, cols, &triplets).unwrap()
        })
    })
}

/// A valid grid for `csr`: threads are a multiple of the batch-block count
pub fn grid_for(
    csr: &CsrMatrix,
    batch: usize,
    width: usize,
    row_parts: usize,
    col_blocks: usize,
) -> BlockGrid {
    let nb = batch.div_ceil(width);
    let columns = ColumnBlocking::Count(col_blocks);
    BlockGrid::new(csr.rows(), csr.cols(), batch, nb * row_parts, width, columns)
        .expect("grid with threads = nb · row_parts is always valid")
}
