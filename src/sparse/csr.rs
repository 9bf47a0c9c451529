//! CSR (Compressed Sparse Row) weight matrix

use crate::error::{Error, Result};

/// CSR sparse matrix with f32 values
///
/// Column indices within a row may appear in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    row_ptrs: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f32>,
}

impl CsrMatrix {
    /// Create a CSR matrix from components
    ///
    /// # Arguments
    ///
    /// * `rows`, `cols` - Matrix shape
    /// * `row_ptrs` - Row pointers (length: rows + 1)
    /// * `col_indices` - Column index of each non-zero
    /// * `values` - Value of each non-zero
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - row_ptrs length != rows + 1
    /// - row_ptrs does not start at 0, decreases, or does not end at nnz
    /// - col_indices and values have different lengths
    /// - a column index is >= cols
    pub fn new(
        rows: usize,
        cols: usize,
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<f32>,
    ) -> Result<Self> {
        let nnz = values.len();

        if row_ptrs.len() != rows + 1 {
            return Err(Error::shape_mismatch(&[rows + 1], &[row_ptrs.len()]));
        }
        if col_indices.len() != nnz {
            return Err(Error::shape_mismatch(&[nnz], &[col_indices.len()]));
        }
        if row_ptrs[0] != 0 {
            return Err(Error::invalid_argument(
                "row_ptrs",
                format!("first row pointer is {}, expected 0", row_ptrs[0]),
            ));
        }
        if let Some(i) = row_ptrs.windows(2).position(|w| w[0] > w[1]) {
            return Err(Error::invalid_argument(
                "row_ptrs",
                format!(
                    "row pointers decrease at row {i}: {} > {}",
                    row_ptrs[i],
                    row_ptrs[i + 1]
                ),
            ));
        }
        if row_ptrs[rows] != nnz {
            return Err(Error::invalid_argument(
                "row_ptrs",
                format!("last row pointer is {}, expected nnz {nnz}", row_ptrs[rows]),
            ));
        }
        if let Some(&c) = col_indices.iter().find(|&&c| c >= cols) {
            return Err(Error::invalid_argument(
                "col_indices",
                format!("column {c} out of range for {cols} columns"),
            ));
        }

        Ok(Self {
            rows,
            cols,
            row_ptrs,
            col_indices,
            values,
        })
    }

    /// Assemble a CSR matrix from (row, col, value) triplets
    ///
    /// Entries are sorted by (row, col) and duplicates are summed.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: &[(usize, usize, f32)],
    ) -> Result<Self> {
        if let Some(&(r, c, _)) = triplets.iter().find(|&&(r, c, _)| r >= rows || c >= cols) {
            return Err(Error::invalid_argument(
                "triplets",
                format!("entry ({r}, {c}) outside {rows}x{cols} matrix"),
            ));
        }

        let mut perm: Vec<usize> = (0..triplets.len()).collect();
        perm.sort_by_key(|&i| (triplets[i].0, triplets[i].1));

        let mut row_ptrs = vec![0usize; rows + 1];
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut values: Vec<f32> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for &i in &perm {
            let (r, c, v) = triplets[i];
            if last == Some((r, c)) {
                if let Some(acc) = values.last_mut() {
                    *acc += v;
                }
                continue;
            }
            row_ptrs[r + 1] += 1;
            col_indices.push(c);
            values.push(v);
            last = Some((r, c));
        }
        for i in 1..=rows {
            row_ptrs[i] += row_ptrs[i - 1];
        }

        Self::new(rows, cols, row_ptrs, col_indices, values)
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored non-zeros
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Fraction of stored entries, `nnz / (rows * cols)`
    pub fn density(&self) -> f64 {
        if self.rows == 0 || self.cols == 0 {
            return 0.0;
        }
        self.nnz() as f64 / self.rows as f64 / self.cols as f64
    }

    /// Row pointers
    pub fn row_ptrs(&self) -> &[usize] {
        &self.row_ptrs
    }

    /// Column indices
    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    /// Non-zero values
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Column indices and values of one row
    #[inline]
    pub fn row(&self, row: usize) -> (&[usize], &[f32]) {
        let range = self.row_ptrs[row]..self.row_ptrs[row + 1];
        (&self.col_indices[range.clone()], &self.values[range])
    }

    /// Keep only the first `rows` rows
    ///
    /// Used to scale a large problem down to a single tile.
    pub fn truncate_rows(&self, rows: usize) -> Self {
        let rows = rows.min(self.rows);
        let nnz = self.row_ptrs[rows];
        Self {
            rows,
            cols: self.cols,
            row_ptrs: self.row_ptrs[..=rows].to_vec(),
            col_indices: self.col_indices[..nnz].to_vec(),
            values: self.values[..nnz].to_vec(),
        }
    }

    /// Expand to a dense row-major `rows × cols` matrix
    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0.0f32; self.rows * self.cols];
        for r in 0..self.rows {
            let (cols, vals) = self.row(r);
            for (&c, &v) in cols.iter().zip(vals) {
                dense[r * self.cols + c] += v;
            }
        }
        dense
    }
}
