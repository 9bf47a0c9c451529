//! Matrix Market coordinate-format reader
//!
//! Accepts `%%MatrixMarket matrix coordinate <field> <symmetry>` where field is
//! `real`, `integer` or `pattern` and symmetry is `general`, `symmetric` or
//! `skew-symmetric`. Indices in the file are 1-based.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use super::CsrMatrix;
use crate::error::{Error, Result};

// Larger files grow the triplet buffer as entries arrive
const MAX_PREALLOCATED_ENTRIES: usize = 1 << 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Real,
    Integer,
    Pattern,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Symmetry {
    General,
    Symmetric,
    SkewSymmetric,
}

/// Load a Matrix Market file as CSR
pub fn read_matrix_market(path: impl AsRef<Path>) -> Result<CsrMatrix> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let csr = parse_matrix_market(BufReader::new(file))?;
    debug!(
        path = %path.display(),
        rows = csr.rows(),
        cols = csr.cols(),
        nnz = csr.nnz(),
        "loaded matrix market file"
    );
    Ok(csr)
}

/// Parse Matrix Market text from any buffered reader
pub fn parse_matrix_market<R: BufRead>(reader: R) -> Result<CsrMatrix> {
    let mut lines = reader.lines().enumerate();

    let (field, symmetry) = match lines.next() {
        Some((_, line)) => parse_banner(&line?)?,
        None => return Err(Error::parse(1, "empty input")),
    };

    // Size line: first non-comment, non-blank line after the banner
    let mut size = None;
    for (idx, line) in lines.by_ref() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        let (rows, cols, nnz) = parse_size(trimmed, idx + 1)?;
        size = Some((rows, cols, nnz, idx + 1));
        break;
    }
    let (rows, cols, declared, size_line) =
        size.ok_or_else(|| Error::parse(1, "missing size line"))?;

    let cells = rows.saturating_mul(cols);
    if declared > cells {
        return Err(Error::parse(
            size_line,
            format!("{declared} entries cannot fit a {rows}x{cols} matrix"),
        ));
    }
    let per_entry = if symmetry == Symmetry::General { 1 } else { 2 };
    let capacity = declared
        .checked_mul(per_entry)
        .ok_or_else(|| Error::parse(size_line, format!("entry count {declared} overflows")))?
        .min(MAX_PREALLOCATED_ENTRIES);
    let mut triplets = Vec::with_capacity(capacity);
    let mut seen = 0usize;

    for (idx, line) in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        let lineno = idx + 1;
        let (r, c, v) = parse_entry(trimmed, field, lineno)?;
        if r == 0 || c == 0 || r > rows || c > cols {
            return Err(Error::parse(
                lineno,
                format!("entry ({r}, {c}) outside {rows}x{cols} matrix"),
            ));
        }
        let (r, c) = (r - 1, c - 1);
        triplets.push((r, c, v));
        if r != c {
            match symmetry {
                Symmetry::General => {}
                Symmetry::Symmetric => triplets.push((c, r, v)),
                Symmetry::SkewSymmetric => triplets.push((c, r, -v)),
            }
        }
        seen += 1;
    }

    if seen != declared {
        return Err(Error::parse(
            0,
            format!("header declares {declared} entries, found {seen}"),
        ));
    }

    CsrMatrix::from_triplets(rows, cols, &triplets)
}

fn parse_banner(line: &str) -> Result<(Field, Symmetry)> {
    let tokens: Vec<String> = line.split_whitespace().map(str::to_ascii_lowercase).collect();
    if tokens.len() < 5 || tokens[0] != "%%matrixmarket" || tokens[1] != "matrix" {
        return Err(Error::parse(1, "missing %%MatrixMarket matrix banner"));
    }
    if tokens[2] != "coordinate" {
        return Err(Error::parse(
            1,
            format!("unsupported format '{}', only coordinate is supported", tokens[2]),
        ));
    }
    let field = match tokens[3].as_str() {
        "real" | "double" => Field::Real,
        "integer" => Field::Integer,
        "pattern" => Field::Pattern,
        other => return Err(Error::parse(1, format!("unsupported field '{other}'"))),
    };
    let symmetry = match tokens[4].as_str() {
        "general" => Symmetry::General,
        "symmetric" => Symmetry::Symmetric,
        "skew-symmetric" => Symmetry::SkewSymmetric,
        other => return Err(Error::parse(1, format!("unsupported symmetry '{other}'"))),
    };
    Ok((field, symmetry))
}

fn parse_size(line: &str, lineno: usize) -> Result<(usize, usize, usize)> {
    let nums = line
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::parse(lineno, format!("bad size line: {e}")))?;
    match nums.as_slice() {
        &[rows, cols, nnz] => Ok((rows, cols, nnz)),
        _ => Err(Error::parse(lineno, "size line must be 'rows cols nnz'")),
    }
}

fn parse_entry(line: &str, field: Field, lineno: usize) -> Result<(usize, usize, f32)> {
    let mut tokens = line.split_whitespace();
    let mut index = |name: &str| -> Result<usize> {
        tokens
            .next()
            .ok_or_else(|| Error::parse(lineno, format!("missing {name} index")))?
            .parse::<usize>()
            .map_err(|e| Error::parse(lineno, format!("bad {name} index: {e}")))
    };
    let r = index("row")?;
    let c = index("column")?;
    let v = match field {
        Field::Pattern => 1.0,
        Field::Real | Field::Integer => tokens
            .next()
            .ok_or_else(|| Error::parse(lineno, "missing value"))?
            .parse::<f64>()
            .map_err(|e| Error::parse(lineno, format!("bad value: {e}")))?
            as f32,
    };
    Ok((r, c, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<CsrMatrix> {
        parse_matrix_market(text.as_bytes())
    }

    #[test]
    fn test_general_real() {
        let csr = parse(
            "%%MatrixMarket matrix coordinate real general\n\
             % comment\n\
             4 4 3\n\
             1 1 1.0\n\
             2 3 2.0\n\
             4 2 3.0\n",
        )
        .unwrap();
        assert_eq!((csr.rows(), csr.cols(), csr.nnz()), (4, 4, 3));
        assert_eq!(csr.row_ptrs(), &[0, 1, 2, 2, 3]);
        assert_eq!(csr.col_indices(), &[0, 2, 1]);
        assert_eq!(csr.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_symmetric_expands_off_diagonal() {
        let csr = parse(
            "%%MatrixMarket matrix coordinate real symmetric\n\
             3 3 2\n\
             1 1 4.0\n\
             3 1 5.0\n",
        )
        .unwrap();
        assert_eq!(csr.nnz(), 3);
        assert_eq!(csr.to_dense(), vec![4.0, 0.0, 5.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_skew_symmetric_negates_mirror() {
        let csr = parse(
            "%%MatrixMarket matrix coordinate integer skew-symmetric\n\
             2 2 1\n\
             2 1 3\n",
        )
        .unwrap();
        assert_eq!(csr.to_dense(), vec![0.0, -3.0, 3.0, 0.0]);
    }

    #[test]
    fn test_pattern_loads_ones() {
        let csr = parse(
            "%%MatrixMarket matrix coordinate pattern general\n\
             2 3 2\n\
             1 3\n\
             2 1\n",
        )
        .unwrap();
        assert_eq!(csr.values(), &[1.0, 1.0]);
    }

    #[test]
    fn test_rejects_array_format() {
        let err = parse("%%MatrixMarket matrix array real general\n2 2\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_rejects_out_of_range_entry() {
        let err = parse(
            "%%MatrixMarket matrix coordinate real general\n\
             2 2 1\n\
             3 1 1.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }));
    }

    #[test]
    fn test_rejects_impossible_entry_count() {
        let err = parse(
            "%%MatrixMarket matrix coordinate real general\n\
             1 1 18446744073709551615\n\
             1 1 1.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));

        let err = parse(
            "%%MatrixMarket matrix coordinate real symmetric\n\
             2 2 9223372036854775808\n\
             1 1 1.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));

        let err = parse(
            "%%MatrixMarket matrix coordinate real general\n\
             2 2 5\n\
             1 1 1.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_large_square_header_does_not_preallocate_everything() {
        // rows·cols saturates; the count passes the cell check and must not
        // be reserved up front
        let err = parse(
            "%%MatrixMarket matrix coordinate real symmetric\n\
             4294967296 4294967296 4611686018427387904\n\
             1 1 1.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { line: 0, .. }));
    }

    #[test]
    fn test_rejects_entry_count_mismatch() {
        let err = parse(
            "%%MatrixMarket matrix coordinate real general\n\
             2 2 2\n\
             1 1 1.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
