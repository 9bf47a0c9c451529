//! Sparse weight matrices
//!
//! - [`CsrMatrix`]: validated CSR storage, assembled from triplets
//! - [`read_matrix_market`]: Matrix Market coordinate reader
//! - [`SparseIndex`]: integer types usable for blocked column indices

mod csr;
mod index;
mod matrix_market;

pub use csr::CsrMatrix;
pub use index::{IndexWidth, SparseIndex};
pub use matrix_market::{parse_matrix_market, read_matrix_market};
