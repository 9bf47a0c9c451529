//! Error types for spfc

use thiserror::Error;

/// Result type alias using spfc's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, blocking, computing or verifying
#[derive(Error, Debug)]
pub enum Error {
    /// Shape mismatch between two operands
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// The batch-block count does not divide the worker count
    #[error("nb {batch_blocks} should divide # of threads {threads}")]
    InvalidBlocking {
        /// Worker thread count
        threads: usize,
        /// Number of batch blocks derived from the batch width
        batch_blocks: usize,
    },

    /// A column index does not fit the chosen index storage
    #[error("Column index {value} does not fit in {bits}-bit index storage")]
    IndexOverflow {
        /// The (possibly pre-scaled) index value
        value: usize,
        /// Width of the index type
        bits: u32,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Malformed sparse matrix input
    #[error("Parse error at line {line}: {reason}")]
    Parse {
        /// 1-based line number, 0 when not tied to a single line
        line: usize,
        /// What went wrong
        reason: String,
    },

    /// I/O failure while reading input
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Compute kernel rejected its arguments or failed
    #[error("Kernel '{kernel}' failed: {reason}")]
    Kernel {
        /// Kernel name
        kernel: &'static str,
        /// Failure description
        reason: String,
    },

    /// Thread pool or other backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Blocked result disagrees with the reference computation
    #[error("({row}, {col}) expected {expected} actual {actual}")]
    VerificationMismatch {
        /// Output row
        row: usize,
        /// Batch column
        col: usize,
        /// Reference value
        expected: f32,
        /// Value produced by the blocked pipeline
        actual: f32,
    },
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create a parse error for the given 1-based line
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a kernel failure
    pub fn kernel(kernel: &'static str, reason: impl Into<String>) -> Self {
        Self::Kernel {
            kernel,
            reason: reason.into(),
        }
    }

    /// True for errors caused by an unsatisfiable blocking configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidBlocking { .. } | Self::InvalidArgument { .. } | Self::IndexOverflow { .. }
        )
    }
}
