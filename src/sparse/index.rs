//! Column index storage for blocked CSR
//!
//! Narrow (16-bit) indices store the raw column and the kernel multiplies by
//! the input row stride. Wider indices have room to hold `column * stride`
//! directly, which removes that multiplication from the inner loop.

use std::fmt::Debug;

use bytemuck::Zeroable;

/// Integer type usable as a blocked column index
pub trait SparseIndex: Copy + Send + Sync + Zeroable + Debug + 'static {
    /// Width of the type in bits
    const BITS: u32;

    /// Whether stored indices are pre-multiplied by the input row stride
    const PRESCALED: bool = Self::BITS > 16;

    /// Convert from usize, `None` if the value does not fit
    fn from_usize(value: usize) -> Option<Self>;

    /// Widen to usize
    fn to_usize(self) -> usize;
}

macro_rules! impl_sparse_index {
    ($($t:ty),*) => {
        $(
            impl SparseIndex for $t {
                const BITS: u32 = <$t>::BITS;

                #[inline]
                fn from_usize(value: usize) -> Option<Self> {
                    <$t>::try_from(value).ok()
                }

                #[inline]
                fn to_usize(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_sparse_index!(u16, u32, u64);

/// Runtime selection of the index type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndexWidth {
    /// 16-bit raw column indices
    U16,
    /// 32-bit pre-scaled indices
    #[default]
    U32,
}

impl IndexWidth {
    /// Name used on the command line
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::U16 => "u16",
            Self::U32 => "u32",
        }
    }
}
