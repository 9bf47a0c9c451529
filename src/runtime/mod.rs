//! CPU runtime support for the blocked pipeline
//!
//! ```text
//! runtime
//! ├── allocator  (page-aligned arena, allocation records)
//! ├── pool       (fixed-size rayon worker pool)
//! └── simd       (vector width detection → batch-block width)
//! ```

mod allocator;
mod pool;
pub mod simd;

pub use allocator::{AlignedBuffer, AllocationRecord, Arena, PAGE_ALIGN};
pub use pool::{WorkerPool, available_threads};
pub use simd::{SimdLevel, default_batch_block_width, detect_simd};
