//! Aligned arena allocation for blocked matrices
//!
//! Every blocked structure is backed by an [`AlignedBuffer`] handed out by an
//! [`Arena`]. The arena keeps a record of each live allocation (pointer, size,
//! alignment) so that a run can report its footprint, and buffers release
//! their memory when dropped.

use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use bytemuck::Zeroable;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Page alignment used for all blocked buffers
pub const PAGE_ALIGN: usize = 4096;

/// One live allocation tracked by the arena
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Base address
    pub ptr: usize,
    /// Size in bytes
    pub size: usize,
    /// Alignment in bytes
    pub align: usize,
}

#[derive(Debug, Default)]
struct ArenaState {
    live: HashMap<usize, AllocationRecord>,
    live_bytes: usize,
    peak_bytes: usize,
    total_allocations: usize,
}

/// Allocation tracker for aligned, zero-initialized buffers
///
/// Cloning an `Arena` yields another handle to the same bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct Arena {
    state: Arc<Mutex<ArenaState>>,
}

impl Arena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `len` zeroed elements aligned to [`PAGE_ALIGN`]
    pub fn alloc<T: Zeroable + Copy>(&self, len: usize) -> Result<AlignedBuffer<T>> {
        self.alloc_aligned(len, PAGE_ALIGN)
    }

    /// Allocate `len` zeroed elements with an explicit alignment
    ///
    /// # Errors
    ///
    /// Alignments below `align_of::<T>()` are raised to it. Returns error if
    /// `align` is not a power of two, if the byte size overflows, or if the
    /// system allocator fails.
    pub fn alloc_aligned<T: Zeroable + Copy>(
        &self,
        len: usize,
        align: usize,
    ) -> Result<AlignedBuffer<T>> {
        if !align.is_power_of_two() {
            return Err(Error::invalid_argument("align", format!("{align} is not a power of two")));
        }
        let align = align.max(std::mem::align_of::<T>());
        let size = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| Error::invalid_argument("len", format!("{len} elements overflow")))?;

        if size == 0 {
            return Ok(AlignedBuffer {
                ptr: NonNull::dangling(),
                len,
                size: 0,
                align,
                arena: self.clone(),
            });
        }

        let layout = AllocLayout::from_size_align(size, align)
            .map_err(|e| Error::invalid_argument("align", e.to_string()))?;

        // SAFETY: layout has non-zero size
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut T).ok_or(Error::OutOfMemory { size })?;

        let mut state = self.state.lock();
        state.live.insert(
            raw as usize,
            AllocationRecord {
                ptr: raw as usize,
                size,
                align,
            },
        );
        state.live_bytes += size;
        state.peak_bytes = state.peak_bytes.max(state.live_bytes);
        state.total_allocations += 1;
        drop(state);

        Ok(AlignedBuffer {
            ptr,
            len,
            size,
            align,
            arena: self.clone(),
        })
    }

    /// Allocate an aligned copy of `src`
    pub fn alloc_from_slice<T: Zeroable + Copy>(&self, src: &[T]) -> Result<AlignedBuffer<T>> {
        let mut buf = self.alloc(src.len())?;
        buf.copy_from_slice(src);
        Ok(buf)
    }

    /// Bytes currently held by live buffers
    pub fn live_bytes(&self) -> usize {
        self.state.lock().live_bytes
    }

    /// Largest value `live_bytes` has reached
    pub fn peak_bytes(&self) -> usize {
        self.state.lock().peak_bytes
    }

    /// Number of live (non-empty) allocations
    pub fn live_allocations(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of non-empty allocations made over the arena's lifetime
    pub fn total_allocations(&self) -> usize {
        self.state.lock().total_allocations
    }

    /// Snapshot of the live allocation records, ordered by address
    pub fn records(&self) -> Vec<AllocationRecord> {
        let mut records: Vec<_> = self.state.lock().live.values().copied().collect();
        records.sort_by_key(|r| r.ptr);
        records
    }

    fn release(&self, ptr: usize) -> Option<AllocationRecord> {
        let mut state = self.state.lock();
        let record = state.live.remove(&ptr)?;
        state.live_bytes -= record.size;
        Some(record)
    }
}

/// Zero-initialized, aligned heap buffer owned by an [`Arena`]
pub struct AlignedBuffer<T> {
    ptr: NonNull<T>,
    len: usize,
    size: usize,
    align: usize,
    arena: Arena,
}

// SAFETY: AlignedBuffer uniquely owns its allocation, like Vec<T>
unsafe impl<T: Send> Send for AlignedBuffer<T> {}
// SAFETY: shared access only hands out &[T]
unsafe impl<T: Sync> Sync for AlignedBuffer<T> {}

impl<T> AlignedBuffer<T> {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment the buffer was allocated with
    pub fn align(&self) -> usize {
        self.align
    }

    /// Size of the allocation in bytes
    pub fn size_bytes(&self) -> usize {
        self.size
    }
}

impl<T> Deref for AlignedBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: ptr is valid for len zero-initialized elements (or dangling with len 0)
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for AlignedBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in deref, and &mut self guarantees exclusivity
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Drop for AlignedBuffer<T> {
    fn drop(&mut self) {
        if self.size == 0 {
            return;
        }
        let addr = self.ptr.as_ptr() as usize;
        self.arena.release(addr);
        // SAFETY: the same size/align were accepted by Layout at allocation time
        unsafe {
            let layout = AllocLayout::from_size_align_unchecked(self.size, self.align);
            dealloc(self.ptr.as_ptr() as *mut u8, layout);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AlignedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("align", &self.align)
            .field("data", &self.deref())
            .finish()
    }
}
