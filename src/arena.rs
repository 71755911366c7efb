//! Bump-allocated entry storage backed by one anonymous memory mapping.
//!
//! The arena bypasses the general-purpose heap: one contiguous, zero-filled
//! region is mapped from the OS up front, and allocation is a single atomic
//! fetch-add on a 32-bit cursor. Individual allocations are never freed;
//! the whole region is returned to the OS when the arena is dropped.
//!
//! Entries are addressed by 32-bit offsets rather than pointers, which
//! keeps index slots at 16 bytes and caps the region at 4 GiB.

use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use thiserror::Error;

/// Offsets 0..8 are reserved so that offset 0 can serve as a
/// null-equivalent and the first entry starts 8-byte aligned.
const FIRST_OFFSET: u32 = 8;

/// Errors surfaced when creating an arena or allocating from it.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// The requested capacity does not fit the 32-bit offset space.
    #[error("arena capacity {requested} exceeds the 32-bit offset space")]
    TooLarge {
        /// The capacity that was asked for, in bytes.
        requested: usize,
    },
    /// The operating system refused the anonymous mapping.
    #[error("failed to map anonymous memory: {0}")]
    MmapFailed(#[from] std::io::Error),
    /// The bump cursor ran past the end of the region.
    #[error("arena exhausted: {needed} bytes needed, {capacity} bytes capacity")]
    OutOfSpace {
        /// Size of the allocation that failed.
        needed: u32,
        /// Total capacity of the arena.
        capacity: u32,
    },
}

/// A monotonic bump allocator over an anonymous read/write mapping.
///
/// The arena exclusively owns its mapping: it is move-only, and dropping it
/// unmaps the region. Allocation is linearizable (concurrent callers each
/// observe a distinct, non-overlapping range), so the arena is shared
/// freely between the writer and readers.
#[derive(Debug)]
pub struct Arena {
    map: MmapMut,
    base: *mut u8,
    cursor: AtomicU32,
}

// The mapping is owned for the arena's lifetime and all mutation of the
// cursor is atomic; entry bytes are only written before their offset is
// published to readers.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Map `size` bytes of zero-filled anonymous memory.
    ///
    /// Fails with [`ArenaError::TooLarge`] when `size` cannot be addressed
    /// by a 32-bit offset, and [`ArenaError::MmapFailed`] when the OS
    /// refuses the mapping.
    pub fn create(size: usize) -> Result<Self, ArenaError> {
        if size > u32::MAX as usize {
            return Err(ArenaError::TooLarge { requested: size });
        }
        let mut map = MmapMut::map_anon(size)?;
        let base = map.as_mut_ptr();
        Ok(Self {
            map,
            base,
            cursor: AtomicU32::new(FIRST_OFFSET),
        })
    }

    /// Reserve `len` bytes and return the offset of the reservation.
    ///
    /// Callers pass lengths pre-rounded to 8 bytes; the arena does not
    /// round. On exhaustion the cursor is left advanced; the allocation is
    /// not rolled back, and subsequent calls may also fail.
    #[inline]
    pub fn alloc(&self, len: u32) -> Result<u32, ArenaError> {
        let old = self.cursor.fetch_add(len, Ordering::AcqRel);
        if old as u64 + len as u64 > self.capacity() as u64 {
            return Err(ArenaError::OutOfSpace {
                needed: len,
                capacity: self.capacity(),
            });
        }
        Ok(old)
    }

    /// Resolve an offset to a raw pointer into the mapping.
    ///
    /// # Safety
    /// `offset` must lie within the mapping; no bounds check is performed.
    #[inline]
    pub unsafe fn ptr_at(&self, offset: u32) -> *mut u8 {
        // SAFETY: caller keeps offset within the mapping.
        unsafe { self.base.add(offset as usize) }
    }

    /// Total capacity of the region in bytes.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.map.len() as u32
    }

    /// Bytes consumed so far, including garbage from overwritten entries.
    ///
    /// The cursor can overshoot the capacity after a failed allocation; the
    /// reported figure is clamped to the capacity.
    #[inline]
    pub fn used(&self) -> u32 {
        self.cursor.load(Ordering::Acquire).min(self.capacity())
    }
}
