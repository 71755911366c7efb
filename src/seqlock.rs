//! Sequence lock: one writer, any number of lock-free readers.
//!
//! Readers speculate that no write overlaps their critical section and
//! validate the sequence counter afterwards; on a mismatch the section is
//! re-run. The writer never waits. The counter is even while quiescent and
//! odd while a write is in progress.

use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Optimistic read/write coordinator around a value `T`.
///
/// `read` closures may observe `T` mid-mutation and can be invoked more
/// than once; they must tolerate transiently inconsistent bytes without
/// dereferencing anything derived from them unchecked. At most one thread
/// may be inside `write` at a time; the protocol assumes external
/// serialization of the writer and asserts it in debug builds.
pub struct SeqLock<T> {
    seq: AtomicU64,
    data: UnsafeCell<T>,
}

// Readers and the writer share `data` by design; consistency comes from
// the sequence protocol, not from `&`/`&mut` exclusivity.
unsafe impl<T: Send> Send for SeqLock<T> {}
unsafe impl<T: Send + Sync> Sync for SeqLock<T> {}

impl<T> SeqLock<T> {
    /// Wrap `data` with the sequence counter at zero (quiescent).
    pub fn new(data: T) -> Self {
        Self {
            seq: AtomicU64::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Run `f` against a consistent view of the data and return its result.
    ///
    /// Lock-free: the reader spins only while a write is in progress or
    /// when validation fails. A sustained write storm can starve readers;
    /// that trade is accepted.
    pub fn read<R>(&self, mut f: impl FnMut(&T) -> R) -> R {
        loop {
            let v1 = self.seq.load(Ordering::Acquire);
            if v1 & 1 != 0 {
                // Write in progress; back off the cache line.
                std::hint::spin_loop();
                continue;
            }

            // SAFETY: readers only ever take a shared view; `f` tolerates
            // torn state, which the validation below discards.
            let result = f(unsafe { &*self.data.get() });

            // Keep the loads in `f` from drifting past the validation load.
            fence(Ordering::Acquire);

            let v2 = self.seq.load(Ordering::Relaxed);
            if v1 == v2 {
                return result;
            }
        }
    }

    /// Run `f` with exclusive mutable access and return its result.
    ///
    /// Publishes all of `f`'s effects atomically with respect to readers:
    /// a reader either validates against the state before this call or the
    /// state after it.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let prev = self.seq.fetch_add(1, Ordering::Acquire);
        debug_assert!(
            prev & 1 == 0,
            "concurrent writers on a single-writer seqlock"
        );

        // SAFETY: single-writer discipline makes this the only mutable
        // reference; readers validate away any overlap.
        let result = f(unsafe { &mut *self.data.get() });

        self.seq.store(prev + 2, Ordering::Release);
        result
    }
}
