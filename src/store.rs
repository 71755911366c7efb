//! The engine: [`Arena`], [`Index`], and [`SeqLock`] composed into the
//! put/get/delete contract.
//!
//! Every `put` appends a fresh entry (header, key bytes, value bytes) to
//! the arena and then publishes its offset through one seqlock write
//! transaction. Overwritten and deleted entries stay behind as garbage for
//! the life of the store. Reads probe the index and copy the value out
//! inside one seqlock read transaction, so a torn slot can never leak an
//! inconsistent value to the caller.

use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use crate::arena::{Arena, ArenaError};
use crate::index::{fnv1a, Index, Slot};
use crate::seqlock::SeqLock;

/// Longest accepted key, in bytes. Key lengths are cached in one byte of
/// the index slot.
pub const MAX_KEY_LEN: usize = 255;

/// Longest accepted value, in bytes.
pub const MAX_VAL_LEN: usize = 65_535;

/// Outcome of a store operation. Every failure is a value, never a panic.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation took effect.
    Ok,
    /// The key exceeds [`MAX_KEY_LEN`]; nothing was mutated.
    KeyTooLong,
    /// The value exceeds [`MAX_VAL_LEN`]; nothing was mutated.
    ValTooLong,
    /// The arena could not fit the entry; the index was not touched.
    ArenaFull,
    /// The key is not present. A normal outcome of `get` and `delete`.
    NotFound,
}

impl Status {
    /// True when the operation took effect.
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// Sizing knobs for [`Store::create`].
///
/// Both capacities are fixed for the lifetime of the store. Provision the
/// arena for the full write volume (overwrites consume fresh bytes) and
/// the slot count above the peak number of live keys.
#[derive(Debug, Clone)]
pub struct Config {
    /// Arena capacity in bytes. Capped at `u32::MAX`.
    pub arena_bytes: usize,
    /// Requested slot count; rounded up to a power of two, floored at 8.
    pub slots: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arena_bytes: 64 * 1024 * 1024,
            slots: 1 << 20,
        }
    }
}

impl Config {
    /// Replace the arena capacity.
    pub fn with_arena_bytes(mut self, bytes: usize) -> Self {
        self.arena_bytes = bytes;
        self
    }

    /// Replace the requested slot count.
    pub fn with_slots(mut self, slots: u32) -> Self {
        self.slots = slots;
        self
    }
}

/// Point-in-time usage snapshot, taken without blocking the writer.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Arena bytes consumed, including garbage from overwrites and deletes.
    pub arena_used: u32,
    /// Total arena capacity in bytes.
    pub arena_capacity: u32,
    /// Number of index slots.
    pub slot_capacity: u32,
    /// Keys currently readable.
    pub live_keys: usize,
}

/// Fixed header written immediately before the key and value bytes.
#[derive(Clone, Copy)]
#[repr(C)]
struct EntryHeader {
    klen: u16,
    vlen: u16,
    hash: u32,
}

const HEADER_SIZE: usize = mem::size_of::<EntryHeader>();
const _: () = assert!(HEADER_SIZE == 8);

#[inline]
fn round_up_8(n: usize) -> usize {
    (n + 7) & !7
}

/// Full key comparison against the arena-resident entry a slot points at.
///
/// Runs inside a seqlock transaction. A torn slot may address bytes owned
/// by some other entry; the hash and length stored in that entry's header
/// then fail to match and the candidate is rejected, leaving the sequence
/// validation to force a retry.
#[inline]
fn entry_matches(arena: &Arena, slot: Slot, h: u32, key: &[u8]) -> bool {
    // SAFETY: `slot` passed the validity filter, so `offset` came from the
    // allocator and the entry behind it is immutable once published.
    unsafe {
        let ptr = arena.ptr_at(slot.offset);
        let hdr = ptr.cast::<EntryHeader>().read();
        if hdr.hash != h || usize::from(hdr.klen) != key.len() {
            return false;
        }
        std::slice::from_raw_parts(ptr.add(HEADER_SIZE), key.len()) == key
    }
}

struct Shared {
    arena: Arena,
    index: SeqLock<Index>,
    live_keys: AtomicUsize,
}

impl Shared {
    fn get(&self, key: &[u8], out: &mut Vec<u8>) -> Status {
        let h = fnv1a(key);
        let found = self.index.read(|idx| {
            let (slot_idx, found) =
                idx.find(h, key.len(), |s| entry_matches(&self.arena, s, h, key));
            if !found {
                return false;
            }
            let slot = idx.slot(slot_idx);
            if !slot.is_valid() {
                // The writer moved underneath us; validation will retry.
                return false;
            }
            // SAFETY: a valid offset addresses a published, immutable
            // entry. If the slot was torn, the copied bytes are discarded
            // by the sequence validation.
            unsafe {
                let ptr = self.arena.ptr_at(slot.offset);
                let hdr = ptr.cast::<EntryHeader>().read();
                out.clear();
                out.extend_from_slice(std::slice::from_raw_parts(
                    ptr.add(HEADER_SIZE + usize::from(hdr.klen)),
                    usize::from(hdr.vlen),
                ));
            }
            true
        });
        if found {
            Status::Ok
        } else {
            Status::NotFound
        }
    }

    fn contains(&self, key: &[u8]) -> bool {
        let h = fnv1a(key);
        self.index.read(|idx| {
            idx.find(h, key.len(), |s| entry_matches(&self.arena, s, h, key))
                .1
        })
    }

    fn len(&self) -> usize {
        self.live_keys.load(Ordering::Relaxed)
    }
}

/// The writer handle: the public entry point of the engine.
///
/// `Store` is the single writer: it is not `Clone`, and `put`/`delete`
/// take `&mut self`, so two mutations can never race through it. Spawn any
/// number of [`StoreReader`] handles for concurrent lock-free reads; the
/// writer may read through its own handle at the same time.
///
/// Dropping the store and every reader returns the arena to the OS. All
/// stored bytes are volatile; nothing persists.
pub struct Store {
    shared: Arc<Shared>,
}

impl Store {
    /// Map the arena, build the index, and return the engine.
    ///
    /// Fails with [`ArenaError::TooLarge`] or [`ArenaError::MmapFailed`];
    /// either leaves nothing behind.
    pub fn create(config: Config) -> Result<Self, ArenaError> {
        let arena = Arena::create(config.arena_bytes)?;
        let index = Index::new(config.slots);
        debug!(
            "store created: arena {} bytes, {} slots",
            arena.capacity(),
            index.capacity()
        );
        Ok(Self {
            shared: Arc::new(Shared {
                arena,
                index: SeqLock::new(index),
                live_keys: AtomicUsize::new(0),
            }),
        })
    }

    /// Insert or overwrite `key` with `val`.
    ///
    /// Append-only: a fresh entry is allocated even when the key already
    /// exists, and the stale entry's bytes are never reclaimed. The entry
    /// is written outside the lock and becomes visible to readers in one
    /// atomic slot update.
    pub fn put(&mut self, key: &[u8], val: &[u8]) -> Status {
        if key.len() > MAX_KEY_LEN {
            return Status::KeyTooLong;
        }
        if val.len() > MAX_VAL_LEN {
            return Status::ValTooLong;
        }

        let shared = &*self.shared;
        let h = fnv1a(key);
        let needed = round_up_8(HEADER_SIZE + key.len() + val.len()) as u32;
        let offset = match shared.arena.alloc(needed) {
            Ok(off) => off,
            Err(_) => return Status::ArenaFull,
        };

        // Entry bytes land before the slot is published; no reader can
        // observe this offset until the index update below.
        // SAFETY: the allocator reserved [offset, offset + needed) for us.
        unsafe {
            let ptr = shared.arena.ptr_at(offset);
            ptr.cast::<EntryHeader>().write(EntryHeader {
                klen: key.len() as u16,
                vlen: val.len() as u16,
                hash: h,
            });
            ptr::copy_nonoverlapping(key.as_ptr(), ptr.add(HEADER_SIZE), key.len());
            ptr::copy_nonoverlapping(
                val.as_ptr(),
                ptr.add(HEADER_SIZE + key.len()),
                val.len(),
            );
        }

        let inserted = shared.index.write(|idx| {
            let (slot_idx, found) =
                idx.find(h, key.len(), |s| entry_matches(&shared.arena, s, h, key));
            idx.update(
                slot_idx,
                (h >> 24) as u8,
                key.len() as u8,
                val.len() as u16,
                offset,
            );
            !found
        });
        if inserted {
            shared.live_keys.fetch_add(1, Ordering::Relaxed);
        }
        Status::Ok
    }

    /// Remove `key`, leaving a tombstone in its index slot.
    ///
    /// The entry's arena bytes remain as garbage. Returns
    /// [`Status::NotFound`] when the key is absent.
    pub fn delete(&mut self, key: &[u8]) -> Status {
        let shared = &*self.shared;
        let h = fnv1a(key);
        let found = shared.index.write(|idx| {
            let (slot_idx, found) =
                idx.find(h, key.len(), |s| entry_matches(&shared.arena, s, h, key));
            if found {
                idx.tombstone(slot_idx);
            }
            found
        });
        if found {
            shared.live_keys.fetch_sub(1, Ordering::Relaxed);
            Status::Ok
        } else {
            Status::NotFound
        }
    }

    /// Copy the value for `key` into `out`.
    pub fn get(&self, key: &[u8], out: &mut Vec<u8>) -> Status {
        self.shared.get(key, out)
    }

    /// True when `key` is present, without copying its value.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.shared.contains(key)
    }

    /// Create a read-only handle usable from any thread.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// True when no key is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usage snapshot: arena consumption and live-key count.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            arena_used: self.shared.arena.used(),
            arena_capacity: self.shared.arena.capacity(),
            slot_capacity: self.shared.index.read(|idx| idx.capacity()),
            live_keys: self.shared.len(),
        }
    }
}

/// A cloneable read-only handle onto a [`Store`].
///
/// Reads are lock-free against the single writer; a reader retries only
/// while a write transaction overlaps its probe.
#[derive(Clone)]
pub struct StoreReader {
    shared: Arc<Shared>,
}

impl StoreReader {
    /// Copy the value for `key` into `out`.
    pub fn get(&self, key: &[u8], out: &mut Vec<u8>) -> Status {
        self.shared.get(key, out)
    }

    /// True when `key` is present, without copying its value.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.shared.contains(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// True when no key is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
