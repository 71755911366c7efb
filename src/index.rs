//! Open-addressed hash index with tagged 16-byte slots.
//!
//! Lookup runs a linear probe over a power-of-two slot array. Each slot
//! caches the top byte of the key's hash and the key length, so a probe
//! only touches the arena for true candidates. Deleted keys leave
//! tombstones that keep probe chains intact and are recycled by the next
//! insertion that walks over them.

use std::ptr;

/// A 16-byte index slot: one key's arena location, a tombstone, or an
/// empty cell. The state is encoded in `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Slot {
    /// Top 8 bits of the entry's full hash, for cheap rejection.
    pub hash_tag: u8,
    /// Key length, a second rejection filter before the byte compare.
    pub key_len: u8,
    /// Value length, cached from the entry header.
    pub val_len: u16,
    /// Arena offset of the entry, or one of the state sentinels.
    pub offset: u32,
    _pad: u64,
}

const _: () = assert!(std::mem::size_of::<Slot>() == 16);

impl Slot {
    /// `offset` sentinel for a never-used slot. Terminates probes.
    pub const OFF_EMPTY: u32 = 0xFFFF_FFFF;
    /// `offset` sentinel for a deleted slot. Probes continue past it.
    pub const OFF_TOMB: u32 = 0xFFFF_FFFE;

    /// The empty slot every cell starts as.
    pub const EMPTY: Slot = Slot {
        hash_tag: 0,
        key_len: 0,
        val_len: 0,
        offset: Self::OFF_EMPTY,
        _pad: 0,
    };

    /// True when the slot has never held a key.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.offset == Self::OFF_EMPTY
    }

    /// True when the slot held a key that was deleted.
    #[inline]
    pub fn is_tombstone(self) -> bool {
        self.offset == Self::OFF_TOMB
    }

    /// True when the slot points at a live entry.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.offset < Self::OFF_TOMB
    }
}

/// 32-bit FNV-1a over `bytes`.
#[inline]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for &b in bytes {
        h ^= u32::from(b);
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

/// Fixed-capacity open-addressed slot table.
///
/// Capacity is a power of two (at least 8) chosen at construction and
/// never changes. Probing is linear with step 1 under the cached mask.
pub struct Index {
    slots: Box<[Slot]>,
    mask: u32,
}

impl Index {
    /// Build a table of `requested_slots` rounded up to a power of two,
    /// floored at 8, with every slot empty.
    pub fn new(requested_slots: u32) -> Self {
        let capacity = requested_slots.clamp(8, 1 << 31).next_power_of_two();
        Self {
            slots: vec![Slot::EMPTY; capacity as usize].into_boxed_slice(),
            mask: capacity - 1,
        }
    }

    /// Number of slots in the table.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    /// Copy out the slot at `idx`.
    ///
    /// Slots may be overwritten by the writer while readers probe; every
    /// access is a whole-slot volatile copy, and the sequence validation
    /// around the transaction decides whether the copy was consistent.
    #[inline]
    pub fn slot(&self, idx: u32) -> Slot {
        debug_assert!(idx <= self.mask);
        // SAFETY: idx is masked to the table range by all callers.
        unsafe { ptr::read_volatile(self.slots.as_ptr().add(idx as usize)) }
    }

    #[inline]
    fn store_slot(&mut self, idx: u32, slot: Slot) {
        debug_assert!(idx <= self.mask);
        // SAFETY: idx is masked to the table range by all callers.
        unsafe { ptr::write_volatile(self.slots.as_mut_ptr().add(idx as usize), slot) }
    }

    /// Linear-probe lookup for a key with hash `h` and length `key_len`.
    ///
    /// `eq` performs the full key comparison for candidate slots that pass
    /// the tag and length filters. Returns `(slot_index, found)`; when the
    /// key is absent, `slot_index` is the preferred insertion point: the
    /// first tombstone walked over, or the empty slot that ended the probe.
    pub fn find<F>(&self, h: u32, key_len: usize, eq: F) -> (u32, bool)
    where
        F: Fn(Slot) -> bool,
    {
        let tag = (h >> 24) as u8;
        let start = h & self.mask;
        let mut idx = start;
        let mut first_tomb = u32::MAX;

        for _ in 0..=self.mask {
            let s = self.slot(idx);

            if s.is_empty() {
                let insert_at = if first_tomb != u32::MAX { first_tomb } else { idx };
                return (insert_at, false);
            }

            if s.is_tombstone() {
                if first_tomb == u32::MAX {
                    first_tomb = idx;
                }
            } else if s.hash_tag == tag && usize::from(s.key_len) == key_len && eq(s) {
                return (idx, true);
            }

            idx = (idx + 1) & self.mask;
        }

        // Full-table traversal: the table is saturated, which signals
        // misconfiguration. Fall back to the first tombstone, else the
        // starting slot.
        let insert_at = if first_tomb != u32::MAX { first_tomb } else { start };
        (insert_at, false)
    }

    /// Overwrite the slot at `idx` with a live entry description.
    #[inline]
    pub fn update(&mut self, idx: u32, tag: u8, key_len: u8, val_len: u16, offset: u32) {
        self.store_slot(
            idx,
            Slot {
                hash_tag: tag,
                key_len,
                val_len,
                offset,
                _pad: 0,
            },
        );
    }

    /// Convert the slot at `idx` into a tombstone.
    #[inline]
    pub fn tombstone(&mut self, idx: u32) {
        let mut s = self.slot(idx);
        s.offset = Slot::OFF_TOMB;
        s.hash_tag = 0;
        self.store_slot(idx, s);
    }
}
