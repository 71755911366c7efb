//! # arenakv
//!
//! An in-process, append-only key/value engine for read-heavy workloads
//! under a single-writer / multi-reader discipline.
//!
//! ## Design
//!
//! Three subsystems interlock to keep operation latency predictable:
//!
//! 1. **Arena**: one contiguous, anonymously mapped region with a 32-bit
//!    atomic bump cursor. Entries are written once and never moved or
//!    freed; offsets replace pointers.
//! 2. **Index**: a fixed-capacity open-addressed table of 16-byte slots.
//!    Each slot caches a hash tag and the key length, so probes reject
//!    most candidates without touching the arena. Deletes leave
//!    tombstones that later insertions recycle.
//! 3. **SeqLock**: an odd/even sequence counter that lets readers probe
//!    the index without taking any lock; a reader whose transaction
//!    overlaps a write simply retries.
//!
//! There is no durability, no reclamation of overwritten bytes, and no
//! resizing: both capacities are fixed at creation and the engine trades
//! space for latency.
//!
//! ## Example
//!
//! ```rust
//! use arenakv::{Config, Status, Store};
//!
//! let config = Config::default().with_arena_bytes(1 << 20).with_slots(1024);
//! let mut store = Store::create(config).unwrap();
//!
//! assert_eq!(store.put(b"user:1001", b"balance:5000"), Status::Ok);
//!
//! let mut out = Vec::new();
//! assert_eq!(store.get(b"user:1001", &mut out), Status::Ok);
//! assert_eq!(out, b"balance:5000");
//!
//! // Readers are cheap clones, usable from any thread.
//! let reader = store.reader();
//! assert!(reader.contains(b"user:1001"));
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod index;
pub mod seqlock;
pub mod store;

pub use arena::ArenaError;
pub use store::{Config, Status, Store, StoreReader, StoreStats, MAX_KEY_LEN, MAX_VAL_LEN};

#[cfg(test)]
mod proptests;
