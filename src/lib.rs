//! weak-iter-map: a map whose keys are held weakly and compared by
//! identity, yet whose live entries can still be enumerated.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a weak-keyed map that never keeps a key alive, never shows a
//!   reclaimed key, and still offers `keys`/`values`/`entries`.
//! - Layers:
//!   - LiveIndex<W, V, S>: structural table of `(identity, weak, value)`
//!     slots in a `SlotMap`, indexed by identity through a `HashTable`, with
//!     an intrusive doubly-linked list recording first-insertion order.
//!   - WeakEnumerableMap<K, V, S>: public API. Owns a LiveIndex keyed by
//!     `K::Weak` and drains reclaimed keys at the start of every operation.
//!   - WeakKey: seam between the map and the pointer type (`Rc`, `Arc`)
//!     that supplies identity and weak handles.
//!
//! Reclamation
//! - A key is reclaimed when its strong count reaches zero. The stored weak
//!   handle is the notification channel: a handle that no longer upgrades
//!   reports its key as gone.
//! - Draining (`purge`) sweeps the index for such handles, unlinks them and
//!   only then drops the evicted values. Since a value may own the last
//!   strong handle of another key, sweeps repeat until one removes nothing.
//! - Reclamation is observed only at the top of a call, or by the
//!   per-item liveness check of the enumeration iterators.
//!
//! Identity
//! - Keys hash and compare by the address of their allocation, never by
//!   `K: Eq/Hash`, so structurally equal keys stay distinct and no user code
//!   runs during lookups.
//! - A registered weak handle pins the allocation's memory, so a new key
//!   cannot reuse the address of an identity that has not been drained yet.
//!
//! Constraints
//! - All operations take `&mut self`; reentrancy from user `Drop` code is
//!   ruled out by the borrow checker rather than a runtime guard.
//! - With `Rc` keys the map is `!Send`/`!Sync`. With `Arc` keys other
//!   threads may reclaim keys at any point; those are skipped during
//!   iteration and removed by the next drain.
//! - Draining is linear in the number of entries; lookups are O(1) average.
//!
//! Ordering
//! - Enumeration follows first insertion. Overwriting keeps the position;
//!   deleting or reclaiming forgets it, and a later `set` of the same object
//!   appends.
//!
//! Notes and non-goals
//! - No weak values and no mutable ordered iteration; mutate through
//!   `get_mut` or `retain`.
//! - `Debug` only has `&self`, so it filters reclaimed keys instead of
//!   draining them.

mod error;
mod live_index;
mod weak_key;
mod weak_map;

// Public surface
pub use error::Error;
pub use weak_key::{Identity, WeakKey};
pub use weak_map::{Entries, Keys, Values, WeakEnumerableMap};
