//! Error type for the weak-handle entry points.

/// Errors surfaced by [`WeakEnumerableMap`](crate::WeakEnumerableMap).
///
/// Absence of an entry is never an error; it is reported as `None` or
/// `false`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The key handle does not refer to a live object, e.g. `Weak::new()`
    /// or the handle of an object that has already been reclaimed.
    #[error("key handle does not refer to a live object")]
    InvalidKey,
}
