//! Key pointers that can be held weakly and compared by identity.

use std::rc::{self, Rc};
use std::sync::{self, Arc};

/// Opaque identity token of a key allocation.
///
/// Two keys share an identity iff they point at the same allocation. The
/// token holds no reference of any kind; it is only an address.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Identity(usize);

impl Identity {
    #[inline]
    fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        // Drop any metadata so `Rc<dyn Trait>` keys compare by address only.
        Identity(ptr.cast::<()>() as usize)
    }

    /// Identity of `key`.
    #[inline]
    pub fn of<K: WeakKey>(key: &K) -> Self {
        K::identity(key)
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: usize) -> Self {
        Identity(raw)
    }
}

/// A strong key pointer with a matching weak handle.
///
/// The map stores only `Self::Weak` and the key's [`Identity`]. A stored
/// weak handle keeps the allocation (not the object) from being freed, so an
/// identity cannot be reused by a new key while it is still registered.
pub trait WeakKey: Sized {
    /// Weak handle stored by the map.
    type Weak;

    /// Create a weak handle to `this`.
    fn downgrade(this: &Self) -> Self::Weak;

    /// Recover a strong handle, or `None` once the object is reclaimed.
    fn upgrade(weak: &Self::Weak) -> Option<Self>;

    /// Whether the object behind `weak` has been reclaimed.
    fn is_reclaimed(weak: &Self::Weak) -> bool;

    /// Identity of the allocation `this` points at.
    fn identity(this: &Self) -> Identity;
}

impl<T: ?Sized> WeakKey for Rc<T> {
    type Weak = rc::Weak<T>;

    #[inline]
    fn downgrade(this: &Self) -> Self::Weak {
        Rc::downgrade(this)
    }

    #[inline]
    fn upgrade(weak: &Self::Weak) -> Option<Self> {
        weak.upgrade()
    }

    #[inline]
    fn is_reclaimed(weak: &Self::Weak) -> bool {
        weak.strong_count() == 0
    }

    #[inline]
    fn identity(this: &Self) -> Identity {
        Identity::from_ptr(Rc::as_ptr(this))
    }
}

impl<T: ?Sized> WeakKey for Arc<T> {
    type Weak = sync::Weak<T>;

    #[inline]
    fn downgrade(this: &Self) -> Self::Weak {
        Arc::downgrade(this)
    }

    #[inline]
    fn upgrade(weak: &Self::Weak) -> Option<Self> {
        weak.upgrade()
    }

    #[inline]
    fn is_reclaimed(weak: &Self::Weak) -> bool {
        weak.strong_count() == 0
    }

    #[inline]
    fn identity(this: &Self) -> Identity {
        Identity::from_ptr(Arc::as_ptr(this))
    }
}
