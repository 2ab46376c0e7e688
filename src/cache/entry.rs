//! Cache Entry Module
//!
//! Defines stored entries and the handle callers receive for a cached value.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

// == Cached Value Handle ==
/// A value returned from the cache.
///
/// `Frozen` values are shared immutably: no reader can change what another
/// reader sees. `Live` values were cached with `no_freeze`; writes through
/// [`Cached::write`] are observed by every later read.
pub enum Cached<T> {
    Frozen(Arc<T>),
    Live(Arc<RwLock<T>>),
}

impl<T> Cached<T> {
    /// Wraps `value`, frozen unless `freeze` is false.
    pub fn new(value: T, freeze: bool) -> Self {
        if freeze {
            Cached::Frozen(Arc::new(value))
        } else {
            Cached::Live(Arc::new(RwLock::new(value)))
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, Cached::Frozen(_))
    }

    /// Runs `f` with a shared reference to the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self {
            Cached::Frozen(value) => f(value.as_ref()),
            Cached::Live(value) => f(&*value.read()),
        }
    }

    /// Write access to a live value. Frozen values return `None`.
    pub fn write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        match self {
            Cached::Frozen(_) => None,
            Cached::Live(value) => Some(value.write()),
        }
    }

    /// Returns the frozen value, if this handle is frozen.
    pub fn as_frozen(&self) -> Option<&Arc<T>> {
        match self {
            Cached::Frozen(value) => Some(value),
            Cached::Live(_) => None,
        }
    }
}

impl<T: Clone> Cached<T> {
    /// Clones the current value out of the cache.
    ///
    /// The copy is private to the caller; mutating it never affects the cache.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

impl<T> Clone for Cached<T> {
    fn clone(&self) -> Self {
        match self {
            Cached::Frozen(value) => Cached::Frozen(Arc::clone(value)),
            Cached::Live(value) => Cached::Live(Arc::clone(value)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cached::Frozen(value) => f.debug_tuple("Frozen").field(value).finish(),
            Cached::Live(value) => f.debug_tuple("Live").field(&*value.read()).finish(),
        }
    }
}

// == Cache Entry ==
/// A single stored value of any type.
///
/// Entries carry no TTL or timestamp; expiry is tracked per group.
pub struct CacheEntry {
    value: Box<dyn Any + Send + Sync>,
    frozen: bool,
}

impl CacheEntry {
    // == Constructor ==
    /// Wraps `value`, frozen unless `freeze` is false.
    pub fn new<T: Send + Sync + 'static>(value: T, freeze: bool) -> Self {
        Self::from_cached(Cached::new(value, freeze))
    }

    pub fn from_cached<T: Send + Sync + 'static>(cached: Cached<T>) -> Self {
        Self {
            frozen: cached.is_frozen(),
            value: Box::new(cached),
        }
    }

    /// Handle to the stored value, or `None` if it is not a `T`.
    pub fn cached<T: 'static>(&self) -> Option<Cached<T>> {
        self.value.downcast_ref::<Cached<T>>().cloned()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("frozen", &self.frozen)
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_frozen_by_default_flag() {
        let entry = CacheEntry::new(vec![1, 2, 3], true);
        assert!(entry.is_frozen());

        let cached = entry.cached::<Vec<i32>>().unwrap();
        assert!(cached.is_frozen());
        assert!(cached.write().is_none());
        assert_eq!(cached.get(), vec![1, 2, 3]);
    }

    #[test]
    fn test_frozen_copy_is_private() {
        let entry = CacheEntry::new(vec![1, 2, 3], true);

        let mut copy = entry.cached::<Vec<i32>>().unwrap().get();
        copy.push(4);

        assert_eq!(entry.cached::<Vec<i32>>().unwrap().get(), vec![1, 2, 3]);
    }

    #[test]
    fn test_frozen_handles_share_one_value() {
        let entry = CacheEntry::new(vec![1, 2, 3], true);
        let first = entry.cached::<Vec<i32>>().unwrap();
        let second = entry.cached::<Vec<i32>>().unwrap();

        assert!(Arc::ptr_eq(first.as_frozen().unwrap(), second.as_frozen().unwrap()));
        assert!(CacheEntry::new(1u8, false).cached::<u8>().unwrap().as_frozen().is_none());
    }

    #[test]
    fn test_live_mutation_is_shared() {
        let entry = CacheEntry::new(String::from("draft"), false);
        assert!(!entry.is_frozen());

        let first = entry.cached::<String>().unwrap();
        first.write().unwrap().push_str(" v2");

        let second = entry.cached::<String>().unwrap();
        assert_eq!(second.get(), "draft v2");
    }

    #[test]
    fn test_wrong_type_is_none() {
        let entry = CacheEntry::new(5u32, true);
        assert!(entry.cached::<String>().is_none());
        assert!(entry.cached::<u32>().is_some());
    }

    #[test]
    fn test_with_reads_without_clone() {
        let entry = CacheEntry::new(String::from("abc"), true);
        let len = entry.cached::<String>().unwrap().with(|s| s.len());
        assert_eq!(len, 3);
    }
}
