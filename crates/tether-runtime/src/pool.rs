#![forbid(unsafe_code)]

//! Identity pool: at most one live proxy per construction key.
//!
//! The pool maps a per-class lookup key to a weak reference. A proxy
//! stays retrievable as long as some external owner keeps it alive; the
//! pool itself never pins an instance. Once the last strong reference
//! drops, the slot is reclaimable and a later `get_or_create` with the
//! same key builds a fresh instance with empty caches (the server, not
//! the proxy, is authoritative).
//!
//! The registry borrow is the single-threaded analogue of the pool-wide
//! lock: it spans the existence check and the registration, never the
//! constructor, so a constructor may itself consult the pool for other
//! keys. Constructors must not suspend; attribute caches populate
//! lazily after construction, so the built-in proxy constructors are
//! non-suspending by design.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::trace;

/// Weak-reference registry keyed by `K`.
pub struct IdentityPool<K, T> {
    entries: RefCell<AHashMap<K, Weak<T>>>,
}

impl<K, T> Default for IdentityPool<K, T> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(AHashMap::new()),
        }
    }
}

impl<K, T> IdentityPool<K, T>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
{
    /// An empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The live instance for `key`, or a freshly constructed and
    /// registered one. The boolean reports whether construction ran.
    pub fn get_or_create(&self, key: K, ctor: impl FnOnce() -> Rc<T>) -> (Rc<T>, bool) {
        if let Some(existing) = self.lookup(&key) {
            return (existing, false);
        }
        // Borrow released: the constructor may reenter the pool.
        let built = ctor();
        let mut entries = self.entries.borrow_mut();
        // A reentrant constructor may have registered this key itself.
        if let Some(raced) = entries.get(&key).and_then(Weak::upgrade) {
            return (raced, false);
        }
        trace!(key = ?key, "registering pooled instance");
        entries.insert(key, Rc::downgrade(&built));
        (built, true)
    }

    /// The live instance for `key`, if any.
    #[must_use]
    pub fn lookup(&self, key: &K) -> Option<Rc<T>> {
        self.entries.borrow().get(key).and_then(Weak::upgrade)
    }

    /// Register an externally constructed instance. Returns `false`
    /// (and leaves the pool unchanged) if a live instance already holds
    /// the key.
    pub fn insert(&self, key: K, instance: &Rc<T>) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.get(&key).and_then(Weak::upgrade).is_some() {
            return false;
        }
        entries.insert(key, Rc::downgrade(instance));
        true
    }

    /// Deterministically forget `key` regardless of liveness, so a
    /// recycled handle builds a fresh instance. Returns whether an
    /// entry was present.
    pub fn release(&self, key: &K) -> bool {
        let removed = self.entries.borrow_mut().remove(key).is_some();
        if removed {
            trace!(key = ?key, "released pooled key");
        }
        removed
    }

    /// Drop entries whose instance has been dropped.
    pub fn prune(&self) {
        self.entries
            .borrow_mut()
            .retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Whether no live entry exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, T> std::fmt::Debug for IdentityPool<K, T>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityPool")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn same_key_same_instance() {
        let pool: IdentityPool<u32, String> = IdentityPool::new();
        let (a, created_a) = pool.get_or_create(7, || Rc::new("seven".to_owned()));
        let (b, created_b) = pool.get_or_create(7, || Rc::new("seven again".to_owned()));
        assert!(created_a);
        assert!(!created_b);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_keys_distinct_instances() {
        let pool: IdentityPool<u32, String> = IdentityPool::new();
        let (a, _) = pool.get_or_create(1, || Rc::new("one".to_owned()));
        let (b, _) = pool.get_or_create(2, || Rc::new("two".to_owned()));
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn dropped_instance_rebuilds_fresh() {
        let pool: IdentityPool<u32, Cell<u32>> = IdentityPool::new();
        let builds = Cell::new(0);
        let (a, _) = pool.get_or_create(7, || {
            builds.set(builds.get() + 1);
            Rc::new(Cell::new(100))
        });
        a.set(150);
        drop(a);
        assert_eq!(pool.len(), 0);
        let (b, created) = pool.get_or_create(7, || {
            builds.set(builds.get() + 1);
            Rc::new(Cell::new(100))
        });
        assert!(created);
        assert_eq!(builds.get(), 2);
        // Fresh instance: no state survived the reclamation.
        assert_eq!(b.get(), 100);
    }

    #[test]
    fn ctor_not_run_on_hit() {
        let pool: IdentityPool<u32, u32> = IdentityPool::new();
        let _keep = pool.get_or_create(1, || Rc::new(10)).0;
        let (_, created) = pool.get_or_create(1, || unreachable!("hit must not construct"));
        assert!(!created);
    }

    #[test]
    fn reentrant_ctor_for_other_key() {
        let pool = Rc::new(IdentityPool::<u32, u32>::new());
        let pool_in = Rc::clone(&pool);
        let mut parent_keep = None;
        let (child, created) = pool.get_or_create(2, || {
            // A child constructor may resolve its parent through the
            // same pool.
            let (parent, _) = pool_in.get_or_create(1, || Rc::new(1));
            parent_keep = Some(parent);
            Rc::new(2)
        });
        assert!(created);
        assert_eq!(*child, 2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn release_forgets_live_entry() {
        let pool: IdentityPool<u32, u32> = IdentityPool::new();
        let (a, _) = pool.get_or_create(7, || Rc::new(1));
        assert!(pool.release(&7));
        assert!(!pool.release(&7));
        // The old instance survives for its owners, but the key builds
        // fresh now.
        let (b, created) = pool.get_or_create(7, || Rc::new(2));
        assert!(created);
        assert!(!Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn prune_drops_dead_entries() {
        let pool: IdentityPool<u32, u32> = IdentityPool::new();
        let (a, _) = pool.get_or_create(1, || Rc::new(1));
        let _ = pool.get_or_create(2, || Rc::new(2));
        drop(a);
        pool.prune();
        // Key 2's instance was dropped immediately too.
        assert!(pool.is_empty());
    }
}
