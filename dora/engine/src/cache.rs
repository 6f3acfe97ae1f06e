//! Recycling free lists for actions and rendezvous points.
//!
//! An [`ObjectCache`] keeps a few independently locked free lists. A thread
//! borrows from the shard it is pinned to, and the object goes back to that
//! shard wherever it is dropped: submitters borrow actions that workers give
//! back. A borrowed object lives in a [`Pooled`] handle; dropping the handle
//! resets the object and returns it, which makes a double return impossible.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

/// Objects that can be recycled through an [`ObjectCache`].
pub trait Cacheable: Default + Send + 'static {
    /// Clears every field that refers to the previous user.
    fn reset(&mut self);
}

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_HINT: usize = NEXT_SHARD.fetch_add(1, Ordering::Relaxed);
}

fn shard_hint() -> usize {
    SHARD_HINT.with(|hint| *hint)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls to [`ObjectCache::get`].
    pub requests: u64,
    /// Objects allocated because a free list was empty, including pre-population.
    pub setups: u64,
    /// Objects returned to a free list.
    pub givebacks: u64,
}

impl CacheStats {
    /// Objects currently borrowed.
    pub fn in_use(&self) -> u64 {
        self.requests - self.givebacks
    }
}

pub struct ObjectCache<T> {
    name: &'static str,
    shards: Box<[Mutex<Vec<T>>]>,
    requests: AtomicU64,
    setups: AtomicU64,
    givebacks: AtomicU64,
}

impl<T: Cacheable> ObjectCache<T> {
    /// Creates a cache with `shards` free lists and `init_count` objects
    /// allocated up front.
    pub fn new(name: &'static str, shards: usize, init_count: usize) -> Arc<Self> {
        let shards = shards.max(1);
        let cache = Self {
            name,
            shards: (0..shards).map(|_| Mutex::new(Vec::new())).collect(),
            requests: AtomicU64::new(0),
            setups: AtomicU64::new(0),
            givebacks: AtomicU64::new(0),
        };
        for i in 0..init_count {
            cache.shards[i % shards].lock().push(T::default());
        }
        cache.setups.store(init_count as u64, Ordering::Relaxed);
        Arc::new(cache)
    }

    /// Borrows an object, creating one if this thread's free list is empty.
    pub fn get(self: &Arc<Self>) -> Pooled<T> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let shard = shard_hint() % self.shards.len();
        let recycled = self.shards[shard].lock().pop();
        let obj = recycled.unwrap_or_else(|| {
            self.setups.fetch_add(1, Ordering::Relaxed);
            T::default()
        });
        Pooled {
            obj,
            shard,
            cache: self.clone(),
        }
    }

    fn give_back(&self, shard: usize, mut obj: T) {
        obj.reset();
        self.shards[shard].lock().push(obj);
        self.givebacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Objects sitting in each free list.
    pub fn idle_per_shard(&self) -> Vec<usize> {
        self.shards.iter().map(|s| s.lock().len()).collect()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            requests: self.requests.load(Ordering::Relaxed),
            setups: self.setups.load(Ordering::Relaxed),
            givebacks: self.givebacks.load(Ordering::Relaxed),
        }
    }

    /// Objects sitting in the free lists.
    pub fn idle(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }
}

impl<T> fmt::Debug for ObjectCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// Owning handle to an object borrowed from an [`ObjectCache`].
pub struct Pooled<T: Cacheable> {
    obj: T,
    /// Free list the object was taken from.
    shard: usize,
    cache: Arc<ObjectCache<T>>,
}

impl<T: Cacheable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.obj
    }
}

impl<T: Cacheable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.obj
    }
}

impl<T: Cacheable> Drop for Pooled<T> {
    fn drop(&mut self) {
        let obj = std::mem::take(&mut self.obj);
        self.cache.give_back(self.shard, obj);
    }
}

impl<T: Cacheable + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.obj, f)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[derive(Default, Debug)]
    struct Slot {
        owner: Option<u32>,
        uses: u32,
    }

    impl Cacheable for Slot {
        fn reset(&mut self) {
            self.owner = None;
        }
    }

    #[test]
    fn test_recycles_and_resets() {
        let cache = ObjectCache::<Slot>::new("slot", 1, 0);
        {
            let mut a = cache.get();
            a.owner = Some(1);
            a.uses += 1;
        }
        let b = cache.get();
        assert_eq!(b.owner, None);
        assert_eq!(b.uses, 1);
        let stats = cache.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.setups, 1);
        assert_eq!(stats.givebacks, 1);
        assert_eq!(stats.in_use(), 1);
    }

    #[test]
    fn test_prepopulated() {
        let cache = ObjectCache::<Slot>::new("slot", 1, 8);
        assert_eq!(cache.idle(), 8);
        let held: Vec<_> = (0..3).map(|_| cache.get()).collect();
        assert_eq!(cache.stats().setups, 8);
        drop(held);
        assert_eq!(cache.idle(), 8);
    }

    #[test]
    fn test_cross_thread_giveback_refills_the_borrower() {
        let cache = ObjectCache::<Slot>::new("slot", 4, 0);
        for _ in 0..50 {
            let objs: Vec<_> = (0..10).map(|_| cache.get()).collect();
            thread::spawn(move || drop(objs)).join().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.requests, 500);
        assert_eq!(stats.requests, stats.givebacks);
        // only the first round allocated; every later one reused it
        assert_eq!(stats.setups, 10);
        assert_eq!(cache.idle(), 10);
        assert_eq!(cache.idle_per_shard().iter().filter(|n| **n > 0).count(), 1);
    }
}
