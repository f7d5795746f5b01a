//! Process-wide runtime state shared by every job
//!
//! Holds the global pseudo-random generator and the shared scratch heap.
//! Both are reachable from any worker, so each sits behind its own lock;
//! per-worker scratch lives in [`LocalHeap`]s owned by the workers instead.

use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::foundation::memory::LocalHeap;

/// Seed used at startup and on [`SceneRuntime::reset`]
pub const GLOBAL_RNG_SEED: u64 = 1;

/// Heap id reported by the shared heap
pub const SHARED_HEAP_ID: usize = usize::MAX;

/// Global RNG plus shared scratch heap
///
/// Both locks are taken on every access, whatever the worker count. With a
/// single worker the driving thread still drains jobs next to it, so two
/// threads can reach the runtime at once. An uncontended lock is one atomic
/// swap.
#[derive(Debug)]
pub struct SceneRuntime {
    rng: Mutex<StdRng>,
    shared_heap: Mutex<LocalHeap>,
}

fn relock<'a, T>(result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl SceneRuntime {
    /// Create the runtime; `shared_heap_size == 0` makes the shared heap growable
    pub fn new(shared_heap_size: usize) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(GLOBAL_RNG_SEED)),
            shared_heap: Mutex::new(LocalHeap::new(SHARED_HEAP_ID, shared_heap_size)),
        }
    }

    /// Next value from the global generator
    pub fn rng_next(&self) -> u64 {
        relock(self.rng.lock()).next_u64()
    }

    /// Reseed the global generator
    pub fn reseed(&self, seed: u64) {
        *relock(self.rng.lock()) = StdRng::seed_from_u64(seed);
    }

    /// Run `f` with exclusive access to the shared heap
    pub fn with_shared_heap<R>(&self, f: impl FnOnce(&mut LocalHeap) -> R) -> R {
        f(&mut relock(self.shared_heap.lock()))
    }

    /// Purge the shared heap
    pub fn purge_shared_heap(&self) {
        relock(self.shared_heap.lock()).purge();
    }

    /// Restore the startup seed and purge the shared heap
    pub fn reset(&self) {
        self.reseed(GLOBAL_RNG_SEED);
        self.purge_shared_heap();
    }
}

impl Default for SceneRuntime {
    fn default() -> Self {
        Self::new(0)
    }
}
