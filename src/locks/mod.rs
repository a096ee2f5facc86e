//! Tier-ordered lock wrappers for state that stays mutable during rendering.
//!
//! Every lock that can be held during the parallel phase gets a [`Tier`].
//! The contract: while holding a lock from tier N, only locks from strictly
//! higher tiers may be acquired. Debug builds keep a per-thread stack of held
//! locks and log a warning on a violation - never a panic, so an ordering bug
//! is CI-visible without failing production builds. Release builds compile
//! the wrappers down to plain parking_lot primitives.
//!
//! Most former caches don't need a tier at all: anything written only during
//! discovery lives in the immutable snapshot instead. Only caches with
//! read/write interleaving during rendering (content hashes, provenance,
//! generated pages, the pending-fingerprint queue, progress counters) remain
//! lock-protected.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Total-order bucket for lock acquisition.
///
/// Lower tiers are "outer" locks: build serialization first, per-worker
/// utility locks last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Whole-build serialization (one build at a time).
    BuildSerial = 0,
    /// Cache infrastructure (persisted cache file, cache index).
    CacheInfra = 1,
    /// Build tracking (dependency tracker, manifest collection).
    BuildTracking = 2,
    /// Rendering caches (content hashes, provenance, generated pages).
    RenderCache = 3,
    /// Component/utility state.
    Component = 4,
    /// Progress counters and terminal IO.
    Progress = 5,
    /// Dev-server-only state.
    DevServer = 6,
    /// Error recording.
    ErrorRecording = 7,
}

/// Count of lock-order violations observed since process start (debug only;
/// always 0 in release builds). Exposed so CI tests can assert on it.
static VIOLATIONS: AtomicUsize = AtomicUsize::new(0);

/// Number of lock-order violations detected so far.
pub fn violation_count() -> usize {
    VIOLATIONS.load(Ordering::Relaxed)
}

#[cfg(debug_assertions)]
mod checker {
    use super::{Ordering, Tier, VIOLATIONS};
    use std::cell::RefCell;

    thread_local! {
        /// Stack of (tier, name) for locks held by this thread.
        static HELD: RefCell<Vec<(Tier, &'static str)>> = const { RefCell::new(Vec::new()) };
    }

    /// Record an acquisition; warn if the order contract is broken.
    pub fn on_acquire(tier: Tier, name: &'static str) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(&(worst_tier, worst_name)) =
                held.iter().filter(|(t, _)| *t >= tier).max_by_key(|(t, _)| *t)
            {
                VIOLATIONS.fetch_add(1, Ordering::Relaxed);
                crate::log!("lock";
                    "order violation: acquiring '{}' (tier {:?}) while holding '{}' (tier {:?})",
                    name, tier, worst_name, worst_tier);
            }
            held.push((tier, name));
        });
    }

    /// Record a release (stack discipline: remove the most recent match).
    pub fn on_release(tier: Tier, name: &'static str) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&(t, n)| t == tier && n == name) {
                held.remove(pos);
            }
        });
    }
}

/// Tier-checked wrapper around `parking_lot::Mutex`.
#[derive(Debug)]
pub struct TieredMutex<T> {
    tier: Tier,
    name: &'static str,
    inner: Mutex<T>,
}

/// Guard for a [`TieredMutex`]; pops the tracking stack on drop.
pub struct TieredMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    tier: Tier,
    name: &'static str,
}

impl<T> TieredMutex<T> {
    pub const fn new(tier: Tier, name: &'static str, value: T) -> Self {
        Self {
            tier,
            name,
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, checking tier order in debug builds.
    #[inline]
    pub fn lock(&self) -> TieredMutexGuard<'_, T> {
        #[cfg(debug_assertions)]
        checker::on_acquire(self.tier, self.name);
        TieredMutexGuard {
            guard: self.inner.lock(),
            tier: self.tier,
            name: self.name,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Drop for TieredMutexGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        checker::on_release(self.tier, self.name);
        let _ = (self.tier, self.name);
    }
}

impl<T> std::ops::Deref for TieredMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::DerefMut for TieredMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Tier-checked wrapper around `parking_lot::RwLock`.
///
/// Reads and writes both count as acquisitions for ordering purposes.
#[derive(Debug)]
pub struct TieredRwLock<T> {
    tier: Tier,
    name: &'static str,
    inner: RwLock<T>,
}

pub struct TieredReadGuard<'a, T> {
    guard: RwLockReadGuard<'a, T>,
    tier: Tier,
    name: &'static str,
}

pub struct TieredWriteGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    tier: Tier,
    name: &'static str,
}

impl<T> TieredRwLock<T> {
    pub const fn new(tier: Tier, name: &'static str, value: T) -> Self {
        Self {
            tier,
            name,
            inner: RwLock::new(value),
        }
    }

    #[inline]
    pub fn read(&self) -> TieredReadGuard<'_, T> {
        #[cfg(debug_assertions)]
        checker::on_acquire(self.tier, self.name);
        TieredReadGuard {
            guard: self.inner.read(),
            tier: self.tier,
            name: self.name,
        }
    }

    #[inline]
    pub fn write(&self) -> TieredWriteGuard<'_, T> {
        #[cfg(debug_assertions)]
        checker::on_acquire(self.tier, self.name);
        TieredWriteGuard {
            guard: self.inner.write(),
            tier: self.tier,
            name: self.name,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }
}

impl<T> Drop for TieredReadGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        checker::on_release(self.tier, self.name);
        let _ = (self.tier, self.name);
    }
}

impl<T> Drop for TieredWriteGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        checker::on_release(self.tier, self.name);
        let _ = (self.tier, self.name);
    }
}

impl<T> std::ops::Deref for TieredReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::Deref for TieredWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::DerefMut for TieredWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
