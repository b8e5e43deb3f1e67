//! Per-workspace mutual exclusion.
//!
//! The registry hands out one async mutex per workspace name, created lazily
//! on first use. The name -> mutex map has its own (synchronous) lock which is
//! never held across an await point, so contention on one workspace never
//! blocks acquisitions for another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Outcome of [`LockRegistry::acquire`]
#[must_use]
pub enum LockAcquire {
    Granted(WorkspaceLock),
    TimedOut,
}

/// Outcome of releasing a lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRelease {
    Released,
    /// Nothing to release: the lock was already released or never held.
    AlreadyReleased,
    /// The lock is held by a live [`WorkspaceLock`] that the caller does not own.
    HeldElsewhere,
}

/// A held workspace lock. Dropping it releases the lock.
pub struct WorkspaceLock {
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
    held: Arc<AtomicBool>,
}

impl WorkspaceLock {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }

    /// Release the lock. Safe to call any number of times.
    pub fn release(&mut self) -> LockRelease {
        match self.guard.take() {
            Some(guard) => {
                // Cleared while the guard is still alive so no new holder's flag is overwritten
                self.held.store(false, Ordering::SeqCst);
                drop(guard);
                debug!(workspace = %self.name, "Released workspace lock");
                LockRelease::Released
            }
            None => LockRelease::AlreadyReleased,
        }
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for WorkspaceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceLock")
            .field("name", &self.name)
            .field("held", &self.is_held())
            .finish()
    }
}

struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    /// Set by the live [`WorkspaceLock`]; read by the name-keyed queries so
    /// they never touch the mutex.
    held: Arc<AtomicBool>,
    last_acquired: Instant,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            lock: Arc::new(AsyncMutex::new(())),
            held: Arc::new(AtomicBool::new(false)),
            last_acquired: Instant::now(),
        }
    }

    /// Only the registry itself references the mutex: nobody holds it and
    /// nobody is waiting on it.
    fn is_unused(&self) -> bool {
        Arc::strong_count(&self.lock) == 1
    }
}

#[derive(Clone)]
pub struct LockRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    entries: Mutex<HashMap<String, LockEntry>>,
    idle_after: Duration,
}

impl LockRegistry {
    /// `idle_after` is how long an unused entry is kept before it may be
    /// reclaimed.
    pub fn new(idle_after: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                idle_after,
            }),
        }
    }

    /// Acquire the lock for `name`, waiting at most `timeout`.
    ///
    /// A zero timeout never waits.
    pub async fn acquire(&self, name: &str, timeout: Duration) -> LockAcquire {
        let (lock, held) = {
            let mut entries = self.entries();
            self.reclaim_idle(&mut entries);
            let entry = entries
                .entry(name.to_string())
                .or_insert_with(LockEntry::new);
            (Arc::clone(&entry.lock), Arc::clone(&entry.held))
        };

        let guard = match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) if timeout.is_zero() => {
                debug!(workspace = %name, "Workspace lock busy");
                return LockAcquire::TimedOut;
            }
            Err(_) => match tokio::time::timeout(timeout, lock.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    debug!(workspace = %name, ?timeout, "Timed out waiting for workspace lock");
                    return LockAcquire::TimedOut;
                }
            },
        };

        held.store(true, Ordering::SeqCst);

        // The entry cannot have been reclaimed: the guard keeps the mutex referenced.
        if let Some(entry) = self.entries().get_mut(name) {
            entry.last_acquired = Instant::now();
        }

        debug!(workspace = %name, "Acquired workspace lock");
        LockAcquire::Granted(WorkspaceLock {
            name: name.to_string(),
            guard: Some(guard),
            held,
        })
    }

    /// Name-keyed release.
    ///
    /// Only the holder of a [`WorkspaceLock`] can release it, so this never
    /// disturbs a live holder. It reports whether the name is currently held
    /// and is a no-op in every case. The per-name mutex is never touched.
    pub fn release(&self, name: &str) -> LockRelease {
        match self.entries().get(name) {
            Some(entry) if entry.held.load(Ordering::SeqCst) => LockRelease::HeldElsewhere,
            _ => LockRelease::AlreadyReleased,
        }
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.release(name) == LockRelease::HeldElsewhere
    }

    /// Number of tracked names
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reclaim_idle(&self, entries: &mut HashMap<String, LockEntry>) {
        let idle_after = self.inner.idle_after;
        let before = entries.len();

        entries.retain(|_, entry| !entry.is_unused() || entry.last_acquired.elapsed() < idle_after);

        let reclaimed = before - entries.len();
        if reclaimed > 0 {
            debug!(reclaimed, "Reclaimed idle workspace locks");
        }
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
