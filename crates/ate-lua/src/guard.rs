//! Execution guard: exclusive access to a runtime's VM.
//!
//! Every guarded operation holds a [`GuardHold`] for its whole duration.
//! The guard tracks a hold count (always 0 or 1) and the thread that holds
//! it. Two conditions are treated as fatal corruption of the runtime's
//! concurrency state:
//!
//! - the holding thread tries to acquire again (it would deadlock), and
//! - the hold count leaves {0, 1}.
//!
//! Both are logged at `error` and abort the process. They are never
//! converted into recoverable errors.

use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use thiserror::Error;

/// A detected corruption of the guard's state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum GuardViolation {
    #[error("runtime '{runtime}': re-entrant acquisition from the holding thread")]
    Reentrant { runtime: String },

    #[error("runtime '{runtime}': hold count {count} outside {{0, 1}}")]
    HoldCount { runtime: String, count: usize },
}

/// Mutual exclusion around a value with corruption checks.
pub(crate) struct ExecutionGuard<T> {
    runtime: String,
    inner: Mutex<T>,
    holds: AtomicUsize,
    holder: Mutex<Option<ThreadId>>,
}

impl<T> ExecutionGuard<T> {
    pub(crate) fn new(runtime: impl Into<String>, value: T) -> Self {
        Self {
            runtime: runtime.into(),
            inner: Mutex::new(value),
            holds: AtomicUsize::new(0),
            holder: Mutex::new(None),
        }
    }

    /// Blocks until the guard is free and returns the hold.
    ///
    /// Aborts the process on a re-entrant acquisition or a corrupted count.
    pub(crate) fn acquire(&self) -> GuardHold<'_, T> {
        if let Err(violation) = self.check_reentry(thread::current().id()) {
            fatal(&violation);
        }
        let value = self.inner.lock();
        let previous = self.holds.fetch_add(1, Ordering::AcqRel);
        if let Err(violation) = self.check_count(previous + 1) {
            fatal(&violation);
        }
        *self.holder.lock() = Some(thread::current().id());
        GuardHold { guard: self, value }
    }

    /// Current hold count. 0 when idle, 1 while an operation runs.
    pub(crate) fn holds(&self) -> usize {
        self.holds.load(Ordering::Acquire)
    }

    pub(crate) fn check_reentry(&self, thread: ThreadId) -> Result<(), GuardViolation> {
        if *self.holder.lock() == Some(thread) {
            return Err(GuardViolation::Reentrant {
                runtime: self.runtime.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_count(&self, count: usize) -> Result<(), GuardViolation> {
        if count > 1 {
            return Err(GuardViolation::HoldCount {
                runtime: self.runtime.clone(),
                count,
            });
        }
        Ok(())
    }

    fn release(&self) {
        *self.holder.lock() = None;
        let previous = self.holds.fetch_sub(1, Ordering::AcqRel);
        if previous != 1 {
            fatal(&GuardViolation::HoldCount {
                runtime: self.runtime.clone(),
                count: previous.wrapping_sub(1),
            });
        }
    }
}

/// RAII hold on an [`ExecutionGuard`]. Releases on drop.
pub(crate) struct GuardHold<'a, T> {
    guard: &'a ExecutionGuard<T>,
    value: MutexGuard<'a, T>,
}

impl<T> Deref for GuardHold<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for GuardHold<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for GuardHold<'_, T> {
    // Runs before the mutex guard field is dropped, so the count reaches 0
    // while the lock is still held.
    fn drop(&mut self) {
        self.guard.release();
    }
}

fn fatal(violation: &GuardViolation) -> ! {
    tracing::error!(%violation, "execution guard corrupted, aborting");
    std::process::abort()
}
