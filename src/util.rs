//! Small shared utilities: timer ownership and lock helpers.

use std::sync::{Mutex, MutexGuard};

use tokio::task::JoinHandle;

/// Owner of at most one live timer task.
///
/// Replacing the slot always aborts the previous task first, so a concern
/// (idle timeout, display ticker, refresh schedule) can never have two timers
/// in flight. Dropping the slot aborts whatever is armed.
#[derive(Debug, Default)]
pub struct TimerSlot(Option<JoinHandle<()>>);

impl TimerSlot {
    pub fn replace(&mut self, handle: JoinHandle<()>) {
        self.clear();
        self.0 = Some(handle);
    }

    pub fn clear(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
/// None of our guarded state is left in a torn state by panics.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
