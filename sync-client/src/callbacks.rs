//! Subscriber registry.
//!
//! Subscribers are `Arc` closures so they can be removed by identity.
//! Dispatch works on a snapshot of the list: a callback that registers or
//! unregisters during dispatch affects the next dispatch, never the
//! current one.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A subscriber. Receives `None` only when registered with `onempty`.
pub type Callback<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

struct Entry<T> {
    callback: Callback<T>,
    once: bool,
    fire_on_empty: bool,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            once: self.once,
            fire_on_empty: self.fire_on_empty,
        }
    }
}

/// Ordered list of subscribers.
pub struct Callbacks<T> {
    entries: Mutex<Vec<Entry<T>>>,
}

impl<T> Callbacks<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to every defined value.
    pub fn register(&self, callback: Callback<T>) {
        self.push(callback, false, false);
    }

    /// Subscribe to the next defined value only.
    pub fn oneshot(&self, callback: Callback<T>) {
        self.push(callback, true, false);
    }

    /// Subscribe to every value, including empty ones.
    pub fn onempty(&self, callback: Callback<T>) {
        self.push(callback, false, true);
    }

    /// Remove a subscriber by identity.
    ///
    /// If the same callback was registered more than once, the most recent
    /// registration is removed. Returns `true` if something was removed.
    pub fn unregister(&self, callback: &Callback<T>) -> bool {
        let mut entries = self.lock();
        match entries
            .iter()
            .rposition(|e| Arc::ptr_eq(&e.callback, callback))
        {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invoke the subscribers due for `value`.
    ///
    /// One-shot subscribers that fire are removed before any callback runs.
    pub fn fire(&self, value: Option<&T>) {
        let defined = value.is_some();
        let due: Vec<Callback<T>> = {
            let mut entries = self.lock();
            let mut due = Vec::new();
            entries.retain(|entry| {
                let fires = defined || entry.fire_on_empty;
                if fires {
                    due.push(Arc::clone(&entry.callback));
                }
                !(fires && entry.once)
            });
            due
        };
        for callback in due {
            callback(value);
        }
    }

    fn push(&self, callback: Callback<T>, once: bool, fire_on_empty: bool) {
        self.lock().push(Entry {
            callback,
            once,
            fire_on_empty,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("len", &self.len())
            .finish()
    }
}
