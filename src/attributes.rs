//! Per-pipeline attribute bag.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Mutex;

/// A concurrent string-keyed map of opaque values, one per [`crate::pipeline::Pipeline`].
///
/// All single-key operations (`set`, `has`, `remove`) are serialized against each other by
/// an internal mutex. [`Attributes::names`] returns a best-effort snapshot: a concurrent
/// `set`/`remove` may race with an in-flight enumeration, so callers must re-check presence
/// of any name they act on rather than trusting the snapshot to still be accurate by the
/// time they use it.
#[derive(Debug, Default)]
pub struct Attributes {
    inner: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl Attributes {
    /// Creates an empty attribute bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any prior value under that name.
    pub fn set<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        let mut guard = self.inner.lock().expect("attributes mutex poisoned");
        guard.insert(name.into(), Box::new(value));
    }

    /// Removes `name`, returning whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.inner
            .lock()
            .expect("attributes mutex poisoned")
            .remove(name)
            .is_some()
    }

    /// Returns whether `name` is currently set.
    pub fn has(&self, name: &str) -> bool {
        self.inner
            .lock()
            .expect("attributes mutex poisoned")
            .contains_key(name)
    }

    /// A best-effort snapshot of the currently-set names. See the type docs for the
    /// consistency caveat.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("attributes mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Runs `f` against the value stored under `name`, if present and of type `T`.
    ///
    /// This avoids requiring `T: Clone` just to read a value; `f` runs while the attributes
    /// mutex is held, so keep it cheap.
    pub fn with<T: Any + Send + Sync, R>(&self, name: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.inner.lock().expect("attributes mutex poisoned");
        guard.get(name).and_then(|v| v.downcast_ref::<T>()).map(f)
    }

    /// Convenience over [`Attributes::with`] for `Clone` values.
    pub fn get_cloned<T: Any + Send + Sync + Clone>(&self, name: &str) -> Option<T> {
        self.with(name, |v: &T| v.clone())
    }
}
