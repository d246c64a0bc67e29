//! Non-owning observers of pooled objects
//!
//! - [`Ref`]: expects the object to be alive; a failed access is a contract
//!   failure and is logged as such.
//! - [`Weak`]: tolerates the object disappearing at any point; every access
//!   is fail-soft.
//!
//! Neither caches an address. Every access re-runs the registry's full
//! validation chain, since destruction may have been deferred to exactly
//! the frame boundary that just passed.

use std::fmt;
use std::sync::Arc;

use crate::memory::error::HandleResult;
use crate::memory::handle::Handle;
use crate::memory::registry::{SlotGuard, SlotRegistry};

type FinalizerFn<T> = Box<dyn FnOnce(&T) + Send + Sync>;

/// Callback shared by a family of cloned `Ref`s, run when the last one drops
struct Finalizer<T> {
    handle: Handle<T>,
    registry: Arc<SlotRegistry<T>>,
    callback: Option<FinalizerFn<T>>,
}

impl<T> Drop for Finalizer<T> {
    fn drop(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        // Only while the object is alive; never frees it
        match self.registry.lookup(self.handle) {
            Ok(guard) => callback(&guard),
            Err(err) => log::debug!("Skipping finalizer for {:?}: {}", self.handle, err),
        }
    }
}

/// Shared, non-owning reference to a pooled object
pub struct Ref<T> {
    handle: Handle<T>,
    registry: Arc<SlotRegistry<T>>,
    finalizer: Option<Arc<Finalizer<T>>>,
}

impl<T> Ref<T> {
    /// Observe a live object; fails if `handle` does not resolve
    pub(crate) fn new(registry: Arc<SlotRegistry<T>>, handle: Handle<T>) -> HandleResult<Self> {
        registry.validate(handle)?;
        Ok(Self {
            handle,
            registry,
            finalizer: None,
        })
    }

    /// Attach a callback run once, when this `Ref` and all its clones are gone
    ///
    /// The callback receives the object only if it is still alive at that
    /// point. It runs under the registry's read lock and must not create or
    /// destroy objects of the same type.
    #[must_use]
    pub fn with_finalizer(mut self, callback: impl FnOnce(&T) + Send + Sync + 'static) -> Self {
        self.finalizer = Some(Arc::new(Finalizer {
            handle: self.handle,
            registry: Arc::clone(&self.registry),
            callback: Some(Box::new(callback)),
        }));
        self
    }

    /// Handle of the observed object
    pub fn handle(&self) -> Handle<T> {
        self.handle
    }

    /// Shared access to the object
    ///
    /// An error here means the owner destroyed the object while this `Ref`
    /// was outstanding, which breaks the `Ref` contract.
    pub fn get(&self) -> HandleResult<SlotGuard<'_, T>> {
        self.registry.lookup(self.handle).map_err(|err| {
            log::error!("Ref to {:?} outlived its object: {}", self.handle, err);
            err
        })
    }

    /// Run `f` against the object
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> HandleResult<R> {
        let guard = self.get()?;
        Ok(f(&guard))
    }

    /// Whether the object still resolves
    pub fn is_alive(&self) -> bool {
        self.registry.is_alive(self.handle)
    }

    /// Weak observer of the same object
    pub fn downgrade(&self) -> Weak<T> {
        Weak::new(&self.registry, self.handle)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            registry: Arc::clone(&self.registry),
            finalizer: self.finalizer.clone(),
        }
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("handle", &self.handle)
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}

/// Weak reference to a pooled object
///
/// Does not keep the registry alive either: once the registry itself is
/// gone every access simply reports nothing.
pub struct Weak<T> {
    handle: Handle<T>,
    registry: std::sync::Weak<SlotRegistry<T>>,
}

impl<T> Weak<T> {
    pub(crate) fn new(registry: &Arc<SlotRegistry<T>>, handle: Handle<T>) -> Self {
        Self {
            handle,
            registry: Arc::downgrade(registry),
        }
    }

    /// Weak reference that never resolves
    pub fn empty() -> Self {
        Self {
            handle: Handle::invalid(),
            registry: std::sync::Weak::new(),
        }
    }

    /// Handle of the observed object
    pub fn handle(&self) -> Handle<T> {
        self.handle
    }

    /// Run `f` against the object if it is still alive
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let registry = self.registry.upgrade()?;
        let result = registry.with(self.handle, f);
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                log::trace!("Weak {:?} no longer resolves: {}", self.handle, err);
                None
            }
        }
    }

    /// Strong observer, if the object is still alive
    pub fn upgrade(&self) -> Option<Ref<T>> {
        let registry = self.registry.upgrade()?;
        Ref::new(registry, self.handle).ok()
    }

    /// Whether the object still resolves
    pub fn is_alive(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.is_alive(self.handle))
    }
}

impl<T> Clone for Weak<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            registry: self.registry.clone(),
        }
    }
}

impl<T> Default for Weak<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Weak").field(&self.handle).finish()
    }
}
