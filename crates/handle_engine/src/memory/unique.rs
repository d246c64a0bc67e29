//! Unique ownership of a pooled object

use std::fmt;
use std::sync::Arc;

use crate::memory::deferred::DeferredDeallocator;
use crate::memory::error::HandleResult;
use crate::memory::handle::Handle;
use crate::memory::registry::{SlotGuard, SlotGuardMut, SlotRegistry};
use crate::memory::shared::{Ref, Weak};

/// Sole destructive owner of a pooled object
///
/// Dropping a `Unique` destroys its object immediately. Objects that may
/// still be referenced by in-flight GPU work should go through
/// [`destroy_deferred`](Self::destroy_deferred) instead.
///
/// Move-only: at most one `Unique` exists per live slot as long as raw
/// handles are not adopted twice through [`from_handle`](Self::from_handle).
pub struct Unique<T> {
    handle: Handle<T>,
    registry: Arc<SlotRegistry<T>>,
}

impl<T> Unique<T> {
    /// Create `value` in `registry` and own it
    pub fn new(registry: Arc<SlotRegistry<T>>, value: T) -> HandleResult<Self> {
        let handle = registry.create(value)?;
        Ok(Self { handle, registry })
    }

    /// Take ownership of an object created through the raw registry API
    pub fn from_handle(registry: Arc<SlotRegistry<T>>, handle: Handle<T>) -> HandleResult<Self> {
        registry.validate(handle)?;
        Ok(Self { handle, registry })
    }

    /// Handle of the owned object
    pub fn handle(&self) -> Handle<T> {
        self.handle
    }

    /// Registry the object lives in
    pub fn registry(&self) -> &Arc<SlotRegistry<T>> {
        &self.registry
    }

    /// Shared access to the object
    pub fn get(&self) -> HandleResult<SlotGuard<'_, T>> {
        self.registry.lookup(self.handle)
    }

    /// Exclusive access to the object
    pub fn get_mut(&mut self) -> HandleResult<SlotGuardMut<'_, T>> {
        self.registry.lookup_mut(self.handle)
    }

    /// Run `f` against the object
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> HandleResult<R> {
        self.registry.with(self.handle, f)
    }

    /// Run `f` against the object with mutable access
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> HandleResult<R> {
        self.registry.with_mut(self.handle, f)
    }

    /// Whether the object still resolves
    pub fn is_alive(&self) -> bool {
        self.registry.is_alive(self.handle)
    }

    /// Attach a debug label to the object
    pub fn set_name(&self, name: impl Into<String>) -> HandleResult<()> {
        self.registry.set_name(self.handle, name)
    }

    /// Debug label of the object
    pub fn name(&self) -> Option<String> {
        self.registry.name(self.handle)
    }

    /// Non-owning observer that expects the object to outlive it
    pub fn share(&self) -> HandleResult<Ref<T>> {
        Ref::new(Arc::clone(&self.registry), self.handle)
    }

    /// Non-owning observer that tolerates the object disappearing
    pub fn downgrade(&self) -> Weak<T> {
        Weak::new(&self.registry, self.handle)
    }

    /// Give up ownership without destroying the object
    pub fn release(mut self) -> Handle<T> {
        std::mem::replace(&mut self.handle, Handle::invalid())
    }

    /// Destroy the object now and report the outcome
    pub fn destroy(mut self) -> HandleResult<()> {
        let handle = std::mem::replace(&mut self.handle, Handle::invalid());
        self.registry.destroy(handle)
    }
}

impl<T: Send + Sync + 'static> Unique<T> {
    /// Hand destruction to `deallocator`
    ///
    /// The object stays resolvable until the frame slot it was queued in
    /// comes around again.
    pub fn destroy_deferred(mut self, deallocator: &DeferredDeallocator) {
        let handle = std::mem::replace(&mut self.handle, Handle::invalid());
        let registry = Arc::clone(&self.registry);
        log::trace!("Deferring destruction of {:?}", handle);
        deallocator.request_deallocation(move || {
            if let Err(err) = registry.destroy(handle) {
                log::error!("Deferred destruction of {:?} failed: {}", handle, err);
            }
        });
    }
}

impl<T> Drop for Unique<T> {
    fn drop(&mut self) {
        if self.handle.is_invalid() {
            return;
        }
        if let Err(err) = self.registry.destroy(self.handle) {
            log::error!("Unique owner of {:?} could not destroy it: {}", self.handle, err);
        }
    }
}

impl<T> fmt::Debug for Unique<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unique").field(&self.handle).finish()
    }
}
