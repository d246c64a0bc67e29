//! Generational Slot Registry
//!
//! Typed wrapper over [`ChunkedPool`] that pairs every slot with a version
//! counter and stamps each handle with a [`TypeTag`] unique to this
//! registry. A handle resolves only in the registry that issued it, and
//! only while its slot holds the exact generation it was issued for.
//!
//! # Locking
//!
//! ```text
//! SlotRegistry<T>
//!     ├── state: RwLock<pool + version table>   (lookups read, create/destroy write)
//!     └── names: RwLock<debug labels>           (independent of pool traffic)
//! ```
//!
//! Objects are dropped after the state lock is released, so a destructor
//! may itself create or destroy handles in the same registry.
//!
//! # Version Wraparound
//!
//! Versions occupy [`VERSION_BITS`](super::handle::VERSION_BITS) bits. A
//! slot whose version would wrap back to zero is retired for good instead
//! of being recycled, so a stale handle can never alias a later generation.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::config::PoolConfig;
use crate::memory::chunked_pool::ChunkedPool;
use crate::memory::error::{HandleError, HandleResult};
use crate::memory::handle::{Handle, RawHandle, TypeTag, MAX_VERSION};

/// Instance ids mixed into registry tags
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(0);

/// Snapshot of a registry's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Element type name
    pub type_name: &'static str,
    /// Currently live objects
    pub live: usize,
    /// Highest live count observed
    pub peak_live: usize,
    /// Total slots across all chunks
    pub capacity: usize,
    /// Allocated chunks
    pub chunks: usize,
    /// Slots per chunk
    pub elements_per_chunk: usize,
    /// Slots retired after exhausting their version space
    pub retired: usize,
    /// Objects created since the registry was made
    pub total_created: u64,
    /// Objects destroyed since the registry was made
    pub total_destroyed: u64,
    /// Live objects carrying a debug label
    pub named: usize,
}

struct RegistryState<T> {
    pool: ChunkedPool<T>,
    versions: Vec<u32>,
    peak_live: usize,
    total_created: u64,
    total_destroyed: u64,
}

impl<T> RegistryState<T> {
    /// Run the full validation chain, returning the slot index
    fn validate(&self, raw: RawHandle, tag: TypeTag) -> HandleResult<u32> {
        if raw.is_invalid() {
            return Err(HandleError::InvalidHandle);
        }

        let slot = raw.slot();
        let Some(entry) = self.pool.slot(slot) else {
            return Err(HandleError::OutOfRange {
                slot,
                capacity: self.pool.capacity(),
            });
        };

        if entry.is_free() {
            return Err(HandleError::StaleSlot { slot });
        }

        let current_version = self.versions[slot as usize];
        if current_version != raw.version() {
            return Err(HandleError::VersionMismatch {
                slot,
                handle_version: raw.version(),
                current_version,
            });
        }

        if raw.tag() != tag.bits() {
            return Err(HandleError::TypeMismatch {
                expected: tag.bits(),
                found: raw.tag(),
            });
        }

        Ok(slot)
    }
}

/// Pool of `T` addressed through versioned handles
pub struct SlotRegistry<T> {
    state: RwLock<RegistryState<T>>,
    names: RwLock<HashMap<RawHandle, String>>,
    tag: TypeTag,
}

impl<T: 'static> SlotRegistry<T> {
    /// Create an empty registry
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                pool: ChunkedPool::new(config),
                versions: Vec::new(),
                peak_live: 0,
                total_created: 0,
                total_destroyed: 0,
            }),
            names: RwLock::new(HashMap::new()),
            tag: TypeTag::for_instance(
                TypeId::of::<T>(),
                NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            ),
        }
    }

    /// Tag embedded in every handle this registry issues
    ///
    /// Unique to this registry among the registries of `T`.
    pub fn type_tag(&self) -> TypeTag {
        self.tag
    }
}

impl<T> SlotRegistry<T> {
    /// Element type name
    pub fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    /// Place `value` in a free slot and return a handle to it
    ///
    /// Fails only when the pool is exhausted. No retry happens here.
    pub fn create(&self, value: T) -> HandleResult<Handle<T>> {
        let result = {
            let mut state = self.write_state();
            match state.pool.try_allocate(value) {
                Ok(slot) => {
                    let capacity = state.pool.capacity();
                    if state.versions.len() < capacity {
                        state.versions.resize(capacity, 0);
                    }
                    state.total_created += 1;
                    state.peak_live = state.peak_live.max(state.pool.live_count());
                    let version = state.versions[slot as usize];
                    Ok(Handle::from_raw(RawHandle::new(slot, version, self.tag)))
                }
                Err(rejected) => Err(rejected),
            }
        };

        match result {
            Ok(handle) => {
                log::trace!("Created {:?}", handle);
                Ok(handle)
            }
            // Rejected value drops here, outside the lock
            Err((err, _value)) => Err(err),
        }
    }

    /// Build the object with `construct` and place it like [`create`](Self::create)
    ///
    /// The constructor runs before the lock is taken, so it may use this
    /// registry itself.
    pub fn create_with(&self, construct: impl FnOnce() -> T) -> HandleResult<Handle<T>> {
        self.create(construct())
    }

    /// Destroy the object behind `handle` and recycle its slot
    ///
    /// The slot's version is bumped before the slot re-enters the free list,
    /// so every outstanding handle to it fails validation from here on.
    pub fn destroy(&self, handle: Handle<T>) -> HandleResult<()> {
        self.take(handle).map(drop)
    }

    /// Remove the object behind `handle` and hand it back to the caller
    pub fn take(&self, handle: Handle<T>) -> HandleResult<T> {
        let raw = handle.raw();
        let value = {
            let mut state = self.write_state();
            let slot = state.validate(raw, self.tag)?;

            let next_version = (state.versions[slot as usize] + 1) & MAX_VERSION;
            state.versions[slot as usize] = next_version;

            let value = if next_version == 0 {
                log::warn!(
                    "Slot {} of {} exhausted its version space and is retired",
                    slot,
                    self.type_name()
                );
                state.pool.retire(slot)?
            } else {
                state.pool.deallocate(slot)?
            };
            state.total_destroyed += 1;
            value
        };

        self.write_names().remove(&raw);
        log::trace!("Destroyed {:?}", handle);
        Ok(value)
    }

    /// Resolve `handle` to a read guard over the live object
    pub fn lookup(&self, handle: Handle<T>) -> HandleResult<SlotGuard<'_, T>> {
        let state = self.read_state();
        let slot = state.validate(handle.raw(), self.tag)?;
        Ok(SlotGuard { state, slot })
    }

    /// Resolve `handle` to a write guard over the live object
    pub fn lookup_mut(&self, handle: Handle<T>) -> HandleResult<SlotGuardMut<'_, T>> {
        let state = self.write_state();
        let slot = state.validate(handle.raw(), self.tag)?;
        Ok(SlotGuardMut { state, slot })
    }

    /// Run `f` against the live object
    pub fn with<R>(&self, handle: Handle<T>, f: impl FnOnce(&T) -> R) -> HandleResult<R> {
        let guard = self.lookup(handle)?;
        Ok(f(&guard))
    }

    /// Run `f` against the live object with mutable access
    pub fn with_mut<R>(&self, handle: Handle<T>, f: impl FnOnce(&mut T) -> R) -> HandleResult<R> {
        let mut guard = self.lookup_mut(handle)?;
        Ok(f(&mut guard))
    }

    /// Check `handle` without touching the object
    pub fn validate(&self, handle: Handle<T>) -> HandleResult<()> {
        self.validate_raw(handle.raw())
    }

    /// Check an untyped handle, including its type tag
    pub fn validate_raw(&self, raw: RawHandle) -> HandleResult<()> {
        self.read_state().validate(raw, self.tag).map(|_| ())
    }

    /// Whether `handle` currently resolves
    pub fn is_alive(&self, handle: Handle<T>) -> bool {
        self.validate(handle).is_ok()
    }

    /// Attach a debug label to a live object
    pub fn set_name(&self, handle: Handle<T>, name: impl Into<String>) -> HandleResult<()> {
        // Held across the insert so a concurrent destroy cannot strand the label
        let state = self.read_state();
        state.validate(handle.raw(), self.tag)?;
        self.write_names().insert(handle.raw(), name.into());
        drop(state);
        Ok(())
    }

    /// Debug label of a live object
    pub fn name(&self, handle: Handle<T>) -> Option<String> {
        self.validate(handle).ok()?;
        self.name_raw(handle.raw())
    }

    fn name_raw(&self, raw: RawHandle) -> Option<String> {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&raw)
            .cloned()
    }

    /// Handles to every live object, in slot order
    pub fn live_handles(&self) -> Vec<Handle<T>> {
        let state = self.read_state();
        (0..state.pool.capacity() as u32)
            .filter(|&slot| state.pool.get(slot).is_some())
            .map(|slot| Handle::from_raw(RawHandle::new(slot, state.versions[slot as usize], self.tag)))
            .collect()
    }

    /// Number of live objects
    pub fn live_count(&self) -> usize {
        self.read_state().pool.live_count()
    }

    /// Total slots across all chunks
    pub fn capacity(&self) -> usize {
        self.read_state().pool.capacity()
    }

    /// Bookkeeping snapshot
    pub fn stats(&self) -> RegistryStats {
        let state = self.read_state();
        RegistryStats {
            type_name: self.type_name(),
            live: state.pool.live_count(),
            peak_live: state.peak_live,
            capacity: state.pool.capacity(),
            chunks: state.pool.chunk_count(),
            elements_per_chunk: state.pool.elements_per_chunk(),
            retired: state.pool.retired_count(),
            total_created: state.total_created,
            total_destroyed: state.total_destroyed,
            named: self.names.read().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_names(&self) -> RwLockWriteGuard<'_, HashMap<RawHandle, String>> {
        self.names.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for SlotRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRegistry")
            .field("type", &self.type_name())
            .field("tag", &self.tag)
            .field("live", &self.live_count())
            .finish()
    }
}

impl<T> Drop for SlotRegistry<T> {
    fn drop(&mut self) {
        let live = self
            .state
            .get_mut()
            .map_or_else(|poisoned| poisoned.into_inner().pool.live_count(), |state| state.pool.live_count());
        if live > 0 {
            log::error!(
                "Registry for {} dropped with {} live objects",
                self.type_name(),
                live
            );
        }
    }
}

/// Shared access to a live pooled object
///
/// Holds the registry's read lock; creation and destruction in the same
/// registry wait until it is dropped.
pub struct SlotGuard<'a, T> {
    state: RwLockReadGuard<'a, RegistryState<T>>,
    slot: u32,
}

impl<T> SlotGuard<'_, T> {
    /// Slot index of the guarded object
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl<T> Deref for SlotGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.state.pool.get(self.slot) {
            Some(value) => value,
            None => unreachable!("slot {} vacated while its read lock was held", self.slot),
        }
    }
}

/// Exclusive access to a live pooled object
pub struct SlotGuardMut<'a, T> {
    state: RwLockWriteGuard<'a, RegistryState<T>>,
    slot: u32,
}

impl<T> SlotGuardMut<'_, T> {
    /// Slot index of the guarded object
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl<T> Deref for SlotGuardMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.state.pool.get(self.slot) {
            Some(value) => value,
            None => unreachable!("slot {} vacated while its write lock was held", self.slot),
        }
    }
}

impl<T> DerefMut for SlotGuardMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        let slot = self.slot;
        match self.state.pool.get_mut(slot) {
            Some(value) => value,
            None => unreachable!("slot {} vacated while its write lock was held", slot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Foo {
        x: i32,
    }

    struct Bar;

    fn registry<T: 'static>() -> SlotRegistry<T> {
        SlotRegistry::new(&PoolConfig::default().with_chunk_bytes(256))
    }

    #[test]
    fn test_create_and_lookup() {
        let registry = registry::<Foo>();
        let handle = registry.create(Foo { x: 42 }).expect("Should create");
        assert_eq!(registry.lookup(handle).expect("Should resolve").x, 42);
        assert_eq!(registry.live_count(), 1);
        registry.destroy(handle).expect("Should destroy");
    }

    #[test]
    fn test_stale_then_reused_slot() {
        let registry = registry::<Foo>();
        let h = registry.create(Foo { x: 42 }).expect("Should create");
        registry.destroy(h).expect("Should destroy");
        assert_eq!(registry.lookup(h).err(), Some(HandleError::StaleSlot { slot: h.slot() }));

        let h2 = registry.create(Foo { x: 7 }).expect("Should create");
        assert_eq!(h2.slot(), h.slot());
        assert_ne!(h2.version(), h.version());
        assert_eq!(
            registry.lookup(h).err(),
            Some(HandleError::VersionMismatch {
                slot: h.slot(),
                handle_version: h.version(),
                current_version: h2.version(),
            })
        );
        assert_eq!(registry.lookup(h2).expect("Should resolve").x, 7);
        registry.destroy(h2).expect("Should destroy");
    }

    #[test]
    fn test_double_destroy_is_reported() {
        let registry = registry::<Foo>();
        let handle = registry.create(Foo { x: 1 }).expect("Should create");
        registry.destroy(handle).expect("Should destroy");
        assert!(registry.destroy(handle).expect_err("Second destroy fails").is_expired());
        assert_eq!(registry.stats().total_destroyed, 1);
    }

    #[test]
    fn test_invalid_and_out_of_range_handles() {
        let registry = registry::<Foo>();
        assert_eq!(registry.validate(Handle::invalid()), Err(HandleError::InvalidHandle));

        let far = Handle::from_raw(RawHandle::new(10_000, 0, registry.type_tag()));
        assert_eq!(
            registry.validate(far),
            Err(HandleError::OutOfRange { slot: 10_000, capacity: 0 })
        );
    }

    #[test]
    fn test_type_mismatch_across_registries() {
        let foos = registry::<Foo>();
        let bars = registry::<Bar>();
        let foo = foos.create(Foo { x: 3 }).expect("Should create");
        let bar = bars.create(Bar).expect("Should create");
        assert_eq!((foo.slot(), foo.version()), (bar.slot(), bar.version()));

        let disguised: Handle<Bar> = Handle::from_raw(foo.raw());
        assert_eq!(
            bars.validate(disguised),
            Err(HandleError::TypeMismatch {
                expected: bars.type_tag().bits(),
                found: foos.type_tag().bits(),
            })
        );
        foos.destroy(foo).expect("Should destroy");
        bars.destroy(bar).expect("Should destroy");
    }

    #[test]
    fn test_handle_from_another_registry_of_same_type_is_rejected() {
        let first = registry::<Foo>();
        let second = registry::<Foo>();
        assert_ne!(first.type_tag(), second.type_tag());

        let foreign = first.create(Foo { x: 1 }).expect("Should create");
        let local = second.create(Foo { x: 2 }).expect("Should create");
        assert_eq!((foreign.slot(), foreign.version()), (local.slot(), local.version()));

        assert_eq!(
            second.validate(foreign),
            Err(HandleError::TypeMismatch {
                expected: second.type_tag().bits(),
                found: first.type_tag().bits(),
            })
        );
        assert!(second.with(foreign, |foo| foo.x).is_err());
        assert!(second.destroy(foreign).is_err());
        assert_eq!(second.with(local, |foo| foo.x), Ok(2));

        first.destroy(foreign).expect("Should destroy");
        second.destroy(local).expect("Should destroy");
    }

    #[test]
    fn test_mutation_through_guard_and_closure() {
        let registry = registry::<Foo>();
        let handle = registry.create(Foo { x: 1 }).expect("Should create");
        registry.lookup_mut(handle).expect("Should resolve").x = 5;
        registry.with_mut(handle, |foo| foo.x += 1).expect("Should resolve");
        assert_eq!(registry.with(handle, |foo| foo.x), Ok(6));
        registry.destroy(handle).expect("Should destroy");
    }

    #[test]
    fn test_take_returns_object() {
        let registry = registry::<Foo>();
        let handle = registry.create_with(|| Foo { x: 9 }).expect("Should create");
        assert_eq!(registry.take(handle), Ok(Foo { x: 9 }));
        assert!(!registry.is_alive(handle));
    }

    #[test]
    fn test_destructor_runs_exactly_once() {
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let registry = registry::<Counted>();
        let handle = registry.create(Counted(Arc::clone(&drops))).expect("Should create");
        registry.destroy(handle).expect("Should destroy");
        let _ = registry.destroy(handle);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destructor_may_reenter_registry() {
        struct Node {
            registry: Arc<SlotRegistry<Node>>,
            child: Option<Handle<Node>>,
        }
        impl Drop for Node {
            fn drop(&mut self) {
                if let Some(child) = self.child.take() {
                    self.registry.destroy(child).expect("Child should still be alive");
                }
            }
        }

        let registry = Arc::new(registry::<Node>());
        let child = registry
            .create(Node { registry: Arc::clone(&registry), child: None })
            .expect("Should create");
        let parent = registry
            .create(Node { registry: Arc::clone(&registry), child: Some(child) })
            .expect("Should create");

        registry.destroy(parent).expect("Should destroy");
        assert!(!registry.is_alive(child));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_names_follow_object_lifetime() {
        let registry = registry::<Foo>();
        let handle = registry.create(Foo { x: 0 }).expect("Should create");
        registry.set_name(handle, "player").expect("Should name");
        assert_eq!(registry.name(handle).as_deref(), Some("player"));

        registry.destroy(handle).expect("Should destroy");
        assert_eq!(registry.name(handle), None);
        assert!(registry.set_name(handle, "ghost").is_err());

        let reused = registry.create(Foo { x: 1 }).expect("Should create");
        assert_eq!(registry.name(reused), None);
        registry.destroy(reused).expect("Should destroy");
        assert_eq!(registry.stats().named, 0);
    }

    #[test]
    fn test_naming_racing_destroy_leaves_no_label() {
        let registry = registry::<Foo>();
        for x in 0..200 {
            let handle = registry.create(Foo { x }).expect("Should create");
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    let _ = registry.set_name(handle, "racer");
                });
                scope.spawn(|| registry.destroy(handle).expect("Should destroy"));
            });
            assert_eq!(registry.name(handle), None);
        }
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.stats().named, 0);
    }

    #[test]
    fn test_version_exhaustion_retires_slot() {
        let registry = registry::<Foo>();
        let first = registry.create(Foo { x: 0 }).expect("Should create");
        let slot = first.slot();
        {
            let mut state = registry.write_state();
            state.versions[slot as usize] = MAX_VERSION;
        }
        let last = Handle::from_raw(RawHandle::new(slot, MAX_VERSION, registry.type_tag()));
        registry.destroy(last).expect("Should destroy");

        assert_eq!(registry.stats().retired, 1);
        let next = registry.create(Foo { x: 1 }).expect("Should create");
        assert_ne!(next.slot(), slot);
        assert_eq!(registry.validate(first), Err(HandleError::StaleSlot { slot }));
        registry.destroy(next).expect("Should destroy");
    }

    #[test]
    fn test_live_handles_and_stats() {
        let registry = registry::<Foo>();
        let handles: Vec<_> = (0..5).map(|x| registry.create(Foo { x }).expect("Should create")).collect();
        registry.destroy(handles[1]).expect("Should destroy");

        let live = registry.live_handles();
        assert_eq!(live, vec![handles[0], handles[2], handles[3], handles[4]]);

        let stats = registry.stats();
        assert_eq!(stats.live, 4);
        assert_eq!(stats.peak_live, 5);
        assert_eq!(stats.total_created, 5);
        assert_eq!(stats.total_destroyed, 1);

        for handle in live {
            registry.destroy(handle).expect("Should destroy");
        }
    }

    #[test]
    fn test_exhaustion_surfaces_as_error() {
        let registry: SlotRegistry<u64> =
            SlotRegistry::new(&PoolConfig::default().with_chunk_bytes(32).with_max_chunks(1));
        let per_chunk = registry.stats().elements_per_chunk;
        let handles: Vec<_> = (0..per_chunk as u64).map(|i| registry.create(i).expect("Should create")).collect();
        assert!(matches!(registry.create(99), Err(HandleError::PoolExhausted { .. })));
        for handle in handles {
            registry.destroy(handle).expect("Should destroy");
        }
    }
}
