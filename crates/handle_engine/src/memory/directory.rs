//! Type-Erased Registry Directory
//!
//! One directory hosts a [`SlotRegistry`] per pooled type without a closed
//! list of types. Registries are created lazily on first request and live
//! as long as the directory (or any handle owner still holding them).
//!
//! # Architecture
//!
//! ```text
//! RegistryDirectory
//!     └── RwLock<HashMap<TypeId, RegistryEntry>>
//!                 ├── Arc<dyn Any>            → downcast to Arc<SlotRegistry<T>>
//!                 └── Arc<dyn ErasedRegistry> → type-agnostic inspection
//! ```
//!
//! Lookups take the read lock. Creating a registry for an unseen type takes
//! the write lock and checks again, since another thread may have won the
//! race in between.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::config::PoolConfig;
use crate::memory::error::{HandleError, HandleResult, LeakReport, TeardownError};
use crate::memory::handle::{RawHandle, TypeTag};
use crate::memory::registry::{RegistryStats, SlotRegistry};
use crate::memory::unique::Unique;

/// Type-agnostic view of a [`SlotRegistry`]
pub trait ErasedRegistry: Send + Sync {
    /// Element type name
    fn type_name(&self) -> &'static str;

    /// Tag embedded in this registry's handles
    fn type_tag(&self) -> TypeTag;

    /// Run the full validation chain on an untyped handle
    fn validate_raw(&self, raw: RawHandle) -> HandleResult<()>;

    /// Destroy the object behind an untyped handle
    fn destroy_raw(&self, raw: RawHandle) -> HandleResult<()>;

    /// Debug label of a live object
    fn name_raw(&self, raw: RawHandle) -> Option<String>;

    /// Number of live objects
    fn live_count(&self) -> usize;

    /// Bookkeeping snapshot
    fn stats(&self) -> RegistryStats;
}

impl<T: Send + Sync + 'static> ErasedRegistry for SlotRegistry<T> {
    fn type_name(&self) -> &'static str {
        SlotRegistry::type_name(self)
    }

    fn type_tag(&self) -> TypeTag {
        SlotRegistry::type_tag(self)
    }

    fn validate_raw(&self, raw: RawHandle) -> HandleResult<()> {
        SlotRegistry::validate_raw(self, raw)
    }

    fn destroy_raw(&self, raw: RawHandle) -> HandleResult<()> {
        self.validate_raw(raw)?;
        self.destroy(crate::memory::handle::Handle::from_raw(raw))
    }

    fn name_raw(&self, raw: RawHandle) -> Option<String> {
        self.validate_raw(raw).ok()?;
        self.name(crate::memory::handle::Handle::from_raw(raw))
    }

    fn live_count(&self) -> usize {
        SlotRegistry::live_count(self)
    }

    fn stats(&self) -> RegistryStats {
        SlotRegistry::stats(self)
    }
}

struct RegistryEntry {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedRegistry>,
}

/// Map from element type to its slot registry
pub struct RegistryDirectory {
    registries: RwLock<HashMap<TypeId, RegistryEntry>>,
    config: PoolConfig,
}

impl RegistryDirectory {
    /// Create an empty directory; every registry it creates uses `config`
    pub fn new(config: PoolConfig) -> Self {
        log::info!("Creating RegistryDirectory with config: {:?}", config);
        Self {
            registries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Registry for `T`, created on first request
    pub fn registry<T: Send + Sync + 'static>(&self) -> Arc<SlotRegistry<T>> {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }

        let mut registries = self.registries.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have created it while we waited for the write lock
        if let Some(entry) = registries.get(&TypeId::of::<T>()) {
            return Self::downcast(entry);
        }

        let registry = Arc::new(SlotRegistry::<T>::new(&self.config));
        log::debug!(
            "Created registry for {} (tag {:?})",
            registry.type_name(),
            registry.type_tag()
        );
        registries.insert(
            TypeId::of::<T>(),
            RegistryEntry {
                typed: registry.clone(),
                erased: registry.clone(),
            },
        );
        registry
    }

    /// Registry for `T` if one exists already
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<SlotRegistry<T>>> {
        let registries = self.registries.read().unwrap_or_else(PoisonError::into_inner);
        registries.get(&TypeId::of::<T>()).map(Self::downcast)
    }

    /// Type-agnostic view of the registry for `type_id`
    pub fn get_erased(&self, type_id: TypeId) -> Option<Arc<dyn ErasedRegistry>> {
        let registries = self.registries.read().unwrap_or_else(PoisonError::into_inner);
        registries.get(&type_id).map(|entry| Arc::clone(&entry.erased))
    }

    /// Create a `T` in its registry and take unique ownership of it
    pub fn create<T: Send + Sync + 'static>(&self, value: T) -> HandleResult<Unique<T>> {
        Unique::new(self.registry::<T>(), value)
    }

    /// Validate a handle that crossed a type-erased boundary
    ///
    /// Reports a type mismatch when the handle's embedded tag does not
    /// belong to this directory's registry for `type_id`, which covers
    /// handles of another type and handles issued by another directory.
    pub fn validate_erased(&self, type_id: TypeId, raw: RawHandle) -> HandleResult<()> {
        if raw.is_invalid() {
            return Err(HandleError::InvalidHandle);
        }
        // No registry means nothing of this type was ever allocated here
        let Some(registry) = self.get_erased(type_id) else {
            return Err(HandleError::OutOfRange {
                slot: raw.slot(),
                capacity: 0,
            });
        };
        let expected = registry.type_tag();
        if raw.tag() != expected.bits() {
            return Err(HandleError::TypeMismatch {
                expected: expected.bits(),
                found: raw.tag(),
            });
        }
        registry.validate_raw(raw)
    }

    /// Number of registries created so far
    pub fn registry_count(&self) -> usize {
        self.registries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Statistics for every registry, sorted by type name
    pub fn stats(&self) -> Vec<RegistryStats> {
        let mut stats: Vec<RegistryStats> = self
            .registries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.erased.stats())
            .collect();
        stats.sort_by_key(|s| s.type_name);
        stats
    }

    /// Drop every registry, reporting those that still hold live objects
    ///
    /// Leaking registries are still removed from the directory; their
    /// objects stay alive only as long as some owner keeps the registry.
    pub fn teardown(&self) -> Result<(), TeardownError> {
        let drained: Vec<RegistryEntry> = self
            .registries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        let mut leaks: Vec<LeakReport> = drained
            .iter()
            .filter_map(|entry| {
                let live = entry.erased.live_count();
                (live > 0).then(|| LeakReport {
                    type_name: entry.erased.type_name(),
                    live,
                })
            })
            .collect();
        leaks.sort_by_key(|leak| leak.type_name);

        log::debug!("Tore down {} registries", drained.len());
        drop(drained);

        if leaks.is_empty() {
            Ok(())
        } else {
            for leak in &leaks {
                log::error!("Registry for {} leaked {} live objects", leak.type_name, leak.live);
            }
            Err(TeardownError::LeakedSlots(leaks))
        }
    }

    fn downcast<T: Send + Sync + 'static>(entry: &RegistryEntry) -> Arc<SlotRegistry<T>> {
        match Arc::clone(&entry.typed).downcast::<SlotRegistry<T>>() {
            Ok(registry) => registry,
            Err(_) => unreachable!("registry stored under the TypeId of another type"),
        }
    }
}

impl Default for RegistryDirectory {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for RegistryDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryDirectory")
            .field("registries", &self.registry_count())
            .field("config", &self.config)
            .finish()
    }
}
