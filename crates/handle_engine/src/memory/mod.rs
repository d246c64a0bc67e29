//! Pooled object storage with generational handles
//!
//! Every subsystem that hands out shareable objects (GPU buffers and
//! textures, input actions, cached assets) stores them here and passes
//! handles around instead of references.
//!
//! # Architecture
//!
//! ```text
//! RegistryDirectory ── TypeId → SlotRegistry<T>
//!                                    ├── ChunkedPool<T>   (chunks + LIFO free list)
//!                                    └── version table    (one counter per slot)
//!                                            ↓
//!                               Handle<T> = slot | version | type tag
//!                                            ↓
//!                          Unique<T> / Ref<T> / Weak<T> ownership views
//!                                            ↓
//!                 DeferredDeallocator (destruction delayed by frames in flight)
//! ```

pub mod chunked_pool;
pub mod deferred;
pub mod directory;
pub mod error;
pub mod handle;
pub mod registry;
pub mod shared;
pub mod unique;

pub use chunked_pool::{ChunkedPool, Slot};
pub use deferred::{DeferredDeallocator, DeferredStats};
pub use directory::{ErasedRegistry, RegistryDirectory};
pub use error::{HandleError, HandleResult, LeakReport, TeardownError};
pub use handle::{Handle, RawHandle, TypeTag, MAX_SLOTS, MAX_VERSION};
pub use registry::{RegistryStats, SlotGuard, SlotGuardMut, SlotRegistry};
pub use shared::{Ref, Weak};
pub use unique::Unique;
