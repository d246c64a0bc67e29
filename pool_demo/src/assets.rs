//! Simulated asset cache layer
//!
//! Meshes are keyed by content id. The cache owns each mesh; renderers get
//! `Ref`s that stay valid while the entry is cached, and evictions are
//! deferred until in-flight frames are done with the mesh.

use std::collections::HashMap;
use std::sync::Arc;

use handle_engine::memory::{DeferredDeallocator, HandleResult, Ref, RegistryDirectory, Unique};

/// Loaded mesh data
#[derive(Debug)]
pub struct MeshAsset {
    pub content_id: u64,
    pub vertex_count: usize,
}

/// Content-addressed mesh cache
pub struct AssetCache {
    directory: Arc<RegistryDirectory>,
    deallocator: Arc<DeferredDeallocator>,
    entries: HashMap<u64, Unique<MeshAsset>>,
    hits: u64,
    misses: u64,
}

impl AssetCache {
    pub fn new(directory: Arc<RegistryDirectory>, deallocator: Arc<DeferredDeallocator>) -> Self {
        Self {
            directory,
            deallocator,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Shared reference to the mesh for `content_id`, loading it on a miss
    pub fn load(&mut self, content_id: u64) -> HandleResult<Ref<MeshAsset>> {
        if let Some(entry) = self.entries.get(&content_id) {
            self.hits += 1;
            return entry.share();
        }

        self.misses += 1;
        let mesh = self.directory.create(MeshAsset {
            content_id,
            // Stand-in for parsing the file
            vertex_count: (content_id % 997) as usize * 3 + 3,
        })?;
        mesh.set_name(format!("mesh:{:016x}", content_id))?;
        log::debug!("Loaded mesh {:016x} as {:?}", content_id, mesh.handle());
        let shared = mesh.share();
        self.entries.insert(content_id, mesh);
        shared
    }

    /// Drop `content_id` from the cache once in-flight frames are done with it
    pub fn evict(&mut self, content_id: u64) -> bool {
        match self.entries.remove(&content_id) {
            Some(mesh) => {
                mesh.destroy_deferred(&self.deallocator);
                true
            }
            None => false,
        }
    }

    /// Evict everything
    pub fn clear(&mut self) {
        for (_, mesh) in self.entries.drain() {
            mesh.destroy_deferred(&self.deallocator);
        }
    }

    pub fn content_ids(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// (hits, misses)
    pub fn hit_stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
