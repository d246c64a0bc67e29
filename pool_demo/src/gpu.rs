//! Simulated GPU resource layer
//!
//! Buffers and textures live in pooled registries. Command recording only
//! sees handles, and release goes through the deferred deallocator so a
//! resource outlives every frame that may still reference it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use handle_engine::memory::{DeferredDeallocator, Handle, HandleResult, RegistryDirectory, Unique};
use rand::Rng;

/// Device memory accounting shared by every live resource
#[derive(Debug, Default)]
pub struct DeviceMemory {
    allocated: AtomicUsize,
}

impl DeviceMemory {
    fn reserve(&self, bytes: usize) {
        self.allocated.fetch_add(bytes, Ordering::Relaxed);
    }

    fn release(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Bytes currently held by live resources
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// Vertex/index/uniform buffer stand-in
#[derive(Debug)]
pub struct GpuBuffer {
    pub bytes: usize,
    memory: Arc<DeviceMemory>,
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.memory.release(self.bytes);
    }
}

/// Sampled texture stand-in
#[derive(Debug)]
pub struct GpuTexture {
    pub width: u32,
    pub height: u32,
    memory: Arc<DeviceMemory>,
}

impl GpuTexture {
    fn bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.memory.release(self.bytes());
    }
}

/// Owns every GPU resource the demo creates
pub struct GpuResources {
    directory: Arc<RegistryDirectory>,
    deallocator: Arc<DeferredDeallocator>,
    memory: Arc<DeviceMemory>,
    buffers: Vec<Unique<GpuBuffer>>,
    textures: Vec<Unique<GpuTexture>>,
}

impl GpuResources {
    pub fn new(directory: Arc<RegistryDirectory>, deallocator: Arc<DeferredDeallocator>) -> Self {
        Self {
            directory,
            deallocator,
            memory: Arc::new(DeviceMemory::default()),
            buffers: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn create_buffer(&mut self, label: &str, bytes: usize) -> HandleResult<Handle<GpuBuffer>> {
        self.memory.reserve(bytes);
        let buffer = self.directory.create(GpuBuffer {
            bytes,
            memory: Arc::clone(&self.memory),
        })?;
        buffer.set_name(label)?;
        let handle = buffer.handle();
        self.buffers.push(buffer);
        Ok(handle)
    }

    pub fn create_texture(&mut self, label: &str, width: u32, height: u32) -> HandleResult<Handle<GpuTexture>> {
        let texture = GpuTexture {
            width,
            height,
            memory: Arc::clone(&self.memory),
        };
        self.memory.reserve(texture.bytes());
        let texture = self.directory.create(texture)?;
        texture.set_name(label)?;
        let handle = texture.handle();
        self.textures.push(texture);
        Ok(handle)
    }

    /// Record a draw that reads `buffer` and `texture`
    ///
    /// Returns the bytes touched, or the error for whichever handle failed
    /// to resolve.
    pub fn record_draw(&self, buffer: Handle<GpuBuffer>, texture: Handle<GpuTexture>) -> HandleResult<usize> {
        let buffers = self.directory.registry::<GpuBuffer>();
        let textures = self.directory.registry::<GpuTexture>();
        let buffer_bytes = buffers.with(buffer, |b| b.bytes)?;
        let texture_bytes = textures.with(texture, GpuTexture::bytes)?;
        Ok(buffer_bytes + texture_bytes)
    }

    /// Release up to `count` random buffers and textures through the deferred queue
    pub fn release_random(&mut self, rng: &mut impl Rng, count: usize) -> usize {
        let mut released = 0;
        for _ in 0..count {
            if !self.buffers.is_empty() {
                let index = rng.gen_range(0..self.buffers.len());
                let buffer = self.buffers.swap_remove(index);
                log::trace!("Releasing buffer {:?} ({:?})", buffer.handle(), buffer.name());
                buffer.destroy_deferred(&self.deallocator);
                released += 1;
            }
            if !self.textures.is_empty() && rng.gen_bool(0.5) {
                let index = rng.gen_range(0..self.textures.len());
                self.textures.swap_remove(index).destroy_deferred(&self.deallocator);
                released += 1;
            }
        }
        released
    }

    /// A live buffer and texture pair, if any exist
    pub fn pick(&self, rng: &mut impl Rng) -> Option<(Handle<GpuBuffer>, Handle<GpuTexture>)> {
        if self.buffers.is_empty() || self.textures.is_empty() {
            return None;
        }
        let buffer = &self.buffers[rng.gen_range(0..self.buffers.len())];
        let texture = &self.textures[rng.gen_range(0..self.textures.len())];
        Some((buffer.handle(), texture.handle()))
    }

    pub fn live_resources(&self) -> usize {
        self.buffers.len() + self.textures.len()
    }

    pub fn device_memory(&self) -> usize {
        self.memory.allocated()
    }

    /// Hand every remaining resource to the deferred queue
    pub fn release_all(&mut self) {
        for buffer in self.buffers.drain(..) {
            buffer.destroy_deferred(&self.deallocator);
        }
        for texture in self.textures.drain(..) {
            texture.destroy_deferred(&self.deallocator);
        }
    }
}
