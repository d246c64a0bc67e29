//! Chunked fixed-size element pool
//!
//! Storage grows by whole chunks. Each chunk is a boxed slice that is never
//! reallocated once created, so growth never moves live elements. Slots are
//! addressed by a global index:
//!
//! ```text
//! slot = chunk_index * elements_per_chunk + index_within_chunk
//! ```
//!
//! Free slots are marked in place (`Slot::Free`) instead of through a side
//! bitmap, and recycled through a LIFO stack.

use crate::core::config::PoolConfig;
use crate::memory::error::{HandleError, HandleResult};
use crate::memory::handle::MAX_SLOTS;

/// State of one element-sized region of a chunk
#[derive(Debug)]
pub enum Slot<T> {
    /// Holds no object
    Free,
    /// Holds a live object
    Occupied(T),
}

impl<T> Slot<T> {
    /// Whether the slot holds no object
    pub fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    /// The live object, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Free => None,
            Self::Occupied(value) => Some(value),
        }
    }

    fn value_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Free => None,
            Self::Occupied(value) => Some(value),
        }
    }
}

/// Growable pool of `T` laid out in fixed-size chunks
pub struct ChunkedPool<T> {
    chunks: Vec<Box<[Slot<T>]>>,
    free: Vec<u32>,
    elements_per_chunk: usize,
    max_chunks: usize,
    initial_chunks: usize,
    growth_factor: f32,
    live: usize,
    retired: usize,
}

impl<T> ChunkedPool<T> {
    /// Create an empty pool; no memory is reserved until the first allocation
    pub fn new(config: &PoolConfig) -> Self {
        let element_size = std::mem::size_of::<Slot<T>>().max(1);
        let elements_per_chunk = (config.chunk_bytes / element_size).clamp(1, MAX_SLOTS);

        let mut max_chunks = (MAX_SLOTS / elements_per_chunk).max(1);
        if let Some(cap) = config.max_chunks {
            max_chunks = max_chunks.min(cap.max(1));
        }

        Self {
            chunks: Vec::new(),
            free: Vec::new(),
            elements_per_chunk,
            max_chunks,
            initial_chunks: config.initial_chunks.clamp(1, max_chunks),
            growth_factor: config.growth_factor.max(1.0),
            live: 0,
            retired: 0,
        }
    }

    /// Place `value` in a free slot and return its index
    ///
    /// Grows the pool when no free slot remains. Fails only once the chunk
    /// cap is reached; `value` is dropped in that case.
    pub fn allocate(&mut self, value: T) -> HandleResult<u32> {
        self.try_allocate(value).map_err(|(err, _)| err)
    }

    /// Like [`allocate`](Self::allocate), but hands `value` back on failure
    ///
    /// Lets callers holding a lock drop the rejected object after releasing it.
    pub fn try_allocate(&mut self, value: T) -> Result<u32, (HandleError, T)> {
        if self.free.is_empty() {
            if let Err(err) = self.grow() {
                return Err((err, value));
            }
        }

        let Some(slot) = self.free.pop() else {
            return Err((self.exhausted(), value));
        };
        let (chunk, index) = self.locate(slot);
        let entry = &mut self.chunks[chunk][index];
        debug_assert!(entry.is_free(), "free list handed out occupied slot {slot}");
        *entry = Slot::Occupied(value);
        self.live += 1;
        Ok(slot)
    }

    /// Mark `slot` free, return it to the free list and hand back its object
    pub fn deallocate(&mut self, slot: u32) -> HandleResult<T> {
        let value = self.vacate(slot)?;
        self.free.push(slot);
        Ok(value)
    }

    /// Mark `slot` free without ever handing it out again
    pub fn retire(&mut self, slot: u32) -> HandleResult<T> {
        let value = self.vacate(slot)?;
        self.retired += 1;
        Ok(value)
    }

    /// The slot at `index`, if it lies within current capacity
    ///
    /// Says nothing about whether the caller's handle is current.
    pub fn slot(&self, index: u32) -> Option<&Slot<T>> {
        if (index as usize) >= self.capacity() {
            return None;
        }
        let (chunk, offset) = self.locate(index);
        Some(&self.chunks[chunk][offset])
    }

    /// Live object at `index`
    pub fn get(&self, index: u32) -> Option<&T> {
        self.slot(index)?.value()
    }

    /// Mutable live object at `index`
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        if (index as usize) >= self.capacity() {
            return None;
        }
        let (chunk, offset) = self.locate(index);
        self.chunks[chunk][offset].value_mut()
    }

    /// Total slots across all chunks
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.elements_per_chunk
    }

    /// Number of allocated chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of occupied slots
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of slots permanently taken out of circulation
    pub fn retired_count(&self) -> usize {
        self.retired
    }

    /// Slots per chunk
    pub fn elements_per_chunk(&self) -> usize {
        self.elements_per_chunk
    }

    /// Hard cap on the number of chunks
    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    fn vacate(&mut self, slot: u32) -> HandleResult<T> {
        let capacity = self.capacity();
        if (slot as usize) >= capacity {
            return Err(HandleError::OutOfRange { slot, capacity });
        }
        let (chunk, index) = self.locate(slot);
        match std::mem::replace(&mut self.chunks[chunk][index], Slot::Free) {
            Slot::Occupied(value) => {
                self.live -= 1;
                Ok(value)
            }
            Slot::Free => Err(HandleError::StaleSlot { slot }),
        }
    }

    fn grow(&mut self) -> HandleResult<()> {
        let current = self.chunks.len();
        if current >= self.max_chunks {
            log::error!(
                "Pool of {} exhausted at {} chunks",
                std::any::type_name::<T>(),
                current
            );
            return Err(self.exhausted());
        }

        let target = if current == 0 {
            self.initial_chunks
        } else {
            // ~50% growth by default, always at least one chunk
            let scaled = (current as f32 * self.growth_factor).ceil() as usize;
            scaled.max(current + 1)
        }
        .min(self.max_chunks);

        let first_new_slot = self.capacity();
        for _ in current..target {
            let chunk: Box<[Slot<T>]> = (0..self.elements_per_chunk).map(|_| Slot::Free).collect();
            self.chunks.push(chunk);
        }

        // Highest index at the bottom so the lowest new index pops first
        self.free.extend((first_new_slot..self.capacity()).rev().map(|slot| slot as u32));

        log::debug!(
            "Grew pool of {} from {} to {} chunks ({} slots)",
            std::any::type_name::<T>(),
            current,
            target,
            self.capacity()
        );
        Ok(())
    }

    fn locate(&self, slot: u32) -> (usize, usize) {
        let slot = slot as usize;
        (slot / self.elements_per_chunk, slot % self.elements_per_chunk)
    }

    fn exhausted(&self) -> HandleError {
        HandleError::PoolExhausted {
            max_chunks: self.max_chunks,
            elements_per_chunk: self.elements_per_chunk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> PoolConfig {
        PoolConfig::default()
            .with_chunk_bytes(4 * std::mem::size_of::<Slot<u64>>())
            .with_initial_chunks(2)
    }

    #[test]
    fn test_elements_per_chunk_from_chunk_bytes() {
        let pool: ChunkedPool<u64> = ChunkedPool::new(&small_config());
        assert_eq!(pool.elements_per_chunk(), 4);
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.chunk_count(), 0);
    }

    #[test]
    fn test_first_growth_allocates_initial_chunks() {
        let mut pool = ChunkedPool::new(&small_config());
        let slot = pool.allocate(10_u64).expect("Should allocate");
        assert_eq!(slot, 0);
        assert_eq!(pool.chunk_count(), 2);
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.get(slot), Some(&10));
    }

    #[test]
    fn test_growth_is_roughly_fifty_percent() {
        let mut pool = ChunkedPool::new(&small_config().with_initial_chunks(4));
        for i in 0..16_u64 {
            pool.allocate(i).expect("Should allocate");
        }
        assert_eq!(pool.chunk_count(), 4);

        pool.allocate(16).expect("Should allocate");
        assert_eq!(pool.chunk_count(), 6);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut pool = ChunkedPool::new(&small_config());
        let a = pool.allocate(1_u64).expect("Should allocate");
        let b = pool.allocate(2_u64).expect("Should allocate");
        assert_eq!((a, b), (0, 1));

        assert_eq!(pool.deallocate(a), Ok(1));
        assert!(pool.slot(a).expect("In range").is_free());
        assert_eq!(pool.allocate(3_u64), Ok(a));
    }

    #[test]
    fn test_deallocate_contract_violations() {
        let mut pool = ChunkedPool::new(&small_config());
        let slot = pool.allocate(1_u64).expect("Should allocate");
        pool.deallocate(slot).expect("First free succeeds");

        assert_eq!(pool.deallocate(slot), Err(HandleError::StaleSlot { slot }));
        assert_eq!(
            pool.deallocate(100),
            Err(HandleError::OutOfRange { slot: 100, capacity: 8 })
        );
    }

    #[test]
    fn test_exhaustion_at_chunk_cap() {
        let mut pool = ChunkedPool::new(&small_config().with_initial_chunks(1).with_max_chunks(2));
        for i in 0..8_u64 {
            pool.allocate(i).expect("Below the cap");
        }
        assert_eq!(
            pool.allocate(8),
            Err(HandleError::PoolExhausted { max_chunks: 2, elements_per_chunk: 4 })
        );
        assert_eq!(pool.live_count(), 8);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut pool = ChunkedPool::new(&small_config());
        let slots: Vec<u32> = (0..20_u64).map(|i| pool.allocate(i).expect("Should allocate")).collect();
        let capacity = pool.capacity();
        for slot in slots {
            pool.deallocate(slot).expect("Should free");
        }
        assert_eq!(pool.capacity(), capacity);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn test_retired_slot_is_not_reused() {
        let mut pool = ChunkedPool::new(&small_config().with_initial_chunks(1));
        let slot = pool.allocate(1_u64).expect("Should allocate");
        pool.retire(slot).expect("Should retire");
        assert_eq!(pool.retired_count(), 1);
        for i in 0..3_u64 {
            assert_ne!(pool.allocate(i).expect("Should allocate"), slot);
        }
        // Fourth allocation needs a new chunk since slot 0 is gone
        pool.allocate(9).expect("Should allocate");
        assert_eq!(pool.chunk_count(), 2);
    }

    #[test]
    fn test_zero_sized_elements() {
        let mut pool: ChunkedPool<()> = ChunkedPool::new(&PoolConfig::default());
        let slot = pool.allocate(()).expect("Should allocate");
        assert_eq!(pool.get(slot), Some(&()));
    }
}
