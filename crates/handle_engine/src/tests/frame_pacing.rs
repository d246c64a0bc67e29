//! Integration tests for deferred destruction paced by the frame counter

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::frame::FrameCounter;
use crate::memory::{DeferredDeallocator, RegistryDirectory};

#[cfg(test)]
mod tests {
    use super::*;

    struct GpuBuffer {
        bytes: usize,
        released: Arc<AtomicUsize>,
    }

    impl Drop for GpuBuffer {
        fn drop(&mut self) {
            self.released.fetch_add(self.bytes, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_destruction_waits_exactly_frames_in_flight() {
        for frames_in_flight in 1..=4 {
            let directory = RegistryDirectory::default();
            let deallocator = DeferredDeallocator::new(frames_in_flight);
            let mut frames = FrameCounter::new(frames_in_flight);
            let released = Arc::new(AtomicUsize::new(0));

            let requested_in = frames.advance();
            deallocator.begin_frame(requested_in.slot);
            let buffer = directory
                .create(GpuBuffer { bytes: 256, released: Arc::clone(&released) })
                .expect("Should create");
            let handle = buffer.handle();
            let registry = Arc::clone(buffer.registry());
            buffer.destroy_deferred(&deallocator);

            for _ in 1..frames_in_flight {
                let frame = frames.advance();
                deallocator.begin_frame(frame.slot);
                assert!(registry.is_alive(handle), "{} frames in flight", frames_in_flight);
            }

            let frame = frames.advance();
            assert_eq!(frame.slot, requested_in.slot);
            deallocator.begin_frame(frame.slot);
            assert!(!registry.is_alive(handle));
            assert_eq!(released.load(Ordering::SeqCst), 256);
        }
    }

    #[test]
    fn test_each_frame_releases_only_its_own_batch() {
        let directory = RegistryDirectory::default();
        let deallocator = DeferredDeallocator::new(3);
        let mut frames = FrameCounter::new(3);
        let released = Arc::new(AtomicUsize::new(0));

        // Frame n queues a buffer of n + 1 bytes
        for n in 0..3 {
            let frame = frames.advance();
            deallocator.begin_frame(frame.slot);
            directory
                .create(GpuBuffer { bytes: n + 1, released: Arc::clone(&released) })
                .expect("Should create")
                .destroy_deferred(&deallocator);
        }
        assert_eq!(released.load(Ordering::SeqCst), 0);

        let expected_totals = [1, 3, 6];
        for total in expected_totals {
            let frame = frames.advance();
            deallocator.begin_frame(frame.slot);
            assert_eq!(released.load(Ordering::SeqCst), total);
        }
        assert_eq!(deallocator.pending(), 0);
    }

    #[test]
    fn test_shutdown_releases_everything_then_teardown_is_clean() {
        let directory = RegistryDirectory::default();
        let deallocator = DeferredDeallocator::new(2);
        let released = Arc::new(AtomicUsize::new(0));

        for bytes in [16, 32, 64] {
            directory
                .create(GpuBuffer { bytes, released: Arc::clone(&released) })
                .expect("Should create")
                .destroy_deferred(&deallocator);
        }

        assert_eq!(deallocator.teardown(), 3);
        assert_eq!(released.load(Ordering::SeqCst), 112);
        assert_eq!(directory.teardown(), Ok(()));
    }
}
