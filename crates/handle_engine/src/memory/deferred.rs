//! Deferred Deallocator
//!
//! Destruction of objects that in-flight GPU work may still reference is
//! postponed until the frame slot it was requested in comes around again.
//!
//! # Frame Ring
//!
//! ```text
//!   frames_in_flight = 3
//!
//!   slot:      0        1        2
//!           [queue]  [queue]  [queue]
//!              ▲
//!         collecting
//!
//!   begin_frame(1): run queue 1 (queued 3 frames ago), collect into 1
//! ```
//!
//! Per slot the state cycles `Collecting → Ready-to-flush → Flushed →
//! Collecting`. Closures always run outside the internal lock, so they may
//! queue further work or destroy handles. A panicking closure is fatal and
//! propagates to the caller.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

type DeallocFn = Box<dyn FnOnce() + Send>;

struct DeferredState {
    queues: Vec<VecDeque<DeallocFn>>,
    current: usize,
    total_requested: u64,
    total_executed: u64,
}

/// Counters describing deferred destruction traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeferredStats {
    /// Closures currently waiting
    pub pending: usize,
    /// Closures ever queued
    pub total_requested: u64,
    /// Closures ever executed
    pub total_executed: u64,
}

/// Ring of per-frame destruction queues
pub struct DeferredDeallocator {
    state: Mutex<DeferredState>,
    frames_in_flight: usize,
}

impl DeferredDeallocator {
    /// Allocate one queue per frame in flight; slot 0 starts collecting
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "at least one frame must be in flight");
        log::debug!("Creating DeferredDeallocator with {} frames in flight", frames_in_flight);
        Self {
            state: Mutex::new(DeferredState {
                queues: (0..frames_in_flight).map(|_| VecDeque::new()).collect(),
                current: 0,
                total_requested: 0,
                total_executed: 0,
            }),
            frames_in_flight,
        }
    }

    /// Number of frame slots in the ring
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot currently collecting requests
    pub fn current_slot(&self) -> usize {
        self.lock().current
    }

    /// Queue `dealloc` on the current frame slot; never runs synchronously
    pub fn request_deallocation(&self, dealloc: impl FnOnce() + Send + 'static) {
        let mut state = self.lock();
        let current = state.current;
        state.queues[current].push_back(Box::new(dealloc));
        state.total_requested += 1;
    }

    /// Start recording into `frame_slot`
    ///
    /// The caller guarantees the GPU work last submitted from this slot has
    /// completed, so everything queued here `frames_in_flight` frames ago
    /// runs first. Returns the number of closures executed.
    pub fn begin_frame(&self, frame_slot: usize) -> usize {
        let executed = self.flush(frame_slot);
        self.lock().current = frame_slot;
        executed
    }

    /// Run and clear exactly the queue belonging to `frame_slot`
    pub fn flush(&self, frame_slot: usize) -> usize {
        assert!(
            frame_slot < self.frames_in_flight,
            "frame slot {} out of range for {} frames in flight",
            frame_slot,
            self.frames_in_flight
        );
        let batch = std::mem::take(&mut self.lock().queues[frame_slot]);
        let executed = Self::run(batch);
        if executed > 0 {
            log::debug!("Flushed {} deferred deallocations from frame slot {}", executed, frame_slot);
        }
        self.lock().total_executed += executed as u64;
        executed
    }

    /// Run every queue regardless of frame completion
    ///
    /// Only valid once no asynchronous consumer can exist any more, i.e. at
    /// shutdown after the device went idle. Repeats until closures stop
    /// queueing follow-up work.
    pub fn flush_all(&self) -> usize {
        let mut executed = 0;
        loop {
            let batch: Vec<VecDeque<DeallocFn>> = {
                let mut state = self.lock();
                let current = state.current;
                // Oldest slot first: the one after `current` was filled longest ago
                (1..=self.frames_in_flight)
                    .map(|offset| std::mem::take(&mut state.queues[(current + offset) % self.frames_in_flight]))
                    .collect()
            };
            let ran: usize = batch.into_iter().map(Self::run).sum();
            if ran == 0 {
                break;
            }
            self.lock().total_executed += ran as u64;
            executed += ran;
        }
        if executed > 0 {
            log::debug!("Force-flushed {} deferred deallocations", executed);
        }
        executed
    }

    /// Shutdown step: force-flush everything still queued
    pub fn teardown(&self) -> usize {
        let executed = self.flush_all();
        log::info!("DeferredDeallocator torn down ({} pending closures executed)", executed);
        executed
    }

    /// Closures waiting across all slots
    pub fn pending(&self) -> usize {
        self.lock().queues.iter().map(VecDeque::len).sum()
    }

    /// Closures waiting on one slot
    pub fn pending_in(&self, frame_slot: usize) -> usize {
        self.lock().queues.get(frame_slot).map_or(0, VecDeque::len)
    }

    /// Traffic counters
    pub fn stats(&self) -> DeferredStats {
        let state = self.lock();
        DeferredStats {
            pending: state.queues.iter().map(VecDeque::len).sum(),
            total_requested: state.total_requested,
            total_executed: state.total_executed,
        }
    }

    fn run(batch: VecDeque<DeallocFn>) -> usize {
        let count = batch.len();
        for dealloc in batch {
            dealloc();
        }
        count
    }

    fn lock(&self) -> MutexGuard<'_, DeferredState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DeferredDeallocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredDeallocator")
            .field("frames_in_flight", &self.frames_in_flight)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for DeferredDeallocator {
    fn drop(&mut self) {
        let pending = self.pending();
        if pending > 0 {
            log::warn!("DeferredDeallocator dropped with {} pending closures, flushing", pending);
            self.flush_all();
        }
    }
}
