//! Frame counter for frames-in-flight pacing
//!
//! Reports which frame-in-flight slot is being recorded and which slot has
//! just retired. The deferred deallocator is driven exclusively from here.

/// Frame-in-flight bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Monotonic frame number, starting at 0
    pub index: u64,
    /// Frame-in-flight slot being recorded
    pub slot: usize,
}

/// Monotonic frame counter over a ring of frame-in-flight slots
#[derive(Debug, Clone)]
pub struct FrameCounter {
    frames_in_flight: usize,
    frame_index: u64,
    started: bool,
}

impl FrameCounter {
    /// Create a counter for `frames_in_flight` overlapping frames
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "at least one frame must be in flight");
        Self {
            frames_in_flight,
            frame_index: 0,
            started: false,
        }
    }

    /// Number of overlapping frames
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Index of the frame being recorded
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Slot of the frame being recorded
    pub fn current_slot(&self) -> usize {
        self.slot_of(self.frame_index)
    }

    /// Current frame as a value
    pub fn current(&self) -> FrameInfo {
        FrameInfo {
            index: self.frame_index,
            slot: self.current_slot(),
        }
    }

    /// Move to the next frame, returning it
    ///
    /// The returned slot is the one that has just retired: its previous
    /// occupant was submitted `frames_in_flight` frames ago. The first call
    /// starts frame 0.
    pub fn advance(&mut self) -> FrameInfo {
        if self.started {
            self.frame_index += 1;
        } else {
            self.started = true;
        }
        self.current()
    }

    /// Frame that last used the current slot, if any
    pub fn retired_frame(&self) -> Option<u64> {
        self.frame_index.checked_sub(self.frames_in_flight as u64)
    }

    fn slot_of(&self, frame_index: u64) -> usize {
        (frame_index % self.frames_in_flight as u64) as usize
    }
}
