//! Frame timing

use std::time::Instant;

/// Wall-clock timer ticked once per frame
pub struct Timer {
    last_tick: Instant,
    delta_time: f32,
    total_time: f32,
    ticks: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a timer starting now
    pub fn new() -> Self {
        Self {
            last_tick: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            ticks: 0,
        }
    }

    /// Record the end of a frame
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_tick).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_tick = now;
        self.ticks += 1;
    }

    /// Seconds between the last two ticks
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds accumulated over all ticks
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of ticks so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Average ticks per second since creation
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.ticks as f32 / self.total_time
        } else {
            0.0
        }
    }
}
