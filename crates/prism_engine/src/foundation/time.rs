//! Time management utilities

use std::time::Instant;

/// High-precision timer for frame timing
///
/// Delta time is computed from a monotonic clock, once per render-loop
/// iteration.
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (call once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Total elapsed time since timer creation in seconds
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of completed frames
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_advances_frame_count_and_accumulates_time() {
        let mut timer = Timer::new();
        assert_eq!(timer.frame_count(), 0);

        std::thread::sleep(std::time::Duration::from_millis(2));
        timer.update();

        assert_eq!(timer.frame_count(), 1);
        assert!(timer.delta_time() > 0.0);
        assert!(timer.total_time() >= timer.delta_time());
    }
}
