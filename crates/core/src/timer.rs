//! Frame timer supplying the delta time of the render loop.

use std::time::{Duration, Instant};

/// Longest delta reported by [`Timer::delta_secs`].
///
/// A window that was minimized or dragged can stall the loop for seconds;
/// the next frame sees at most this much time pass.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Measures elapsed time and per-frame deltas.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    ticks: u64,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            ticks: 0,
        }
    }

    /// Total elapsed time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Time since the previous call to `tick()` (or since creation).
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.ticks += 1;
        delta
    }

    /// Delta time in seconds for the frame loop, capped at [`MAX_FRAME_DELTA`].
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().min(MAX_FRAME_DELTA).as_secs_f32()
    }

    /// Number of ticks since the timer was created or reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.ticks = 0;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_capped() {
        let mut timer = Timer::new();
        if let Some(earlier) = timer.last_tick.checked_sub(Duration::from_secs(5)) {
            timer.last_tick = earlier;
        }

        let delta = timer.delta_secs();
        assert!(delta <= MAX_FRAME_DELTA.as_secs_f32());
        assert_eq!(timer.ticks(), 1);
    }

    #[test]
    fn test_reset_clears_ticks() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.ticks(), 2);

        timer.reset();
        assert_eq!(timer.ticks(), 0);
        assert!(timer.elapsed() < Duration::from_secs(1));
    }
}
