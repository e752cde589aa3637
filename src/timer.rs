use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling average of recent frame times.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    window: usize,
    samples: VecDeque<Duration>,
    last_tick: Instant,
    frames: u64,
    total: Duration,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

impl FrameTimer {
    pub const DEFAULT_WINDOW: usize = 50;

    /// Averages over the last `window` frames (at least one).
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            last_tick: Instant::now(),
            frames: 0,
            total: Duration::ZERO,
        }
    }

    /// Restarts the clock without recording a frame.
    pub fn start(&mut self) {
        self.last_tick = Instant::now();
    }

    /// Records the time since the previous `tick` or `start`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.record(elapsed);
        elapsed
    }

    pub fn record(&mut self, frame_time: Duration) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(frame_time);
        self.frames += 1;
        self.total += frame_time;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Mean frame time over the sample window.
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    /// Frames per second implied by [`Self::average`]; `0.0` before the
    /// first frame.
    pub fn frame_rate(&self) -> f64 {
        let average = self.average().as_secs_f64();
        if average > 0.0 {
            1.0 / average
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_over_window() {
        let mut timer = FrameTimer::new(2);
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        timer.record(Duration::from_millis(40));
        assert_eq!(timer.average(), Duration::from_millis(30));
        assert_eq!(timer.frames(), 3);
        assert_eq!(timer.total(), Duration::from_millis(70));
    }

    #[test]
    fn frame_rate_follows_average() {
        let mut timer = FrameTimer::default();
        assert_eq!(timer.frame_rate(), 0.0);
        timer.record(Duration::from_millis(20));
        assert!((timer.frame_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn tick_records_a_frame() {
        let mut timer = FrameTimer::new(0);
        timer.start();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frames(), 2);
    }
}
