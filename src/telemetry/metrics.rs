//! Frame timing

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Counts frames over fixed one-second windows
pub struct FrameRateCounter {
    window: Duration,
    window_start: Option<Instant>,
    frames: u32,
    fps: u32,
}

impl Default for FrameRateCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FrameRateCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            frames: 0,
            fps: 0,
        }
    }

    /// Record a frame at `now`. Returns the new rate when a window closes.
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.duration_since(start);
        if elapsed < self.window {
            return None;
        }

        let rate = self.frames as f64 / elapsed.as_secs_f64() * self.window.as_secs_f64();
        self.fps = rate.round() as u32;
        self.frames = 0;
        self.window_start = Some(now);
        Some(self.fps)
    }

    /// Rate of the last completed window
    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.frames = 0;
        self.fps = 0;
    }
}

/// Rolling average of recent durations (e.g. swap latency)
pub struct LatencyTracker {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(30)
    }
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, sample: Duration) {
        self.samples.push_back(sample);
        if self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average in milliseconds, 0 without samples
    pub fn average_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.samples.iter().sum();
        total.as_secs_f64() * 1000.0 / self.samples.len() as f64
    }

    pub fn last_ms(&self) -> f64 {
        self.samples
            .back()
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate_window() {
        let mut counter = FrameRateCounter::default();
        let start = Instant::now();

        for i in 0..30 {
            assert_eq!(counter.tick(start + Duration::from_millis(i * 33)), None);
        }
        assert_eq!(counter.fps(), 0);

        // 31st frame closes the window at exactly one second
        assert_eq!(counter.tick(start + Duration::from_secs(1)), Some(31));
        assert_eq!(counter.fps(), 31);
    }

    #[test]
    fn test_frame_rate_reset() {
        let mut counter = FrameRateCounter::default();
        let start = Instant::now();
        counter.tick(start);
        counter.tick(start + Duration::from_secs(2));
        assert!(counter.fps() > 0);

        counter.reset();
        assert_eq!(counter.fps(), 0);
    }

    #[test]
    fn test_latency_tracker() {
        let mut tracker = LatencyTracker::new(2);
        assert_eq!(tracker.average_ms(), 0.0);

        tracker.record(Duration::from_millis(10));
        tracker.record(Duration::from_millis(20));
        tracker.record(Duration::from_millis(40));
        assert!((tracker.average_ms() - 30.0).abs() < 1e-9);
        assert!((tracker.last_ms() - 40.0).abs() < 1e-9);
    }
}
