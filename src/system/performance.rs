//! Frame-rate tracking and the pool size tiers it selects.

use std::collections::VecDeque;
use std::fmt;

const HISTORY: usize = 60;
const MEDIUM_BELOW_FPS: f32 = 45.0;
const LOW_BELOW_FPS: f32 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PerformanceMode {
    Low,
    Medium,
    High,
}

impl PerformanceMode {
    pub const fn capacity(self) -> usize {
        match self {
            PerformanceMode::High => 1000,
            PerformanceMode::Medium => 750,
            PerformanceMode::Low => 500,
        }
    }

    /// Multiplier applied to streak counts.
    pub const fn streak_scale(self) -> f32 {
        match self {
            PerformanceMode::High => 1.0,
            PerformanceMode::Medium => 0.75,
            PerformanceMode::Low => 0.5,
        }
    }

    /// Tier for a configured pool size; sizes above Medium count as High.
    pub fn for_pool_size(size: usize) -> Self {
        if size <= PerformanceMode::Low.capacity() {
            PerformanceMode::Low
        } else if size <= PerformanceMode::Medium.capacity() {
            PerformanceMode::Medium
        } else {
            PerformanceMode::High
        }
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PerformanceMode::High => "high",
            PerformanceMode::Medium => "medium",
            PerformanceMode::Low => "low",
        })
    }
}

/// Rolling average over the last 60 frame times.
#[derive(Debug, Default)]
pub struct FpsMonitor {
    samples: VecDeque<f32>,
}

impl FpsMonitor {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY),
        }
    }

    /// Records one frame time in seconds. Non-positive or non-finite times are ignored.
    pub fn record(&mut self, frame_time: f32) {
        if !(frame_time.is_finite() && frame_time > 0.0) {
            return;
        }
        if self.samples.len() == HISTORY {
            self.samples.pop_front();
        }
        self.samples.push_back(1.0 / frame_time);
    }

    pub fn average_fps(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Tier the current average calls for. Only ever steps down from `current`,
    /// and only once a full window of samples has been recorded.
    pub fn recommend(&self, current: PerformanceMode) -> PerformanceMode {
        if self.samples.len() < HISTORY {
            return current;
        }
        let Some(fps) = self.average_fps() else {
            return current;
        };
        if fps < LOW_BELOW_FPS && current != PerformanceMode::Low {
            PerformanceMode::Low
        } else if fps < MEDIUM_BELOW_FPS && current == PerformanceMode::High {
            PerformanceMode::Medium
        } else {
            current
        }
    }
}
