//! Rolling statistics of behavior loop cycles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

/// Stats shared between a loop and whoever reports on it.
pub type SharedStats = Arc<Mutex<CycleStats>>;

#[derive(Debug, Clone, Copy)]
struct CycleSample {
    duration: Duration,
    entities: usize,
}

/// Rolling window of cycle durations and fan-out sizes.
#[derive(Debug)]
pub struct CycleStats {
    window_size: usize,
    samples: VecDeque<CycleSample>,
    total_cycles: u64,
    slow_cycles: u64,
}

/// Point-in-time view of [`CycleStats`], in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSnapshot {
    pub total_cycles: u64,
    pub slow_cycles: u64,
    pub last_ms: Option<f64>,
    pub average_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub last_entities: usize,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new(100)
    }
}

impl CycleStats {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            samples: VecDeque::with_capacity(window_size),
            total_cycles: 0,
            slow_cycles: 0,
        }
    }

    pub fn shared(window_size: usize) -> SharedStats {
        Arc::new(Mutex::new(Self::new(window_size)))
    }

    /// Record one cycle. `slow` marks a cycle that overran its frame.
    pub fn record(&mut self, duration: Duration, entities: usize, slow: bool) {
        if self.samples.len() >= self.window_size {
            self.samples.pop_front();
        }
        self.samples.push_back(CycleSample { duration, entities });
        self.total_cycles += 1;
        if slow {
            self.slow_cycles += 1;
        }
    }

    pub fn last(&self) -> Option<Duration> {
        self.samples.back().map(|s| s.duration)
    }

    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: Duration = self.samples.iter().map(|s| s.duration).sum();
        Some(sum / self.samples.len() as u32)
    }

    pub fn max(&self) -> Option<Duration> {
        self.samples.iter().map(|s| s.duration).max()
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        let ms = |d: Duration| d.as_micros() as f64 / 1000.0;
        CycleSnapshot {
            total_cycles: self.total_cycles,
            slow_cycles: self.slow_cycles,
            last_ms: self.last().map(ms),
            average_ms: self.average().map(ms),
            max_ms: self.max().map(ms),
            last_entities: self.samples.back().map_or(0, |s| s.entities),
        }
    }
}
