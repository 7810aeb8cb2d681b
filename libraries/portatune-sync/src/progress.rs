//! Throughput and ETA estimation for a transcode batch
//!
//! Workers report a job's estimated duration when they *start* it, so the
//! raw started total runs ahead of reality by however much audio is still
//! in flight. The estimator keeps a small window of recent starts and
//! counts half of it as not-yet-done, which smooths the ETA without having
//! to know when individual jobs finish.

use std::collections::VecDeque;
use std::time::Duration;

const WINDOW_SIZE: usize = 4;

/// A point-in-time progress reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Fraction of the batch's audio accounted as done, 0.0..=1.0
    pub fraction_done: f64,

    /// Seconds of audio processed per wall-clock second
    pub speed: f64,

    /// Estimated wall-clock time to finish the batch
    pub remaining: Duration,
}

/// Tracks completed audio seconds against a batch total.
#[derive(Debug)]
pub struct ProgressEstimator {
    total_seconds: f64,
    started_seconds: f64,
    window: VecDeque<f64>,
}

impl ProgressEstimator {
    /// Create an estimator for a batch totalling `total_seconds` of audio
    pub fn new(total_seconds: f64) -> Self {
        Self {
            total_seconds,
            started_seconds: 0.0,
            window: VecDeque::with_capacity(WINDOW_SIZE),
        }
    }

    /// Record that a job of `duration_seconds` has been handed to a worker
    pub fn record_started(&mut self, duration_seconds: f64) {
        self.started_seconds += duration_seconds;
        if self.window.len() == WINDOW_SIZE {
            self.window.pop_front();
        }
        self.window.push_back(duration_seconds);
    }

    /// Audio seconds counted as completed: everything started, minus the
    /// newer half of the recent-starts window.
    pub fn seconds_done(&self) -> f64 {
        let in_flight: f64 = self
            .window
            .iter()
            .skip(self.window.len().div_ceil(2))
            .sum();
        self.started_seconds - in_flight
    }

    /// Total audio seconds in the batch
    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    /// Compute a snapshot after `elapsed` wall-clock time.
    ///
    /// Returns `None` until enough work has completed to make a rate
    /// meaningful.
    pub fn snapshot(&self, elapsed: Duration) -> Option<ProgressSnapshot> {
        let done = self.seconds_done();
        let elapsed_secs = elapsed.as_secs_f64();
        if done <= 0.0 || elapsed_secs <= 0.0 || self.total_seconds <= 0.0 {
            return None;
        }
        let speed = done / elapsed_secs;
        let remaining_audio = (self.total_seconds - done).max(0.0);
        Some(ProgressSnapshot {
            fraction_done: (done / self.total_seconds).min(1.0),
            speed,
            remaining: Duration::from_secs_f64(remaining_audio / speed),
        })
    }
}
