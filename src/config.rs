//! Multiplexer configuration

use std::time::Duration;

use crate::stats::DEFAULT_LATENCY_SMOOTHING;

/// Default budget for a single control-plane call
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default settle delay before a switch is re-verified
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Multiplexer configuration options
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Budget for each control-plane call before it fails with `Timeout`
    pub control_timeout: Duration,

    /// Delay between commit and re-verification of a switch
    pub settle_delay: Duration,

    /// Number of finished switches kept in history
    pub history_capacity: usize,

    /// Frames buffered per endpoint before new frames are dropped
    pub worker_queue_capacity: usize,

    /// Events buffered per subscriber before slow subscribers lag
    pub event_capacity: usize,

    /// Smoothing factor for the latency moving average
    pub latency_smoothing: f64,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            history_capacity: 20,
            worker_queue_capacity: 256,
            event_capacity: 256,
            latency_smoothing: DEFAULT_LATENCY_SMOOTHING,
        }
    }
}

impl MuxConfig {
    /// Set the control-plane call timeout
    pub fn control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    /// Set the switch settle delay
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set switch history capacity (at least 1)
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Set the per-endpoint frame queue capacity (at least 1)
    pub fn worker_queue_capacity(mut self, capacity: usize) -> Self {
        self.worker_queue_capacity = capacity.max(1);
        self
    }

    /// Set the event channel capacity (at least 1)
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the latency smoothing factor, clamped to (0, 1]
    pub fn latency_smoothing(mut self, alpha: f64) -> Self {
        self.latency_smoothing = if alpha.is_finite() {
            alpha.clamp(f64::EPSILON, 1.0)
        } else {
            DEFAULT_LATENCY_SMOOTHING
        };
        self
    }
}
