//! Statistics and metrics for frame streaming

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default smoothing factor for the latency moving average
pub const DEFAULT_LATENCY_SMOOTHING: f64 = 0.1;

/// Process-wide frame counters
///
/// Counters are plain atomics so the router can bump them from any worker
/// without locking. The latency average is stored as `f64` bits and folded
/// with a compare-and-swap loop.
#[derive(Debug)]
pub struct MetricsAggregator {
    /// Frames accepted for a live session
    total_frames_received: AtomicU64,
    /// Handler failures
    total_errors: AtomicU64,
    /// Frames dropped because an endpoint's queue was full
    dropped_frames: AtomicU64,
    /// Exponential moving average of capture-to-dispatch latency, as f64 bits
    average_latency_bits: AtomicU64,
    /// Smoothing factor for the moving average
    smoothing: f64,
    /// When this aggregator was created
    process_start_time: DateTime<Utc>,
}

impl MetricsAggregator {
    /// Create a new aggregator with the default smoothing factor
    pub fn new() -> Self {
        Self::with_smoothing(DEFAULT_LATENCY_SMOOTHING)
    }

    /// Create a new aggregator with a custom smoothing factor
    pub fn with_smoothing(smoothing: f64) -> Self {
        Self {
            total_frames_received: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            average_latency_bits: AtomicU64::new(0f64.to_bits()),
            smoothing,
            process_start_time: Utc::now(),
        }
    }

    /// Account for one received frame captured at `timestamp_ms`
    ///
    /// Returns the latency sample that was folded in.
    pub fn record_frame(&self, timestamp_ms: i64) -> f64 {
        self.total_frames_received.fetch_add(1, Ordering::Relaxed);

        let latency = (Utc::now().timestamp_millis() - timestamp_ms).max(0) as f64;
        self.fold_latency(latency);
        latency
    }

    /// Fold a latency sample into the moving average
    pub fn fold_latency(&self, latency_ms: f64) {
        let alpha = self.smoothing;
        // The closure always returns Some, so this cannot fail.
        let _ = self
            .average_latency_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let avg = f64::from_bits(bits);
                Some((avg * (1.0 - alpha) + latency_ms * alpha).to_bits())
            });
    }

    /// Account for a failed handler invocation
    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for a frame dropped before dispatch
    pub fn record_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the aggregator was created
    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.process_start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Create a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_frames_received: self.total_frames_received.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            average_latency_ms: f64::from_bits(self.average_latency_bits.load(Ordering::Acquire)),
            process_start_time: self.process_start_time,
            active_sessions: 0,
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of metrics
///
/// Holds the start time rather than an uptime so two snapshots taken with no
/// frames in between compare equal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_frames_received: u64,
    pub total_errors: u64,
    pub dropped_frames: u64,
    pub average_latency_ms: f64,
    pub process_start_time: DateTime<Utc>,
    /// Filled in by the multiplexer; zero on a bare aggregator snapshot
    pub active_sessions: usize,
}

impl MetricsSnapshot {
    /// Uptime as of now
    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.process_start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
