//! Frame and error counters

pub mod metrics;

pub use metrics::{MetricsAggregator, MetricsSnapshot, DEFAULT_LATENCY_SMOOTHING};
