//! Session record and state types
//!
//! This module defines the per-endpoint state stored in the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::frame::EndpointId;

/// State of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Endpoint is streaming frames
    Active,
    /// Endpoint has been asked to hold frames
    Paused,
    /// Session was torn down (only seen on the snapshot returned by stop)
    Stopped,
}

/// Configuration bag attached to a session
///
/// Opaque to the multiplexer; updates merge key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionOptions(Map<String, Value>);

impl SessionOptions {
    /// Create an empty options bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single option
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up an option
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Merge `other` into this bag, overwriting keys present in both
    pub fn merge(&mut self, other: &SessionOptions) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for SessionOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Record for a single endpoint's streaming session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Owning endpoint
    pub endpoint_id: EndpointId,
    /// Current status
    pub status: SessionStatus,
    /// Options the session was started with, plus merged updates
    pub options: SessionOptions,
    /// Frames dispatched for this endpoint
    pub frame_count: u64,
    /// Timestamp carried by the most recent frame (ms since epoch)
    pub last_frame_timestamp: Option<i64>,
    /// When the session was created
    pub started_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a new active record
    pub(crate) fn new(endpoint_id: EndpointId, options: SessionOptions) -> Self {
        Self {
            endpoint_id,
            status: SessionStatus::Active,
            options,
            frame_count: 0,
            last_frame_timestamp: None,
            started_at: Utc::now(),
        }
    }

    /// Check if the session is streaming
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Account for one dispatched frame
    pub(crate) fn on_frame(&mut self, timestamp: i64) {
        self.frame_count += 1;
        self.last_frame_timestamp = Some(timestamp);
    }
}
