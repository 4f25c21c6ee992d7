//! Event publication
//!
//! Lifecycle and switch progress are published on a `tokio::sync::broadcast`
//! channel. Delivery is fire-and-forget: emitting with no subscribers is not an
//! error, and a subscriber that falls behind sees `RecvError::Lagged`.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::registry::EndpointId;
use crate::switch::{PhaseDurations, SwitchPhase};

/// Event emitted by the multiplexer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum MuxEvent {
    #[serde(rename_all = "camelCase")]
    SwitchStarted {
        from_endpoint: Option<EndpointId>,
        to_endpoint: EndpointId,
    },
    SwitchProgress {
        phase: SwitchPhase,
        percent: u8,
    },
    #[serde(rename_all = "camelCase")]
    SwitchComplete {
        from_endpoint: Option<EndpointId>,
        to_endpoint: EndpointId,
        durations: PhaseDurations,
    },
    #[serde(rename_all = "camelCase")]
    SwitchError {
        to_endpoint: EndpointId,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    SessionStarted { endpoint_id: EndpointId },
    #[serde(rename_all = "camelCase")]
    SessionStopped { endpoint_id: EndpointId },
    #[serde(rename_all = "camelCase")]
    SessionPaused { endpoint_id: EndpointId },
    #[serde(rename_all = "camelCase")]
    SessionResumed { endpoint_id: EndpointId },
    #[serde(rename_all = "camelCase")]
    SessionConfigUpdated { endpoint_id: EndpointId },
}

impl MuxEvent {
    /// Event name as seen by subscribers
    pub fn name(&self) -> &'static str {
        match self {
            MuxEvent::SwitchStarted { .. } => "switchStarted",
            MuxEvent::SwitchProgress { .. } => "switchProgress",
            MuxEvent::SwitchComplete { .. } => "switchComplete",
            MuxEvent::SwitchError { .. } => "switchError",
            MuxEvent::SessionStarted { .. } => "sessionStarted",
            MuxEvent::SessionStopped { .. } => "sessionStopped",
            MuxEvent::SessionPaused { .. } => "sessionPaused",
            MuxEvent::SessionResumed { .. } => "sessionResumed",
            MuxEvent::SessionConfigUpdated { .. } => "sessionConfigUpdated",
        }
    }
}

/// Broadcast sink for [`MuxEvent`]s
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<MuxEvent>,
}

impl EventSink {
    /// Create a sink buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<MuxEvent> {
        self.tx.subscribe()
    }

    /// Publish an event
    ///
    /// Returns the number of subscribers that received it, or 0 if there are none.
    pub fn emit(&self, event: MuxEvent) -> usize {
        tracing::trace!(event = event.name(), "Emitting event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
