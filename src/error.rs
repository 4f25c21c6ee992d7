//! Error types
//!
//! One taxonomy shared by the lifecycle controller, the switch orchestrator
//! and the frame router.

use std::time::Duration;

use crate::registry::EndpointId;
use crate::switch::SwitchPhase;

/// Error type for multiplexer operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Operation on an endpoint with no session record
    #[error("no session for endpoint {0}")]
    NotFound(EndpointId),

    /// Start on an endpoint that already has a session record
    #[error("endpoint {0} already has a session")]
    AlreadyActive(EndpointId),

    /// The control plane reported a failure; the message is passed through as-is
    #[error("{0}")]
    RemoteFailure(String),

    /// A control-plane call exceeded its budget
    #[error("{operation} for endpoint {endpoint} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        endpoint: EndpointId,
        after: Duration,
    },

    /// Switch cancelled by the caller
    #[error("cancelled")]
    Cancelled,

    /// Switch target failed its health check
    #[error("target unavailable")]
    TargetUnavailable(EndpointId),

    /// A registered frame handler returned an error or panicked
    #[error("frame handler for endpoint {endpoint} failed: {message}")]
    HandlerFailure {
        endpoint: EndpointId,
        message: String,
    },

    /// Another switch is already running
    #[error("switch to endpoint {0} already in progress")]
    SwitchInProgress(EndpointId),

    /// The in-flight switch is past the point where it can be cancelled
    #[error("switch cannot be cancelled in phase {0}")]
    NotCancellable(SwitchPhase),

    /// Cancel requested with no switch running
    #[error("no switch in flight")]
    NoSwitchInFlight,

    /// Inbound message could not be normalized into a frame
    #[error("invalid inbound message: {0}")]
    InvalidMessage(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by user-supplied frame handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
