//! Frame dispatch
//!
//! Applies one normalized frame to the registries: account it against the
//! session, fold it into the metrics, then hand it to the endpoint's frame
//! handler. Handler failures (returned errors and panics alike) stop here.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::Error;
use crate::registry::{EndpointId, FrameEvent, HandlerRegistry, InboundMessage, SessionRegistry};
use crate::stats::MetricsAggregator;

/// What happened to a dispatched frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No session for the endpoint; frame dropped
    Discarded,
    /// Counted, no frame handler bound
    Counted,
    /// Counted and delivered to the frame handler
    Delivered,
    /// Counted, but the frame handler failed
    HandlerFailed,
}

/// Routes frames to per-endpoint consumers
pub struct FrameRouter {
    sessions: Arc<SessionRegistry>,
    handlers: Arc<HandlerRegistry>,
    metrics: Arc<MetricsAggregator>,
}

impl FrameRouter {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        handlers: Arc<HandlerRegistry>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            sessions,
            handlers,
            metrics,
        }
    }

    /// Normalize and dispatch an inbound message inline
    ///
    /// Messages that cannot be normalized are logged and discarded.
    pub async fn route(&self, message: InboundMessage) -> DispatchOutcome {
        match message.into_frame_event() {
            Ok(frame) => self.dispatch(frame).await,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed frame message");
                DispatchOutcome::Discarded
            }
        }
    }

    /// Dispatch one frame
    pub async fn dispatch(&self, frame: FrameEvent) -> DispatchOutcome {
        let endpoint = frame.endpoint_id;

        let Some(frame_count) = self.sessions.record_frame(endpoint, frame.timestamp).await else {
            tracing::debug!(
                endpoint = %endpoint,
                frame_number = frame.frame_number,
                "No session for frame, discarding"
            );
            return DispatchOutcome::Discarded;
        };

        let latency_ms = self.metrics.record_frame(frame.timestamp);

        tracing::trace!(
            endpoint = %endpoint,
            frame_number = frame.frame_number,
            frame_count,
            latency_ms,
            "Frame accounted"
        );

        let Some(handler) = self.handlers.frame_handler(endpoint).await else {
            return DispatchOutcome::Counted;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(&frame))) {
            Ok(Ok(())) => DispatchOutcome::Delivered,
            Ok(Err(e)) => {
                self.on_handler_failure(endpoint, frame.frame_number, e.to_string())
                    .await;
                DispatchOutcome::HandlerFailed
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.on_handler_failure(endpoint, frame.frame_number, message)
                    .await;
                DispatchOutcome::HandlerFailed
            }
        }
    }

    async fn on_handler_failure(&self, endpoint: EndpointId, frame_number: u64, message: String) {
        self.metrics.record_error();

        tracing::warn!(
            endpoint = %endpoint,
            frame_number,
            error = %message,
            "Frame handler failed"
        );

        let Some(error_handler) = self.handlers.error_handler(endpoint).await else {
            return;
        };

        let error = Error::HandlerFailure { endpoint, message };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| error_handler(&error))) {
            tracing::warn!(
                endpoint = %endpoint,
                error = %panic_message(payload.as_ref()),
                "Error handler panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
