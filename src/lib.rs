//! Per-endpoint frame streaming multiplexer
//!
//! Many remote endpoints (one per editor window, keyed by port) stream frames
//! over one shared channel. The multiplexer tracks a session per endpoint,
//! routes each frame to that endpoint's handler, and moves "active" status
//! between endpoints through a staged switch.
//!
//! ```text
//!                       ┌──────────────────────────── Multiplexer ───────────────────────────┐
//!  inbound JSON ──────► │ InboundMessage ─► EndpointWorkers ─► FrameRouter ─► frame handler  │
//!                       │                   (one task/endpoint)    │                         │
//!                       │                                          ├─► SessionRegistry       │
//!                       │                                          └─► MetricsAggregator     │
//!                       │                                                                    │
//!  start/stop/pause ──► │ LifecycleController ──┐                                            │
//!  switch_to/cancel ──► │ SwitchOrchestrator ───┼──► ControlPlane (remote)                   │
//!                       │                       └──► EventSink ──► subscribers               │
//!                       └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mirror_mux::{ControlPlane, EndpointId, Multiplexer, MuxConfig, SessionOptions};
//!
//! async fn run<C: ControlPlane>(client: C) -> mirror_mux::Result<()> {
//!     let mux = Multiplexer::with_config(client, MuxConfig::default());
//!     let endpoint = EndpointId::new(8080);
//!
//!     mux.start(endpoint, SessionOptions::new().with("quality", 80)).await?;
//!     mux.register_frame_handler(endpoint, |frame| {
//!         println!("frame {} from {}", frame.frame_number, frame.endpoint_id);
//!         Ok(())
//!     })
//!     .await;
//!
//!     mux.switch_to(endpoint).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod multiplexer;
pub mod registry;
pub mod router;
pub mod session;
pub mod stats;
pub mod switch;

pub use config::MuxConfig;
pub use error::{Error, HandlerError, Result};
pub use events::{EventSink, MuxEvent};
pub use multiplexer::Multiplexer;
pub use registry::{
    EndpointId, FrameEvent, FramePayload, InboundMessage, SessionOptions, SessionRecord,
    SessionStatus,
};
pub use session::{ControlPlane, ControlResponse};
pub use stats::MetricsSnapshot;
pub use switch::{PhaseDurations, SwitchOutcome, SwitchPhase, SwitchRecord};
