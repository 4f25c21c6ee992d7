//! Session and handler registries
//!
//! The registry owns the per-endpoint state of the multiplexer: one
//! [`SessionRecord`] per started endpoint and at most one frame handler and one
//! error handler per endpoint.
//!
//! # Architecture
//!
//! ```text
//!                   Arc<SessionRegistry>             Arc<HandlerRegistry>
//!              ┌──────────────────────────┐     ┌──────────────────────────┐
//!              │ sessions: HashMap<Id,    │     │ bindings: HashMap<Id,    │
//!              │   SessionRecord {        │     │   HandlerBinding {       │
//!              │     status, options,     │     │     frame, error,        │
//!              │     frame_count, ...     │     │   }                      │
//!              │ >                        │     │ >                        │
//!              └────────────┬─────────────┘     └────────────┬─────────────┘
//!                           │                                │
//!         ┌─────────────────┼────────────────┐               │
//!         │                 │                │               │
//!         ▼                 ▼                ▼               ▼
//!  [LifecycleController] [FrameRouter] ──────────────► handler(frame)
//!  insert / remove /     record_frame()
//!  set_status / merge
//! ```
//!
//! Records are created and removed only by the lifecycle controller; frame
//! counters are bumped only by the router.

pub mod entry;
pub mod frame;
pub mod handlers;
pub mod store;

pub use entry::{SessionOptions, SessionRecord, SessionStatus};
pub use frame::{EndpointId, FrameEvent, FramePayload, InboundMessage};
pub use handlers::{ErrorHandler, FrameHandler, HandlerBinding, HandlerRegistry};
pub use store::SessionRegistry;
