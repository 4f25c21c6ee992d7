//! Frame routing
//!
//! ```text
//!   inbound JSON ──► InboundMessage ──► FrameEvent
//!                                          │
//!                                 EndpointWorkers::submit()
//!                    ┌─────────────────────┼─────────────────────┐
//!                    ▼                     ▼                     ▼
//!              [worker 8080]         [worker 9090]         [worker 3000]
//!                    │                     │                     │
//!                    └──────► FrameRouter::dispatch() ◄──────────┘
//!                              sessions + metrics + handler
//! ```

pub mod dispatch;
pub mod worker;

pub use dispatch::{DispatchOutcome, FrameRouter};
pub use worker::EndpointWorkers;
