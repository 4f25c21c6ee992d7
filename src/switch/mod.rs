//! Active-endpoint switching
//!
//! ```text
//!  Idle ─► Validating ─► Preparing ─► Switching ─► Verifying ─► Complete
//!            │  10%        │  30%        │  60%        90%         100%
//!            └─────────────┴─────────────┴──────────► Failed
//!          (cancellable)  (cancellable)  (commit: point of no return)
//! ```

pub mod history;
pub mod orchestrator;
pub mod state;

pub use history::SwitchHistory;
pub use orchestrator::{InFlightSwitch, SwitchOrchestrator, SwitchOutcome};
pub use state::{PhaseDurations, SwitchPhase, SwitchRecord};
