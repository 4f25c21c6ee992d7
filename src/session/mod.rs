//! Endpoint session lifecycle
//!
//! [`LifecycleController`] keeps the session registry consistent with the
//! remote state reported by a [`ControlPlane`].

pub mod control;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod mock;

pub use control::{ControlPlane, ControlResponse};
pub use lifecycle::LifecycleController;
