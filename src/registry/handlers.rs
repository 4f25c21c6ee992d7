//! Per-endpoint callback bindings

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Error, HandlerError};

use super::frame::{EndpointId, FrameEvent};

/// Callback invoked for every frame dispatched to an endpoint
pub type FrameHandler = Arc<dyn Fn(&FrameEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Callback invoked when an endpoint's frame handler fails
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Handlers bound to one endpoint
#[derive(Clone, Default)]
pub struct HandlerBinding {
    pub frame: Option<FrameHandler>,
    pub error: Option<ErrorHandler>,
}

impl HandlerBinding {
    fn is_empty(&self) -> bool {
        self.frame.is_none() && self.error.is_none()
    }
}

/// Registry of frame and error handlers
///
/// Re-registering replaces the previous handler of the same kind.
pub struct HandlerRegistry {
    bindings: RwLock<HashMap<EndpointId, HandlerBinding>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Bind the frame handler for an endpoint
    pub async fn set_frame_handler<F>(&self, endpoint: EndpointId, handler: F)
    where
        F: Fn(&FrameEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler: FrameHandler = Arc::new(handler);
        let replaced = self
            .bindings
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .frame
            .replace(handler)
            .is_some();

        tracing::debug!(endpoint = %endpoint, replaced, "Frame handler registered");
    }

    /// Bind the error handler for an endpoint
    pub async fn set_error_handler<F>(&self, endpoint: EndpointId, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(handler);
        let replaced = self
            .bindings
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .error
            .replace(handler)
            .is_some();

        tracing::debug!(endpoint = %endpoint, replaced, "Error handler registered");
    }

    /// Current frame handler, cloned out so it can be called without the lock
    pub async fn frame_handler(&self, endpoint: EndpointId) -> Option<FrameHandler> {
        self.bindings.read().await.get(&endpoint)?.frame.clone()
    }

    /// Current error handler, cloned out so it can be called without the lock
    pub async fn error_handler(&self, endpoint: EndpointId) -> Option<ErrorHandler> {
        self.bindings.read().await.get(&endpoint)?.error.clone()
    }

    /// Drop every handler bound to an endpoint
    pub async fn clear(&self, endpoint: EndpointId) -> bool {
        let removed = self.bindings.write().await.remove(&endpoint);
        removed.is_some_and(|binding| !binding.is_empty())
    }

    /// Check if an endpoint has any handler bound
    pub async fn is_bound(&self, endpoint: EndpointId) -> bool {
        self.bindings
            .read()
            .await
            .get(&endpoint)
            .is_some_and(|binding| !binding.is_empty())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
