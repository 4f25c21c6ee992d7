//! Session lifecycle controller
//!
//! Start, stop, pause, resume and reconfigure endpoint sessions. The control
//! plane is authoritative: local state changes only after a positive response,
//! so a failed call leaves the registry exactly as it was.
//!
//! A session owns its dispatch worker and handler bindings. Both are released
//! on stop, under the same per-endpoint lock as the record itself.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::events::{EventSink, MuxEvent};
use crate::registry::{
    EndpointId, HandlerRegistry, SessionOptions, SessionRecord, SessionRegistry, SessionStatus,
};
use crate::router::EndpointWorkers;

use super::control::{call_with_timeout, ControlPlane, ControlResponse};

/// Drives endpoint sessions through the control plane
pub struct LifecycleController<C: ControlPlane> {
    client: Arc<C>,
    sessions: Arc<SessionRegistry>,
    handlers: Arc<HandlerRegistry>,
    workers: Arc<EndpointWorkers>,
    events: EventSink,
    timeout: Duration,
    /// Serializes operations per endpoint; different endpoints never wait on each other
    endpoint_locks: Mutex<HashMap<EndpointId, Arc<Mutex<()>>>>,
}

impl<C: ControlPlane> LifecycleController<C> {
    pub fn new(
        client: Arc<C>,
        sessions: Arc<SessionRegistry>,
        handlers: Arc<HandlerRegistry>,
        workers: Arc<EndpointWorkers>,
        events: EventSink,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            sessions,
            handlers,
            workers,
            events,
            timeout,
            endpoint_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Start streaming from an endpoint
    pub async fn start(
        &self,
        endpoint: EndpointId,
        options: SessionOptions,
    ) -> Result<SessionRecord> {
        let _guard = self.lock_endpoint(endpoint).await;

        if self.sessions.contains(endpoint).await {
            tracing::warn!(endpoint = %endpoint, "Start rejected: session already exists");
            return Err(Error::AlreadyActive(endpoint));
        }

        self.call("start", endpoint, self.client.start_session(endpoint, &options))
            .await?;

        let record = self.sessions.insert(endpoint, options).await?;
        self.workers.open(endpoint).await;
        self.events.emit(MuxEvent::SessionStarted { endpoint_id: endpoint });

        Ok(record)
    }

    /// Stop streaming from an endpoint
    ///
    /// Removes the session record, every handler bound to the endpoint and
    /// its dispatch worker. Returns the final state of the record.
    pub async fn stop(&self, endpoint: EndpointId) -> Result<SessionRecord> {
        let _guard = self.lock_endpoint(endpoint).await;
        self.require_session(endpoint).await?;

        self.call("stop", endpoint, self.client.stop_session(endpoint))
            .await?;

        let record = self
            .sessions
            .remove(endpoint)
            .await
            .ok_or(Error::NotFound(endpoint))?;
        let had_handlers = self.handlers.clear(endpoint).await;
        let had_worker = self.workers.retire(endpoint).await;

        tracing::debug!(
            endpoint = %endpoint,
            had_handlers,
            had_worker,
            "Session resources released"
        );
        self.events.emit(MuxEvent::SessionStopped { endpoint_id: endpoint });

        Ok(record)
    }

    /// Pause an endpoint's stream
    ///
    /// Always asks the control plane, even if the session is already paused.
    pub async fn pause(&self, endpoint: EndpointId) -> Result<()> {
        let _guard = self.lock_endpoint(endpoint).await;
        self.require_session(endpoint).await?;

        self.call("pause", endpoint, self.client.pause_session(endpoint))
            .await?;

        self.sessions.set_status(endpoint, SessionStatus::Paused).await?;
        tracing::info!(endpoint = %endpoint, "Session paused");
        self.events.emit(MuxEvent::SessionPaused { endpoint_id: endpoint });

        Ok(())
    }

    /// Resume an endpoint's stream
    ///
    /// Always asks the control plane, even if the session is already active.
    pub async fn resume(&self, endpoint: EndpointId) -> Result<()> {
        let _guard = self.lock_endpoint(endpoint).await;
        self.require_session(endpoint).await?;

        self.call("resume", endpoint, self.client.resume_session(endpoint))
            .await?;

        self.sessions.set_status(endpoint, SessionStatus::Active).await?;
        tracing::info!(endpoint = %endpoint, "Session resumed");
        self.events.emit(MuxEvent::SessionResumed { endpoint_id: endpoint });

        Ok(())
    }

    /// Merge a partial configuration into an endpoint's options
    ///
    /// Returns the merged options.
    pub async fn update_config(
        &self,
        endpoint: EndpointId,
        partial: SessionOptions,
    ) -> Result<SessionOptions> {
        let _guard = self.lock_endpoint(endpoint).await;
        self.require_session(endpoint).await?;

        self.call(
            "update_config",
            endpoint,
            self.client.update_session_config(endpoint, &partial),
        )
        .await?;

        let options = self.sessions.merge_options(endpoint, &partial).await?;
        tracing::info!(
            endpoint = %endpoint,
            updated = partial.len(),
            total = options.len(),
            "Session options updated"
        );
        self.events
            .emit(MuxEvent::SessionConfigUpdated { endpoint_id: endpoint });

        Ok(options)
    }

    /// Snapshot one session
    pub async fn session(&self, endpoint: EndpointId) -> Option<SessionRecord> {
        self.sessions.get(endpoint).await
    }

    /// Snapshot every session
    pub async fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.all().await
    }

    async fn require_session(&self, endpoint: EndpointId) -> Result<()> {
        if self.sessions.contains(endpoint).await {
            Ok(())
        } else {
            Err(Error::NotFound(endpoint))
        }
    }

    async fn lock_endpoint(&self, endpoint: EndpointId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.endpoint_locks.lock().await;
            Arc::clone(locks.entry(endpoint).or_default())
        };
        lock.lock_owned().await
    }

    async fn call<F>(&self, operation: &'static str, endpoint: EndpointId, request: F) -> Result<()>
    where
        F: Future<Output = ControlResponse>,
    {
        let result = call_with_timeout(operation, endpoint, self.timeout, request).await;

        if let Err(ref e) = result {
            tracing::warn!(
                endpoint = %endpoint,
                operation,
                error = %e,
                "Control-plane call failed"
            );
        }

        result
    }
}
