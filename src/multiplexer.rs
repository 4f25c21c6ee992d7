//! Multiplexer facade
//!
//! Owns every component and wires them together. One instance per process is
//! typical, but nothing is global: tests build as many as they like.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::MuxConfig;
use crate::error::{Error, HandlerError, Result};
use crate::events::{EventSink, MuxEvent};
use crate::registry::{
    EndpointId, FrameEvent, HandlerRegistry, InboundMessage, SessionOptions, SessionRecord,
    SessionRegistry,
};
use crate::router::{EndpointWorkers, FrameRouter};
use crate::session::{ControlPlane, LifecycleController};
use crate::stats::{MetricsAggregator, MetricsSnapshot};
use crate::switch::{InFlightSwitch, SwitchOrchestrator, SwitchOutcome, SwitchRecord};

/// Session-streaming multiplexer
pub struct Multiplexer<C: ControlPlane> {
    config: MuxConfig,
    client: Arc<C>,
    sessions: Arc<SessionRegistry>,
    handlers: Arc<HandlerRegistry>,
    metrics: Arc<MetricsAggregator>,
    workers: Arc<EndpointWorkers>,
    lifecycle: LifecycleController<C>,
    switches: SwitchOrchestrator<C>,
    events: EventSink,
}

impl<C: ControlPlane> Multiplexer<C> {
    /// Create a multiplexer with the default configuration
    pub fn new(client: C) -> Self {
        Self::with_config(client, MuxConfig::default())
    }

    /// Create a multiplexer with a custom configuration
    pub fn with_config(client: C, config: MuxConfig) -> Self {
        let client = Arc::new(client);
        let sessions = Arc::new(SessionRegistry::new());
        let handlers = Arc::new(HandlerRegistry::new());
        let metrics = Arc::new(MetricsAggregator::with_smoothing(config.latency_smoothing));
        let events = EventSink::new(config.event_capacity);

        let router = Arc::new(FrameRouter::new(
            Arc::clone(&sessions),
            Arc::clone(&handlers),
            Arc::clone(&metrics),
        ));
        let workers = Arc::new(EndpointWorkers::new(
            router,
            Arc::clone(&metrics),
            config.worker_queue_capacity,
        ));

        let lifecycle = LifecycleController::new(
            Arc::clone(&client),
            Arc::clone(&sessions),
            Arc::clone(&handlers),
            Arc::clone(&workers),
            events.clone(),
            config.control_timeout,
        );
        let switches = SwitchOrchestrator::new(
            Arc::clone(&client),
            events.clone(),
            config.control_timeout,
            config.settle_delay,
            config.history_capacity,
        );

        tracing::debug!(
            control_timeout = ?config.control_timeout,
            settle_delay = ?config.settle_delay,
            queue_capacity = config.worker_queue_capacity,
            "Multiplexer created"
        );

        Self {
            config,
            client,
            sessions,
            handlers,
            metrics,
            workers,
            lifecycle,
            switches,
            events,
        }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// The control plane every remote call goes through
    pub fn control_plane(&self) -> &C {
        &self.client
    }

    /// Subscribe to lifecycle and switch events
    pub fn subscribe(&self) -> broadcast::Receiver<MuxEvent> {
        self.events.subscribe()
    }

    // Sessions

    /// Start an endpoint's session and open its dispatch worker
    pub async fn start(
        &self,
        endpoint: EndpointId,
        options: SessionOptions,
    ) -> Result<SessionRecord> {
        self.lifecycle.start(endpoint, options).await
    }

    /// Stop an endpoint's session
    ///
    /// Returns once the endpoint's worker has ended; frames still queued for
    /// the old session are dropped.
    pub async fn stop(&self, endpoint: EndpointId) -> Result<SessionRecord> {
        self.lifecycle.stop(endpoint).await
    }

    pub async fn pause(&self, endpoint: EndpointId) -> Result<()> {
        self.lifecycle.pause(endpoint).await
    }

    pub async fn resume(&self, endpoint: EndpointId) -> Result<()> {
        self.lifecycle.resume(endpoint).await
    }

    /// Merge a partial configuration into an endpoint's options
    pub async fn update_config(
        &self,
        endpoint: EndpointId,
        partial: SessionOptions,
    ) -> Result<SessionOptions> {
        self.lifecycle.update_config(endpoint, partial).await
    }

    pub async fn get_session(&self, endpoint: EndpointId) -> Option<SessionRecord> {
        self.lifecycle.session(endpoint).await
    }

    /// Every live session, ordered by endpoint
    pub async fn get_all_sessions(&self) -> Vec<SessionRecord> {
        self.lifecycle.sessions().await
    }

    // Handlers

    /// Bind the frame handler for an endpoint, replacing any previous one
    pub async fn register_frame_handler<F>(&self, endpoint: EndpointId, handler: F)
    where
        F: Fn(&FrameEvent) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.set_frame_handler(endpoint, handler).await;
    }

    /// Bind the error handler for an endpoint, replacing any previous one
    pub async fn register_error_handler<F>(&self, endpoint: EndpointId, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.handlers.set_error_handler(endpoint, handler).await;
    }

    // Switching

    pub async fn switch_to(&self, endpoint: EndpointId) -> Result<SwitchOutcome> {
        self.switches.switch_to(endpoint).await
    }

    pub async fn cancel_switch(&self) -> Result<()> {
        self.switches.cancel().await
    }

    pub async fn set_active(&self, endpoint: Option<EndpointId>) -> Result<()> {
        self.switches.set_active(endpoint).await
    }

    pub async fn current_active(&self) -> Option<EndpointId> {
        self.switches.current_active().await
    }

    pub async fn switch_in_flight(&self) -> Option<InFlightSwitch> {
        self.switches.in_flight().await
    }

    /// Finished switches, most recent first
    pub async fn switch_history(&self) -> Vec<SwitchRecord> {
        self.switches.history().await
    }

    // Stats

    /// Aggregate counters plus the number of live sessions
    ///
    /// Calling this has no side effects; two calls with no traffic in between
    /// return equal snapshots.
    pub async fn get_stats(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.active_sessions = self.sessions.len().await;
        snapshot
    }

    /// Number of dispatch workers currently running
    pub async fn live_workers(&self) -> usize {
        self.workers.len().await
    }

    // Ingest

    /// Queue one inbound message on its endpoint's worker
    ///
    /// Returns `false` if the frame was not queued: the endpoint has no
    /// session, or its queue is full.
    pub async fn ingest(&self, message: InboundMessage) -> Result<bool> {
        let frame = message.into_frame_event()?;
        Ok(self.workers.submit(frame).await)
    }

    /// Parse and queue one JSON text message
    pub async fn ingest_json(&self, text: &str) -> Result<bool> {
        self.ingest(InboundMessage::from_json(text)?).await
    }

    /// Drain an inbound channel until it closes or `shutdown` resolves
    ///
    /// Malformed messages are logged and skipped. Workers are left running so
    /// frames already queued are still dispatched; call [`shutdown`] to stop
    /// them.
    ///
    /// [`shutdown`]: Multiplexer::shutdown
    pub async fn run_until<F>(&self, mut inbound: mpsc::Receiver<String>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("Multiplexer ingest loop running");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                message = inbound.recv() => {
                    let Some(text) = message else {
                        tracing::info!("Inbound channel closed");
                        break;
                    };

                    if let Err(e) = self.ingest_json(&text).await {
                        tracing::warn!(error = %e, "Discarding inbound message");
                    }
                }
            }
        }
    }

    /// Stop every worker
    ///
    /// Sessions and the active endpoint are left as they are; the remote
    /// endpoints are not contacted.
    pub async fn shutdown(&self) {
        self.workers.shutdown().await;
        tracing::info!(
            sessions = self.sessions.len().await,
            "Multiplexer shut down"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use crate::session::mock::ScriptedControlPlane;

    use super::*;

    const A: EndpointId = EndpointId::new(8080);

    fn direct_frame(port: u16, frame_number: u64) -> String {
        format!(r#"{{"endpointId":{port},"frameNumber":{frame_number},"timestamp":0}}"#)
    }

    async fn wait_for_frames(
        mux: &Multiplexer<ScriptedControlPlane>,
        endpoint: EndpointId,
        count: u64,
    ) {
        for _ in 0..1000 {
            if mux.get_session(endpoint).await.map(|s| s.frame_count) >= Some(count) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("endpoint {endpoint} never reached {count} frames");
    }

    #[tokio::test]
    async fn test_ingest_json_reaches_handler() {
        let mux = Multiplexer::new(ScriptedControlPlane::new());
        let seen = Arc::new(AtomicU64::new(0));
        mux.start(A, SessionOptions::new()).await.unwrap();

        let counter = Arc::clone(&seen);
        mux.register_frame_handler(A, move |frame| {
            counter.store(frame.frame_number, Ordering::SeqCst);
            Ok(())
        })
        .await;

        let topic_frame =
            r#"{"topic":"mirror-8080-frames","data":{"frameNumber":7,"timestamp":0,"payload":""}}"#;
        let accepted = mux.ingest_json(topic_frame).await.unwrap();
        assert!(accepted);

        wait_for_frames(&mux, A, 1).await;
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(mux.get_stats().await.total_frames_received, 1);
    }

    #[tokio::test]
    async fn test_ingest_json_rejects_garbage() {
        let mux = Multiplexer::new(ScriptedControlPlane::new());

        assert!(matches!(
            mux.ingest_json("not json").await,
            Err(Error::InvalidMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_idempotent() {
        let mux = Multiplexer::new(ScriptedControlPlane::new());
        mux.start(A, SessionOptions::new()).await.unwrap();

        let first = mux.get_stats().await;
        let second = mux.get_stats().await;

        assert_eq!(first, second);
        assert_eq!(first.active_sessions, 1);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let mux = Arc::new(Multiplexer::new(ScriptedControlPlane::new()));
        mux.start(A, SessionOptions::new()).await.unwrap();

        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let running = {
            let mux = Arc::clone(&mux);
            tokio::spawn(async move {
                mux.run_until(rx, async {
                    let _ = stop_rx.await;
                })
                .await
            })
        };

        tx.send("garbage".to_string()).await.unwrap();
        for n in 1..=3 {
            tx.send(direct_frame(8080, n)).await.unwrap();
        }

        wait_for_frames(&mux, A, 3).await;
        stop_tx.send(()).unwrap();
        running.await.unwrap();

        mux.shutdown().await;
        assert_eq!(mux.get_stats().await.total_frames_received, 3);
    }

    #[tokio::test]
    async fn test_stop_retires_worker() {
        let mux = Multiplexer::new(ScriptedControlPlane::new());
        mux.start(A, SessionOptions::new()).await.unwrap();
        let message = InboundMessage::from_json(&direct_frame(8080, 1)).unwrap();
        assert!(mux.ingest(message).await.unwrap());
        wait_for_frames(&mux, A, 1).await;
        assert_eq!(mux.live_workers().await, 1);

        mux.stop(A).await.unwrap();

        assert_eq!(mux.live_workers().await, 0);
        assert!(mux.get_all_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_frames_without_session_spawn_nothing() {
        let mux = Multiplexer::new(ScriptedControlPlane::new());
        mux.start(A, SessionOptions::new()).await.unwrap();
        mux.stop(A).await.unwrap();

        // Late frame for the stopped endpoint, then endpoints never started
        assert!(!mux.ingest_json(&direct_frame(8080, 2)).await.unwrap());
        for port in 3000..3500 {
            assert!(!mux.ingest_json(&direct_frame(port, 1)).await.unwrap());
        }

        assert_eq!(mux.live_workers().await, 0);
        let stats = mux.get_stats().await;
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.total_frames_received, 0);
        assert_eq!(stats.dropped_frames, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_does_not_inherit_backlog() {
        let mux = Multiplexer::new(ScriptedControlPlane::new());
        mux.start(A, SessionOptions::new()).await.unwrap();
        mux.register_frame_handler(A, |_| {
            std::thread::sleep(Duration::from_millis(10));
            Ok(())
        })
        .await;

        for n in 1..=20 {
            assert!(mux.ingest_json(&direct_frame(8080, n)).await.unwrap());
        }
        wait_for_frames(&mux, A, 1).await;

        let stopped = mux.stop(A).await.unwrap();
        assert!(stopped.frame_count < 20);
        mux.start(A, SessionOptions::new()).await.unwrap();
        assert_eq!(mux.live_workers().await, 1);

        for n in 100..103 {
            assert!(mux.ingest_json(&direct_frame(8080, n)).await.unwrap());
        }
        wait_for_frames(&mux, A, 3).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Only the new session's frames are credited to the new record
        assert_eq!(mux.get_session(A).await.unwrap().frame_count, 3);
    }
}
