//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mirror_mux::{ControlPlane, ControlResponse, EndpointId, Multiplexer, SessionOptions};

/// In-memory control plane
///
/// Every endpoint is healthy unless marked otherwise.
#[derive(Default)]
pub struct FakeEditor {
    unhealthy: Mutex<HashSet<EndpointId>>,
    committed: Mutex<Vec<EndpointId>>,
}

impl FakeEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unhealthy(&self, endpoint: EndpointId) {
        self.unhealthy.lock().unwrap().insert(endpoint);
    }

    pub fn committed(&self) -> Vec<EndpointId> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlane for FakeEditor {
    async fn start_session(
        &self,
        _endpoint: EndpointId,
        _options: &SessionOptions,
    ) -> ControlResponse {
        ControlResponse::ok()
    }

    async fn stop_session(&self, _endpoint: EndpointId) -> ControlResponse {
        ControlResponse::ok()
    }

    async fn pause_session(&self, _endpoint: EndpointId) -> ControlResponse {
        ControlResponse::ok()
    }

    async fn resume_session(&self, _endpoint: EndpointId) -> ControlResponse {
        ControlResponse::ok()
    }

    async fn update_session_config(
        &self,
        _endpoint: EndpointId,
        _options: &SessionOptions,
    ) -> ControlResponse {
        ControlResponse::ok()
    }

    async fn check_health(&self, endpoint: EndpointId) -> ControlResponse {
        if self.unhealthy.lock().unwrap().contains(&endpoint) {
            ControlResponse::failed("connection refused")
        } else {
            ControlResponse::ok()
        }
    }

    async fn commit_active_endpoint(&self, endpoint: EndpointId) -> ControlResponse {
        self.committed.lock().unwrap().push(endpoint);
        ControlResponse::ok()
    }
}

/// Install a test subscriber once; honors `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wait until an endpoint's session has counted `count` frames
pub async fn wait_for_frames<C: ControlPlane>(
    mux: &Multiplexer<C>,
    endpoint: EndpointId,
    count: u64,
) {
    for _ in 0..2000 {
        if mux.get_session(endpoint).await.map(|s| s.frame_count) >= Some(count) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("endpoint {endpoint} never reached {count} frames");
}
