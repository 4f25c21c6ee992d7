//! Scripted control plane for unit tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::registry::{EndpointId, SessionOptions};

use super::control::{ControlPlane, ControlResponse};

/// Control plane whose answers are set up by the test
#[derive(Default)]
pub(crate) struct ScriptedControlPlane {
    failures: Mutex<HashMap<(&'static str, EndpointId), String>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    calls: Mutex<Vec<(&'static str, EndpointId)>>,
}

impl ScriptedControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail for `endpoint` with `message`
    pub fn fail(&self, operation: &'static str, endpoint: EndpointId, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((operation, endpoint), message.to_string());
    }

    /// Delay every call to `operation`
    pub fn delay(&self, operation: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(operation, delay);
    }

    pub fn calls(&self) -> Vec<(&'static str, EndpointId)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    async fn respond(&self, operation: &'static str, endpoint: EndpointId) -> ControlResponse {
        self.calls.lock().unwrap().push((operation, endpoint));

        let delay = self.delays.lock().unwrap().get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get(&(operation, endpoint))
            .cloned();
        match failure {
            Some(message) => ControlResponse::failed(message),
            None => ControlResponse::ok(),
        }
    }
}

#[async_trait]
impl ControlPlane for ScriptedControlPlane {
    async fn start_session(
        &self,
        endpoint: EndpointId,
        _options: &SessionOptions,
    ) -> ControlResponse {
        self.respond("start_session", endpoint).await
    }

    async fn stop_session(&self, endpoint: EndpointId) -> ControlResponse {
        self.respond("stop_session", endpoint).await
    }

    async fn pause_session(&self, endpoint: EndpointId) -> ControlResponse {
        self.respond("pause_session", endpoint).await
    }

    async fn resume_session(&self, endpoint: EndpointId) -> ControlResponse {
        self.respond("resume_session", endpoint).await
    }

    async fn update_session_config(
        &self,
        endpoint: EndpointId,
        _options: &SessionOptions,
    ) -> ControlResponse {
        self.respond("update_session_config", endpoint).await
    }

    async fn check_health(&self, endpoint: EndpointId) -> ControlResponse {
        self.respond("check_health", endpoint).await
    }

    async fn commit_active_endpoint(&self, endpoint: EndpointId) -> ControlResponse {
        self.respond("commit_active_endpoint", endpoint).await
    }

    async fn quiesce_endpoint(&self, endpoint: EndpointId) -> ControlResponse {
        self.respond("quiesce_endpoint", endpoint).await
    }
}
