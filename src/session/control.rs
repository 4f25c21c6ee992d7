//! Control-plane boundary
//!
//! The multiplexer never talks to endpoints directly. Every remote effect goes
//! through a [`ControlPlane`] implementation, and only a positive
//! [`ControlResponse`] counts as success.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::{EndpointId, SessionOptions};

/// Outcome of a single control-plane call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    /// A successful response
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failed response carrying the remote's message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }

    /// Convert into a crate result, passing the remote message through verbatim
    pub fn into_result(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(Error::RemoteFailure(
                self.error
                    .unwrap_or_else(|| "control plane reported failure".to_string()),
            ))
        }
    }
}

/// Remote control plane for endpoint sessions
///
/// Implementations are expected to map transport errors to a failed
/// [`ControlResponse`] rather than panic. Timeouts are applied by the caller.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Ask the endpoint to start streaming with the given options
    async fn start_session(
        &self,
        endpoint: EndpointId,
        options: &SessionOptions,
    ) -> ControlResponse;

    /// Ask the endpoint to stop streaming
    async fn stop_session(&self, endpoint: EndpointId) -> ControlResponse;

    /// Ask the endpoint to hold frames
    async fn pause_session(&self, endpoint: EndpointId) -> ControlResponse;

    /// Ask the endpoint to resume frames
    async fn resume_session(&self, endpoint: EndpointId) -> ControlResponse;

    /// Push a partial configuration update
    async fn update_session_config(
        &self,
        endpoint: EndpointId,
        options: &SessionOptions,
    ) -> ControlResponse;

    /// Check that the endpoint is reachable and healthy
    async fn check_health(&self, endpoint: EndpointId) -> ControlResponse;

    /// Make the endpoint the active one
    async fn commit_active_endpoint(&self, endpoint: EndpointId) -> ControlResponse;

    /// Ask the outgoing endpoint to settle before a switch
    ///
    /// Advisory; the default does nothing.
    async fn quiesce_endpoint(&self, _endpoint: EndpointId) -> ControlResponse {
        ControlResponse::ok()
    }
}

/// Await a control-plane request under a time budget
pub(crate) async fn call_with_timeout<F>(
    operation: &'static str,
    endpoint: EndpointId,
    timeout: Duration,
    request: F,
) -> Result<()>
where
    F: Future<Output = ControlResponse>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(response) => response.into_result(),
        Err(_) => Err(Error::Timeout {
            operation,
            endpoint,
            after: timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result() {
        assert_eq!(ControlResponse::ok().into_result(), Ok(()));
        assert_eq!(
            ControlResponse::failed("editor not responding").into_result(),
            Err(Error::RemoteFailure("editor not responding".into()))
        );
        assert!(matches!(
            ControlResponse::default().into_result(),
            Err(Error::RemoteFailure(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_with_timeout() {
        let endpoint = EndpointId::new(8080);

        let ok = call_with_timeout("health", endpoint, Duration::from_secs(1), async {
            ControlResponse::ok()
        });
        assert_eq!(ok.await, Ok(()));

        let slow = call_with_timeout("health", endpoint, Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ControlResponse::ok()
        });
        assert_eq!(
            slow.await,
            Err(Error::Timeout {
                operation: "health",
                endpoint,
                after: Duration::from_secs(1),
            })
        );
    }

    #[test]
    fn test_decode_http_body() {
        let response: ControlResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert_eq!(response, ControlResponse::ok());

        let response: ControlResponse =
            serde_json::from_str(r#"{"success":false,"error":"no such port"}"#).unwrap();
        assert_eq!(response.error.as_deref(), Some("no such port"));
    }
}
