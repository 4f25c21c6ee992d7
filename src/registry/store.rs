//! Session registry implementation
//!
//! The central map from endpoint id to session record. Written by the
//! lifecycle controller (create, remove, status, options) and the frame router
//! (frame counters); read by everything else.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::entry::{SessionOptions, SessionRecord, SessionStatus};
use super::frame::EndpointId;

/// Registry of all live sessions
///
/// Thread-safe via `RwLock`. The outer lock guards membership, each record has
/// its own lock so frame accounting for one endpoint never contends with
/// another endpoint's updates.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<EndpointId, Arc<RwLock<SessionRecord>>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly started session
    ///
    /// Returns an error if the endpoint already has a record; the existing
    /// record is left untouched.
    pub async fn insert(
        &self,
        endpoint: EndpointId,
        options: SessionOptions,
    ) -> Result<SessionRecord> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&endpoint) {
            return Err(Error::AlreadyActive(endpoint));
        }

        let record = SessionRecord::new(endpoint, options);
        sessions.insert(endpoint, Arc::new(RwLock::new(record.clone())));

        tracing::info!(endpoint = %endpoint, sessions = sessions.len(), "Session registered");

        Ok(record)
    }

    /// Remove a session, returning its final state
    pub async fn remove(&self, endpoint: EndpointId) -> Option<SessionRecord> {
        let removed = self.sessions.write().await.remove(&endpoint)?;
        let mut record = removed.read().await.clone();
        record.status = SessionStatus::Stopped;

        tracing::info!(
            endpoint = %endpoint,
            frames = record.frame_count,
            "Session removed"
        );

        Some(record)
    }

    /// Check if an endpoint has a record
    pub async fn contains(&self, endpoint: EndpointId) -> bool {
        self.sessions.read().await.contains_key(&endpoint)
    }

    /// Snapshot a single session
    pub async fn get(&self, endpoint: EndpointId) -> Option<SessionRecord> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&endpoint)?;
        let record = entry.read().await.clone();
        Some(record)
    }

    /// Snapshot every session, ordered by endpoint id
    pub async fn all(&self) -> Vec<SessionRecord> {
        let sessions = self.sessions.read().await;
        let mut records = Vec::with_capacity(sessions.len());

        for entry in sessions.values() {
            records.push(entry.read().await.clone());
        }

        records.sort_by_key(|record| record.endpoint_id);
        records
    }

    /// Get total number of sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Set the status of a session
    pub async fn set_status(&self, endpoint: EndpointId, status: SessionStatus) -> Result<()> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&endpoint).ok_or(Error::NotFound(endpoint))?;
        entry.write().await.status = status;
        Ok(())
    }

    /// Merge options into a session's options bag
    pub async fn merge_options(
        &self,
        endpoint: EndpointId,
        partial: &SessionOptions,
    ) -> Result<SessionOptions> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&endpoint).ok_or(Error::NotFound(endpoint))?;
        let mut record = entry.write().await;
        record.options.merge(partial);
        Ok(record.options.clone())
    }

    /// Account for a frame on an endpoint
    ///
    /// Returns the new frame count, or `None` if the endpoint has no session.
    pub async fn record_frame(&self, endpoint: EndpointId, timestamp: i64) -> Option<u64> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&endpoint)?;
        let mut record = entry.write().await;
        record.on_frame(timestamp);
        Some(record.frame_count)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_duplicate() {
        let registry = SessionRegistry::new();
        let endpoint = EndpointId::new(8080);

        let record = registry
            .insert(endpoint, SessionOptions::new().with("quality", "high"))
            .await
            .unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert_eq!(record.frame_count, 0);

        // Can't start twice
        let result = registry.insert(endpoint, SessionOptions::new()).await;
        assert!(matches!(result, Err(Error::AlreadyActive(id)) if id == endpoint));

        // Existing options survive the rejected insert
        let record = registry.get(endpoint).await.unwrap();
        assert_eq!(record.options.get("quality").unwrap(), "high");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_record_frame() {
        let registry = SessionRegistry::new();
        let endpoint = EndpointId::new(8080);

        assert_eq!(registry.record_frame(endpoint, 10).await, None);

        registry.insert(endpoint, SessionOptions::new()).await.unwrap();
        assert_eq!(registry.record_frame(endpoint, 10).await, Some(1));
        assert_eq!(registry.record_frame(endpoint, 20).await, Some(2));

        let record = registry.get(endpoint).await.unwrap();
        assert_eq!(record.frame_count, 2);
        assert_eq!(record.last_frame_timestamp, Some(20));
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = SessionRegistry::new();
        let endpoint = EndpointId::new(8080);

        assert!(registry.remove(endpoint).await.is_none());

        registry.insert(endpoint, SessionOptions::new()).await.unwrap();
        registry.record_frame(endpoint, 1).await;

        let removed = registry.remove(endpoint).await.unwrap();
        assert_eq!(removed.status, SessionStatus::Stopped);
        assert_eq!(removed.frame_count, 1);
        assert!(!registry.contains(endpoint).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_status_and_options_require_record() {
        let registry = SessionRegistry::new();
        let endpoint = EndpointId::new(9090);

        assert!(matches!(
            registry.set_status(endpoint, SessionStatus::Paused).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            registry.merge_options(endpoint, &SessionOptions::new()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_all_is_sorted() {
        let registry = SessionRegistry::new();
        for port in [9090, 8080, 3000] {
            registry.insert(EndpointId::new(port), SessionOptions::new()).await.unwrap();
        }

        let ports: Vec<u16> = registry.all().await.iter().map(|r| r.endpoint_id.port()).collect();
        assert_eq!(ports, vec![3000, 8080, 9090]);
    }
}
