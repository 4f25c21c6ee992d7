//! Endpoint identifiers and frame types
//!
//! This module defines the key type for identifying endpoints, the two wire
//! shapes an inbound frame can arrive in, and the normalized [`FrameEvent`]
//! the router works with.

use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TOPIC_PREFIX: &str = "mirror-";
const TOPIC_SUFFIX: &str = "-frames";

/// Unique identifier for an endpoint (the editor instance's port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(u16);

impl EndpointId {
    /// Create a new endpoint id
    pub const fn new(port: u16) -> Self {
        Self(port)
    }

    /// Port number backing this id
    pub const fn port(self) -> u16 {
        self.0
    }

    /// Topic name frames for this endpoint are published under
    pub fn frame_topic(self) -> String {
        format!("{}{}{}", TOPIC_PREFIX, self.0, TOPIC_SUFFIX)
    }

    /// Parse an endpoint id out of a `mirror-<port>-frames` topic
    pub fn from_topic(topic: &str) -> Result<Self> {
        topic
            .strip_prefix(TOPIC_PREFIX)
            .and_then(|rest| rest.strip_suffix(TOPIC_SUFFIX))
            .and_then(|port| port.parse().ok())
            .map(Self)
            .ok_or_else(|| Error::InvalidMessage(format!("unrecognized topic: {}", topic)))
    }
}

impl From<u16> for EndpointId {
    fn from(port: u16) -> Self {
        Self(port)
    }
}

impl FromStr for EndpointId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| Error::InvalidMessage(format!("invalid endpoint id: {}", s)))
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frame fields common to both inbound shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePayload {
    /// Sequence number assigned by the endpoint
    pub frame_number: u64,
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Image format (e.g. "jpeg")
    #[serde(default)]
    pub format: String,
    /// Encoded size in bytes, if the sender reported it
    #[serde(default)]
    pub size: Option<usize>,
    /// Encoded frame data
    #[serde(default)]
    pub payload: String,
}

/// An inbound message as it arrives on the shared channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    /// `{topic: "mirror-<port>-frames", data: {...}}`
    Topic { topic: String, data: FramePayload },
    /// `{endpointId, frameNumber, timestamp, ...}`
    Direct {
        #[serde(rename = "endpointId")]
        endpoint_id: EndpointId,
        #[serde(flatten)]
        frame: FramePayload,
    },
}

impl InboundMessage {
    /// Decode a JSON text message
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidMessage(e.to_string()))
    }

    /// Normalize either shape into a frame event
    pub fn into_frame_event(self) -> Result<FrameEvent> {
        let (endpoint_id, frame) = match self {
            InboundMessage::Direct { endpoint_id, frame } => (endpoint_id, frame),
            InboundMessage::Topic { topic, data } => (EndpointId::from_topic(&topic)?, data),
        };
        Ok(FrameEvent::from_payload(endpoint_id, frame))
    }
}

/// A frame routed to one endpoint's consumers
///
/// Cheap to clone: `data` is reference counted.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEvent {
    /// Owning endpoint
    pub endpoint_id: EndpointId,
    /// Sequence number assigned by the endpoint
    pub frame_number: u64,
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Image format
    pub format: String,
    /// Encoded size in bytes
    pub size: usize,
    /// Frame data
    pub data: Bytes,
}

impl FrameEvent {
    /// Create a frame with no payload data
    pub fn new(endpoint_id: EndpointId, frame_number: u64, timestamp: i64) -> Self {
        Self {
            endpoint_id,
            frame_number,
            timestamp,
            format: String::new(),
            size: 0,
            data: Bytes::new(),
        }
    }

    fn from_payload(endpoint_id: EndpointId, frame: FramePayload) -> Self {
        let size = frame.size.unwrap_or(frame.payload.len());
        Self {
            endpoint_id,
            frame_number: frame.frame_number,
            timestamp: frame.timestamp,
            format: frame.format,
            size,
            data: Bytes::from(frame.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_roundtrip() {
        let id = EndpointId::new(8080);
        assert_eq!(id.frame_topic(), "mirror-8080-frames");
        assert_eq!(EndpointId::from_topic("mirror-8080-frames").unwrap(), id);
    }

    #[test]
    fn test_bad_topics_rejected() {
        let topics = [
            "mirror-8080",
            "8080-frames",
            "mirror--frames",
            "mirror-abc-frames",
            "mirror-70000-frames",
        ];
        for topic in topics {
            assert!(
                matches!(EndpointId::from_topic(topic), Err(Error::InvalidMessage(_))),
                "{topic} should be rejected"
            );
        }
    }

    #[test]
    fn test_direct_message() {
        let text = r#"{"endpointId":8080,"frameNumber":1,"timestamp":1700000000000,
            "format":"jpeg","size":4,"payload":"abcd"}"#;
        let msg = InboundMessage::from_json(text).unwrap();
        let event = msg.into_frame_event().unwrap();

        assert_eq!(event.endpoint_id, EndpointId::new(8080));
        assert_eq!(event.frame_number, 1);
        assert_eq!(event.timestamp, 1_700_000_000_000);
        assert_eq!(event.format, "jpeg");
        assert_eq!(event.size, 4);
        assert_eq!(&event.data[..], b"abcd");
    }

    #[test]
    fn test_topic_message_matches_direct() {
        let topic = InboundMessage::from_json(
            r#"{"topic":"mirror-8080-frames","data":{"frameNumber":5,"timestamp":42}}"#,
        )
        .unwrap()
        .into_frame_event()
        .unwrap();
        let direct =
            InboundMessage::from_json(r#"{"endpointId":8080,"frameNumber":5,"timestamp":42}"#)
            .unwrap()
            .into_frame_event()
            .unwrap();

        assert_eq!(topic, direct);
        assert_eq!(topic.size, 0);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(InboundMessage::from_json(r#"{"hello":"world"}"#).is_err());
        assert!(InboundMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_endpoint_from_str() {
        assert_eq!(" 9090 ".parse::<EndpointId>().unwrap(), EndpointId::new(9090));
        assert!("nope".parse::<EndpointId>().is_err());
    }
}
