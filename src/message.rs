/// Feed message model
///
/// Each broker delivery carries two layers of metadata:
///   - transport headers: broker-native properties (type name, sequence, guid,
///     fixture id, timestamp) attached by the publisher
///   - the message header: the `Header` object inside the JSON envelope, holding
///     the integer type code used for routing
///
/// Envelope layout (keys are matched case-insensitively):
///   {"Header": {"Type": 3, "MsgSeq": 10, "MsgGuid": "...", ...}, "Body": {...}}

use crate::decoder::Decoder;
use crate::entity::EntityKey;
use crate::error::ConfigError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub const MESSAGE_TYPE: &str = "MessageType";
pub const MESSAGE_SEQUENCE: &str = "MessageSequence";
pub const MESSAGE_GUID: &str = "MessageGuid";
pub const FIXTURE_ID: &str = "FixtureId";
pub const TIMESTAMP_IN_MS: &str = "timestamp_in_ms";

/// Raw broker property value
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Null,
    Bytes(Vec<u8>),
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl HeaderValue {
    /// Textual form of the value; `None` for null
    pub fn to_text(&self) -> Option<String> {
        match self {
            HeaderValue::Null => None,
            HeaderValue::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Null => Ok(()),
            HeaderValue::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            HeaderValue::Text(s) => f.write_str(s),
            HeaderValue::Int(v) => write!(f, "{}", v),
            HeaderValue::Float(v) => write!(f, "{}", v),
            HeaderValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Text(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Text(v)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(v: Vec<u8>) -> Self {
        HeaderValue::Bytes(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

pub type RawHeaders = HashMap<String, HeaderValue>;

/// Broker-native headers, reconstructed from raw delivery properties
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportHeaders {
    pub message_type: String,
    pub message_sequence: String,
    pub message_guid: String,
    pub fixture_id: String,
    pub timestamp_in_ms: String,
}

impl TransportHeaders {
    /// Build from raw properties.
    /// `MessageType`, `MessageGuid` and `timestamp_in_ms` must be present and non-null;
    /// `MessageSequence` and `FixtureId` default to empty.
    pub fn from_properties(properties: &RawHeaders) -> Result<Self, ConfigError> {
        Ok(TransportHeaders {
            message_type: required(properties, MESSAGE_TYPE)?,
            message_sequence: optional(properties, MESSAGE_SEQUENCE),
            message_guid: required(properties, MESSAGE_GUID)?,
            fixture_id: optional(properties, FIXTURE_ID),
            timestamp_in_ms: required(properties, TIMESTAMP_IN_MS)?,
        })
    }
}

fn required(properties: &RawHeaders, name: &'static str) -> Result<String, ConfigError> {
    properties
        .get(name)
        .and_then(HeaderValue::to_text)
        .ok_or(ConfigError::MissingHeader { name })
}

fn optional(properties: &RawHeaders, name: &str) -> String {
    properties
        .get(name)
        .and_then(HeaderValue::to_text)
        .unwrap_or_default()
}

/// Transport-independent envelope metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct MessageHeader {
    #[serde(rename = "type")]
    pub message_type: i32,
    pub msg_seq: Option<i64>,
    pub msg_guid: Option<String>,
    pub creation_date: Option<String>,
    pub server_timestamp: Option<i64>,
    pub message_broker_timestamp: Option<String>,
    pub processing_timestamp: Option<String>,
}

impl MessageHeader {
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.message_type)
    }
}

/// Wire envelope wrapping every feed message
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub header: MessageHeader,
    pub body: Option<Value>,
}

impl Envelope {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(payload)?;
        Decoder::decode_value(value)
    }

    /// Body as JSON text. Some publishers double-encode the body as a JSON string;
    /// that string is returned as-is.
    pub fn body_text(&self) -> Option<String> {
        match &self.body {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    pub fn into_parts(self) -> (MessageHeader, Option<String>) {
        let body = self.body_text();
        (self.header, body)
    }
}
