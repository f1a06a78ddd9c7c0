//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use odds_feed::config::{FeedSettings, PackageSettings};
use odds_feed::message::{MESSAGE_GUID, MESSAGE_TYPE, TIMESTAMP_IN_MS};
use odds_feed::{FeedHandler, HeaderValue, MessageHeader, Payload, RawHeaders, TransportHeaders};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

/// Tracing layer that keeps every event in memory
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Route events on the current thread into a fresh capture until the guard drops
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

#[derive(Debug, Clone)]
pub struct Recorded<T> {
    pub transport: TransportHeaders,
    pub header: MessageHeader,
    pub payload: Payload<T>,
}

/// Handler that records every call and optionally fails
pub struct Recorder<T> {
    calls: Arc<Mutex<Vec<Recorded<T>>>>,
    failure: Option<String>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Recorder {
            calls: Arc::clone(&self.calls),
            failure: self.failure.clone(),
        }
    }
}

impl<T> Recorder<T> {
    pub fn new() -> Self {
        Recorder {
            calls: Arc::new(Mutex::new(Vec::new())),
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Recorder {
            calls: Arc::new(Mutex::new(Vec::new())),
            failure: Some(message.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl<T: Clone> Recorder<T> {
    pub fn calls(&self) -> Vec<Recorded<T>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<T: Send + 'static> FeedHandler<T> for Recorder<T> {
    async fn handle(
        &self,
        transport: &TransportHeaders,
        header: &MessageHeader,
        payload: Payload<T>,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(Recorded {
            transport: transport.clone(),
            header: header.clone(),
            payload,
        });
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(()),
        }
    }
}

pub fn header(message_type: i32) -> MessageHeader {
    MessageHeader {
        message_type,
        ..Default::default()
    }
}

/// Broker properties carrying every required transport header
pub fn properties(message_type: &str) -> RawHeaders {
    let mut props = RawHeaders::new();
    props.insert(MESSAGE_TYPE.to_string(), HeaderValue::from(message_type));
    props.insert(MESSAGE_GUID.to_string(), HeaderValue::from("guid-1"));
    props.insert(TIMESTAMP_IN_MS.to_string(), HeaderValue::Int(1_700_000_000_000));
    props
}

/// Wire envelope with an inline JSON body
pub fn envelope(type_code: i32, body: Option<&str>) -> Vec<u8> {
    match body {
        Some(body) => format!(r#"{{"Header":{{"Type":{},"MsgSeq":1}},"Body":{}}}"#, type_code, body),
        None => format!(r#"{{"Header":{{"Type":{},"MsgSeq":1}}}}"#, type_code),
    }
    .into_bytes()
}

pub fn package(package_id: i64) -> PackageSettings {
    PackageSettings {
        host: "localhost".to_string(),
        port: 5672,
        virtual_host: "StmInPlay".to_string(),
        username: "user".to_string(),
        password: "secret".to_string(),
        package_id,
        prefetch_count: 10,
        requested_heartbeat_seconds: 30,
        network_recovery_interval_seconds: 5,
        auto_ack: false,
    }
}

pub fn settings() -> FeedSettings {
    FeedSettings {
        in_play: Some(package(430)),
        pre_match: Some(package(431)),
        customers_api: None,
    }
}
