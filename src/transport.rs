/// Broker transport capability
///
/// The session only needs to connect, pull deliveries in order, settle them and
/// close. Broker clients implement [`FeedTransport`]; [`ChannelTransport`] is an
/// in-process implementation backed by a tokio channel, used for replay and tests.

use crate::error::TransportError;
use crate::message::RawHeaders;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Everything a broker client needs to open the package queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub username: String,
    pub password: String,
    pub queue: String,
    pub prefetch_count: u16,
    pub heartbeat: Duration,
    pub recovery_interval: Duration,
    pub auto_ack: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub properties: RawHeaders,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait FeedTransport: Send {
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), TransportError>;

    /// Next delivery in arrival order; `None` once the broker closed the consumer
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, TransportError>;

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), TransportError>;

    async fn reject(&mut self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[derive(Debug, Default, Clone)]
struct ProbeState {
    connected_with: Option<ConnectOptions>,
    acked: Vec<u64>,
    rejected: Vec<(u64, bool)>,
    closed: bool,
}

/// Read-only view of what a [`ChannelTransport`] did
#[derive(Debug, Clone, Default)]
pub struct TransportProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl TransportProbe {
    fn update(&self, f: impl FnOnce(&mut ProbeState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    fn read<R>(&self, f: impl FnOnce(&ProbeState) -> R) -> R {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub fn connected_with(&self) -> Option<ConnectOptions> {
        self.read(|s| s.connected_with.clone())
    }

    pub fn acked(&self) -> Vec<u64> {
        self.read(|s| s.acked.clone())
    }

    pub fn rejected(&self) -> Vec<(u64, bool)> {
        self.read(|s| s.rejected.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.read(|s| s.closed)
    }
}

/// Publishing half of an in-process feed
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<Delivery>,
    next_tag: Arc<AtomicU64>,
}

impl ChannelPublisher {
    /// Enqueue a delivery, returning its delivery tag
    pub async fn publish(&self, properties: RawHeaders, body: impl Into<Vec<u8>>) -> Result<u64, TransportError> {
        let delivery_tag = self.next_tag.fetch_add(1, Ordering::Relaxed) + 1;
        self.sender
            .send(Delivery {
                delivery_tag,
                properties,
                body: body.into(),
            })
            .await
            .map_err(|_| TransportError::Receive("consumer side dropped".to_string()))?;
        Ok(delivery_tag)
    }
}

pub struct ChannelTransport {
    receiver: mpsc::Receiver<Delivery>,
    connected: bool,
    connect_failure: Option<String>,
    probe: TransportProbe,
}

/// Create a connected publisher/transport pair with room for `capacity` unconsumed deliveries
pub fn channel(capacity: usize) -> (ChannelPublisher, ChannelTransport) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let publisher = ChannelPublisher {
        sender,
        next_tag: Arc::new(AtomicU64::new(0)),
    };
    let transport = ChannelTransport {
        receiver,
        connected: false,
        connect_failure: None,
        probe: TransportProbe::default(),
    };
    (publisher, transport)
}

impl ChannelTransport {
    /// Make every `connect` call fail with `reason`
    pub fn with_connect_failure(mut self, reason: impl Into<String>) -> Self {
        self.connect_failure = Some(reason.into());
        self
    }

    pub fn probe(&self) -> TransportProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl FeedTransport for ChannelTransport {
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), TransportError> {
        if let Some(reason) = &self.connect_failure {
            return Err(TransportError::Connect {
                host: options.host.clone(),
                port: options.port,
                reason: reason.clone(),
            });
        }
        self.connected = true;
        let options = options.clone();
        self.probe.update(|s| s.connected_with = Some(options));
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<Delivery>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(self.receiver.recv().await)
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.probe.update(|s| s.acked.push(delivery_tag));
        Ok(())
    }

    async fn reject(&mut self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.probe.update(|s| s.rejected.push((delivery_tag, requeue)));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.receiver.close();
        self.connected = false;
        self.probe.update(|s| s.closed = true);
        Ok(())
    }
}
