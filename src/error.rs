/// Error taxonomy for the feed client
///
/// Configuration errors are fatal and raised synchronously at construction time.
/// Decode and routing errors are per-message and never stop the feed.
/// Distribution errors surface once, after the bounded retry loop gives up.

use crate::entity::EntityKey;
use crate::flow::Flow;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be a positive integer")]
    NotPositive { field: &'static str },

    #[error("{field} is not a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("unrecognized flow '{0}', expected one of: inplay, prematch")]
    UnknownFlow(String),

    #[error("no connection settings configured for flow {0}")]
    FlowNotConfigured(Flow),

    #[error("duplicate resolver for entity key {key}: {existing} already registered, cannot add {duplicate}")]
    DuplicateEntityKey {
        key: EntityKey,
        existing: &'static str,
        duplicate: &'static str,
    },

    #[error("entity type {entity} carries no entity key")]
    MissingEntityKey { entity: &'static str },

    #[error("required transport header '{name}' is missing or null")]
    MissingHeader { name: &'static str },

    #[error("no handler registered for {entity} on flow {flow}")]
    MissingHandler { entity: &'static str, flow: Flow },

    #[error("failed to load settings: {0}")]
    Load(String),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("message body is empty")]
    Empty,

    #[error("failed to decode {entity}: {source}")]
    Malformed {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no processor registered for entity key {key} on flow {flow}")]
    UnknownEntityKey { key: EntityKey, flow: Flow },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    MissingHandler(ConfigError),

    #[error(transparent)]
    Handler(anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("control plane request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("control plane returned HTTP {status}")]
    Status { status: u16 },

    #[error("control plane rejected the request: {0}")]
    Rejected(String),

    #[error("control plane request cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("distribution was not confirmed started after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("distribution could not be confirmed started: {source}")]
    ControlPlane {
        #[source]
        source: ControlPlaneError,
    },

    #[error("distribution start cancelled")]
    Cancelled,
}

impl DistributionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DistributionError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("transport is not connected")]
    NotConnected,

    #[error("transport receive failed: {0}")]
    Receive(String),

    #[error("failed to settle delivery {delivery_tag}: {reason}")]
    Settle { delivery_tag: u64, reason: String },

    #[error("failed to close transport: {0}")]
    Close(String),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("operation not allowed while session is {0}")]
    InvalidState(crate::session::SessionState),

    #[error("feed consumer task failed: {0}")]
    ConsumerTask(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
