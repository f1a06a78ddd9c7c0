/// Odds Feed - Sports Odds Feed Client
///
/// Client SDK for a broker-delivered sports odds feed. Features include:
/// - Case-insensitive JSON decoding of feed payloads
/// - Entity-key routing through a per-flow processor registry
/// - Typed handlers resolved per entity type and flow
/// - Distribution start-up handshake with bounded retries and cancellation
/// - Feed session lifecycle over a pluggable broker transport
/// - Per-session delivery statistics

pub mod flow;
pub mod entity;
pub mod entities;
pub mod error;
pub mod decoder;
pub mod message;
pub mod handler;
pub mod processor;
pub mod registry;
pub mod control_plane;
pub mod distribution;
pub mod transport;
pub mod config;
pub mod stats;
pub mod session;
pub mod logging;

pub use flow::Flow;
pub use entity::{EntityKey, FeedEntity};
pub use error::{
    ConfigError, ControlPlaneError, DecodeError, DistributionError, FeedError, FeedResult,
    ProcessError, RoutingError, TransportError,
};
pub use decoder::Decoder;
pub use message::{Envelope, HeaderValue, MessageHeader, RawHeaders, TransportHeaders};
pub use handler::{handler_fn, FeedHandler, Handlers, Payload};
pub use processor::{processor, EntityProcessor, PayloadKind, Processor};
pub use registry::ProcessorRegistry;
pub use control_plane::{DistributionApi, DistributionStatus, HttpDistributionApi, PackageCredentials};
pub use distribution::{DistributionController, DistributionState, RetryPolicy};
pub use transport::{channel, ChannelPublisher, ChannelTransport, ConnectOptions, Delivery, FeedTransport};
pub use config::{CustomersApiSettings, FeedSettings, PackageSettings};
pub use stats::{FeedStats, LatencyStats, StatsSnapshot};
pub use session::{FeedSession, FeedSessionBuilder, SessionState};
pub use logging::init_logging;
