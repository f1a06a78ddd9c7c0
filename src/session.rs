/// Feed session lifecycle
///
///   Created -> Starting -> Running -> Stopping -> Stopped
///
/// Construction validates settings and resolves the flow before anything touches
/// the network. `start` optionally confirms distribution, connects the transport
/// and spawns the consuming task. Per-message failures (bad headers, bad
/// envelope, unknown type code, handler errors) are logged, counted and rejected;
/// only a missing handler registration or a broken transport ends the task.

use crate::config::{FeedSettings, PackageSettings};
use crate::control_plane::{DistributionApi, HttpDistributionApi};
use crate::distribution::{DistributionController, RetryPolicy};
use crate::error::{ConfigError, FeedError, FeedResult, ProcessError};
use crate::flow::Flow;
use crate::message::{Envelope, TransportHeaders};
use crate::processor::{PayloadKind, Processor};
use crate::registry::ProcessorRegistry;
use crate::stats::{FeedStats, StatsSnapshot};
use crate::transport::{Delivery, FeedTransport};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

type ConsumerHandle = JoinHandle<(Box<dyn FeedTransport>, FeedResult<()>)>;

pub struct FeedSession {
    flow: Flow,
    package: PackageSettings,
    registry: Arc<ProcessorRegistry>,
    distribution: Option<DistributionController>,
    transport: Option<Box<dyn FeedTransport>>,
    consumer: Option<ConsumerHandle>,
    shutdown: CancellationToken,
    stats: Arc<FeedStats>,
    state: SessionState,
}

impl FeedSession {
    /// Build a session for the flow named by `flow`.
    ///
    /// When `control_plane` is `None` and the settings carry a customers API
    /// section, an HTTP control-plane client is created for the selected package.
    pub fn new(
        settings: &FeedSettings,
        flow: &str,
        processors: &[Arc<dyn Processor>],
        transport: Box<dyn FeedTransport>,
        control_plane: Option<Arc<dyn DistributionApi>>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let flow: Flow = flow.parse()?;
        let package = settings.package(flow)?.clone();
        let registry = ProcessorRegistry::build(flow, processors)?;

        let policy = settings
            .customers_api
            .as_ref()
            .map(|api| api.retry_policy())
            .unwrap_or_default();

        let control_plane = match (control_plane, &settings.customers_api) {
            (Some(api), _) => Some(api),
            (None, Some(api)) => {
                let client = HttpDistributionApi::new(&api.base_url, package.credentials())?;
                Some(Arc::new(client) as Arc<dyn DistributionApi>)
            }
            (None, None) => None,
        };

        tracing::debug!(
            %flow,
            package_id = package.package_id,
            processors = registry.len(),
            distribution_check = control_plane.is_some(),
            "feed session created"
        );

        Ok(FeedSession {
            flow,
            package,
            registry: Arc::new(registry),
            distribution: control_plane.map(|api| DistributionController::new(api, policy)),
            transport: Some(transport),
            consumer: None,
            shutdown: CancellationToken::new(),
            stats: Arc::new(FeedStats::new()),
            state: SessionState::Created,
        })
    }

    pub fn builder(settings: &FeedSettings) -> FeedSessionBuilder<'_> {
        FeedSessionBuilder {
            settings,
            flow: None,
            processors: Vec::new(),
            transport: None,
            control_plane: None,
        }
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<FeedStats> {
        Arc::clone(&self.stats)
    }

    /// Start consuming.
    ///
    /// With `connect_at_start` the distribution handshake runs first and its
    /// failure or cancellation is returned as-is. A failed start leaves the
    /// session in `Created` so it can be retried.
    pub async fn start(&mut self, connect_at_start: bool, cancel: &CancellationToken) -> FeedResult<()> {
        if self.state != SessionState::Created {
            return Err(FeedError::InvalidState(self.state));
        }
        self.state = SessionState::Starting;

        if let Err(err) = self.connect(connect_at_start, cancel).await {
            self.state = SessionState::Created;
            return Err(err);
        }

        self.state = SessionState::Running;
        Ok(())
    }

    async fn connect(&mut self, connect_at_start: bool, cancel: &CancellationToken) -> FeedResult<()> {
        if connect_at_start {
            match self.distribution.as_mut() {
                Some(controller) => controller.ensure_started(cancel).await?,
                None => tracing::debug!(flow = %self.flow, "no control plane configured, skipping distribution check"),
            }
        }

        let mut transport = self
            .transport
            .take()
            .ok_or(FeedError::InvalidState(self.state))?;

        let options = self.package.connect_options();
        if let Err(err) = transport.connect(&options).await {
            tracing::error!(flow = %self.flow, host = %options.host, port = options.port, error = %err, "feed connection failed");
            self.transport = Some(transport);
            return Err(err.into());
        }

        tracing::info!(
            flow = %self.flow,
            host = %options.host,
            queue = %options.queue,
            prefetch = options.prefetch_count,
            "feed connected"
        );

        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            auto_ack: options.auto_ack,
        };
        let span = tracing::info_span!("feed", flow = %self.flow, package_id = self.package.package_id);
        let shutdown = self.shutdown.clone();
        self.consumer = Some(tokio::spawn(
            consume(transport, dispatcher, shutdown).instrument(span),
        ));
        Ok(())
    }

    /// Stop consuming and release the transport. Safe to call repeatedly and
    /// before `start`; errors are logged, never returned.
    pub async fn stop(&mut self) {
        match self.state {
            SessionState::Stopped => return,
            SessionState::Running => {}
            _ => {
                if let Some(mut transport) = self.transport.take() {
                    if let Err(err) = transport.close().await {
                        tracing::debug!(error = %err, "closing unopened transport failed");
                    }
                }
                self.state = SessionState::Stopped;
                return;
            }
        }

        self.state = SessionState::Stopping;
        self.shutdown.cancel();
        if let Err(err) = self.finish().await {
            tracing::warn!(flow = %self.flow, error = %err, "feed consumer ended with error");
        }
    }

    /// Wait for the consuming task to end on its own (broker closed the
    /// consumer, transport failure, or a missing handler) and return why.
    pub async fn wait(&mut self) -> FeedResult<()> {
        if self.state != SessionState::Running {
            return Err(FeedError::InvalidState(self.state));
        }
        self.finish().await
    }

    async fn finish(&mut self) -> FeedResult<()> {
        let result = match self.consumer.take() {
            Some(handle) => match handle.await {
                Ok((mut transport, result)) => {
                    if let Err(err) = transport.close().await {
                        tracing::warn!(flow = %self.flow, error = %err, "failed to close feed transport");
                    }
                    result
                }
                Err(err) => Err(FeedError::ConsumerTask(err.to_string())),
            },
            None => Ok(()),
        };

        self.stats.log_summary();
        self.state = SessionState::Stopped;
        tracing::info!(flow = %self.flow, "feed stopped");
        result
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSession")
            .field("flow", &self.flow)
            .field("state", &self.state)
            .field("package_id", &self.package.package_id)
            .field("registry", &self.registry)
            .finish()
    }
}

pub struct FeedSessionBuilder<'a> {
    settings: &'a FeedSettings,
    flow: Option<String>,
    processors: Vec<Arc<dyn Processor>>,
    transport: Option<Box<dyn FeedTransport>>,
    control_plane: Option<Arc<dyn DistributionApi>>,
}

impl<'a> FeedSessionBuilder<'a> {
    pub fn flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn processors(mut self, processors: impl IntoIterator<Item = Arc<dyn Processor>>) -> Self {
        self.processors.extend(processors);
        self
    }

    pub fn transport(mut self, transport: impl FeedTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn control_plane(mut self, api: Arc<dyn DistributionApi>) -> Self {
        self.control_plane = Some(api);
        self
    }

    pub fn build(self) -> Result<FeedSession, ConfigError> {
        let flow = self.flow.ok_or(ConfigError::Required { field: "Flow" })?;
        let transport = self.transport.ok_or(ConfigError::Required { field: "Transport" })?;
        FeedSession::new(
            self.settings,
            &flow,
            &self.processors,
            transport,
            self.control_plane,
        )
    }
}

/// Per-delivery routing, owned by the consuming task
struct Dispatcher {
    registry: Arc<ProcessorRegistry>,
    stats: Arc<FeedStats>,
    auto_ack: bool,
}

impl Dispatcher {
    async fn dispatch(&self, transport: &mut dyn FeedTransport, delivery: Delivery) -> FeedResult<()> {
        let started = Instant::now();
        let delivery_tag = delivery.delivery_tag;
        self.stats.record_received(delivery.body.len());

        match self.route(&delivery).await {
            Ok(Some(kind)) => {
                self.stats.record_dispatched(kind);
                self.stats
                    .record_dispatch_latency(started.elapsed().as_micros() as u64);
                self.settle(transport, delivery_tag, true).await
            }
            Ok(None) => self.settle(transport, delivery_tag, false).await,
            Err(err) => {
                if let Err(settle_err) = self.settle(transport, delivery_tag, false).await {
                    tracing::warn!(delivery_tag, error = %settle_err, "failed to reject delivery before stopping");
                }
                Err(err)
            }
        }
    }

    /// `Ok(None)` means the delivery was dropped for a per-message reason
    async fn route(&self, delivery: &Delivery) -> FeedResult<Option<PayloadKind>> {
        let delivery_tag = delivery.delivery_tag;

        let transport_headers = match TransportHeaders::from_properties(&delivery.properties) {
            Ok(headers) => headers,
            Err(err) => {
                tracing::warn!(delivery_tag, error = %err, "dropping delivery with invalid transport headers");
                self.stats.record_invalid_headers();
                return Ok(None);
            }
        };

        let envelope = match Envelope::parse(&delivery.body) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(
                    delivery_tag,
                    message_type = %transport_headers.message_type,
                    body = %String::from_utf8_lossy(&delivery.body),
                    error = %err,
                    "dropping delivery with invalid envelope"
                );
                self.stats.record_invalid_envelope();
                return Ok(None);
            }
        };
        let (header, body) = envelope.into_parts();

        let processor = match self.registry.resolve(header.entity_key()) {
            Ok(processor) => processor,
            Err(err) => {
                tracing::warn!(
                    delivery_tag,
                    message_type = %transport_headers.message_type,
                    error = %err,
                    "dropping unroutable message"
                );
                self.stats.record_unroutable();
                return Ok(None);
            }
        };

        match processor
            .process(&transport_headers, &header, body.as_deref())
            .await
        {
            Ok(kind) => Ok(Some(kind)),
            Err(ProcessError::Handler(err)) => {
                tracing::error!(
                    delivery_tag,
                    entity = processor.entity_name(),
                    error = ?err,
                    "feed handler failed"
                );
                self.stats.record_handler_failure();
                Ok(None)
            }
            Err(err @ ProcessError::MissingHandler(_)) => {
                tracing::error!(entity = processor.entity_name(), error = %err, "stopping feed");
                Err(err.into())
            }
        }
    }

    async fn settle(&self, transport: &mut dyn FeedTransport, delivery_tag: u64, success: bool) -> FeedResult<()> {
        if self.auto_ack {
            return Ok(());
        }
        let result = if success {
            transport.ack(delivery_tag).await
        } else {
            transport.reject(delivery_tag, false).await
        };
        result.map_err(FeedError::from)
    }
}

async fn consume(
    mut transport: Box<dyn FeedTransport>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) -> (Box<dyn FeedTransport>, FeedResult<()>) {
    let result = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break Ok(()),
            next = transport.next_delivery() => next,
        };

        match next {
            Ok(Some(delivery)) => {
                if let Err(err) = dispatcher.dispatch(transport.as_mut(), delivery).await {
                    break Err(err);
                }
            }
            Ok(None) => {
                tracing::info!("feed consumer closed by broker");
                break Ok(());
            }
            Err(err) => break Err(err.into()),
        }
    };
    (transport, result)
}
