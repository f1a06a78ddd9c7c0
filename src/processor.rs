/// Typed decode-and-dispatch units
///
/// A processor binds one entity type and one flow. It decodes the raw body,
/// resolves the caller's handler and invokes it exactly once per message.

use crate::decoder::Decoder;
use crate::entity::{EntityKey, FeedEntity};
use crate::error::{DecodeError, ProcessError};
use crate::flow::Flow;
use crate::handler::{Handlers, Payload};
use crate::message::{MessageHeader, TransportHeaders};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

/// How the body of a dispatched message was delivered to the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Entity,
    Empty,
    Undecodable,
}

impl<T> From<&Payload<T>> for PayloadKind {
    fn from(payload: &Payload<T>) -> Self {
        match payload {
            Payload::Entity(_) => PayloadKind::Entity,
            Payload::Empty => PayloadKind::Empty,
            Payload::Undecodable => PayloadKind::Undecodable,
        }
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    fn entity_name(&self) -> &'static str;

    fn entity_key(&self) -> Option<EntityKey>;

    fn flow(&self) -> Flow;

    /// Decode `body` and hand it to the registered handler.
    ///
    /// Blank bodies and undecodable bodies still reach the handler, as
    /// `Payload::Empty` and `Payload::Undecodable`. Handler errors are returned
    /// unchanged.
    async fn process(
        &self,
        transport: &TransportHeaders,
        header: &MessageHeader,
        body: Option<&str>,
    ) -> Result<PayloadKind, ProcessError>;
}

pub struct EntityProcessor<T> {
    flow: Flow,
    handlers: Arc<Handlers>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: FeedEntity> EntityProcessor<T> {
    pub fn new(flow: Flow, handlers: Arc<Handlers>) -> Self {
        EntityProcessor {
            flow,
            handlers,
            _entity: PhantomData,
        }
    }

    fn decode(&self, body: Option<&str>) -> Payload<T> {
        match Decoder::decode_entity::<T>(body) {
            Ok(entity) => Payload::Entity(entity),
            Err(DecodeError::Empty) => Payload::Empty,
            Err(err) => {
                tracing::warn!(
                    entity = T::entity_name(),
                    flow = %self.flow,
                    body = body.unwrap_or_default(),
                    error = %err,
                    "failed to decode message body"
                );
                Payload::Undecodable
            }
        }
    }
}

#[async_trait]
impl<T: FeedEntity> Processor for EntityProcessor<T> {
    fn entity_name(&self) -> &'static str {
        T::entity_name()
    }

    fn entity_key(&self) -> Option<EntityKey> {
        T::ENTITY_KEY
    }

    fn flow(&self) -> Flow {
        self.flow
    }

    async fn process(
        &self,
        transport: &TransportHeaders,
        header: &MessageHeader,
        body: Option<&str>,
    ) -> Result<PayloadKind, ProcessError> {
        let handler = self
            .handlers
            .resolve::<T>(self.flow)
            .map_err(ProcessError::MissingHandler)?;

        let payload = self.decode(body);
        let kind = PayloadKind::from(&payload);

        handler
            .handle(transport, header, payload)
            .await
            .map_err(ProcessError::Handler)?;

        Ok(kind)
    }
}

/// Shorthand for building a type-erased processor
pub fn processor<T: FeedEntity>(flow: Flow, handlers: &Arc<Handlers>) -> Arc<dyn Processor> {
    Arc::new(EntityProcessor::<T>::new(flow, Arc::clone(handlers)))
}
