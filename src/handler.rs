/// Caller handlers and the lookup processors resolve them from
///
/// Handlers are registered per (entity type, flow). Processors look them up when
/// a message arrives, so a missing registration only surfaces once that entity
/// type is actually dispatched.

use crate::entity::FeedEntity;
use crate::error::ConfigError;
use crate::flow::Flow;
use crate::message::{MessageHeader, TransportHeaders};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a handler receives for one message
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    /// Body decoded into the target entity
    Entity(T),
    /// No body on the wire (heartbeats, keepalives)
    Empty,
    /// A body was present but could not be decoded; already logged
    Undecodable,
}

impl<T> Payload<T> {
    pub fn entity(&self) -> Option<&T> {
        match self {
            Payload::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<T> {
        match self {
            Payload::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Payload::Entity(_))
    }
}

#[async_trait]
pub trait FeedHandler<T: Send + 'static>: Send + Sync {
    async fn handle(
        &self,
        transport: &TransportHeaders,
        header: &MessageHeader,
        payload: Payload<T>,
    ) -> anyhow::Result<()>;
}

/// Adapts a synchronous closure into a [`FeedHandler`]
pub struct HandlerFn<F>(F);

pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn(f)
}

#[async_trait]
impl<T, F> FeedHandler<T> for HandlerFn<F>
where
    T: Send + 'static,
    F: Fn(&TransportHeaders, &MessageHeader, Payload<T>) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(
        &self,
        transport: &TransportHeaders,
        header: &MessageHeader,
        payload: Payload<T>,
    ) -> anyhow::Result<()> {
        (self.0)(transport, header, payload)
    }
}

type HandlerSlot = Arc<dyn Any + Send + Sync>;

#[derive(Default, Clone)]
pub struct Handlers {
    entries: HashMap<(TypeId, Flow), HandlerSlot>,
    names: HashMap<(TypeId, Flow), &'static str>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `T` on `flow`, replacing any previous one
    pub fn register<T, H>(&mut self, flow: Flow, handler: H) -> &mut Self
    where
        T: FeedEntity,
        H: FeedHandler<T> + 'static,
    {
        let key = (TypeId::of::<T>(), flow);
        let handler: Arc<dyn FeedHandler<T>> = Arc::new(handler);
        if self.entries.insert(key, Arc::new(handler)).is_some() {
            tracing::debug!(entity = T::entity_name(), %flow, "replacing feed handler");
        }
        self.names.insert(key, T::entity_name());
        self
    }

    pub fn with<T, H>(mut self, flow: Flow, handler: H) -> Self
    where
        T: FeedEntity,
        H: FeedHandler<T> + 'static,
    {
        self.register::<T, H>(flow, handler);
        self
    }

    pub fn resolve<T: FeedEntity>(&self, flow: Flow) -> Result<Arc<dyn FeedHandler<T>>, ConfigError> {
        self.entries
            .get(&(TypeId::of::<T>(), flow))
            .and_then(|slot| slot.downcast_ref::<Arc<dyn FeedHandler<T>>>())
            .cloned()
            .ok_or(ConfigError::MissingHandler {
                entity: T::entity_name(),
                flow,
            })
    }

    pub fn contains<T: FeedEntity>(&self, flow: Flow) -> bool {
        self.entries.contains_key(&(TypeId::of::<T>(), flow))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<String> = self
            .names
            .iter()
            .map(|((_, flow), name)| format!("{}/{}", name, flow))
            .collect();
        registered.sort();
        f.debug_struct("Handlers").field("registered", &registered).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{HeartbeatUpdate, MarketUpdate};

    fn ignore(_: &TransportHeaders, _: &MessageHeader, _: Payload<MarketUpdate>) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_resolve_registered_handler() {
        let handlers = Handlers::new().with::<MarketUpdate, _>(Flow::InPlay, handler_fn(ignore));
        assert!(handlers.resolve::<MarketUpdate>(Flow::InPlay).is_ok());
        assert!(handlers.contains::<MarketUpdate>(Flow::InPlay));
        assert_eq!(handlers.len(), 1);
    }

    #[test]
    fn test_resolve_is_flow_scoped() {
        let handlers = Handlers::new().with::<MarketUpdate, _>(Flow::InPlay, handler_fn(ignore));
        let err = handlers.resolve::<MarketUpdate>(Flow::PreMatch).err().unwrap();
        assert_eq!(
            err,
            ConfigError::MissingHandler {
                entity: "MarketUpdate",
                flow: Flow::PreMatch,
            }
        );
    }

    #[test]
    fn test_resolve_missing_entity_type() {
        let handlers = Handlers::new().with::<MarketUpdate, _>(Flow::InPlay, handler_fn(ignore));
        let err = handlers.resolve::<HeartbeatUpdate>(Flow::InPlay).err().unwrap();
        assert!(err.to_string().contains("HeartbeatUpdate"));
    }

    #[test]
    fn test_payload_views() {
        let payload = Payload::Entity(5);
        assert_eq!(payload.entity(), Some(&5));
        assert!(payload.is_entity());
        assert_eq!(Payload::<i32>::Empty.into_entity(), None);
        assert_eq!(Payload::<i32>::Undecodable.entity(), None);
    }
}
